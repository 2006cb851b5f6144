//! Output keys of transcode jobs.
//!
//! Every key starts with the job's unique prefix so concurrent jobs for the same
//! asset never overwrite each other. The prefix is dropped when outputs are moved
//! into storage.

use portico_core::mime;
use portico_core::models::AssetId;

/// Output key for one preset of a job, `None` for media types that cannot be transcoded.
pub fn process_preset(media_type: &str, asset_id: &AssetId, job_id: &str, extension: &str) -> Option<String> {
    let path = asset_id.path();
    if mime::is_audio(media_type) {
        Some(format!("{job_id}/{path}/full/max/default.{extension}"))
    } else if mime::is_video(media_type) {
        Some(format!("{job_id}/{path}/full/full/max/max/0/default.{extension}"))
    } else {
        None
    }
}

/// Storage key of a transcode output: the output key without its job prefix.
pub fn final_destination_key(output_key: &str) -> &str {
    output_key
        .split_once('/')
        .map_or(output_key, |(_, rest)| rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_uses_audio_template() {
        let key = process_preset("audio/wav", &AssetId::new(2, 1, "foo"), "_jobid_", "mp3");
        assert_eq!(key.as_deref(), Some("_jobid_/2/1/foo/full/max/default.mp3"));
    }

    #[test]
    fn test_video_uses_video_template() {
        let key = process_preset("video/mp4", &AssetId::new(2, 1, "foo"), "_jobid_", "webm");
        assert_eq!(key.as_deref(), Some("_jobid_/2/1/foo/full/full/max/max/0/default.webm"));
    }

    #[test]
    fn test_other_media_types_have_no_template() {
        assert!(process_preset("image/jpeg", &AssetId::new(2, 1, "foo"), "j", "mp4").is_none());
        assert!(process_preset("", &AssetId::new(2, 1, "foo"), "j", "mp4").is_none());
    }

    #[test]
    fn test_final_key_matches_submitted_key_without_prefix() {
        let id = AssetId::new(2, 1, "foo");
        for media_type in ["audio/mpeg", "video/webm"] {
            let submitted = process_preset(media_type, &id, "3c1d", "mp4").unwrap();
            let stored = final_destination_key(&submitted);
            assert!(stored.starts_with("2/1/foo/full/"));
            assert_eq!(format!("3c1d/{stored}"), submitted);
        }
    }
}
