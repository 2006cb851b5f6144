//! Content-type helpers for the small set of media types the engine names files by.

/// MIME type for jp2
pub const JP2: &str = "image/jp2";
/// Alternative MIME type for jp2
pub const JPX: &str = "image/jpx";
pub const BINARY_OCTET: &str = "binary/octet-stream";
pub const APPLICATION_OCTET: &str = "application/octet-stream";

/// content-type -> extension. The first entry for an extension is the one used in reverse.
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("audio/wav", "wav"),
    ("audio/mp3", "mp3"),
    ("audio/x-mpeg-3", "mp3"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("video/mpeg", "mpg"),
    ("video/mp2", "mp2"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("image/bmp", "bmp"),
    ("image/cgm", "cgm"),
    ("image/gif", "gif"),
    ("image/ief", "ief"),
    (JP2, "jp2"),
    (JPX, "jp2"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/pict", "pic"),
    ("image/png", "png"),
    ("image/svg+xml", "svg"),
    ("image/tiff", "tiff"),
    ("image/tif", "tiff"),
];

/// Strip any parameters (`; charset=...`) and lower-case a content-type.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Extension for a known content-type.
pub fn extension_for_content_type(content_type: Option<&str>) -> Option<&'static str> {
    let content_type = content_type.map(essence).filter(|c| !c.is_empty())?;
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
}

/// Content-type for a known extension, with or without a leading dot.
pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let candidate = extension.trim().trim_start_matches('.').to_lowercase();
    if candidate.is_empty() {
        return None;
    }
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(_, ext)| *ext == candidate)
        .map(|(ct, _)| *ct)
}

pub fn is_binary_octet(content_type: Option<&str>) -> bool {
    matches!(
        content_type.map(essence).as_deref(),
        Some(BINARY_OCTET) | Some(APPLICATION_OCTET)
    )
}

pub fn is_audio(media_type: &str) -> bool {
    media_type.starts_with("audio/")
}

pub fn is_video(media_type: &str) -> bool {
    media_type.starts_with("video/")
}

pub fn is_image(media_type: &str) -> bool {
    media_type.starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_ignores_parameters_and_case() {
        assert_eq!(
            extension_for_content_type(Some("Image/JPEG; charset=binary")),
            Some("jpg")
        );
        assert_eq!(extension_for_content_type(Some("image/tif")), Some("tiff"));
        assert_eq!(extension_for_content_type(Some("text/html")), None);
        assert_eq!(extension_for_content_type(None), None);
    }

    #[test]
    fn test_content_type_prefers_first_mapping() {
        assert_eq!(content_type_for_extension(".jp2"), Some(JP2));
        assert_eq!(content_type_for_extension("MP3"), Some("audio/mp3"));
        assert_eq!(content_type_for_extension(""), None);
    }

    #[test]
    fn test_detects_octet_stream_variants() {
        assert!(is_binary_octet(Some("application/octet-stream")));
        assert!(is_binary_octet(Some("binary/octet-stream; foo=bar")));
        assert!(!is_binary_octet(Some("image/png")));
        assert!(!is_binary_octet(None));
    }
}
