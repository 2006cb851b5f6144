use std::fmt::{Display, Formatter, Result as FmtResult};

/// A key in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectInBucket {
    pub bucket: String,
    pub key: String,
}

impl ObjectInBucket {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// `s3://bucket/key` form.
    pub fn s3_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    /// Parse a bucket object reference.
    ///
    /// Accepts `s3://bucket/key` and the https forms
    /// `https://bucket.s3[.-]region.amazonaws.com/key` and
    /// `https://s3[.-]region.amazonaws.com/bucket/key`. Returns `None` for anything else.
    pub fn parse(uri: &str) -> Option<Self> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            return Self::from_bucket_and_key(rest.split_once('/')?);
        }

        let rest = uri
            .strip_prefix("https://")
            .or_else(|| uri.strip_prefix("http://"))?;
        let (host, path) = rest.split_once('/')?;
        let host = host.to_lowercase();
        if !host.ends_with(".amazonaws.com") {
            return None;
        }

        if host.starts_with("s3.") || host.starts_with("s3-") {
            // path style, bucket is the first path segment
            Self::from_bucket_and_key(path.split_once('/')?)
        } else {
            // virtual-hosted style, bucket is everything before ".s3"
            let bucket = host
                .find(".s3.")
                .or_else(|| host.find(".s3-"))
                .map(|idx| &host[..idx])?;
            Self::from_bucket_and_key((bucket, path))
        }
    }

    fn from_bucket_and_key((bucket, key): (&str, &str)) -> Option<Self> {
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        let key = urlencoding::decode(key).ok()?;
        Some(Self::new(bucket, key.into_owned()))
    }
}

impl Display for ObjectInBucket {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
