use std::fmt;
use std::str::FromStr;

use crate::error::{FerryError, Result};

const SCHEME: &str = "gs://";

/// `gs://bucket/path`. The path never starts or ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GcsUri {
    pub bucket: String,
    pub path: String,
}

impl GcsUri {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: normalize(&path.into()),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let rest = s.trim().strip_prefix(SCHEME).ok_or_else(|| {
            FerryError::InvalidStoragePath(format!("'{}' does not start with {}", s, SCHEME))
        })?;

        let (bucket, path) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(FerryError::InvalidStoragePath(format!("'{}' has no bucket", s)));
        }

        let uri = Self::new(bucket, path);
        if uri.path.matches('*').count() > 1 {
            return Err(FerryError::InvalidStoragePath(format!(
                "'{}' has more than one '*' wildcard", s
            )));
        }
        if let Some(star) = uri.path.find('*') {
            if uri.path[star..].contains('/') {
                return Err(FerryError::InvalidStoragePath(format!(
                    "'{}' has a wildcard outside the final path segment", s
                )));
            }
        }
        Ok(uri)
    }

    pub fn join(&self, segment: &str) -> Self {
        let segment = normalize(segment);
        let path = match (self.path.is_empty(), segment.is_empty()) {
            (true, _) => segment,
            (false, true) => self.path.clone(),
            (false, false) => format!("{}/{}", self.path, segment),
        };
        Self { bucket: self.bucket.clone(), path }
    }

    /// Drops the last path segment. The parent of a bucket root is itself.
    pub fn parent(&self) -> Self {
        let path = self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        Self { bucket: self.bucket.clone(), path: path.to_string() }
    }

    /// Last path segment, empty for a bucket root.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    pub fn has_wildcard(&self) -> bool {
        self.path.contains('*')
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

impl fmt::Display for GcsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}{}", SCHEME, self.bucket)
        } else {
            write!(f, "{}{}/{}", SCHEME, self.bucket, self.path)
        }
    }
}

impl FromStr for GcsUri {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
