use std::path::Component;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

mod config;
pub use config::ObjectsBackend;
mod errors;
pub use errors::{Error, KeyError, Result};
pub(crate) mod s3;
pub use s3::S3Config;
pub use s3::S3;

#[cfg(test)]
pub(crate) mod memory;

use crate::manifest::CompletedPart;

/// A wrapper around [`std::path::PathBuf`] that rejects unsavory key names.
///
/// The following rules applied during the [`TryFrom<PathBuf>`] implementation:
///
/// * paths must not start with `/`
/// * paths are delimited by `/`
/// * paths must not contain relative segments (ie `.` or `..`)
/// * only characters explicitly documented as safe [in the S3
///   docs](https://docs.aws.amazon.com/AmazonS3/latest/userguide/object-keys.html) are allowed in
///   path segments
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    key: PathBuf,
}

impl Key {
    /// Builds a key from a prefix (which may contain several segments) and a single trailing
    /// file name segment.
    pub fn with_prefix(prefix: &str, file_name: &str) -> Result<Key> {
        let name = PathBuf::from(file_name);
        if name.components().count() != 1 {
            return Err(KeyError::PathComponentsMustMatchRegex(RE.as_str().to_string()).into());
        }
        let mut pb = PathBuf::new();
        if !prefix.is_empty() {
            pb.push(prefix);
        }
        pb.push(name);
        Key::try_from(pb)
    }

    /// The last segment of the key.
    pub fn file_name(&self) -> Option<&str> {
        self.key.file_name().and_then(|s| s.to_str())
    }
}

impl From<&Key> for String {
    fn from(k: &Key) -> String {
        format!("{}", k.key.display())
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.key.display())
    }
}

impl TryFrom<PathBuf> for Key {
    type Error = Error;

    fn try_from(pb: PathBuf) -> Result<Key> {
        let key = pb
            .components()
            .try_fold(PathBuf::new(), validate_component)?;
        if key.as_os_str().is_empty() {
            return Err(KeyError::Empty.into());
        }
        Ok(Key { key })
    }
}

static RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.!*'()-]+$").expect("key regex must compile"));

fn validate_component(mut pb: PathBuf, c: Component<'_>) -> std::result::Result<PathBuf, KeyError> {
    match c {
        Component::Prefix(_) => return Err(KeyError::PrefixNotAllowed),
        Component::RootDir => return Err(KeyError::RootDirNotAllowed),
        Component::CurDir => return Err(KeyError::CurDirNotAllowed),
        Component::ParentDir => return Err(KeyError::ParentDirNotAllowed),
        Component::Normal(s) => {
            if let Some(s) = s.to_str() {
                if !RE.is_match(s) {
                    return Err(KeyError::PathComponentsMustMatchRegex(
                        RE.as_str().to_string(),
                    ));
                }
            } else {
                return Err(KeyError::PathComponentsMustBeValidUnicode);
            }
        }
    }
    pb.push(c);
    Ok(pb)
}

/// The subset of a multipart-capable object store that the upload coordinator relies on.
///
/// None of these methods ever see object bytes: parts are written by clients directly to the
/// store using URLs produced by [`ObjectStore::presign_upload_part`].
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Starts a multipart upload for `key` and returns the backend-issued upload id.
    async fn initiate_multipart_upload(&self, key: &Key, content_type: &str) -> Result<String>;

    /// Returns a URL authorizing a single `PUT` of part `part_number` of the given upload, valid
    /// for `expires_in`.
    async fn presign_upload_part(
        &self,
        key: &Key,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> Result<String>;

    async fn complete_multipart_upload(
        &self,
        key: &Key,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, key: &Key, upload_id: &str) -> Result<()>;

    async fn delete(&self, key: &Key) -> Result<()>;

    /// Durable URL at which a completed object is reachable.
    fn object_url(&self, key: &Key) -> String;
}
