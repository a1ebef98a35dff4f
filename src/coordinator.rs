//! Server side of the multipart upload protocol.
//!
//! The coordinator is stateless across requests: the storage backend tracks every open multipart
//! upload by its upload id and clients carry the [`UploadHandle`] between calls.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::manifest::{Manifest, MAX_PART_NUMBER};
use crate::objects::{Key, ObjectStore};
use crate::protocol::{PartCredential, UploadHandle};

const DEFAULT_EXTENSION: &str = "mp4";
const MAX_EXTENSION_LEN: usize = 16;

/// Result of a successfully finalized upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedUpload {
    pub filename: String,
    pub object_key: String,
    pub url: String,
}

#[derive(Clone)]
pub struct UploadCoordinator {
    objects: Arc<dyn ObjectStore>,
    key_prefix: String,
    part_url_ttl: Duration,
}

impl UploadCoordinator {
    pub fn new(objects: Arc<dyn ObjectStore>, key_prefix: &str, part_url_ttl: Duration) -> Self {
        Self {
            objects,
            key_prefix: key_prefix.trim_matches('/').to_string(),
            part_url_ttl,
        }
    }

    /// Starts a multipart upload under a freshly generated `<uuid>.<ext>` filename, keeping only
    /// the extension of the name the client asked for.
    pub async fn initiate(&self, filename: &str, content_type: &str) -> Result<UploadHandle> {
        validate_content_type(content_type)?;
        let unique = unique_filename(filename);
        let key = self.object_key(&unique)?;

        let upload_id = self
            .objects
            .initiate_multipart_upload(&key, content_type)
            .await
            .map_err(|e| Error::InitiateFailed(format!("{e}")))?;

        tracing::debug!(requested = filename, filename = %unique, %key, "initiated multipart upload");

        Ok(UploadHandle {
            upload_id,
            filename: unique,
            object_key: key.to_string(),
        })
    }

    /// Issues a presigned URL for exactly one `PUT` of `part_number`. Every call produces an
    /// independently valid URL, so clients may ask again for a part they are retrying.
    pub async fn issue_part_credential(
        &self,
        filename: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<PartCredential> {
        let key = self.object_key(filename)?;
        validate_upload_id(upload_id)?;
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(Error::InvalidInput(format!(
                "part number {part_number} outside 1..={MAX_PART_NUMBER}"
            )));
        }

        let url = self
            .objects
            .presign_upload_part(&key, upload_id, part_number, self.part_url_ttl)
            .await
            .map_err(|e| Error::CredentialIssuanceFailed {
                part_number,
                reason: format!("{e}"),
                retryable: true,
            })?;

        Ok(PartCredential {
            url,
            expires_in_secs: self.part_url_ttl.as_secs(),
        })
    }

    /// Finalizes the object. The manifest is validated before the backend is contacted and a
    /// backend failure is never retried here.
    pub async fn complete(
        &self,
        filename: &str,
        upload_id: &str,
        manifest: &Manifest,
    ) -> Result<CompletedUpload> {
        let key = self.object_key(filename)?;
        validate_upload_id(upload_id)?;
        manifest.validate()?;

        self.objects
            .complete_multipart_upload(&key, upload_id, manifest.parts())
            .await
            .map_err(|e| Error::CompletionFailed(format!("{e}")))?;

        Ok(CompletedUpload {
            filename: filename.to_string(),
            url: self.objects.object_url(&key),
            object_key: key.to_string(),
        })
    }

    /// Releases backend resources held by an unfinished upload.
    pub async fn abort(&self, filename: &str, upload_id: &str) -> Result<()> {
        let key = self.object_key(filename)?;
        validate_upload_id(upload_id)?;
        self.objects
            .abort_multipart_upload(&key, upload_id)
            .await
            .map_err(|e| Error::AbortFailed(format!("{e}")))
    }

    /// Removes a completed object.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let key = self.object_key(filename)?;
        self.objects.delete(&key).await?;
        Ok(())
    }

    fn object_key(&self, filename: &str) -> Result<Key> {
        Key::with_prefix(&self.key_prefix, filename)
            .map_err(|e| Error::InvalidInput(format!("filename {filename:?}: {e}")))
    }
}

fn unique_filename(requested: &str) -> String {
    let extension = requested
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| String::from(DEFAULT_EXTENSION));
    format!("{}.{}", Uuid::new_v4(), extension)
}

fn validate_content_type(content_type: &str) -> Result<()> {
    let valid = content_type
        .split_once('/')
        .map(|(t, s)| !t.trim().is_empty() && !s.trim().is_empty())
        .unwrap_or(false)
        && http::HeaderValue::from_str(content_type).is_ok();
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "content type {content_type:?} is not of the form type/subtype"
        )))
    }
}

fn validate_upload_id(upload_id: &str) -> Result<()> {
    if upload_id.trim().is_empty() {
        return Err(Error::InvalidInput(String::from("upload id must not be empty")));
    }
    Ok(())
}
