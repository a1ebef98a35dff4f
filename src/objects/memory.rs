//! In-memory [`ObjectStore`] with multipart semantics close enough to S3 for exercising the
//! coordinator and the upload client without a real backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{Error, Key, ObjectStore, Result};
use crate::manifest::CompletedPart;

const BUCKET: &str = "memory-bucket";

struct PendingUpload {
    key: String,
    content_type: String,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Clone, Debug)]
pub(crate) struct StoredObject {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Default)]
struct Inner {
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<String, StoredObject>,
    next_id: u64,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
    complete_calls: AtomicUsize,
    abort_calls: AtomicUsize,
    presign_calls: AtomicUsize,
    fail_completion: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_completion(&self, fail: bool) {
        self.fail_completion.store(fail, Ordering::SeqCst);
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    pub fn presign_calls(&self) -> usize {
        self.presign_calls.load(Ordering::SeqCst)
    }

    pub fn pending_uploads(&self) -> usize {
        self.inner.lock().expect("lock").uploads.len()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.inner.lock().expect("lock").objects.get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.inner.lock().expect("lock").objects.len()
    }

    /// Plays the role of the storage backend receiving a `PUT` to a presigned part URL. Returns
    /// the quoted ETag the backend would put in the response header.
    pub fn accept_part(&self, url: &str, data: Bytes) -> Result<String> {
        let (key, upload_id, part_number) = parse_part_url(url)?;
        let mut inner = self.inner.lock().expect("lock");
        inner.next_id += 1;
        let e_tag = format!("\"{:08x}-{part_number}\"", inner.next_id);
        let upload = inner
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| Error::UnknownUploadId(upload_id.clone()))?;
        if upload.key != key {
            return Err(Error::UnknownUploadId(upload_id));
        }
        upload.parts.insert(part_number, (e_tag.clone(), data));
        Ok(e_tag)
    }
}

fn parse_part_url(url: &str) -> Result<(String, String, i32)> {
    let rest = url
        .strip_prefix(&format!("memory://{BUCKET}/"))
        .ok_or_else(|| Error::UnknownUploadId(url.to_string()))?;
    let (key, query) = rest
        .split_once('?')
        .ok_or_else(|| Error::UnknownUploadId(url.to_string()))?;
    let mut upload_id = None;
    let mut part_number = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("uploadId", v)) => upload_id = Some(v.to_string()),
            Some(("partNumber", v)) => part_number = v.parse::<i32>().ok(),
            _ => {}
        }
    }
    match (upload_id, part_number) {
        (Some(u), Some(p)) => Ok((key.to_string(), u, p)),
        _ => Err(Error::UnknownUploadId(url.to_string())),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn initiate_multipart_upload(&self, key: &Key, content_type: &str) -> Result<String> {
        let mut inner = self.inner.lock().expect("lock");
        inner.next_id += 1;
        let upload_id = format!("upload-{}", inner.next_id);
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn presign_upload_part(
        &self,
        key: &Key,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> Result<String> {
        let signature = self.presign_calls.fetch_add(1, Ordering::SeqCst);
        if !self.inner.lock().expect("lock").uploads.contains_key(upload_id) {
            return Err(Error::UnknownUploadId(upload_id.to_string()));
        }
        Ok(format!(
            "memory://{BUCKET}/{key}?uploadId={upload_id}&partNumber={part_number}&expires={}&signature={signature}",
            expires_in.as_secs()
        ))
    }

    async fn complete_multipart_upload(
        &self,
        key: &Key,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_completion.load(Ordering::SeqCst) {
            return Err(Error::UnknownUploadId(upload_id.to_string()));
        }
        let mut inner = self.inner.lock().expect("lock");
        let upload = inner
            .uploads
            .get(upload_id)
            .filter(|u| u.key == key.to_string())
            .ok_or_else(|| Error::UnknownUploadId(upload_id.to_string()))?;

        let mut data = BytesMut::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((e_tag, bytes)) if *e_tag == part.e_tag => data.extend_from_slice(bytes),
                _ => return Err(Error::InvalidPart(part.part_number)),
            }
        }
        let content_type = upload.content_type.clone();
        inner.uploads.remove(upload_id);
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                content_type,
                data: data.freeze(),
            },
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &Key, upload_id: &str) -> Result<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lock()
            .expect("lock")
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownUploadId(upload_id.to_string()))
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        self.inner
            .lock()
            .expect("lock")
            .objects
            .remove(&key.to_string());
        Ok(())
    }

    fn object_url(&self, key: &Key) -> String {
        format!("memory://{BUCKET}/{key}")
    }
}
