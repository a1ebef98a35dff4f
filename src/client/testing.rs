//! In-process transports that route the client straight into an [`UploadCoordinator`] over a
//! [`MemoryStore`], with hooks for injecting failures and delays.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;

use super::source::PartBody;
use super::transport::{ControlPlane, DataPlane};
use crate::coordinator::UploadCoordinator;
use crate::errors::{Error, Result};
use crate::manifest::Manifest;
use crate::objects::memory::MemoryStore;
use crate::protocol::{CompleteResponse, PartCredential, UploadHandle};

/// Takes one injected failure for `part_number`, if any remain.
fn take_failure(failures: &Mutex<HashMap<i32, u32>>, part_number: i32) -> bool {
    let mut failures = failures.lock().expect("lock");
    match failures.get_mut(&part_number) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

pub(crate) struct LocalControlPlane {
    coordinator: UploadCoordinator,
    calls: AtomicUsize,
    completed: Mutex<Vec<i32>>,
    credential_failures: Mutex<HashMap<i32, u32>>,
}

impl LocalControlPlane {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            coordinator: UploadCoordinator::new(store, "videos", Duration::from_secs(900)),
            calls: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
            credential_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Makes the next `times` credential requests for `part_number` fail with a server error.
    pub fn fail_credentials(&self, part_number: i32, times: u32) {
        self.credential_failures
            .lock()
            .expect("lock")
            .insert(part_number, times);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Part numbers of the last manifest submitted, in submission order.
    pub fn completed_part_numbers(&self) -> Vec<i32> {
        self.completed.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ControlPlane for LocalControlPlane {
    async fn initiate(&self, filename: &str, content_type: &str) -> Result<UploadHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.coordinator.initiate(filename, content_type).await
    }

    async fn part_url(&self, handle: &UploadHandle, part_number: i32) -> Result<PartCredential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.credential_failures, part_number) {
            return Err(Error::CredentialIssuanceFailed {
                part_number,
                reason: String::from("injected 503"),
                retryable: true,
            });
        }
        self.coordinator
            .issue_part_credential(&handle.filename, &handle.upload_id, part_number)
            .await
    }

    async fn complete(
        &self,
        handle: &UploadHandle,
        manifest: &Manifest,
        _elapsed: Duration,
    ) -> Result<CompleteResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.completed.lock().expect("lock") =
            manifest.parts().iter().map(|p| p.part_number).collect();
        let completed = self
            .coordinator
            .complete(&handle.filename, &handle.upload_id, manifest)
            .await?;
        Ok(CompleteResponse {
            message: String::from("Upload completed successfully"),
            filename: completed.filename,
            url: completed.url,
        })
    }

    async fn abort(&self, handle: &UploadHandle) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.coordinator
            .abort(&handle.filename, &handle.upload_id)
            .await
    }
}

pub(crate) struct MemoryDataPlane {
    store: Arc<MemoryStore>,
    puts: AtomicUsize,
    failures: Mutex<HashMap<i32, u32>>,
    delays: Mutex<HashMap<i32, Duration>>,
}

impl MemoryDataPlane {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            puts: AtomicUsize::new(0),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }

    /// Makes the next `times` `PUT`s of `part_number` answer with a non-success status.
    pub fn fail_part(&self, part_number: i32, times: u32) {
        self.failures
            .lock()
            .expect("lock")
            .insert(part_number, times);
    }

    pub fn delay_part(&self, part_number: i32, delay: Duration) {
        self.delays.lock().expect("lock").insert(part_number, delay);
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataPlane for MemoryDataPlane {
    async fn put_part(&self, url: &str, body: PartBody) -> Result<String> {
        let part_number = body.part_number;
        self.puts.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .expect("lock")
            .get(&part_number)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let data = body
            .stream
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        assert_eq!(body.length, data.len() as u64, "part {part_number} length");

        if take_failure(&self.failures, part_number) {
            return Err(Error::PartTransferFailed {
                part_number,
                reason: String::from("storage backend responded 503 Service Unavailable"),
                retryable: true,
            });
        }

        self.store
            .accept_part(url, data.freeze())
            .map_err(|e| Error::PartTransferFailed {
                part_number,
                reason: format!("{e}"),
                retryable: false,
            })
    }
}
