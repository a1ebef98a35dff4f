//! Moves the bytes of one upload attempt: credential, direct `PUT`, token bookkeeping and
//! progress for every planned part, a bounded number of parts at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::assembler;
use super::plan::{Part, PartPlan};
use super::retry::{retry_with_backoff, Backoff};
use super::source::{ByteSource, PartBody};
use super::status::StatusTracker;
use super::transport::{ControlPlane, DataPlane};
use crate::config::ClientConfig;
use crate::errors::{Error, Result};
use crate::manifest::Manifest;
use crate::protocol::UploadHandle;

const MAX_BACKOFF_FACTOR: u32 = 8;

#[derive(Clone, Debug)]
pub struct TransferConfig {
    pub part_size: u64,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub abort_on_failure: bool,
}

impl From<&ClientConfig> for TransferConfig {
    fn from(config: &ClientConfig) -> Self {
        let initial = Duration::from_millis(config.retry_backoff_ms);
        Self {
            part_size: config.part_size,
            concurrency: config.concurrency,
            max_attempts: config.max_attempts,
            backoff: Backoff::Exponential {
                initial,
                max: initial * MAX_BACKOFF_FACTOR,
            },
            abort_on_failure: config.abort_on_failure,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartStatus {
    Pending,
    InFlight,
    Uploaded,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartRecord {
    pub part_number: i32,
    pub completion_token: Option<String>,
    pub status: PartStatus,
    pub failure: Option<String>,
}

impl PartRecord {
    pub fn pending(part_number: i32) -> Self {
        Self {
            part_number,
            completion_token: None,
            status: PartStatus::Pending,
            failure: None,
        }
    }
}

/// One [`PartRecord`] per planned part, indexed by part number.
struct PartLedger {
    records: Mutex<Vec<PartRecord>>,
}

impl PartLedger {
    fn new(plan: &PartPlan) -> Self {
        Self {
            records: Mutex::new(
                plan.parts()
                    .iter()
                    .map(|p| PartRecord::pending(p.number))
                    .collect(),
            ),
        }
    }

    fn update(&self, part_number: i32, f: impl FnOnce(&mut PartRecord)) {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(record) = records.get_mut(part_number as usize - 1) {
            f(record);
        }
    }

    fn in_flight(&self, part_number: i32) {
        self.update(part_number, |r| r.status = PartStatus::InFlight);
    }

    fn uploaded(&self, part_number: i32, token: String) {
        self.update(part_number, |r| {
            r.status = PartStatus::Uploaded;
            r.completion_token = Some(token);
            r.failure = None;
        });
    }

    fn failed(&self, part_number: i32, reason: String) {
        self.update(part_number, |r| {
            r.status = PartStatus::Failed;
            r.failure = Some(reason);
        });
    }

    fn pending(&self, part_number: i32) {
        self.update(part_number, |r| r.status = PartStatus::Pending);
    }

    fn snapshot(&self) -> Vec<PartRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Accumulates uploaded bytes from concurrently finishing parts and emits the integer percentage
/// only when it grows.
struct ProgressTracker<'a> {
    total: u64,
    uploaded: AtomicU64,
    last: Mutex<u8>,
    emit: &'a (dyn Fn(u8) + Send + Sync),
}

impl<'a> ProgressTracker<'a> {
    fn new(total: u64, emit: &'a (dyn Fn(u8) + Send + Sync)) -> Self {
        Self {
            total,
            uploaded: AtomicU64::new(0),
            last: Mutex::new(0),
            emit,
        }
    }

    fn add(&self, bytes: u64) {
        let uploaded = self.uploaded.fetch_add(bytes, Ordering::SeqCst) + bytes;
        let percent = (uploaded.min(self.total) * 100 / self.total.max(1)) as u8;
        // emission happens under the lock so observers never see a smaller value after a larger one
        let mut last = match self.last.lock() {
            Ok(last) => last,
            Err(poisoned) => poisoned.into_inner(),
        };
        if percent > *last {
            *last = percent;
            (self.emit)(percent);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed { filename: String, url: String },
    /// The source was empty; nothing was sent anywhere.
    Empty,
}

impl UploadOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            UploadOutcome::Completed { url, .. } => Some(url),
            UploadOutcome::Empty => None,
        }
    }
}

/// Client side of the upload protocol over explicitly supplied transports.
pub struct Uploader<C, D> {
    control: C,
    data: D,
    config: TransferConfig,
}

impl<C: ControlPlane, D: DataPlane> Uploader<C, D> {
    pub fn new(control: C, data: D, config: TransferConfig) -> Self {
        Self {
            control,
            data,
            config,
        }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    /// Runs one upload attempt and publishes its lifecycle on `tracker`, which must be idle.
    pub async fn run<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        filename: &str,
        content_type: &str,
        tracker: &StatusTracker,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        if !tracker.begin() {
            return Err(Error::InvalidInput(String::from(
                "status tracker is not idle; reset it before starting another upload",
            )));
        }
        let progress = |percent: u8| tracker.progress(percent);
        match self
            .upload(source, filename, content_type, &progress, cancel)
            .await
        {
            Ok(outcome) => {
                tracker.succeed(outcome.url().map(String::from));
                Ok(outcome)
            }
            Err(e) => {
                tracker.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Uploads `source` as `filename`, reporting integer percentages to `progress` as they grow.
    ///
    /// Triggering `cancel` stops dispatching parts, drops the ones in flight, aborts the
    /// multipart upload and returns [`Error::Cancelled`].
    ///
    /// Part failures abort the session when `abort_on_failure` is set. Any other failure after
    /// initiation returns [`Error::Unfinished`] carrying the handle, so the caller can
    /// [`finish`](Self::finish) or [`abort`](Self::abort) it.
    pub async fn upload<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        filename: &str,
        content_type: &str,
        progress: &(dyn Fn(u8) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        let plan = PartPlan::new(source.len(), self.config.part_size)?;
        if plan.is_empty() {
            tracing::info!(filename, "source is empty, nothing to upload");
            return Ok(UploadOutcome::Empty);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let started = Instant::now();
        let handle = self.control.initiate(filename, content_type).await?;
        tracing::info!(
            filename = %handle.filename,
            upload_id = %handle.upload_id,
            parts = plan.len(),
            file_size = plan.file_size(),
            part_size = plan.part_size(),
            "multipart upload initiated"
        );

        let ledger = PartLedger::new(&plan);
        let tracker = ProgressTracker::new(plan.file_size(), progress);
        let stop = cancel.child_token();

        let transfers = stream::iter(plan.parts().iter().copied())
            .map(|part| self.transfer_part(source, &handle, part, &ledger, &tracker, &stop))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect::<Vec<()>>();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = transfers => {}
        }

        if cancel.is_cancelled() {
            tracing::info!(filename = %handle.filename, "upload cancelled");
            self.abort_quietly(&handle).await;
            return Err(Error::Cancelled);
        }

        let records = ledger.snapshot();
        let manifest = match assembler::assemble(&plan, &records) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(filename = %handle.filename, error = %e, "upload failed");
                if self.config.abort_on_failure {
                    self.abort_quietly(&handle).await;
                    return Err(e);
                }
                return Err(Error::Unfinished {
                    handle,
                    manifest: None,
                    source: Box::new(e),
                });
            }
        };
        self.finish(handle, manifest, started.elapsed()).await
    }

    /// Submits `manifest` for an upload whose parts are all stored, typically one returned inside
    /// [`Error::Unfinished`] after a failed completion call.
    pub async fn finish(
        &self,
        handle: UploadHandle,
        manifest: Manifest,
        elapsed: Duration,
    ) -> Result<UploadOutcome> {
        match assembler::finalize(&self.control, &handle, &manifest, elapsed).await {
            Ok(response) => {
                tracing::info!(
                    filename = %response.filename,
                    url = %response.url,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "upload complete"
                );
                Ok(UploadOutcome::Completed {
                    filename: response.filename,
                    url: response.url,
                })
            }
            // session stays open for another completion attempt
            Err(e) => {
                tracing::warn!(filename = %handle.filename, error = %e, "completion failed");
                Err(Error::Unfinished {
                    handle,
                    manifest: Some(manifest),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Discards an open multipart upload and every part stored under it.
    pub async fn abort(&self, handle: &UploadHandle) -> Result<()> {
        self.control.abort(handle).await?;
        tracing::info!(filename = %handle.filename, "multipart upload aborted");
        Ok(())
    }

    async fn transfer_part<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        handle: &UploadHandle,
        part: Part,
        ledger: &PartLedger,
        tracker: &ProgressTracker<'_>,
        stop: &CancellationToken,
    ) {
        if stop.is_cancelled() {
            return;
        }
        ledger.in_flight(part.number);

        let description = format!("upload part {}", part.number);
        let result = retry_with_backoff(
            self.config.max_attempts,
            self.config.backoff,
            &description,
            |attempt| async move {
                if stop.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                tracing::debug!(part_number = part.number, attempt, "uploading part");
                self.attempt_part(source, handle, part).await
            },
            Error::is_retryable,
        )
        .await;

        match result {
            Ok(token) => {
                tracing::debug!(part_number = part.number, length = part.length, "part uploaded");
                ledger.uploaded(part.number, token);
                tracker.add(part.length);
            }
            Err(Error::Cancelled) => ledger.pending(part.number),
            Err(e) => {
                tracing::warn!(part_number = part.number, error = %e, "part failed");
                ledger.failed(part.number, e.to_string());
                stop.cancel();
            }
        }
    }

    async fn attempt_part<S: ByteSource + ?Sized>(
        &self,
        source: &S,
        handle: &UploadHandle,
        part: Part,
    ) -> Result<String> {
        let credential = self.control.part_url(handle, part.number).await?;
        let stream = source
            .open_range(part.offset, part.length)
            .await
            .map_err(|e| Error::PartTransferFailed {
                part_number: part.number,
                reason: format!("reading source: {e}"),
                retryable: false,
            })?;
        self.data
            .put_part(
                &credential.url,
                PartBody {
                    part_number: part.number,
                    length: part.length,
                    stream,
                },
            )
            .await
    }

    async fn abort_quietly(&self, handle: &UploadHandle) {
        if let Err(e) = self.abort(handle).await {
            tracing::warn!(filename = %handle.filename, error = %e, "failed to abort upload");
        }
    }
}
