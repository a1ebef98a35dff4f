//! Observable state of an upload, for whatever presents it to a user.

use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    Uploading { progress: u8 },
    /// `url` is `None` when there was nothing to upload.
    Success { url: Option<String> },
    Error { reason: String },
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Success { .. } | UploadStatus::Error { .. })
    }
}

/// Single writer of an [`UploadStatus`]; any number of observers subscribe to it.
///
/// Transitions follow `Idle -> Uploading -> Success | Error`, and back to `Idle` only through
/// [`StatusTracker::reset`] once terminal. Progress never decreases while uploading.
pub struct StatusTracker {
    tx: watch::Sender<UploadStatus>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(UploadStatus::Idle);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> UploadStatus {
        self.tx.borrow().clone()
    }

    /// Moves from `Idle` to `Uploading { progress: 0 }`. Returns false if an upload is already in
    /// progress or has not been reset.
    pub fn begin(&self) -> bool {
        self.tx.send_if_modified(|status| match status {
            UploadStatus::Idle => {
                *status = UploadStatus::Uploading { progress: 0 };
                true
            }
            _ => false,
        })
    }

    pub fn progress(&self, progress: u8) {
        let progress = progress.min(100);
        self.tx.send_if_modified(|status| match status {
            UploadStatus::Uploading { progress: current } if progress > *current => {
                *current = progress;
                true
            }
            _ => false,
        });
    }

    pub fn succeed(&self, url: Option<String>) {
        self.finish(UploadStatus::Success { url });
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.finish(UploadStatus::Error {
            reason: reason.into(),
        });
    }

    /// Returns to `Idle` after a terminal state so another upload may begin.
    pub fn reset(&self) -> bool {
        self.tx.send_if_modified(|status| {
            if status.is_terminal() {
                *status = UploadStatus::Idle;
                true
            } else {
                false
            }
        })
    }

    fn finish(&self, terminal: UploadStatus) {
        self.tx.send_if_modified(|status| match status {
            UploadStatus::Uploading { .. } => {
                *status = terminal;
                true
            }
            _ => false,
        });
    }
}
