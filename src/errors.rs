use thiserror;

use crate::manifest::Manifest;
use crate::objects;
use crate::protocol::UploadHandle;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to initiate upload: {0}")]
    InitiateFailed(String),
    #[error("failed to issue credential for part {part_number}: {reason}")]
    CredentialIssuanceFailed {
        part_number: i32,
        reason: String,
        retryable: bool,
    },
    #[error("transfer of part {part_number} failed: {reason}")]
    PartTransferFailed {
        part_number: i32,
        reason: String,
        retryable: bool,
    },
    #[error("parts {parts:?} failed: {reason}")]
    PartsFailed { parts: Vec<i32>, reason: String },

    #[error("plan incomplete, missing parts: {0:?}")]
    PlanIncomplete(Vec<i32>),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("completion failed: {0}")]
    CompletionFailed(String),
    #[error("abort failed: {0}")]
    AbortFailed(String),

    #[error("upload cancelled")]
    Cancelled,
    /// A failure after initiation that left the multipart session open. `manifest` is present
    /// when every part uploaded and only the completion call failed.
    #[error("upload of {} left unfinished: {source}", handle.filename)]
    Unfinished {
        handle: UploadHandle,
        manifest: Option<Manifest>,
        source: Box<Error>,
    },

    #[error("object store error: {0}")]
    ObjectStoreError(#[from] objects::Error),
    #[error("config deserialization error")]
    ConfigError(#[from] serde_yaml::Error),
    #[error("io error")]
    IOError(#[from] std::io::Error),
    #[error("http client error: {0}")]
    HTTPClientError(#[from] reqwest::Error),
}

impl Error {
    /// Whether a per-part attempt that failed with this error may be repeated with a freshly
    /// issued credential.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::CredentialIssuanceFailed { retryable, .. } => *retryable,
            Error::PartTransferFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// The failure underneath any [`Error::Unfinished`] wrapping.
    pub fn root(&self) -> &Error {
        match self {
            Error::Unfinished { source, .. } => source.root(),
            other => other,
        }
    }
}
