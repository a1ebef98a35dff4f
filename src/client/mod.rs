//! Upload client: plans parts, moves bytes directly to the storage backend, and finalizes
//! through the coordinator.

pub mod assembler;
pub mod driver;
pub mod plan;
pub mod retry;
pub mod source;
pub mod status;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{PartRecord, PartStatus, TransferConfig, UploadOutcome, Uploader};
pub use plan::{Part, PartPlan};
pub use retry::Backoff;
pub use source::{ByteSource, FileSource, PartBody, PartStream};
pub use status::{StatusTracker, UploadStatus};
pub use transport::{ControlPlane, DataPlane, HttpControlPlane, HttpDataPlane};
