//! # Conveyor
//!
//! Multipart uploads of large files straight to S3-compatible object storage. The server side
//! ([`coordinator`], served over [`http`]) hands out one presigned URL per part and finalizes the
//! object; it never sees file bytes. The [`client`] plans parts, `PUT`s them directly to the
//! storage backend and submits the ordered completion tokens back to the coordinator.

pub mod config;
pub use config::{ClientConfig, Config, ServerConfig};

mod errors;
pub use errors::{Error, Result};

pub mod client;
pub mod coordinator;
pub mod http;
pub mod manifest;
pub mod objects;
pub mod protocol;
