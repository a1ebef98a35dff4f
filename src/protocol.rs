//! Control-plane messages exchanged between upload clients and the coordinator.
//!
//! Query parameters and JSON bodies use camelCase field names.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateParams {
    pub filename: String,
    pub content_type: String,
}

/// Everything a client needs to carry between control-plane calls for one upload. The
/// coordinator keeps no copy of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadHandle {
    pub upload_id: String,
    pub filename: String,
    pub object_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlParams {
    pub filename: String,
    pub upload_id: String,
    pub part_number: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartCredential {
    pub url: String,
    pub expires_in_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteParams {
    pub filename: String,
    pub upload_id: String,
    #[serde(default)]
    pub client_upload_time_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub message: String,
    pub filename: String,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortParams {
    pub filename: String,
    pub upload_id: String,
}

/// Body of every non-2xx control-plane response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
