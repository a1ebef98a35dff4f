//! Network seams of the upload client.
//!
//! [`ControlPlane`] talks to the upload coordinator and never carries file bytes. [`DataPlane`]
//! writes part bodies straight to the storage backend through presigned URLs. Both are built
//! explicitly by the caller and handed to the driver; nothing here is process-global.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{Client, Response, StatusCode};

use super::source::PartBody;
use crate::config::ClientConfig;
use crate::errors::{Error, Result};
use crate::manifest::Manifest;
use crate::protocol::{
    AbortParams, CompleteParams, CompleteResponse, ErrorBody, InitiateParams, PartCredential,
    PartUrlParams, UploadHandle,
};

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn initiate(&self, filename: &str, content_type: &str) -> Result<UploadHandle>;

    async fn part_url(&self, handle: &UploadHandle, part_number: i32) -> Result<PartCredential>;

    async fn complete(
        &self,
        handle: &UploadHandle,
        manifest: &Manifest,
        elapsed: Duration,
    ) -> Result<CompleteResponse>;

    async fn abort(&self, handle: &UploadHandle) -> Result<()>;
}

#[async_trait]
pub trait DataPlane: Send + Sync {
    /// Writes one part and returns the completion token from the backend's `ETag` header,
    /// exactly as received.
    async fn put_part(&self, url: &str, body: PartBody) -> Result<String>;
}

/// [`ControlPlane`] over the coordinator's HTTP API, with short request timeouts.
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
}

impl HttpControlPlane {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.control_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/video/{}", self.base_url, path)
    }
}

/// Extracts the coordinator's error body, falling back to the status line.
async fn error_body(response: Response) -> ErrorBody {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => body,
        Err(_) => ErrorBody {
            code: String::from("unknown"),
            message: status.to_string(),
        },
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn initiate(&self, filename: &str, content_type: &str) -> Result<UploadHandle> {
        let params = InitiateParams {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
        };
        let response = self
            .client
            .post(self.endpoint("initiate-multipart"))
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::InitiateFailed(format!("{e}")))?;

        if !response.status().is_success() {
            let body = error_body(response).await;
            return Err(match body.code.as_str() {
                "invalid_input" => Error::InvalidInput(body.message),
                _ => Error::InitiateFailed(body.message),
            });
        }
        response
            .json::<UploadHandle>()
            .await
            .map_err(|e| Error::InitiateFailed(format!("{e}")))
    }

    async fn part_url(&self, handle: &UploadHandle, part_number: i32) -> Result<PartCredential> {
        let params = PartUrlParams {
            filename: handle.filename.clone(),
            upload_id: handle.upload_id.clone(),
            part_number,
        };
        let response = self
            .client
            .post(self.endpoint("part-presigned-url"))
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::CredentialIssuanceFailed {
                part_number,
                reason: format!("{e}"),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(Error::CredentialIssuanceFailed {
                part_number,
                reason: body.message,
                retryable: is_transient(status),
            });
        }
        response
            .json::<PartCredential>()
            .await
            .map_err(|e| Error::CredentialIssuanceFailed {
                part_number,
                reason: format!("{e}"),
                retryable: true,
            })
    }

    async fn complete(
        &self,
        handle: &UploadHandle,
        manifest: &Manifest,
        elapsed: Duration,
    ) -> Result<CompleteResponse> {
        let params = CompleteParams {
            filename: handle.filename.clone(),
            upload_id: handle.upload_id.clone(),
            client_upload_time_ms: elapsed.as_millis() as u64,
        };
        let response = self
            .client
            .post(self.endpoint("complete-multipart"))
            .query(&params)
            .json(manifest)
            .send()
            .await
            .map_err(|e| Error::CompletionFailed(format!("{e}")))?;

        if !response.status().is_success() {
            let body = error_body(response).await;
            return Err(match body.code.as_str() {
                "invalid_manifest" => Error::InvalidManifest(body.message),
                _ => Error::CompletionFailed(body.message),
            });
        }
        response
            .json::<CompleteResponse>()
            .await
            .map_err(|e| Error::CompletionFailed(format!("{e}")))
    }

    async fn abort(&self, handle: &UploadHandle) -> Result<()> {
        let params = AbortParams {
            filename: handle.filename.clone(),
            upload_id: handle.upload_id.clone(),
        };
        let response = self
            .client
            .post(self.endpoint("abort-multipart"))
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::AbortFailed(format!("{e}")))?;

        if !response.status().is_success() {
            return Err(Error::AbortFailed(error_body(response).await.message));
        }
        Ok(())
    }
}

/// [`DataPlane`] issuing `PUT`s to presigned URLs, with timeouts sized for large bodies.
pub struct HttpDataPlane {
    client: Client,
}

impl HttpDataPlane {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.part_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DataPlane for HttpDataPlane {
    async fn put_part(&self, url: &str, body: PartBody) -> Result<String> {
        let part_number = body.part_number;
        let response = self
            .client
            .put(url)
            .header(CONTENT_LENGTH, body.length)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body.stream))
            .send()
            .await
            .map_err(|e| Error::PartTransferFailed {
                part_number,
                reason: format!("{e}"),
                retryable: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::PartTransferFailed {
                part_number,
                reason: format!("storage backend responded {status}"),
                retryable: true,
            });
        }

        response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .ok_or(Error::PartTransferFailed {
                part_number,
                reason: String::from("response carried no ETag"),
                retryable: true,
            })
    }
}
