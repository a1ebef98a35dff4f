use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use http::Uri;
use serde::Deserialize;

pub(crate) mod logging;
use super::errors::{Error, Result};
use super::s3::logging::LoggingInterceptor;
use super::{Key, ObjectStore};
use crate::manifest::CompletedPart;

fn default_force_path_style() -> bool {
    true
}

#[derive(Clone, Deserialize)]
pub struct S3Config {
    endpoint: String,
    region: String,
    access_key: String,
    secret_key: String,
    bucket_name: String,
    #[serde(default = "default_force_path_style")]
    force_path_style: bool,
    /// Base URL used when handing out object URLs; defaults to `endpoint`.
    #[serde(default)]
    public_url: Option<String>,
}

impl S3Config {
    pub async fn new_objects(&self) -> Result<S3> {
        let credentials = Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            None,
            None,
            "conveyor",
        );

        let uri: Uri = self.endpoint.parse()?;

        let sdk_config = aws_config::load_from_env().await;

        let config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .region(Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(uri.to_string())
            .force_path_style(self.force_path_style)
            .interceptor(LoggingInterceptor)
            .build();

        let s3_client = aws_sdk_s3::Client::from_conf(config);

        let public_url = self
            .public_url
            .clone()
            .unwrap_or_else(|| self.endpoint.clone());

        Ok(S3 {
            bucket_name: self.bucket_name.clone(),
            public_url: public_url.trim_end_matches('/').to_string(),
            client: s3_client,
        })
    }
}

#[derive(Clone)]
pub struct S3 {
    bucket_name: String,
    public_url: String,
    client: Client,
}

#[async_trait]
impl ObjectStore for S3 {
    async fn initiate_multipart_upload(&self, key: &Key, content_type: &str) -> Result<String> {
        let create_multipart_upload_output = self
            .client
            .create_multipart_upload()
            .key(key.to_string())
            .content_type(content_type)
            .bucket(&self.bucket_name)
            .send()
            .await?;

        let upload_id = create_multipart_upload_output.upload_id.ok_or(
            Error::ObjectsFailedToInitiateMultipartUpload("missing upload id"),
        )?;

        Ok(upload_id)
    }

    async fn presign_upload_part(
        &self,
        key: &Key,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> Result<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)?;
        let presigned = self
            .client
            .upload_part()
            .upload_id(upload_id)
            .part_number(part_number)
            .key(key.to_string())
            .bucket(&self.bucket_name)
            .presigned(presigning_config)
            .await?;

        Ok(presigned.uri().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        key: &Key,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let mut mpu = CompletedMultipartUpload::builder();
        for part in parts {
            mpu = mpu.parts(
                S3CompletedPart::builder()
                    .e_tag(&part.e_tag)
                    .part_number(part.part_number)
                    .build(),
            );
        }
        let _complete_multipart_upload_output = self
            .client
            .complete_multipart_upload()
            .multipart_upload(mpu.build())
            .upload_id(upload_id)
            .key(key.to_string())
            .bucket(&self.bucket_name)
            .send()
            .await?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &Key, upload_id: &str) -> Result<()> {
        let _abort_multipart_upload_output = self
            .client
            .abort_multipart_upload()
            .upload_id(upload_id)
            .key(key.to_string())
            .bucket(&self.bucket_name)
            .send()
            .await?;
        // parts whose PUT was still in flight when the abort landed may linger; the bucket
        // lifecycle policy for incomplete multipart uploads is responsible for those.

        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<()> {
        self.client
            .delete_object()
            .key(key.to_string())
            .bucket(&self.bucket_name)
            .send()
            .await?;
        Ok(())
    }

    fn object_url(&self, key: &Key) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket_name, key)
    }
}
