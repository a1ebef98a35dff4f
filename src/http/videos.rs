use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};

use super::errors::Result;
use crate::coordinator::UploadCoordinator;
use crate::manifest::Manifest;
use crate::protocol::{
    AbortParams, CompleteParams, CompleteResponse, InitiateParams, PartCredential, PartUrlParams,
    UploadHandle,
};

pub fn router() -> Router<UploadCoordinator> {
    Router::new()
        .route("/initiate-multipart", post(initiate_multipart))
        .route("/part-presigned-url", post(part_presigned_url))
        .route("/complete-multipart", post(complete_multipart))
        .route("/abort-multipart", post(abort_multipart))
        .route("/:filename", delete(delete_video))
}

async fn initiate_multipart(
    State(coordinator): State<UploadCoordinator>,
    Query(params): Query<InitiateParams>,
) -> Result<Json<UploadHandle>> {
    let started = Instant::now();
    let handle = coordinator
        .initiate(&params.filename, &params.content_type)
        .await?;
    tracing::info!(
        filename = %handle.filename,
        upload_id = %handle.upload_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "multipart upload started"
    );
    Ok(Json(handle))
}

async fn part_presigned_url(
    State(coordinator): State<UploadCoordinator>,
    Query(params): Query<PartUrlParams>,
) -> Result<Json<PartCredential>> {
    let credential = coordinator
        .issue_part_credential(&params.filename, &params.upload_id, params.part_number)
        .await?;
    tracing::info!(
        filename = %params.filename,
        part_number = params.part_number,
        "issued part credential"
    );
    Ok(Json(credential))
}

async fn complete_multipart(
    State(coordinator): State<UploadCoordinator>,
    Query(params): Query<CompleteParams>,
    Json(manifest): Json<Manifest>,
) -> Result<Json<CompleteResponse>> {
    let started = Instant::now();
    let completed = coordinator
        .complete(&params.filename, &params.upload_id, &manifest)
        .await?;

    let client_secs = params.client_upload_time_ms as f64 / 1000.0;
    tracing::info!(
        filename = %completed.filename,
        parts = manifest.len(),
        client_upload_time_ms = params.client_upload_time_ms,
        client_upload_time_secs = client_secs,
        completion_ms = started.elapsed().as_millis() as u64,
        "multipart upload completed"
    );

    Ok(Json(CompleteResponse {
        message: String::from("Upload completed successfully"),
        filename: completed.filename,
        url: completed.url,
    }))
}

async fn abort_multipart(
    State(coordinator): State<UploadCoordinator>,
    Query(params): Query<AbortParams>,
) -> Result<StatusCode> {
    coordinator
        .abort(&params.filename, &params.upload_id)
        .await?;
    tracing::info!(
        filename = %params.filename,
        upload_id = %params.upload_id,
        "multipart upload aborted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_video(
    State(coordinator): State<UploadCoordinator>,
    Path(filename): Path<String>,
) -> Result<StatusCode> {
    coordinator.delete(&filename).await?;
    tracing::info!(filename = %filename, "object deleted");
    Ok(StatusCode::NO_CONTENT)
}
