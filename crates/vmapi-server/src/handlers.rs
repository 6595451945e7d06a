//! Request handlers for the VM endpoints.
//!
//! Handlers check transport-level preconditions, call the orchestrator and
//! map its errors. Causes of internal failures are logged here and never
//! returned to the client.

use crate::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::future::Future;
use std::sync::Arc;
use vmapi_core::{
    CoreError, VmCreation, VmCreationRequest, VmDeletion, VmId, VmOrchestrator, VmStatusReport,
};

/// Shared handler state.
pub type AppState = Arc<VmOrchestrator>;

/// `POST /vms`
pub async fn create_vm(
    State(orchestrator): State<AppState>,
    payload: Result<Json<VmCreationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VmCreation>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::error!(endpoint = "create vm", error = %rejection, "Failed to bind request");
        ApiError::BadRequest(rejection.body_text())
    })?;
    request.validate().map_err(|e| failure("create vm", e))?;

    match tokio::fs::metadata(&request.base_image).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::error!(
                endpoint = "create vm",
                base_image = %request.base_image.display(),
                "Base image not found"
            );
            return Err(ApiError::NotFound(format!(
                "Base image not found: {}",
                request.base_image.display()
            )));
        }
        _ => {}
    }

    let created = detached("create vm", async move {
        orchestrator.create(&request).await
    })
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `DELETE /vms/:id`
pub async fn delete_vm(
    State(orchestrator): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VmDeletion>, ApiError> {
    let id = parse_id("delete vm", &id)?;
    let deleted =
        detached("delete vm", async move { orchestrator.delete(id).await }).await?;
    Ok(Json(deleted))
}

/// `GET /vms/:id/status`
pub async fn vm_status(
    State(orchestrator): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VmStatusReport>, ApiError> {
    let id = parse_id("vm status", &id)?;
    let report = orchestrator
        .status(id)
        .await
        .map_err(|e| failure("vm status", e))?;
    Ok(Json(report))
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    tracing::trace!("Health check request");
    Json(serde_json::json!({
        "status": "healthy",
        "service": "vmapi"
    }))
}

/// Run a lifecycle operation on its own task. A client that disconnects
/// early does not stop it halfway.
async fn detached<T, F>(endpoint: &'static str, operation: F) -> Result<T, ApiError>
where
    F: Future<Output = vmapi_core::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(operation).await {
        Ok(result) => result.map_err(|e| failure(endpoint, e)),
        Err(e) => {
            tracing::error!(endpoint, error = %e, "Lifecycle task failed");
            Err(ApiError::Internal)
        }
    }
}

fn parse_id(endpoint: &'static str, raw: &str) -> Result<VmId, ApiError> {
    raw.parse::<VmId>().map_err(|e| {
        tracing::error!(endpoint, id = raw, error = %e, "Failed to parse id");
        ApiError::BadRequest(e.to_string())
    })
}

fn failure(endpoint: &'static str, err: CoreError) -> ApiError {
    tracing::error!(endpoint, error = %err, "Request failed");
    ApiError::from(err)
}
