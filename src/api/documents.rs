//! Document inventory and availability endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        document::{Availability, CreateDocument, Document, UpdateCopies},
        reservation::QueueEntry,
    },
};

/// Register a circulating document (counter row only)
#[utoipa::path(
    post,
    path = "/documents",
    tag = "documents",
    request_body = CreateDocument,
    responses(
        (status = 201, description = "Document registered", body = Document),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_document(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateDocument>,
) -> AppResult<(StatusCode, Json<Document>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let document = state.services.inventory.create(&request).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// Get a document's counter row
#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "documents",
    params(("id" = i32, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document", body = Document),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_document(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Document>> {
    let document = state.services.inventory.get(id).await?;
    Ok(Json(document))
}

/// Resize a document's copy pool
#[utoipa::path(
    put,
    path = "/documents/{id}/copies",
    tag = "documents",
    params(("id" = i32, Path, description = "Document ID")),
    request_body = UpdateCopies,
    responses(
        (status = 200, description = "Pool resized", body = Document),
        (status = 400, description = "Invalid copy count"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn update_copies(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateCopies>,
) -> AppResult<Json<Document>> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let document = state.services.inventory.resize(id, request.total_copies).await?;
    Ok(Json(document))
}

/// Remove a document's counter row
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "documents",
    params(("id" = i32, Path, description = "Document ID")),
    responses(
        (status = 204, description = "Document removed"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn delete_document(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.inventory.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Live availability for a document
#[utoipa::path(
    get,
    path = "/documents/{id}/availability",
    tag = "documents",
    params(("id" = i32, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Computed availability", body = Availability),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_availability(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Availability>> {
    let availability = state.services.availability.for_document(id).await?;
    Ok(Json(availability))
}

/// The document's active waitlist in serving order
#[utoipa::path(
    get,
    path = "/documents/{id}/queue",
    tag = "documents",
    params(("id" = i32, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Active reservation queue", body = Vec<QueueEntry>),
        (status = 404, description = "Document not found")
    )
)]
pub async fn get_queue(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<QueueEntry>>> {
    let queue = state.services.reservations.queue(id).await?;
    Ok(Json(queue))
}
