//! Borrower management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrower::{Borrower, CreateBorrower, UpdateBorrower},
        loan::LoanDetails,
        reservation::Reservation,
    },
};

/// Borrower list query parameters
#[derive(Debug, Deserialize, IntoParams)]
pub struct BorrowerQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create a new borrower
#[utoipa::path(
    post,
    path = "/borrowers",
    tag = "borrowers",
    request_body = CreateBorrower,
    responses(
        (status = 201, description = "Borrower created", body = Borrower),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_borrower(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateBorrower>,
) -> AppResult<(StatusCode, Json<Borrower>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let borrower = state.services.borrowers.create(&request).await?;
    Ok((StatusCode::CREATED, Json(borrower)))
}

/// Get a borrower
#[utoipa::path(
    get,
    path = "/borrowers/{id}",
    tag = "borrowers",
    params(("id" = i32, Path, description = "Borrower ID")),
    responses(
        (status = 200, description = "Borrower", body = Borrower),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn get_borrower(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Borrower>> {
    let borrower = state.services.borrowers.get(id).await?;
    Ok(Json(borrower))
}

/// Update a borrower (quotas and status take effect on the next admission
/// check)
#[utoipa::path(
    put,
    path = "/borrowers/{id}",
    tag = "borrowers",
    params(("id" = i32, Path, description = "Borrower ID")),
    request_body = UpdateBorrower,
    responses(
        (status = 200, description = "Borrower updated", body = Borrower),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn update_borrower(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateBorrower>,
) -> AppResult<Json<Borrower>> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let borrower = state.services.borrowers.update(id, &request).await?;
    Ok(Json(borrower))
}

/// List borrowers
#[utoipa::path(
    get,
    path = "/borrowers",
    tag = "borrowers",
    params(BorrowerQuery),
    responses(
        (status = 200, description = "Borrowers", body = Vec<Borrower>)
    )
)]
pub async fn list_borrowers(
    State(state): State<crate::AppState>,
    Query(query): Query<BorrowerQuery>,
) -> AppResult<Json<Vec<Borrower>>> {
    let borrowers = state
        .services
        .borrowers
        .list(query.page.unwrap_or(1), query.per_page.unwrap_or(50))
        .await?;
    Ok(Json(borrowers))
}

/// Remove a borrower
#[utoipa::path(
    delete,
    path = "/borrowers/{id}",
    tag = "borrowers",
    params(("id" = i32, Path, description = "Borrower ID")),
    responses(
        (status = 204, description = "Borrower removed"),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn delete_borrower(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.borrowers.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Outstanding loans for a borrower
#[utoipa::path(
    get,
    path = "/borrowers/{id}/loans",
    tag = "loans",
    params(("id" = i32, Path, description = "Borrower ID")),
    responses(
        (status = 200, description = "Borrower's outstanding loans", body = Vec<LoanDetails>),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn get_borrower_loans(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.list_for_borrower(id).await?;
    Ok(Json(loans))
}

/// Active reservations held by a borrower
#[utoipa::path(
    get,
    path = "/borrowers/{id}/reservations",
    tag = "reservations",
    params(("id" = i32, Path, description = "Borrower ID")),
    responses(
        (status = 200, description = "Borrower's active reservations", body = Vec<Reservation>),
        (status = 404, description = "Borrower not found")
    )
)]
pub async fn get_borrower_reservations(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<Reservation>>> {
    let reservations = state.services.reservations.list_for_borrower(id).await?;
    Ok(Json(reservations))
}
