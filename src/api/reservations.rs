//! Reservation queue endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::reservation::Reservation,
};

use super::loans::LoanResponse;

/// Join a document's waitlist
#[derive(Deserialize, ToSchema)]
pub struct CreateReservationRequest {
    /// Borrower ID
    pub borrower_id: i32,
    /// Document ID
    pub document_id: i32,
    /// Override for the default grace window
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Reservation response with queue position
#[derive(Serialize, ToSchema)]
pub struct ReservationResponse {
    /// Reservation ID
    pub id: i32,
    /// Position in the queue (1 is served next)
    pub priority_order: i16,
    /// When the reservation lapses if not fulfilled
    pub expiry_date: DateTime<Utc>,
    /// Status message
    pub message: String,
}

/// Result of a manual expiry sweep
#[derive(Serialize, ToSchema)]
pub struct ExpireSweepResponse {
    /// Number of reservations expired by this sweep
    pub expired: u64,
}

/// Reserve a document that is currently unavailable
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Reservation queued", body = ReservationResponse),
        (status = 404, description = "Borrower or document not found"),
        (status = 422, description = "Admission rejected (blocked, quota, duplicate, already borrowed, or copies available)")
    )
)]
pub async fn create_reservation(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateReservationRequest>,
) -> AppResult<(StatusCode, Json<ReservationResponse>)> {
    let reservation = state
        .services
        .reservations
        .reserve(request.borrower_id, request.document_id, request.expiry_date)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ReservationResponse {
            id: reservation.id,
            priority_order: reservation.priority_order,
            expiry_date: reservation.expiry_date,
            message: format!("Reservation queued at position {}", reservation.priority_order),
        }),
    ))
}

/// Get a reservation
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation", body = Reservation),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.reservations.get(id).await?;
    Ok(Json(reservation))
}

/// Cancel an active reservation; the queue behind it closes up
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "Reservation not found"),
        (status = 422, description = "Reservation is not active")
    )
)]
pub async fn cancel_reservation(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.reservations.cancel(id).await?;
    Ok(Json(reservation))
}

/// Fulfill a reservation: atomically convert it into a loan
#[utoipa::path(
    post,
    path = "/reservations/{id}/fulfill",
    tag = "reservations",
    params(("id" = i32, Path, description = "Reservation ID")),
    responses(
        (status = 201, description = "Loan created from reservation", body = LoanResponse),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "No copy available yet; re-check availability"),
        (status = 422, description = "Reservation not active, borrower blocked or over quota")
    )
)]
pub async fn fulfill_reservation(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    let loan = state.services.fulfillment.fulfill(id).await?;

    Ok((
        StatusCode::CREATED,
        Json(LoanResponse {
            id: loan.id,
            document_id: loan.document_id,
            due_date: loan.due_date,
            message: "Reservation fulfilled".to_string(),
        }),
    ))
}

/// Expire lapsed reservations now instead of waiting for the background
/// sweep
#[utoipa::path(
    post,
    path = "/reservations/expire",
    tag = "reservations",
    responses(
        (status = 200, description = "Sweep finished", body = ExpireSweepResponse)
    )
)]
pub async fn expire_reservations(
    State(state): State<crate::AppState>,
) -> AppResult<Json<ExpireSweepResponse>> {
    let expired = state.services.reservations.expire_due(Utc::now()).await?;
    Ok(Json(ExpireSweepResponse { expired }))
}
