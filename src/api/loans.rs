//! Loan circulation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppResult;

/// Direct borrow request, used when copies are available and no queue
/// stands in the way
#[derive(Deserialize, ToSchema)]
pub struct BorrowRequest {
    /// Borrower ID
    pub borrower_id: i32,
    /// Document ID
    pub document_id: i32,
}

/// Return request; the return date defaults to now
#[derive(Deserialize, Default, ToSchema)]
pub struct ReturnRequest {
    pub returned_at: Option<DateTime<Utc>>,
}

/// Extension request
#[derive(Deserialize, ToSchema)]
pub struct ExtendRequest {
    /// New due date (whether it must be later than the old one is caller
    /// policy)
    pub due_date: DateTime<Utc>,
}

/// Loan response with calculated dates
#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    /// Loan ID
    pub id: i32,
    /// Document ID
    pub document_id: i32,
    /// Due date (ISO 8601 format)
    pub due_date: DateTime<Utc>,
    /// Status message
    pub message: String,
}

/// Create a new loan (direct borrow)
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanResponse),
        (status = 404, description = "Borrower or document not found"),
        (status = 409, description = "No copy available (lost a race; retry or reserve)"),
        (status = 422, description = "Admission rejected (blocked, quota, already borrowed, reservation pending)")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    let loan = state
        .services
        .fulfillment
        .borrow(request.borrower_id, request.document_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LoanResponse {
            id: loan.id,
            document_id: loan.document_id,
            due_date: loan.due_date,
            message: "Document borrowed successfully".to_string(),
        }),
    ))
}

/// Return a borrowed document
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(("id" = i32, Path, description = "Loan ID")),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Document returned", body = LoanResponse),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    Path(loan_id): Path<i32>,
    request: Option<Json<ReturnRequest>>,
) -> AppResult<Json<LoanResponse>> {
    let returned_at = request.and_then(|Json(r)| r.returned_at);
    let loan = state.services.loans.return_loan(loan_id, returned_at).await?;

    Ok(Json(LoanResponse {
        id: loan.id,
        document_id: loan.document_id,
        due_date: loan.due_date,
        message: "Document returned".to_string(),
    }))
}

/// Extend a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/extend",
    tag = "loans",
    params(("id" = i32, Path, description = "Loan ID")),
    request_body = ExtendRequest,
    responses(
        (status = 200, description = "Loan extended", body = LoanResponse),
        (status = 404, description = "Loan not found"),
        (status = 422, description = "Already returned")
    )
)]
pub async fn extend_loan(
    State(state): State<crate::AppState>,
    Path(loan_id): Path<i32>,
    Json(request): Json<ExtendRequest>,
) -> AppResult<Json<LoanResponse>> {
    let loan = state.services.loans.extend(loan_id, request.due_date).await?;

    Ok(Json(LoanResponse {
        id: loan.id,
        document_id: loan.document_id,
        due_date: loan.due_date,
        message: format!("Loan extended ({} extensions)", loan.extended_count),
    }))
}

/// Hard-delete a loan (administrative). An outstanding loan returns its
/// copy to the pool first.
#[utoipa::path(
    delete,
    path = "/loans/{id}",
    tag = "loans",
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 204, description = "Loan deleted"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn delete_loan(
    State(state): State<crate::AppState>,
    Path(loan_id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.loans.delete(loan_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
