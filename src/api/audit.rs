//! Consistency audit endpoint

use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{error::AppResult, models::audit::AuditReport};

/// Audit run parameters
#[derive(Deserialize, Default, ToSchema)]
pub struct AuditRequest {
    /// Correct detected issues instead of only reporting them
    #[serde(default)]
    pub auto_fix: bool,
}

/// Run a consistency audit over all circulation state
#[utoipa::path(
    post,
    path = "/audit",
    tag = "audit",
    request_body = AuditRequest,
    responses(
        (status = 200, description = "Audit report", body = AuditReport)
    )
)]
pub async fn run_audit(
    State(state): State<crate::AppState>,
    request: Option<Json<AuditRequest>>,
) -> AppResult<Json<AuditReport>> {
    let auto_fix = request.map(|Json(r)| r.auto_fix).unwrap_or(false);
    let report = state.services.audit.run(auto_fix).await?;
    Ok(Json(report))
}
