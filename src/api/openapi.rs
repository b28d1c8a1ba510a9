//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{audit, borrowers, documents, health, loans, reservations};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Orbis API",
        version = "0.3.0",
        description = "Library Circulation Server REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html"),
        contact(name = "Orbis Team", email = "contact@orbis-lms.org")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Documents
        documents::create_document,
        documents::get_document,
        documents::update_copies,
        documents::delete_document,
        documents::get_availability,
        documents::get_queue,
        // Borrowers
        borrowers::create_borrower,
        borrowers::get_borrower,
        borrowers::update_borrower,
        borrowers::list_borrowers,
        borrowers::delete_borrower,
        borrowers::get_borrower_loans,
        borrowers::get_borrower_reservations,
        // Loans
        loans::create_loan,
        loans::return_loan,
        loans::extend_loan,
        loans::delete_loan,
        // Reservations
        reservations::create_reservation,
        reservations::get_reservation,
        reservations::cancel_reservation,
        reservations::fulfill_reservation,
        reservations::expire_reservations,
        // Audit
        audit::run_audit,
    ),
    components(
        schemas(
            // Documents
            crate::models::document::Document,
            crate::models::document::DocumentKind,
            crate::models::document::CreateDocument,
            crate::models::document::UpdateCopies,
            crate::models::document::Availability,
            crate::models::document::AvailabilityStatus,
            // Borrowers
            crate::models::borrower::Borrower,
            crate::models::borrower::BorrowerStatus,
            crate::models::borrower::CreateBorrower,
            crate::models::borrower::UpdateBorrower,
            // Loans
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanStatus,
            loans::BorrowRequest,
            loans::ReturnRequest,
            loans::ExtendRequest,
            loans::LoanResponse,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::QueueEntry,
            reservations::CreateReservationRequest,
            reservations::ReservationResponse,
            reservations::ExpireSweepResponse,
            // Audit
            crate::models::audit::AuditReport,
            crate::models::audit::AuditIssue,
            crate::models::audit::IssueKind,
            crate::models::audit::Severity,
            audit::AuditRequest,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "documents", description = "Inventory counters and availability"),
        (name = "borrowers", description = "Borrower management"),
        (name = "loans", description = "Loan circulation"),
        (name = "reservations", description = "Reservation waitlist"),
        (name = "audit", description = "Consistency audit and repair")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
