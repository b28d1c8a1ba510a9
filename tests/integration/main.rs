//! Integration tests against a running Orbis server.
//!
//! Run with: cargo test -- --ignored
//! Requires the server on localhost:8080 and DATABASE_URL pointing at its
//! database (fixtures that corrupt state on purpose are injected with sqlx).

mod api_tests;
mod common;
