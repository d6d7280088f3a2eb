use crate::application::{BillingSyncError, MeteringError};
use crate::infrastructure::{AuthError, BillingError};
use axum::http::StatusCode;

pub(super) fn map_auth_error(err: &AuthError) -> (StatusCode, serde_json::Value) {
    match err {
        AuthError::MissingEmail => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "User email not available" }),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "error": "Missing or invalid authorization token" }),
        ),
    }
}

pub(super) fn map_metering_error(err: &MeteringError) -> (StatusCode, serde_json::Value) {
    match err {
        MeteringError::NotProvisioned(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "No credit record for this user" }),
        ),
        MeteringError::AlreadyProvisioned(_) => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": "Credit record already exists" }),
        ),
        MeteringError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to update credits" }),
        ),
    }
}

pub(super) fn map_billing_sync_error(err: &BillingSyncError) -> (StatusCode, serde_json::Value) {
    match err {
        BillingSyncError::Billing(BillingError::RateLimited) => (
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({ "error": "Rate limited by billing provider, please retry" }),
        ),
        BillingSyncError::Billing(_) => (
            StatusCode::BAD_GATEWAY,
            serde_json::json!({ "error": "Billing provider unavailable" }),
        ),
        BillingSyncError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to update subscription" }),
        ),
    }
}
