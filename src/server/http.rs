use super::http_auth::{authenticate, is_admin_authorized};
use super::http_errors::{map_auth_error, map_billing_sync_error, map_metering_error};
use super::http_parse::{parse_credit_action, parse_subscription_tier, CreditAction};
use super::http_types::{
    consume_body, CheckCreditsResponse, ConsumeDeniedResponse, ConsumeGrantedResponse,
    CreditActionRequest, CreditActionResponse, ErrorResponse, HealthResponse, ProvisionUserRequest,
    ProvisionedUserResponse, RemovedUserResponse, SubscriptionResponse,
};
use super::state::AppState;
use crate::application::{ConsumeOutcome, MeteringError};
use crate::infrastructure::Identity;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

type JsonReply = (StatusCode, Json<Value>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/credits", get(check_credits))
        .route("/credits/consume", post(consume_credit))
        .route("/credits/actions", post(credit_action))
        .route("/subscription/refresh", post(refresh_subscription))
        .route("/admin/users", post(provision_user))
        .route("/admin/users/:id", delete(remove_user))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        check_credits,
        consume_credit,
        credit_action,
        refresh_subscription,
        provision_user,
        remove_user,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            CreditActionRequest,
            CheckCreditsResponse,
            ConsumeGrantedResponse,
            CreditActionResponse,
            ConsumeDeniedResponse,
            SubscriptionResponse,
            ProvisionUserRequest,
            ProvisionedUserResponse,
            RemovedUserResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Credits", description = "Credit checks and consumption"),
        (name = "Subscription", description = "Billing reconciliation"),
        (name = "Admin", description = "Account provisioning"),
    ),
    info(
        title = "Credit Meter API",
        version = "0.1.0",
        description = "Credit metering and subscription gating for AI page generation",
        license(name = "MIT")
    )
)]
struct ApiDoc;

fn reply((status, body): (StatusCode, Value)) -> JsonReply {
    (status, Json(body))
}

fn caller(state: &AppState, headers: &HeaderMap) -> Result<Identity, JsonReply> {
    authenticate(headers, &state.verifier).map_err(|e| {
        warn!(error = %e, "Rejected unauthenticated request");
        reply(map_auth_error(&e))
    })
}

fn metering_failure(user_id: Uuid, e: &MeteringError) -> JsonReply {
    match e {
        MeteringError::Repository(_) => error!(user_id = %user_id, error = %e, "Credit operation failed"),
        _ => warn!(user_id = %user_id, error = %e, "Credit operation refused"),
    }
    reply(map_metering_error(e))
}

async fn run_check(state: &AppState, user_id: Uuid) -> JsonReply {
    match state.credits.check(user_id).await {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::json!(CheckCreditsResponse::from(report))),
        ),
        Err(e) => metering_failure(user_id, &e),
    }
}

async fn run_consume(state: &AppState, user_id: Uuid) -> JsonReply {
    match state.credits.consume(user_id).await {
        Ok(outcome) => {
            let status = match outcome {
                ConsumeOutcome::Granted { .. } => StatusCode::OK,
                ConsumeOutcome::Denied { .. } => StatusCode::FORBIDDEN,
            };
            (status, Json(consume_body(outcome)))
        }
        Err(e) => metering_failure(user_id, &e),
    }
}

/// Health check endpoint
///
/// Verifies database connectivity and returns service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

/// Report the caller's remaining credits
///
/// Applies any pending daily/monthly rollover; never spends a credit.
#[utoipa::path(
    get,
    path = "/credits",
    tag = "Credits",
    responses(
        (status = 200, description = "Current credit status", body = CheckCreditsResponse),
        (status = 401, description = "Missing or invalid authorization token", body = ErrorResponse),
        (status = 404, description = "No credit record for this user", body = ErrorResponse),
        (status = 500, description = "Failed to read credits", body = ErrorResponse)
    )
)]
async fn check_credits(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let identity = match caller(&state, &headers) {
        Ok(identity) => identity,
        Err(rejection) => return rejection,
    };

    run_check(&state, identity.user_id).await
}

/// Spend one credit for the caller
#[utoipa::path(
    post,
    path = "/credits/consume",
    tag = "Credits",
    responses(
        (status = 200, description = "Credit consumed", body = ConsumeGrantedResponse),
        (status = 401, description = "Missing or invalid authorization token", body = ErrorResponse),
        (status = 403, description = "No credits available", body = ConsumeDeniedResponse),
        (status = 404, description = "No credit record for this user", body = ErrorResponse),
        (status = 409, description = "Credit record busy, retry", body = ErrorResponse),
        (status = 500, description = "Failed to update credits", body = ErrorResponse)
    )
)]
async fn consume_credit(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let identity = match caller(&state, &headers) {
        Ok(identity) => identity,
        Err(rejection) => return rejection,
    };

    run_consume(&state, identity.user_id).await
}

/// Dispatch a `check` or `consume` action
#[utoipa::path(
    post,
    path = "/credits/actions",
    tag = "Credits",
    request_body = CreditActionRequest,
    responses(
        (status = 200, description = "Credit status for `check`, spent credit for `consume`", body = CreditActionResponse),
        (status = 400, description = "Malformed body or unknown action", body = ErrorResponse),
        (status = 401, description = "Missing or invalid authorization token", body = ErrorResponse),
        (status = 403, description = "No credits available", body = ConsumeDeniedResponse),
        (status = 404, description = "No credit record for this user", body = ErrorResponse)
    )
)]
async fn credit_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let identity = match caller(&state, &headers) {
        Ok(identity) => identity,
        Err(rejection) => return rejection,
    };

    // Parsed only after authentication so anonymous callers always see 401.
    let req: CreditActionRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!(user_id = %identity.user_id, error = %e, "Malformed credit action body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid request body"})),
            );
        }
    };

    match parse_credit_action(req.action.as_str()) {
        Some(CreditAction::Check) => run_check(&state, identity.user_id).await,
        Some(CreditAction::Consume) => run_consume(&state, identity.user_id).await,
        None => {
            warn!(user_id = %identity.user_id, action = %req.action, "Unknown credit action");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("Invalid action: {}", req.action),
                    "allowed": ["check", "consume"]
                })),
            )
        }
    }
}

/// Reconcile the caller's subscription with the billing provider
#[utoipa::path(
    post,
    path = "/subscription/refresh",
    tag = "Subscription",
    responses(
        (status = 200, description = "Subscription reconciled", body = SubscriptionResponse),
        (status = 400, description = "User email not available", body = ErrorResponse),
        (status = 401, description = "Missing or invalid authorization token", body = ErrorResponse),
        (status = 502, description = "Billing provider unavailable", body = ErrorResponse),
        (status = 503, description = "Billing not configured", body = ErrorResponse)
    )
)]
async fn refresh_subscription(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let identity = match caller(&state, &headers) {
        Ok(identity) => identity,
        Err(rejection) => return rejection,
    };

    let email = match identity.require_email() {
        Ok(email) => email,
        Err(e) => return reply(map_auth_error(&e)),
    };

    let Some(subscriptions) = state.subscriptions.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "Billing is not configured"})),
        );
    };

    match subscriptions.reconcile_user(identity.user_id, email).await {
        Ok(summary) => {
            info!(user_id = %identity.user_id, subscribed = summary.subscribed, "Subscription refreshed");
            (
                StatusCode::OK,
                Json(serde_json::json!(SubscriptionResponse::from(summary))),
            )
        }
        Err(e) => {
            error!(user_id = %identity.user_id, error = %e, "Subscription refresh failed");
            reply(map_billing_sync_error(&e))
        }
    }
}

/// Provision the credit record of a new account
#[utoipa::path(
    post,
    path = "/admin/users",
    tag = "Admin",
    request_body = ProvisionUserRequest,
    responses(
        (status = 201, description = "Credit record created", body = ProvisionedUserResponse),
        (status = 400, description = "Invalid subscription tier", body = ErrorResponse),
        (status = 401, description = "Admin token required", body = ErrorResponse),
        (status = 409, description = "Credit record already exists", body = ErrorResponse)
    )
)]
async fn provision_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ProvisionUserRequest>,
) -> impl IntoResponse {
    if !is_admin_authorized(&headers, &state.admin_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Admin token required"})),
        );
    }

    let Some(tier) = parse_subscription_tier(req.tier.as_deref()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid subscription tier",
                "allowed": ["free", "pro"]
            })),
        );
    };

    match state.credits.provision(req.user_id, tier).await {
        Ok(credit_state) => (
            StatusCode::CREATED,
            Json(serde_json::json!(ProvisionedUserResponse::from(credit_state))),
        ),
        Err(e) => metering_failure(req.user_id, &e),
    }
}

/// Delete an account's credit and subscription records
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Records removed", body = RemovedUserResponse),
        (status = 401, description = "Admin token required", body = ErrorResponse),
        (status = 404, description = "No credit record for this user", body = ErrorResponse)
    )
)]
async fn remove_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !is_admin_authorized(&headers, &state.admin_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "Admin token required"})),
        );
    }

    match state.credits.remove(id).await {
        Ok(()) => {
            info!(user_id = %id, "User records removed");
            (
                StatusCode::OK,
                Json(serde_json::json!(RemovedUserResponse {
                    status: "removed".to_string(),
                })),
            )
        }
        Err(e) => metering_failure(id, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::CreditService;
    use crate::infrastructure::{AccessTokenClaims, PostgresCreditRepository, TokenVerifier};
    use axum::http::{header, HeaderValue};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    const SECRET: &str = "handler-secret";

    // The lazy pool never connects; every request below is answered before
    // the database is reached.
    fn offline_state() -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/credits")
            .unwrap();
        AppState {
            pool: pool.clone(),
            verifier: Arc::new(TokenVerifier::new(SECRET, "")),
            admin_token: Arc::from("admin-secret"),
            credits: Arc::new(CreditService::new(Arc::new(PostgresCreditRepository::new(pool)))),
            subscriptions: None,
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn user_headers(email: Option<&str>) -> HeaderMap {
        let claims = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            email: email.map(str::to_string),
            aud: None,
            exp: (chrono::Utc::now().timestamp() + 600) as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        bearer(&token)
    }

    #[tokio::test]
    async fn credit_action_rejects_anonymous_before_reading_body() {
        let resp = credit_action(
            State(offline_state()),
            HeaderMap::new(),
            Bytes::from_static(b"{not json"),
        )
        .await
        .into_response();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn credit_action_malformed_body_is_bad_request() {
        let resp = credit_action(
            State(offline_state()),
            user_headers(None),
            Bytes::from_static(b"{not json"),
        )
        .await
        .into_response();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn credit_action_unknown_action_is_bad_request() {
        let resp = credit_action(
            State(offline_state()),
            user_headers(None),
            Bytes::from_static(br#"{"action":"refund"}"#),
        )
        .await
        .into_response();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_without_billing_is_unavailable() {
        let resp = refresh_subscription(
            State(offline_state()),
            user_headers(Some("ada@example.com")),
        )
        .await
        .into_response();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn remove_user_requires_admin_token() {
        let resp = remove_user(
            State(offline_state()),
            Path(Uuid::new_v4()),
            bearer("not-the-admin"),
        )
        .await
        .into_response();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn actions_route_documents_both_success_bodies() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let ok = &doc["paths"]["/credits/actions"]["post"]["responses"]["200"];

        assert_eq!(
            ok["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/CreditActionResponse"
        );
        let variants = doc["components"]["schemas"]["CreditActionResponse"]["oneOf"]
            .as_array()
            .unwrap();
        assert_eq!(variants.len(), 2);
    }
}
