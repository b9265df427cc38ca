use crate::errors::ApiError;
use crate::metrics_defs::REQUEST_DURATION;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use lifecycle::{CheckOutcome, PurchaseEvent, Registration, SyncError, Synchronizer};
use serde::de::DeserializeOwned;
use shared::histogram;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const LIVENESS_MESSAGE: &str = "API is live and connected";
pub const HEALTH_MESSAGE: &str = "API is up and responding.";
pub const PURCHASE_SYNCED_MESSAGE: &str = "Purchase synced to HubSpot.";

/// Storefront-facing routes. Browsers may only call them from `cors_origin`.
pub fn router(synchronizer: Synchronizer, cors_origin: HeaderValue) -> Router {
    // List mode: the allow-origin header is only sent back to a matching origin.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([cors_origin]))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .route("/check", post(check))
        .route("/purchase", post(purchase))
        .method_not_allowed_fallback(method_not_allowed)
        .route_layer(middleware::from_fn(record_duration))
        .layer(cors)
        .with_state(synchronizer)
}

async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

async fn health() -> &'static str {
    HEALTH_MESSAGE
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn check(
    State(synchronizer): State<Synchronizer>,
    body: Bytes,
) -> Result<Json<CheckOutcome>, ApiError> {
    let registration: Registration = parse_body(&body)?;

    match synchronizer.check_or_register(&registration).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(SyncError::MissingEmail) => Err(ApiError::MissingCheckEmail),
        Err(SyncError::ShuttingDown) => Err(ApiError::ShuttingDown),
        Err(SyncError::Upstream(e)) => {
            tracing::error!(error = %e, status = ?e.status(), "check-or-register failed");
            Err(ApiError::CheckFailed)
        }
    }
}

async fn purchase(
    State(synchronizer): State<Synchronizer>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let event: PurchaseEvent = parse_body(&body)?;

    match synchronizer.mark_purchased(&event).await {
        Ok(()) => Ok(PURCHASE_SYNCED_MESSAGE),
        Err(SyncError::MissingEmail) => {
            tracing::warn!("purchase webhook without a usable email");
            Err(ApiError::MissingPurchaseEmail)
        }
        Err(SyncError::ShuttingDown) => Err(ApiError::ShuttingDown),
        Err(SyncError::Upstream(e)) => {
            tracing::error!(error = %e, status = ?e.status(), "purchase sync failed");
            Err(ApiError::PurchaseFailed)
        }
    }
}

/// Reads a JSON body regardless of its declared content type. An empty body reads as an
/// empty object, so it fails on the missing email instead of on the syntax.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))
}

async fn record_duration(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let start = Instant::now();

    let response = next.run(request).await;

    histogram!(
        REQUEST_DURATION,
        "route" => route,
        "status" => response.status().as_u16().to_string(),
    )
    .record(start.elapsed().as_secs_f64());
    response
}
