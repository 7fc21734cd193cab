//! Demo protected resources.

use axum::{
    Json, Router,
    http::Method,
    response::{IntoResponse, Response},
    routing::get,
};
use oauth1_provider::Authenticated;

pub fn router() -> Router {
    Router::new()
        .route("/api/whoami", get(whoami))
        .route("/api/photos", get(photos).post(photos))
}

async fn whoami(authenticated: Authenticated) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "consumer": authenticated.consumer.name,
        "user": authenticated.user(),
        "scope": authenticated.resource().map(|r| r.name.as_str()),
    }))
}

async fn photos(authenticated: Authenticated, method: Method) -> Response {
    if let Err(e) = authenticated.require_scope("photos", &method) {
        return authenticated.reject(e);
    }

    tracing::info!(user = authenticated.user().unwrap_or_default(), %method, "photos accessed");
    Json(serde_json::json!({
        "user": authenticated.user(),
        "photos": ["vacation.jpg", "family.jpg"],
    }))
    .into_response()
}
