// src/handlers/mod.rs

pub mod admin;
pub mod health;
pub mod results;
pub mod students;

use axum::{
    Json,
    extract::OriginalUri,
    http::{Method, StatusCode},
    response::IntoResponse,
};
use serde_json::json;

/// Fallback for unknown `/api/*` routes, so API clients never get the SPA page.
pub async fn api_not_found(method: Method, OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": format!("API endpoint not found: {} {}", method, uri.path()),
        })),
    )
}
