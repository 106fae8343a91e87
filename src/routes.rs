// src/routes.rs

use std::path::Path;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{
    config::{Config, MAX_UPLOAD_BODY_BYTES},
    handlers::{admin, api_not_found, health, results, students},
    state::AppState,
};

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * `/api/*` JSON routes (public results, record admin, credentials) with a
///   JSON 404 fallback.
/// * `/uploads/*` photo files.
/// * Everything else is the static front-end, falling back to `index.html`.
pub fn create_router(state: AppState) -> Router {
    let result_routes = Router::new()
        .route("/", get(results::search_result))
        .route("/{exam_number}", get(results::get_result));

    let student_routes = Router::new()
        .route("/", get(students::list_students))
        .route("/add", post(students::add_student))
        .route("/export", get(students::export_students))
        .route("/publish-all", post(students::publish_all))
        .route(
            "/{id}",
            put(students::update_student).delete(students::delete_student),
        )
        .route("/{id}/publish", put(students::set_published))
        .route("/{id}/qr", get(students::student_qr))
        .route("/{id}/qr-download", get(students::download_qr))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES));

    let admin_routes = Router::new()
        .route("/login", post(admin::login))
        .route("/info", get(admin::info))
        .route("/password", put(admin::change_password))
        .route("/username", put(admin::change_username));

    let api_routes = Router::new()
        .nest("/result", result_routes)
        .nest("/students", student_routes)
        .nest("/admin", admin_routes)
        .fallback(api_not_found);

    let static_dir = Path::new(&state.config.static_dir);
    let frontend = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));
    let uploads = ServeDir::new(&state.config.upload_dir);

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health::health))
        .route("/keep-alive", get(health::keep_alive))
        .nest("/api", api_routes)
        .nest_service("/uploads", uploads)
        .fallback_service(frontend)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
