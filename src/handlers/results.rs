// src/handlers/results.rs

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    handlers::students::RecordView,
    models::student::ResultSearchParams,
    reconcile::Lookup,
    state::AppState,
    utils::{origin::PublicOrigin, qr},
};

/// Public result page data for one exam number.
///
/// A single published record comes back as `student`. When the exam number
/// covers several records (Midterm and Final) they are all listed under
/// `students`, with the first one repeated as `student`.
pub async fn get_result(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    origin: PublicOrigin,
) -> Result<impl IntoResponse, AppError> {
    let Path(exam_number) = path?;
    lookup_response(&state, &origin, &exam_number).await
}

/// Same as `get_result`, with the exam number in `?exam=`.
pub async fn search_result(
    State(state): State<AppState>,
    query: Result<Query<ResultSearchParams>, QueryRejection>,
    origin: PublicOrigin,
) -> Result<impl IntoResponse, AppError> {
    let Query(params) = query?;
    let exam_number = params
        .exam
        .as_deref()
        .map(str::trim)
        .filter(|exam| !exam.is_empty())
        .ok_or(AppError::BadRequest("Exam number required".to_string()))?;

    lookup_response(&state, &origin, exam_number).await
}

async fn lookup_response(
    state: &AppState,
    origin: &PublicOrigin,
    exam_number: &str,
) -> Result<Json<serde_json::Value>, AppError> {
    let exam_number = exam_number.trim();
    if exam_number.is_empty() {
        return Err(AppError::BadRequest("Exam number required".to_string()));
    }

    let lookup = state.registry.lookup(exam_number).await?;
    let artifact = qr::artifact(state.qr.as_ref(), origin.result_url(exam_number));

    let body = match lookup {
        Lookup::Single(record) => json!({
            "success": true,
            "student": RecordView { record, qr: artifact },
        }),
        Lookup::Multiple(records) => {
            let mut body = json!({
                "success": true,
                "students": records,
                "student": records.first(),
                "multiple": true,
                "qr_url": artifact.qr_url,
            });
            if let Some(data) = artifact.qr_code_data {
                body["qr_code_data"] = json!(data);
            }
            body
        }
    };

    Ok(Json(body))
}
