// src/handlers/students.rs

use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;

use crate::{
    error::AppError,
    models::student::{ExamRecord, PublishRequest, Submission, SubmissionFields},
    reconcile::{UpsertAction, UpsertOutcome},
    state::AppState,
    utils::{
        export::records_to_csv,
        origin::PublicOrigin,
        photo::PhotoUpload,
        qr::{self, QrArtifact, QrOptions},
    },
};

/// A record with its public link and QR code.
#[derive(Debug, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: ExamRecord,
    #[serde(flatten)]
    pub qr: QrArtifact,
}

/// Response payload of add/edit.
#[derive(Debug, Serialize)]
struct SubmissionReceipt {
    id: i64,
    exam_number: String,
    #[serde(flatten)]
    qr: QrArtifact,
}

/// Reads the add/edit multipart form: text fields plus an optional `photo`.
async fn read_submission_form(
    mut multipart: Multipart,
) -> Result<(SubmissionFields, Option<PhotoUpload>), AppError> {
    let mut fields = SubmissionFields::default();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "photo" {
            let file_name = field.file_name().map(str::to_owned);
            let content_type = field.content_type().map(str::to_owned);
            let bytes = field.bytes().await?;
            // Browsers send an empty part when no file was picked.
            if !bytes.is_empty() {
                photo = Some(PhotoUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
        } else {
            let value = field.text().await?;
            fields.set(&name, value);
        }
    }

    Ok((fields, photo))
}

/// Parses the form, stores the photo and returns the submission to reconcile.
async fn prepare_submission(
    state: &AppState,
    multipart: Multipart,
) -> Result<Submission, AppError> {
    let (fields, photo) = read_submission_form(multipart).await?;
    let mut submission = fields.into_submission()?;

    if let Some(upload) = photo {
        submission.photo_url = Some(state.photos.save(upload).await?);
    }

    Ok(submission)
}

/// Drops a just-stored photo when the write it belonged to failed.
async fn discard_photo_on_error(
    state: &AppState,
    photo_url: Option<&str>,
    result: Result<UpsertOutcome, AppError>,
) -> Result<UpsertOutcome, AppError> {
    if result.is_err() {
        if let Some(url) = photo_url {
            state.photos.discard(url).await;
        }
    }
    result
}

fn receipt(state: &AppState, origin: &PublicOrigin, outcome: &UpsertOutcome) -> SubmissionReceipt {
    SubmissionReceipt {
        id: outcome.id,
        exam_number: outcome.exam_number.clone(),
        qr: qr::artifact(state.qr.as_ref(), origin.result_url(&outcome.exam_number)),
    }
}

/// Lists every record, newest first.
/// Admin only.
pub async fn list_students(
    State(state): State<AppState>,
    origin: PublicOrigin,
) -> Result<impl IntoResponse, AppError> {
    let records = state.registry.list().await?;

    let views: Vec<RecordView> = records
        .into_iter()
        .map(|record| {
            let qr = qr::artifact(state.qr.as_ref(), origin.result_url(&record.exam_number));
            RecordView { record, qr }
        })
        .collect();

    Ok(Json(views))
}

/// Adds a record, or updates the student's existing record of the same type.
///
/// Multipart fields: `student_name`, `id_number`, `exam_number` (optional,
/// generated when empty), `exam_type`, `level`, `exam_link`, `subjects` (JSON),
/// `exam_date`, `midterm_max_marks`, `final_max_marks`, `photo` (file).
/// Admin only.
pub async fn add_student(
    State(state): State<AppState>,
    origin: PublicOrigin,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let multipart = multipart?;
    let submission = prepare_submission(&state, multipart).await?;
    let photo_url = submission.photo_url.clone();

    let result = state.registry.submit(submission).await;
    let outcome = discard_photo_on_error(&state, photo_url.as_deref(), result).await?;

    let (status, message) = match outcome.action {
        UpsertAction::Created => (StatusCode::CREATED, "Student added successfully".to_string()),
        UpsertAction::Updated => (
            StatusCode::OK,
            format!("Student {} record updated successfully", outcome.exam_type),
        ),
    };

    Ok((
        status,
        Json(json!({
            "success": true,
            "message": message,
            "student": receipt(&state, &origin, &outcome),
        })),
    ))
}

/// Edits a record by ID. Same form as `add_student`; an empty exam number,
/// exam date or photo keeps the stored value.
/// Admin only.
pub async fn update_student(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    origin: PublicOrigin,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let multipart = multipart?;
    let submission = prepare_submission(&state, multipart).await?;
    let photo_url = submission.photo_url.clone();

    let result = state.registry.revise(id, submission).await;
    let outcome = discard_photo_on_error(&state, photo_url.as_deref(), result).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Student updated successfully",
        "student": receipt(&state, &origin, &outcome),
    })))
}

/// Publishes or hides a record.
/// Admin only.
pub async fn set_published(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(payload) = payload?;
    state.registry.set_published(id, payload.published).await?;

    let message = if payload.published {
        "Student published"
    } else {
        "Student unpublished"
    };

    Ok(Json(json!({ "success": true, "message": message })))
}

/// Publishes every record.
/// Admin only.
pub async fn publish_all(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let updated = state.registry.publish_all().await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("All students published ({} updated)", updated),
    })))
}

/// Deletes a record by ID.
/// Admin only.
pub async fn delete_student(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    state.registry.delete(id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Student deleted successfully",
        "deletedId": id,
    })))
}

/// QR code of a record's public link, as a data URL.
/// Admin only.
pub async fn student_qr(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    origin: PublicOrigin,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let record = state.registry.get(id).await?;
    let qr_url = origin.result_url(&record.exam_number);

    let image = state
        .qr
        .encode(&qr_url, &QrOptions::INLINE)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "qr_code_data": image.to_data_url(),
        "qr_url": qr_url,
    })))
}

/// QR code of a record's public link, as a downloadable file named after the
/// exam number.
/// Admin only.
pub async fn download_qr(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    origin: PublicOrigin,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let record = state.registry.get(id).await?;
    let qr_url = origin.result_url(&record.exam_number);

    let image = state
        .qr
        .encode(&qr_url, &QrOptions::DOWNLOAD)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let safe_name: String = record
        .exam_number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        safe_name, image.file_extension
    );

    Ok((
        [
            (header::CONTENT_TYPE, image.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        image.bytes,
    ))
}

/// Exports every record as CSV.
/// Admin only.
pub async fn export_students(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let records = state.registry.list().await?;
    let csv = records_to_csv(&records);

    let disposition = format!(
        "attachment; filename=students_export_{}.csv",
        chrono::Utc::now().timestamp_millis()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
