// src/store.rs

//! SQL access to the `students` table.
//!
//! Every function takes an explicit connection so callers can run several of
//! them inside one transaction (`&mut *tx`) or on a pooled connection.

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;

use crate::{
    error::{AppError, is_unique_violation},
    models::student::{ExamRecord, ExamType, Grade, StudentRow, Subjects},
};

const SELECT_STUDENT: &str = r#"
    SELECT
        id, id_number, exam_number, student_name, photo_url, exam_type,
        level, exam_link, subjects_json, total_marks, grade, exam_date,
        published, created_at
    FROM students
"#;

/// Everything the engine writes for one record, minus identity and visibility.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub id_number: String,
    pub exam_number: String,
    pub student_name: String,
    /// `None` keeps the stored photo on update.
    pub photo_url: Option<String>,
    pub exam_type: ExamType,
    pub level: Option<String>,
    pub exam_link: Option<String>,
    pub subjects: Subjects,
    pub total_marks: f64,
    pub grade: Grade,
    pub exam_date: NaiveDate,
}

fn into_records(rows: Vec<StudentRow>) -> Result<Vec<ExamRecord>, AppError> {
    rows.into_iter().map(ExamRecord::try_from).collect()
}

fn map_write_error(err: sqlx::Error, draft: &RecordDraft) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict(format!(
            "A {} record for this student already exists under exam number {}",
            draft.exam_type, draft.exam_number
        ))
    } else {
        tracing::error!("Failed to write exam record: {:?}", err);
        AppError::from(err)
    }
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<ExamRecord>, AppError> {
    let row = sqlx::query_as::<_, StudentRow>(&format!("{SELECT_STUDENT} WHERE id = ?1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(ExamRecord::try_from).transpose()
}

/// Point lookup by the identity triple.
pub async fn find_by_identity(
    conn: &mut SqliteConnection,
    exam_number: &str,
    id_number: &str,
    exam_type: ExamType,
) -> Result<Option<ExamRecord>, AppError> {
    let row = sqlx::query_as::<_, StudentRow>(&format!(
        "{SELECT_STUDENT} WHERE exam_number = ?1 AND id_number = ?2 AND exam_type = ?3"
    ))
    .bind(exam_number)
    .bind(id_number)
    .bind(exam_type.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(ExamRecord::try_from).transpose()
}

/// Whether `exam_number` is already used by a student other than `id_number`.
/// `except_id` excludes one record (the one being edited).
pub async fn exam_number_claimed_by_other(
    conn: &mut SqliteConnection,
    exam_number: &str,
    id_number: &str,
    except_id: Option<i64>,
) -> Result<bool, AppError> {
    let claimed = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT id FROM students
        WHERE exam_number = ?1
          AND id_number != ?2
          AND (?3 IS NULL OR id != ?3)
        LIMIT 1
        "#,
    )
    .bind(exam_number)
    .bind(id_number)
    .bind(except_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(claimed.is_some())
}

/// Exam number of the most recently created record.
pub async fn latest_exam_number(conn: &mut SqliteConnection) -> Result<Option<String>, AppError> {
    let latest = sqlx::query_scalar::<_, String>(
        "SELECT exam_number FROM students ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    Ok(latest)
}

/// Inserts an unpublished record and returns its id.
pub async fn insert(conn: &mut SqliteConnection, draft: &RecordDraft) -> Result<i64, AppError> {
    let subjects_json = serde_json::to_string(&draft.subjects)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO students
        (id_number, exam_number, student_name, photo_url, exam_type, level, exam_link,
         subjects_json, total_marks, grade, exam_date, published, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, FALSE, ?12)
        "#,
    )
    .bind(&draft.id_number)
    .bind(&draft.exam_number)
    .bind(&draft.student_name)
    .bind(&draft.photo_url)
    .bind(draft.exam_type.as_str())
    .bind(&draft.level)
    .bind(&draft.exam_link)
    .bind(subjects_json)
    .bind(draft.total_marks)
    .bind(draft.grade.as_str())
    .bind(draft.exam_date)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, draft))?;

    Ok(result.last_insert_rowid())
}

/// Overwrites every mutable column of record `id`. The photo is only replaced
/// when the draft carries a new one; `published` and `created_at` are kept.
pub async fn update(conn: &mut SqliteConnection, id: i64, draft: &RecordDraft) -> Result<(), AppError> {
    let subjects_json = serde_json::to_string(&draft.subjects)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let result = sqlx::query(
        r#"
        UPDATE students SET
            id_number = ?1,
            exam_number = ?2,
            student_name = ?3,
            photo_url = COALESCE(?4, photo_url),
            exam_type = ?5,
            level = ?6,
            exam_link = ?7,
            subjects_json = ?8,
            total_marks = ?9,
            grade = ?10,
            exam_date = ?11
        WHERE id = ?12
        "#,
    )
    .bind(&draft.id_number)
    .bind(&draft.exam_number)
    .bind(&draft.student_name)
    .bind(&draft.photo_url)
    .bind(draft.exam_type.as_str())
    .bind(&draft.level)
    .bind(&draft.exam_link)
    .bind(subjects_json)
    .bind(draft.total_marks)
    .bind(draft.grade.as_str())
    .bind(draft.exam_date)
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, draft))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student not found".to_string()));
    }

    Ok(())
}

/// Returns `false` when no record has this id.
pub async fn set_published(conn: &mut SqliteConnection, id: i64, published: bool) -> Result<bool, AppError> {
    let result = sqlx::query("UPDATE students SET published = ?1 WHERE id = ?2")
        .bind(published)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn publish_all(conn: &mut SqliteConnection) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE students SET published = TRUE")
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Returns `false` when no record has this id.
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM students WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// All records, newest first.
pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<ExamRecord>, AppError> {
    let rows = sqlx::query_as::<_, StudentRow>(&format!(
        "{SELECT_STUDENT} ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(&mut *conn)
    .await?;

    into_records(rows)
}

/// Published records sharing `exam_number`, Midterm before Final before Both,
/// then in creation order.
pub async fn list_published_by_exam_number(
    conn: &mut SqliteConnection,
    exam_number: &str,
) -> Result<Vec<ExamRecord>, AppError> {
    let rows = sqlx::query_as::<_, StudentRow>(&format!(
        r#"{SELECT_STUDENT}
        WHERE exam_number = ?1 AND published = TRUE
        ORDER BY
            CASE exam_type WHEN 'Midterm' THEN 0 WHEN 'Final' THEN 1 ELSE 2 END,
            created_at ASC,
            id ASC
        "#
    ))
    .bind(exam_number)
    .fetch_all(&mut *conn)
    .await?;

    into_records(rows)
}
