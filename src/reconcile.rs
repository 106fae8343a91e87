// src/reconcile.rs

//! Record reconciliation: decides whether a submission creates a record,
//! updates one, or is rejected, and owns every write to exam records.

use std::sync::{Arc, LazyLock};

use chrono::{Datelike, Utc};
use regex::Regex;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    grading::assess,
    models::student::{ExamRecord, ExamType, Submission},
    store::{self, RecordDraft},
};

static TRAILING_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)$").unwrap());

const CROSS_STUDENT_CONFLICT: &str =
    "Exam number already exists for another student. Each student must have a unique exam number.";

/// Exam number following `latest` in `year`: `EX-<year>-<NNN>`.
///
/// The counter continues from the trailing digits of `latest` and restarts
/// at 1 when there is no previous record or it has no numeric suffix.
pub fn next_exam_number(latest: Option<&str>, year: i32) -> String {
    let counter = latest
        .and_then(|exam_number| TRAILING_DIGITS.captures(exam_number))
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
        .map_or(1, |last| last.saturating_add(1));

    format!("EX-{}-{:03}", year, counter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: i64,
    pub exam_number: String,
    pub exam_type: ExamType,
    pub action: UpsertAction,
}

/// Published records behind one exam number.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Single(ExamRecord),
    /// Ordered Midterm, Final, Both; never empty.
    Multiple(Vec<ExamRecord>),
}

/// The reconciliation engine.
///
/// Writes are serialized through `write_gate` and each one runs in a single
/// transaction, so the conflict checks, exam-number generation and the write
/// itself cannot interleave with another submission.
#[derive(Clone)]
pub struct ResultsRegistry {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

impl ResultsRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Add-or-update by identity triple.
    ///
    /// * Exam number bound to another student -> `Conflict`, nothing written.
    /// * Same exam number, student and type -> overwrite that record.
    /// * Otherwise -> insert an unpublished record.
    pub async fn submit(&self, submission: Submission) -> Result<UpsertOutcome, AppError> {
        let assessment = assess(
            submission.exam_type,
            submission.subjects,
            submission.midterm_max_marks,
            submission.final_max_marks,
        )?;

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let exam_number = match submission.exam_number {
            Some(exam_number) => exam_number,
            None => {
                let latest = store::latest_exam_number(&mut *tx).await?;
                next_exam_number(latest.as_deref(), Utc::now().year())
            }
        };

        if store::exam_number_claimed_by_other(&mut *tx, &exam_number, &submission.id_number, None)
            .await?
        {
            tracing::info!(
                "Rejected submission for {}: exam number {} belongs to another student",
                submission.id_number,
                exam_number
            );
            return Err(AppError::Conflict(CROSS_STUDENT_CONFLICT.to_string()));
        }

        let draft = RecordDraft {
            id_number: submission.id_number,
            exam_number,
            student_name: submission.student_name,
            photo_url: submission.photo_url,
            exam_type: submission.exam_type,
            level: submission.level,
            exam_link: submission.exam_link,
            subjects: assessment.subjects,
            total_marks: assessment.total_marks,
            grade: assessment.grade,
            exam_date: submission
                .exam_date
                .unwrap_or_else(|| Utc::now().date_naive()),
        };

        let existing = store::find_by_identity(
            &mut *tx,
            &draft.exam_number,
            &draft.id_number,
            draft.exam_type,
        )
        .await?;

        let (id, action) = match existing {
            Some(record) => {
                store::update(&mut *tx, record.id, &draft).await?;
                (record.id, UpsertAction::Updated)
            }
            None => (store::insert(&mut *tx, &draft).await?, UpsertAction::Created),
        };

        tx.commit().await?;

        tracing::info!(
            "{:?} {} record {} for student {} under exam number {} (grade {})",
            action,
            draft.exam_type,
            id,
            draft.id_number,
            draft.exam_number,
            draft.grade
        );

        Ok(UpsertOutcome {
            id,
            exam_number: draft.exam_number,
            exam_type: draft.exam_type,
            action,
        })
    }

    /// Edits record `id` in place.
    ///
    /// Absent exam number, exam date and photo keep their stored values. The
    /// edited record must still not share its exam number with another
    /// student, nor collide with another record's identity triple.
    pub async fn revise(&self, id: i64, submission: Submission) -> Result<UpsertOutcome, AppError> {
        let assessment = assess(
            submission.exam_type,
            submission.subjects,
            submission.midterm_max_marks,
            submission.final_max_marks,
        )?;

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let current = store::find_by_id(&mut *tx, id)
            .await?
            .ok_or(AppError::NotFound("Student not found".to_string()))?;

        let draft = RecordDraft {
            id_number: submission.id_number,
            exam_number: submission.exam_number.unwrap_or(current.exam_number),
            student_name: submission.student_name,
            photo_url: submission.photo_url,
            exam_type: submission.exam_type,
            level: submission.level,
            exam_link: submission.exam_link,
            subjects: assessment.subjects,
            total_marks: assessment.total_marks,
            grade: assessment.grade,
            exam_date: submission.exam_date.unwrap_or(current.exam_date),
        };

        if store::exam_number_claimed_by_other(&mut *tx, &draft.exam_number, &draft.id_number, Some(id))
            .await?
        {
            return Err(AppError::Conflict(CROSS_STUDENT_CONFLICT.to_string()));
        }

        let twin = store::find_by_identity(
            &mut *tx,
            &draft.exam_number,
            &draft.id_number,
            draft.exam_type,
        )
        .await?;
        if twin.is_some_and(|other| other.id != id) {
            return Err(AppError::Conflict(format!(
                "A {} record for this student already exists under exam number {}",
                draft.exam_type, draft.exam_number
            )));
        }

        store::update(&mut *tx, id, &draft).await?;
        tx.commit().await?;

        tracing::info!("Revised record {} (exam number {})", id, draft.exam_number);

        Ok(UpsertOutcome {
            id,
            exam_number: draft.exam_number,
            exam_type: draft.exam_type,
            action: UpsertAction::Updated,
        })
    }

    pub async fn set_published(&self, id: i64, published: bool) -> Result<(), AppError> {
        let _gate = self.write_gate.lock().await;
        let mut conn = self.pool.acquire().await?;

        if !store::set_published(&mut *conn, id, published).await? {
            return Err(AppError::NotFound("Student not found".to_string()));
        }

        tracing::info!("Record {} published = {}", id, published);
        Ok(())
    }

    /// Publishes every record; returns how many rows were touched.
    pub async fn publish_all(&self) -> Result<u64, AppError> {
        let _gate = self.write_gate.lock().await;
        let mut conn = self.pool.acquire().await?;

        let updated = store::publish_all(&mut *conn).await?;
        tracing::info!("Published all records ({} updated)", updated);
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        let _gate = self.write_gate.lock().await;
        let mut conn = self.pool.acquire().await?;

        if !store::delete(&mut *conn, id).await? {
            return Err(AppError::NotFound("Student not found".to_string()));
        }

        tracing::info!("Deleted record {}", id);
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<ExamRecord, AppError> {
        let mut conn = self.pool.acquire().await?;
        store::find_by_id(&mut *conn, id)
            .await?
            .ok_or(AppError::NotFound("Student not found".to_string()))
    }

    /// Every record, newest first.
    pub async fn list(&self) -> Result<Vec<ExamRecord>, AppError> {
        let mut conn = self.pool.acquire().await?;
        store::list_all(&mut *conn).await
    }

    /// Public lookup. Unpublished records are never returned.
    pub async fn lookup(&self, exam_number: &str) -> Result<Lookup, AppError> {
        let mut conn = self.pool.acquire().await?;
        let mut records = store::list_published_by_exam_number(&mut *conn, exam_number.trim()).await?;

        match records.len() {
            0 => Err(AppError::NotFound("Student not found".to_string())),
            1 => Ok(Lookup::Single(records.remove(0))),
            _ => Ok(Lookup::Multiple(records)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_exam_number_continues_sequence() {
        assert_eq!(next_exam_number(Some("EX-2024-007"), 2024), "EX-2024-008");
        assert_eq!(next_exam_number(Some("EX-2023-041"), 2024), "EX-2024-042");
    }

    #[test]
    fn test_next_exam_number_starts_at_one() {
        assert_eq!(next_exam_number(None, 2025), "EX-2025-001");
        assert_eq!(next_exam_number(Some("CUSTOM"), 2025), "EX-2025-001");
    }

    #[test]
    fn test_next_exam_number_grows_past_three_digits() {
        assert_eq!(next_exam_number(Some("EX-2024-999"), 2024), "EX-2024-1000");
        assert_eq!(next_exam_number(Some("ROOM12"), 2024), "EX-2024-013");
    }
}
