// src/grading.rs

//! Grade calculation and the marks assessment of a submission.

use crate::{
    error::AppError,
    models::student::{ExamType, Grade, SubjectMark, Subjects},
};

/// Max marks assumed when the caller does not specify any.
pub const DEFAULT_MAX_MARKS: f64 = 100.0;

/// Maps a total out of `max_marks` (default 100) to a letter grade.
///
/// Thresholds on the percentage: >=90 A, >=80 B, >=70 C, >=60 D, else F.
/// A non-positive max cannot be graded and yields `N/A`.
pub fn calculate_grade(total_marks: f64, max_marks: Option<f64>) -> Grade {
    let max_marks = max_marks.unwrap_or(DEFAULT_MAX_MARKS);
    if !max_marks.is_finite() || max_marks <= 0.0 {
        return Grade::NotApplicable;
    }

    let percentage = total_marks * 100.0 / max_marks;
    if percentage >= 90.0 {
        Grade::A
    } else if percentage >= 80.0 {
        Grade::B
    } else if percentage >= 70.0 {
        Grade::C
    } else if percentage >= 60.0 {
        Grade::D
    } else {
        Grade::F
    }
}

/// Derived marks of a submission, computed before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// What gets persisted: the filtered list for flat types, the untouched
    /// `{midterm, final}` buckets for `Both`.
    pub subjects: Subjects,
    pub total_marks: f64,
    pub max_marks: f64,
    pub grade: Grade,
}

/// Validates the max-marks parameters against the submitted subjects and
/// computes total, max and grade.
pub fn assess(
    exam_type: ExamType,
    subjects: Subjects,
    midterm_max_marks: Option<f64>,
    final_max_marks: Option<f64>,
) -> Result<Assessment, AppError> {
    match (exam_type, subjects) {
        (ExamType::Both, Subjects::Split(buckets)) => {
            let valid_midterm = named(&buckets.midterm);
            let valid_final = named(&buckets.final_exam);

            if !valid_midterm.is_empty() {
                require_positive(
                    midterm_max_marks,
                    "Max marks for midterm is required when adding midterm subjects",
                )?;
            }
            if !valid_final.is_empty() {
                require_positive(
                    final_max_marks,
                    "Max marks for final is required when adding final subjects",
                )?;
            }

            let counted = valid_midterm.len() + valid_final.len();
            let total_marks = sum_marks(valid_midterm.iter().chain(valid_final.iter()).copied());
            let max_marks = if counted == 0 {
                DEFAULT_MAX_MARKS
            } else {
                valid_midterm.len() as f64 * midterm_max_marks.unwrap_or_default()
                    + valid_final.len() as f64 * final_max_marks.unwrap_or_default()
            };

            Ok(graded(Subjects::Split(buckets), counted, total_marks, max_marks))
        }
        (ExamType::Midterm | ExamType::Final, Subjects::Flat(list)) => {
            let (bucket_max, message) = match exam_type {
                ExamType::Midterm => (
                    midterm_max_marks,
                    "Max marks for midterm is required when adding subjects",
                ),
                _ => (
                    final_max_marks,
                    "Max marks for final is required when adding subjects",
                ),
            };

            let valid: Vec<SubjectMark> = list.into_iter().filter(SubjectMark::is_named).collect();
            if !valid.is_empty() {
                require_positive(bucket_max, message)?;
            }

            let total_marks = sum_marks(valid.iter());
            let max_marks = if valid.is_empty() {
                DEFAULT_MAX_MARKS
            } else {
                valid.len() as f64 * bucket_max.unwrap_or_default()
            };
            let counted = valid.len();

            Ok(graded(Subjects::Flat(valid), counted, total_marks, max_marks))
        }
        (ExamType::Both, Subjects::Flat(_)) => Err(AppError::BadRequest(
            "Subjects for a Both exam must be an object with midterm and final lists".to_string(),
        )),
        (_, Subjects::Split(_)) => Err(AppError::BadRequest(format!(
            "Subjects for a {} exam must be a list",
            exam_type
        ))),
    }
}

fn named(list: &[SubjectMark]) -> Vec<&SubjectMark> {
    list.iter().filter(|subject| subject.is_named()).collect()
}

fn sum_marks<'a>(subjects: impl Iterator<Item = &'a SubjectMark>) -> f64 {
    subjects.map(SubjectMark::numeric_mark).sum()
}

fn require_positive(max_marks: Option<f64>, message: &str) -> Result<(), AppError> {
    match max_marks {
        Some(value) if value.is_finite() && value > 0.0 => Ok(()),
        _ => Err(AppError::BadRequest(message.to_string())),
    }
}

fn graded(subjects: Subjects, counted: usize, total_marks: f64, max_marks: f64) -> Assessment {
    if counted == 0 {
        return Assessment {
            subjects,
            total_marks: 0.0,
            max_marks,
            grade: Grade::NotApplicable,
        };
    }

    Assessment {
        subjects,
        total_marks,
        max_marks,
        grade: calculate_grade(total_marks, Some(max_marks)),
    }
}
