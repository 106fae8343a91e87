// src/models/student.rs

use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Leading decimal number of a free-text mark, e.g. `"72.5/80"` -> `72.5`.
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").unwrap()
});

/// Classification of a record. Declaration order is the public lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExamType {
    Midterm,
    Final,
    Both,
}

impl ExamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamType::Midterm => "Midterm",
            ExamType::Final => "Final",
            ExamType::Both => "Both",
        }
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "midterm" => Ok(ExamType::Midterm),
            "final" => Ok(ExamType::Final),
            "both" => Ok(ExamType::Both),
            _ => Err(AppError::BadRequest(format!(
                "Invalid exam type '{}'. Expected Midterm, Final or Both",
                s.trim()
            ))),
        }
    }
}

/// Letter grade. `NotApplicable` is the "ungraded" sentinel, stored as `N/A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::NotApplicable => "N/A",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            "N/A" => Ok(Grade::NotApplicable),
            other => Err(AppError::InternalServerError(format!("Unknown grade '{}'", other))),
        }
    }
}

/// One `{name, mark}` entry. Both halves are optional in submitted JSON and are
/// stored exactly as received.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubjectMark {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// JSON number or free text (`"85"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<serde_json::Value>,

    /// Any other keys the admin panel sent along, stored untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SubjectMark {
    pub fn new(name: &str, mark: impl Into<serde_json::Value>) -> Self {
        Self {
            name: Some(name.to_string()),
            mark: Some(mark.into()),
            extra: serde_json::Map::new(),
        }
    }

    /// A subject counts only when its trimmed name is non-empty.
    pub fn is_named(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.trim().is_empty())
    }

    /// Numeric value of the mark; anything unparseable counts as 0.
    pub fn numeric_mark(&self) -> f64 {
        match &self.mark {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(serde_json::Value::String(s)) => parse_leading_number(s).unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

fn parse_leading_number(text: &str) -> Option<f64> {
    LEADING_NUMBER
        .find(text.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Subject buckets of a `Both` record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SplitSubjects {
    #[serde(default)]
    pub midterm: Vec<SubjectMark>,
    #[serde(default, rename = "final")]
    pub final_exam: Vec<SubjectMark>,
}

/// Stored subject structure: a flat list for `Midterm`/`Final`,
/// `{midterm, final}` for `Both`. Serializes back to the same JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subjects {
    Flat(Vec<SubjectMark>),
    Split(SplitSubjects),
}

impl Subjects {
    pub fn empty_for(exam_type: ExamType) -> Self {
        match exam_type {
            ExamType::Both => Subjects::Split(SplitSubjects::default()),
            ExamType::Midterm | ExamType::Final => Subjects::Flat(Vec::new()),
        }
    }
}

/// One exam result: a row of the `students` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamRecord {
    pub id: i64,
    pub id_number: String,
    pub exam_number: String,
    pub student_name: String,
    pub photo_url: Option<String>,
    pub exam_type: ExamType,
    pub level: Option<String>,
    pub exam_link: Option<String>,
    pub subjects: Subjects,
    pub total_marks: f64,
    pub grade: Grade,
    pub exam_date: NaiveDate,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

/// Raw database row; converted into `ExamRecord` after decoding.
#[derive(Debug, FromRow)]
pub struct StudentRow {
    pub id: i64,
    pub id_number: String,
    pub exam_number: String,
    pub student_name: String,
    pub photo_url: Option<String>,
    pub exam_type: String,
    pub level: Option<String>,
    pub exam_link: Option<String>,
    pub subjects_json: String,
    pub total_marks: f64,
    pub grade: String,
    pub exam_date: NaiveDate,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StudentRow> for ExamRecord {
    type Error = AppError;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        let exam_type: ExamType = row.exam_type.parse().map_err(|_| {
            AppError::InternalServerError(format!(
                "Record {} has unknown exam type '{}'",
                row.id, row.exam_type
            ))
        })?;

        // A corrupt subjects column should not hide the rest of the record.
        let subjects = serde_json::from_str(&row.subjects_json).unwrap_or_else(|e| {
            tracing::warn!("Unreadable subjects_json for record {}: {}", row.id, e);
            Subjects::empty_for(exam_type)
        });

        let grade = row.grade.parse().unwrap_or_else(|_| {
            tracing::warn!("Unknown grade '{}' for record {}", row.grade, row.id);
            Grade::NotApplicable
        });

        Ok(ExamRecord {
            id: row.id,
            id_number: row.id_number,
            exam_number: row.exam_number,
            student_name: row.student_name,
            photo_url: row.photo_url,
            exam_type,
            level: row.level,
            exam_link: row.exam_link,
            subjects,
            total_marks: row.total_marks,
            grade,
            exam_date: row.exam_date,
            published: row.published,
            created_at: row.created_at,
        })
    }
}

/// A validated add/edit request, ready for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id_number: String,
    /// Generated as `EX-<year>-<NNN>` when absent.
    pub exam_number: Option<String>,
    pub student_name: String,
    pub exam_type: ExamType,
    pub level: Option<String>,
    pub exam_link: Option<String>,
    pub subjects: Subjects,
    pub exam_date: Option<NaiveDate>,
    pub midterm_max_marks: Option<f64>,
    pub final_max_marks: Option<f64>,
    /// Set by the HTTP layer after the photo store accepted an upload.
    pub photo_url: Option<String>,
}

/// Text fields of the add/edit form, as posted by the admin panel.
#[derive(Debug, Default, Validate)]
pub struct SubmissionFields {
    #[validate(
        custom(function = not_blank, message = "Name and ID are required"),
        length(max = 200, message = "Name must be at most 200 characters.")
    )]
    pub student_name: String,

    #[validate(
        custom(function = not_blank, message = "Name and ID are required"),
        length(max = 50, message = "ID must be at most 50 characters.")
    )]
    pub id_number: String,

    #[validate(length(max = 50, message = "Exam number must be at most 50 characters."))]
    pub exam_number: Option<String>,

    pub exam_type: Option<String>,

    #[validate(length(max = 100))]
    pub level: Option<String>,

    #[validate(length(max = 500))]
    pub exam_link: Option<String>,

    /// JSON text: a list or a `{midterm, final}` object.
    pub subjects: Option<String>,
    pub exam_date: Option<String>,
    pub midterm_max_marks: Option<String>,
    pub final_max_marks: Option<String>,
}

fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("required"));
    }
    Ok(())
}

impl SubmissionFields {
    /// Stores a posted form field; blank optional fields are treated as absent.
    pub fn set(&mut self, name: &str, value: String) {
        let optional = if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_string())
        };

        match name {
            "student_name" => self.student_name = value,
            "id_number" => self.id_number = value,
            "exam_number" => self.exam_number = optional,
            "exam_type" => self.exam_type = optional,
            "level" => self.level = optional,
            "exam_link" => self.exam_link = optional,
            "subjects" => self.subjects = optional,
            "exam_date" => self.exam_date = optional,
            "midterm_max_marks" => self.midterm_max_marks = optional,
            "final_max_marks" => self.final_max_marks = optional,
            other => tracing::debug!("Ignoring unknown form field '{}'", other),
        }
    }

    pub fn into_submission(self) -> Result<Submission, AppError> {
        if let Err(validation_errors) = self.validate() {
            return Err(AppError::BadRequest(validation_errors.to_string()));
        }

        let exam_type: ExamType = self
            .exam_type
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("Exam type is required".to_string()))?
            .parse()?;

        let subjects = match self.subjects.as_deref() {
            None => Subjects::empty_for(exam_type),
            Some(raw) => serde_json::from_str::<Subjects>(raw).map_err(|e| {
                AppError::BadRequest(format!("Invalid subjects payload: {}", e))
            })?,
        };

        let exam_date = self
            .exam_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                    AppError::BadRequest(format!("Invalid exam date '{}', expected YYYY-MM-DD", raw))
                })
            })
            .transpose()?;

        Ok(Submission {
            id_number: self.id_number.trim().to_string(),
            exam_number: self.exam_number,
            student_name: self.student_name.trim().to_string(),
            exam_type,
            level: self.level,
            exam_link: self.exam_link,
            subjects,
            exam_date,
            midterm_max_marks: parse_max_marks("midterm_max_marks", self.midterm_max_marks)?,
            final_max_marks: parse_max_marks("final_max_marks", self.final_max_marks)?,
            photo_url: None,
        })
    }
}

fn parse_max_marks(field: &str, raw: Option<String>) -> Result<Option<f64>, AppError> {
    raw.map(|value| {
        value
            .parse::<f64>()
            .ok()
            .filter(|parsed| parsed.is_finite())
            .ok_or_else(|| AppError::BadRequest(format!("{} must be a number", field)))
    })
    .transpose()
}

/// DTO for toggling public visibility.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

/// Query parameters of the public search endpoint.
#[derive(Debug, Deserialize)]
pub struct ResultSearchParams {
    pub exam: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(exam_type: &str) -> SubmissionFields {
        SubmissionFields {
            student_name: "Amina Yusuf".to_string(),
            id_number: "S1".to_string(),
            exam_type: Some(exam_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_numeric_mark_accepts_numbers_and_text() {
        assert_eq!(SubjectMark::new("Math", 85).numeric_mark(), 85.0);
        assert_eq!(SubjectMark::new("Math", "72.5").numeric_mark(), 72.5);
        assert_eq!(SubjectMark::new("Math", " 90abc").numeric_mark(), 90.0);
        assert_eq!(SubjectMark::new("Math", "absent").numeric_mark(), 0.0);
        assert_eq!(SubjectMark::new("Math", serde_json::Value::Null).numeric_mark(), 0.0);
    }

    #[test]
    fn test_blank_names_do_not_count() {
        assert!(SubjectMark::new("Physics", 1).is_named());
        assert!(!SubjectMark::new("   ", 1).is_named());
        assert!(!SubjectMark::default().is_named());
    }

    #[test]
    fn test_subjects_keep_their_json_shape() {
        let flat: Subjects = serde_json::from_str(r#"[{"name":"Math","mark":"80"}]"#).unwrap();
        assert!(matches!(flat, Subjects::Flat(ref list) if list.len() == 1));
        assert!(serde_json::to_value(&flat).unwrap().is_array());

        let split: Subjects =
            serde_json::from_str(r#"{"midterm":[{"name":"Math","mark":30}],"final":[]}"#).unwrap();
        match &split {
            Subjects::Split(buckets) => {
                assert_eq!(buckets.midterm.len(), 1);
                assert!(buckets.final_exam.is_empty());
            }
            Subjects::Flat(_) => panic!("object decoded as a list"),
        }
        let encoded = serde_json::to_value(&split).unwrap();
        assert!(encoded.is_object());
        assert!(encoded["final"].is_array());
    }

    #[test]
    fn test_subject_keeps_unknown_keys() {
        let raw = r#"[{"name":"Math","mark":"80","remarks":"retake","weight":2}]"#;
        let subjects: Subjects = serde_json::from_str(raw).unwrap();

        let Subjects::Flat(list) = &subjects else {
            panic!("list decoded as an object");
        };
        assert_eq!(list[0].numeric_mark(), 80.0);
        assert_eq!(list[0].extra["remarks"], "retake");

        let encoded = serde_json::to_value(&subjects).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!([{ "name": "Math", "mark": "80", "remarks": "retake", "weight": 2 }])
        );
    }

    #[test]
    fn test_exam_type_parsing() {
        assert_eq!("Midterm".parse::<ExamType>().unwrap(), ExamType::Midterm);
        assert_eq!(" final ".parse::<ExamType>().unwrap(), ExamType::Final);
        assert_eq!("BOTH".parse::<ExamType>().unwrap(), ExamType::Both);
        assert!("Quiz".parse::<ExamType>().is_err());
        assert!(ExamType::Midterm < ExamType::Final && ExamType::Final < ExamType::Both);
    }

    #[test]
    fn test_grade_round_trips_through_text() {
        for grade in [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F, Grade::NotApplicable] {
            assert_eq!(grade.as_str().parse::<Grade>().unwrap(), grade);
        }
        assert_eq!(serde_json::to_value(Grade::NotApplicable).unwrap(), "N/A");
    }

    #[test]
    fn test_form_requires_name_and_id() {
        let mut form = fields("Midterm");
        form.student_name = "   ".to_string();
        assert!(matches!(form.into_submission(), Err(AppError::BadRequest(_))));

        let mut form = fields("Midterm");
        form.id_number = String::new();
        assert!(matches!(form.into_submission(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_form_parses_optional_fields() {
        let mut form = fields("Final");
        form.set("subjects", r#"[{"name":"Math","mark":"70"}]"#.to_string());
        form.set("exam_date", "2024-06-01".to_string());
        form.set("final_max_marks", "100".to_string());
        form.set("exam_number", "   ".to_string());

        let submission = form.into_submission().unwrap();
        assert_eq!(submission.exam_type, ExamType::Final);
        assert_eq!(submission.exam_number, None);
        assert_eq!(submission.final_max_marks, Some(100.0));
        assert_eq!(submission.midterm_max_marks, None);
        assert_eq!(
            submission.exam_date,
            Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        );
    }

    #[test]
    fn test_form_rejects_malformed_values() {
        let mut form = fields("Final");
        form.set("exam_date", "01/06/2024".to_string());
        assert!(form.into_submission().is_err());

        let mut form = fields("Final");
        form.set("final_max_marks", "lots".to_string());
        assert!(form.into_submission().is_err());

        let mut form = fields("Final");
        form.set("subjects", "not json".to_string());
        assert!(form.into_submission().is_err());

        let mut form = fields("Final");
        form.exam_type = None;
        assert!(form.into_submission().is_err());
    }

    #[test]
    fn test_missing_subjects_default_to_matching_shape() {
        let submission = fields("Both").into_submission().unwrap();
        assert_eq!(submission.subjects, Subjects::Split(SplitSubjects::default()));

        let submission = fields("Midterm").into_submission().unwrap();
        assert_eq!(submission.subjects, Subjects::Flat(Vec::new()));
    }
}
