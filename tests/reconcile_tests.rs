// tests/reconcile_tests.rs

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Utc};
use exam_results::{
    ResultsRegistry, db,
    error::AppError,
    models::student::{ExamType, Grade, SplitSubjects, SubjectMark, Subjects, Submission},
    reconcile::{Lookup, UpsertAction},
};

/// Fresh registry over a private in-memory database.
async fn registry() -> ResultsRegistry {
    let pool = db::connect_in_memory()
        .await
        .expect("Failed to open in-memory database");
    db::migrate(&pool).await.expect("Failed to migrate database");
    ResultsRegistry::new(pool)
}

fn submission(id_number: &str, exam_number: Option<&str>, exam_type: ExamType) -> Submission {
    Submission {
        id_number: id_number.to_string(),
        exam_number: exam_number.map(str::to_string),
        student_name: "Amina Yusuf".to_string(),
        exam_type,
        level: Some("Grade 8".to_string()),
        exam_link: None,
        subjects: Subjects::Flat(vec![
            SubjectMark::new("Math", 45),
            SubjectMark::new("Science", "40"),
        ]),
        exam_date: NaiveDate::from_ymd_opt(2024, 6, 1),
        midterm_max_marks: Some(50.0),
        final_max_marks: Some(50.0),
        photo_url: None,
    }
}

#[tokio::test]
async fn submit_creates_unpublished_record() {
    let registry = registry().await;

    let outcome = registry
        .submit(submission("S1", Some("EX-2024-001"), ExamType::Midterm))
        .await
        .unwrap();
    assert_eq!(outcome.action, UpsertAction::Created);

    let record = registry.get(outcome.id).await.unwrap();
    assert!(!record.published);
    assert_eq!(record.total_marks, 85.0);
    assert_eq!(record.grade, Grade::B);

    // Not visible to the public until published.
    assert!(matches!(
        registry.lookup("EX-2024-001").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn resubmitting_same_identity_updates_in_place() {
    let registry = registry().await;

    let first = registry
        .submit(submission("S1", Some("EX-2024-001"), ExamType::Midterm))
        .await
        .unwrap();
    let before = registry.get(first.id).await.unwrap();

    let mut revised = submission("S1", Some("EX-2024-001"), ExamType::Midterm);
    revised.subjects = Subjects::Flat(vec![SubjectMark::new("Math", 48), SubjectMark::new("Science", 47)]);
    let second = registry.submit(revised).await.unwrap();

    assert_eq!(second.action, UpsertAction::Updated);
    assert_eq!(second.id, first.id);

    let after = registry.get(first.id).await.unwrap();
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.total_marks, 95.0);
    assert_eq!(after.grade, Grade::A);
    assert_eq!(registry.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn exam_number_of_another_student_is_rejected() {
    let registry = registry().await;

    registry
        .submit(submission("S1", Some("EX-2024-001"), ExamType::Midterm))
        .await
        .unwrap();

    let result = registry
        .submit(submission("S2", Some("EX-2024-001"), ExamType::Final))
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    let records = registry.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records.iter().all(|record| record.id_number == "S1"));
}

#[tokio::test]
async fn midterm_and_final_share_exam_number_and_lookup_in_order() {
    let registry = registry().await;

    // Final submitted first; lookup still lists Midterm first.
    let final_exam = registry
        .submit(submission("S1", Some("EX-2024-010"), ExamType::Final))
        .await
        .unwrap();
    let midterm = registry
        .submit(submission("S1", Some("EX-2024-010"), ExamType::Midterm))
        .await
        .unwrap();
    assert_eq!(midterm.action, UpsertAction::Created);
    assert_ne!(midterm.id, final_exam.id);

    registry.publish_all().await.unwrap();

    match registry.lookup("EX-2024-010").await.unwrap() {
        Lookup::Multiple(records) => {
            let types: Vec<ExamType> = records.iter().map(|record| record.exam_type).collect();
            assert_eq!(types, vec![ExamType::Midterm, ExamType::Final]);
        }
        Lookup::Single(_) => panic!("expected both records"),
    }
}

#[tokio::test]
async fn publishing_changes_only_visibility() {
    let registry = registry().await;

    let outcome = registry
        .submit(submission("S1", Some("EX-2024-002"), ExamType::Final))
        .await
        .unwrap();
    let before = registry.get(outcome.id).await.unwrap();

    registry.set_published(outcome.id, true).await.unwrap();

    let after = registry.get(outcome.id).await.unwrap();
    assert!(after.published);
    assert_eq!(ExamRecordFields::of(&after), ExamRecordFields::of(&before));

    match registry.lookup(" EX-2024-002 ").await.unwrap() {
        Lookup::Single(record) => assert_eq!(record.id, outcome.id),
        Lookup::Multiple(_) => panic!("expected a single record"),
    }

    registry.set_published(outcome.id, false).await.unwrap();
    assert!(registry.lookup("EX-2024-002").await.is_err());
}

/// Every stored field except `published`.
#[derive(Debug, PartialEq)]
struct ExamRecordFields {
    id: i64,
    exam_number: String,
    id_number: String,
    total_marks: f64,
    grade: Grade,
    subjects: Subjects,
    exam_date: NaiveDate,
    created_at: chrono::DateTime<Utc>,
}

impl ExamRecordFields {
    fn of(record: &exam_results::models::student::ExamRecord) -> Self {
        Self {
            id: record.id,
            exam_number: record.exam_number.clone(),
            id_number: record.id_number.clone(),
            total_marks: record.total_marks,
            grade: record.grade,
            subjects: record.subjects.clone(),
            exam_date: record.exam_date,
            created_at: record.created_at,
        }
    }
}

#[tokio::test]
async fn missing_exam_number_is_generated_for_current_year() {
    let registry = registry().await;
    let year = Utc::now().year();

    let first = registry
        .submit(submission("S1", None, ExamType::Midterm))
        .await
        .unwrap();
    let second = registry
        .submit(submission("S2", None, ExamType::Midterm))
        .await
        .unwrap();

    assert_eq!(first.exam_number, format!("EX-{}-001", year));
    assert_eq!(second.exam_number, format!("EX-{}-002", year));
}

#[tokio::test]
async fn record_without_subjects_is_not_graded() {
    let registry = registry().await;

    let mut empty = submission("S1", Some("EX-2024-003"), ExamType::Midterm);
    empty.subjects = Subjects::Flat(vec![SubjectMark::new("   ", 30)]);
    empty.midterm_max_marks = None;

    let outcome = registry.submit(empty).await.unwrap();
    let record = registry.get(outcome.id).await.unwrap();

    assert_eq!(record.grade, Grade::NotApplicable);
    assert_eq!(record.total_marks, 0.0);
    assert_eq!(record.subjects, Subjects::Flat(vec![]));
}

#[tokio::test]
async fn both_exam_sums_buckets() {
    let registry = registry().await;

    let mut both = submission("S1", Some("EX-2024-004"), ExamType::Both);
    both.subjects = Subjects::Split(SplitSubjects {
        midterm: vec![SubjectMark::new("Math", 40)],
        final_exam: vec![SubjectMark::new("Math", 70)],
    });
    both.midterm_max_marks = Some(50.0);
    both.final_max_marks = Some(100.0);

    let outcome = registry.submit(both).await.unwrap();
    let record = registry.get(outcome.id).await.unwrap();

    assert_eq!(record.total_marks, 110.0);
    // 110 / 150 = 73.3%
    assert_eq!(record.grade, Grade::C);
}

#[tokio::test]
async fn missing_max_marks_rejects_without_writing() {
    let registry = registry().await;

    let mut invalid = submission("S1", Some("EX-2024-005"), ExamType::Final);
    invalid.final_max_marks = None;

    assert!(matches!(
        registry.submit(invalid).await,
        Err(AppError::BadRequest(_))
    ));
    assert!(registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn revise_keeps_unspecified_fields() {
    let registry = registry().await;

    let outcome = registry
        .submit(submission("S1", Some("EX-2024-006"), ExamType::Midterm))
        .await
        .unwrap();

    let mut edit = submission("S1", None, ExamType::Midterm);
    edit.student_name = "Amina Y. Hassan".to_string();
    edit.exam_date = None;
    let revised = registry.revise(outcome.id, edit).await.unwrap();

    assert_eq!(revised.exam_number, "EX-2024-006");
    let record = registry.get(outcome.id).await.unwrap();
    assert_eq!(record.student_name, "Amina Y. Hassan");
    assert_eq!(record.exam_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
}

#[tokio::test]
async fn revise_cannot_take_over_foreign_exam_number_or_identity() {
    let registry = registry().await;

    registry
        .submit(submission("S1", Some("EX-2024-007"), ExamType::Midterm))
        .await
        .unwrap();
    let s2 = registry
        .submit(submission("S2", Some("EX-2024-008"), ExamType::Midterm))
        .await
        .unwrap();

    let hijack = submission("S2", Some("EX-2024-007"), ExamType::Midterm);
    assert!(matches!(
        registry.revise(s2.id, hijack).await,
        Err(AppError::Conflict(_))
    ));

    // Changing type onto an existing triple of the same student.
    let s2_final = registry
        .submit(submission("S2", Some("EX-2024-008"), ExamType::Final))
        .await
        .unwrap();
    let collide = submission("S2", Some("EX-2024-008"), ExamType::Midterm);
    assert!(matches!(
        registry.revise(s2_final.id, collide).await,
        Err(AppError::Conflict(_))
    ));

    let unchanged = registry.get(s2.id).await.unwrap();
    assert_eq!(unchanged.exam_number, "EX-2024-008");
}

#[tokio::test]
async fn missing_targets_are_not_found() {
    let registry = registry().await;

    assert!(matches!(registry.get(42).await, Err(AppError::NotFound(_))));
    assert!(matches!(registry.delete(42).await, Err(AppError::NotFound(_))));
    assert!(matches!(
        registry.set_published(42, true).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        registry.revise(42, submission("S1", None, ExamType::Final)).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn delete_removes_record() {
    let registry = registry().await;

    let outcome = registry
        .submit(submission("S1", Some("EX-2024-009"), ExamType::Final))
        .await
        .unwrap();
    registry.set_published(outcome.id, true).await.unwrap();

    registry.delete(outcome.id).await.unwrap();

    assert!(registry.list().await.unwrap().is_empty());
    assert!(registry.lookup("EX-2024-009").await.is_err());
}

/// Registry over a database file, so several pooled connections write concurrently.
async fn file_registry() -> (ResultsRegistry, std::path::PathBuf) {
    let path = std::env::temp_dir().join(format!("exam-results-{}.db", uuid::Uuid::new_v4()));
    let pool = db::connect(&format!("sqlite://{}", path.display()))
        .await
        .expect("Failed to open database file");
    db::migrate(&pool).await.expect("Failed to migrate database");
    (ResultsRegistry::new(pool), path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_get_distinct_exam_numbers() {
    let (registry, path) = file_registry().await;

    let handles: Vec<_> = (0..20)
        .map(|n| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .submit(submission(&format!("S{}", n), None, ExamType::Midterm))
                    .await
            })
        })
        .collect();

    let mut exam_numbers = HashSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap().expect("submission failed");
        exam_numbers.insert(outcome.exam_number);
    }

    assert_eq!(exam_numbers.len(), 20);
    assert_eq!(registry.list().await.unwrap().len(), 20);

    let _ = std::fs::remove_file(path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_collapse_into_one_record() {
    let (registry, path) = file_registry().await;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .submit(submission("S1", Some("EX-2024-900"), ExamType::Final))
                    .await
            })
        })
        .collect();

    let mut actions = Vec::new();
    for handle in handles {
        actions.push(handle.await.unwrap().expect("submission failed").action);
    }
    actions.sort_by_key(|action| *action == UpsertAction::Updated);

    assert_eq!(actions, vec![UpsertAction::Created, UpsertAction::Updated]);
    assert_eq!(registry.list().await.unwrap().len(), 1);

    let _ = std::fs::remove_file(path);
}
