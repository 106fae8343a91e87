// src/utils/export.rs

//! CSV export of exam records.

use std::borrow::Cow;

use crate::models::student::{ExamRecord, SubjectMark, Subjects};

const HEADER: [&str; 8] = [
    "ID Number",
    "Exam Number",
    "Name",
    "Exam Type",
    "Subjects",
    "Total Marks",
    "Grade",
    "Exam Date",
];

/// Quotes a field when it contains a delimiter, quote or line break.
fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn describe(subject: &SubjectMark, prefix: &str) -> String {
    let mark = match &subject.mark {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    format!("{}{}: {}", prefix, subject.name.as_deref().unwrap_or_default(), mark)
}

/// `name: mark; ...`, with `Midterm`/`Final` prefixes for split buckets.
fn subjects_summary(subjects: &Subjects) -> String {
    match subjects {
        Subjects::Flat(list) => list
            .iter()
            .map(|subject| describe(subject, ""))
            .collect::<Vec<_>>()
            .join("; "),
        Subjects::Split(buckets) => buckets
            .midterm
            .iter()
            .map(|subject| describe(subject, "Midterm "))
            .chain(buckets.final_exam.iter().map(|subject| describe(subject, "Final ")))
            .collect::<Vec<_>>()
            .join("; "),
    }
}

pub fn records_to_csv(records: &[ExamRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(HEADER.join(","));

    for record in records {
        let total = record.total_marks.to_string();
        let exam_date = record.exam_date.to_string();
        let summary = subjects_summary(&record.subjects);
        let fields = [
            record.id_number.as_str(),
            record.exam_number.as_str(),
            record.student_name.as_str(),
            record.exam_type.as_str(),
            summary.as_str(),
            total.as_str(),
            record.grade.as_str(),
            exam_date.as_str(),
        ];
        lines.push(
            fields
                .iter()
                .map(|field| escape(field))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    lines.join("\n")
}
