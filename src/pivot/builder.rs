use super::collate::compare_names;
use super::{
    AttendanceSummary, EventKey, EventRecord, EventValue, GradeSummary, PivotKind, Student,
    StudentPivotRow, Summary,
};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

/// A record that cannot take part in aggregation. These are data errors in
/// the store, not caller errors, so they are reported and skipped.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum IntegrityIssue {
    #[error("record {record_id}: status {raw:?} is not one of Hadir, Izin, Sakit, Alpha")]
    #[serde(rename_all = "camelCase")]
    UnknownStatus { record_id: String, raw: String },

    #[error("record {record_id}: score {score} is outside 0..=100")]
    #[serde(rename_all = "camelCase")]
    ScoreOutOfRange { record_id: String, score: f64 },

    #[error("record {record_id}: {found} value in a {expected:?} pivot")]
    #[serde(rename_all = "camelCase")]
    KindMismatch {
        record_id: String,
        expected: PivotKind,
        found: &'static str,
    },

    #[error("record {record_id}: student {student_id} is not in the directory")]
    #[serde(rename_all = "camelCase")]
    UnknownStudent {
        record_id: String,
        student_id: String,
    },

    #[error("record {record_id}: stored {field} {raw:?} is not a valid date")]
    #[serde(rename_all = "camelCase")]
    BadStoredDate {
        record_id: String,
        field: &'static str,
        raw: String,
    },
}

impl IntegrityIssue {
    pub fn record_id(&self) -> &str {
        match self {
            Self::UnknownStatus { record_id, .. }
            | Self::ScoreOutOfRange { record_id, .. }
            | Self::KindMismatch { record_id, .. }
            | Self::UnknownStudent { record_id, .. }
            | Self::BadStoredDate { record_id, .. } => record_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pivot {
    pub rows: Vec<StudentPivotRow>,
    pub warnings: Vec<IntegrityIssue>,
}

fn check_record(
    kind: PivotKind,
    record: &EventRecord,
    students: &HashMap<String, Student>,
) -> Result<(), IntegrityIssue> {
    match (&record.value, kind) {
        (EventValue::Unrecognized(raw), _) => {
            return Err(IntegrityIssue::UnknownStatus {
                record_id: record.record_id.clone(),
                raw: raw.clone(),
            })
        }
        (EventValue::Grade(score), PivotKind::Grades) => {
            if !score.is_finite() || *score < SCORE_MIN || *score > SCORE_MAX {
                return Err(IntegrityIssue::ScoreOutOfRange {
                    record_id: record.record_id.clone(),
                    score: *score,
                });
            }
        }
        (EventValue::Attendance(_), PivotKind::Attendance) => {}
        (EventValue::Grade(_), PivotKind::Attendance) => {
            return Err(IntegrityIssue::KindMismatch {
                record_id: record.record_id.clone(),
                expected: kind,
                found: "grade",
            })
        }
        (EventValue::Attendance(_), PivotKind::Grades) => {
            return Err(IntegrityIssue::KindMismatch {
                record_id: record.record_id.clone(),
                expected: kind,
                found: "attendance",
            })
        }
    }
    if !students.contains_key(&record.student_id) {
        return Err(IntegrityIssue::UnknownStudent {
            record_id: record.record_id.clone(),
            student_id: record.student_id.clone(),
        });
    }
    Ok(())
}

// Corrections win: later event date, then later insertion. Record id only
// settles exact duplicates so the result never depends on input order.
fn supersedes(candidate: &EventRecord, current: &EventRecord) -> bool {
    (candidate.event_date, candidate.seq, &candidate.record_id)
        > (current.event_date, current.seq, &current.record_id)
}

fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn summarize<'a>(kind: PivotKind, retained: impl Iterator<Item = &'a EventRecord>) -> Summary {
    match kind {
        PivotKind::Attendance => {
            let mut counts = AttendanceSummary::default();
            for record in retained {
                if let EventValue::Attendance(status) = record.value {
                    counts.add(status);
                }
            }
            Summary::Attendance(counts)
        }
        PivotKind::Grades => {
            let mut sum = 0.0;
            let mut count = 0u32;
            for record in retained {
                if let EventValue::Grade(score) = record.value {
                    sum += score;
                    count += 1;
                }
            }
            let average = if count > 0 {
                round_2(sum / f64::from(count))
            } else {
                0.0
            };
            Summary::Grade(GradeSummary { average, count })
        }
    }
}

fn sort_rows(rows: &mut [StudentPivotRow]) {
    rows.sort_by(|a, b| {
        compare_names(&a.student.full_name, &b.student.full_name)
            .then_with(|| a.student.student_number.cmp(&b.student.student_number))
            .then_with(|| a.student.student_id.cmp(&b.student.student_id))
    });
}

/// Pivots already-filtered records into one row per student. Only students
/// with at least one valid record get a row; see [`union_roster`].
pub fn build_pivot(
    kind: PivotKind,
    records: &[EventRecord],
    students: &HashMap<String, Student>,
) -> Pivot {
    let mut warnings = Vec::new();
    let mut by_student: HashMap<&str, HashMap<&EventKey, &EventRecord>> = HashMap::new();

    for record in records {
        if let Err(issue) = check_record(kind, record, students) {
            tracing::warn!(record_id = %issue.record_id(), "integrity: {issue}");
            warnings.push(issue);
            continue;
        }
        let cells = by_student.entry(record.student_id.as_str()).or_default();
        match cells.entry(&record.event_key) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                if supersedes(record, slot.get()) {
                    slot.insert(record);
                }
            }
        }
    }

    let mut rows: Vec<StudentPivotRow> = by_student
        .into_iter()
        .filter_map(|(student_id, cells)| {
            let student = students.get(student_id)?.clone();
            let values: BTreeMap<EventKey, EventRecord> = cells
                .into_iter()
                .map(|(key, record)| (key.clone(), record.clone()))
                .collect();
            let summary = summarize(kind, values.values());
            Some(StudentPivotRow {
                student,
                values,
                summary,
            })
        })
        .collect();
    sort_rows(&mut rows);

    Pivot { rows, warnings }
}

/// Adds an empty row for every roster student the pivot has no record for.
pub fn union_roster(
    kind: PivotKind,
    mut rows: Vec<StudentPivotRow>,
    roster: &[Student],
) -> Vec<StudentPivotRow> {
    let present: HashSet<String> = rows.iter().map(|r| r.student.student_id.clone()).collect();
    for student in roster {
        if present.contains(&student.student_id) {
            continue;
        }
        rows.push(StudentPivotRow {
            student: student.clone(),
            values: BTreeMap::new(),
            summary: Summary::empty(kind),
        });
    }
    sort_rows(&mut rows);
    rows
}
