mod builder;
mod collate;
mod columns;
mod export;
mod filter;
mod metrics;

pub use builder::{build_pivot, union_roster, IntegrityIssue, SCORE_MAX, SCORE_MIN};
pub use collate::compare_names;
pub use columns::resolve_columns;
pub use export::{tabulate, ExportTable};
pub use filter::{filter_records, FilterCriteria, Scope};
pub use metrics::{
    attendance_percentage, class_summary, format_average, format_percentage, ClassSummary,
    GradeBands,
};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PivotKind {
    Attendance,
    Grades,
}

impl PivotKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attendance" => Some(Self::Attendance),
            "grades" => Some(Self::Grades),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Hadir,
    Izin,
    Sakit,
    Alpha,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Hadir" => Some(Self::Hadir),
            "Izin" => Some(Self::Izin),
            "Sakit" => Some(Self::Sakit),
            "Alpha" => Some(Self::Alpha),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hadir => "Hadir",
            Self::Izin => "Izin",
            Self::Sakit => "Sakit",
            Self::Alpha => "Alpha",
        }
    }

    /// One-letter code used in export cells.
    pub fn code(self) -> &'static str {
        match self {
            Self::Hadir => "H",
            Self::Izin => "I",
            Self::Sakit => "S",
            Self::Alpha => "A",
        }
    }
}

/// Payload of one event record. `Unrecognized` keeps a stored status that is
/// outside the closed enum so it can be reported instead of miscounted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum EventValue {
    Attendance(AttendanceStatus),
    Grade(f64),
    Unrecognized(String),
}

/// Identifies one pivot column: the lesson (journal) or task the record
/// belongs to. `date` and `title` order and label the column; `event_id`
/// keeps distinct events apart when they share both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventKey {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub event_id: String,
}

impl EventKey {
    pub fn lesson(journal_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            date,
            title: None,
            event_id: journal_id.into(),
        }
    }

    pub fn task(task_id: impl Into<String>, date: NaiveDate, title: impl Into<String>) -> Self {
        Self {
            date,
            title: Some(title.into()),
            event_id: task_id.into(),
        }
    }
}

/// Ownership chain of a record: the subject it belongs to, that subject's
/// class, and the teacher who teaches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordScope {
    pub subject_id: String,
    pub class_id: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub record_id: String,
    pub seq: i64,
    pub student_id: String,
    pub scope: RecordScope,
    pub event_key: EventKey,
    pub event_date: NaiveDateTime,
    pub value: EventValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_id: String,
    pub full_name: String,
    pub student_number: String,
    pub class_id: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventColumn {
    pub event_key: EventKey,
    pub label: String,
    pub sort_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub present: u32,
    pub excused: u32,
    pub sick: u32,
    pub absent: u32,
    pub total: u32,
}

impl AttendanceSummary {
    pub fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Hadir => self.present += 1,
            AttendanceStatus::Izin => self.excused += 1,
            AttendanceStatus::Sakit => self.sick += 1,
            AttendanceStatus::Alpha => self.absent += 1,
        }
        self.total += 1;
    }

    pub fn percentage(&self) -> u32 {
        attendance_percentage(self.present, self.total)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub average: f64,
    pub count: u32,
}

impl GradeSummary {
    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Summary {
    Attendance(AttendanceSummary),
    Grade(GradeSummary),
}

impl Summary {
    pub fn empty(kind: PivotKind) -> Self {
        match kind {
            PivotKind::Attendance => Self::Attendance(AttendanceSummary::default()),
            PivotKind::Grades => Self::Grade(GradeSummary::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPivotRow {
    pub student: Student,
    #[serde(serialize_with = "serialize_cells")]
    pub values: BTreeMap<EventKey, EventRecord>,
    pub summary: Summary,
}

// JSON object keys must be strings, so cells go out as a list in column order.
fn serialize_cells<S>(
    values: &BTreeMap<EventKey, EventRecord>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(values.values())
}

impl StudentPivotRow {
    /// Cells in column order, `None` where the student has no record for that
    /// event.
    pub fn cells<'a>(
        &'a self,
        columns: &'a [EventColumn],
    ) -> impl Iterator<Item = Option<&'a EventRecord>> + 'a {
        columns.iter().map(move |c| self.values.get(&c.event_key))
    }
}
