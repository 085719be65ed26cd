use crate::pivot::{
    build_pivot, class_summary, filter_records, format_average, format_percentage,
    resolve_columns, tabulate, union_roster, ClassSummary, EventColumn, EventRecord,
    ExportTable, FilterCriteria, GradeBands, IntegrityIssue, PivotKind, Student,
    StudentPivotRow, Summary,
};
use crate::store;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

/// Everything a screen needs to draw one pivot table. Rebuilt from scratch on
/// every filter change, never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    pub kind: PivotKind,
    pub criteria: FilterCriteria,
    pub columns: Vec<EventColumn>,
    pub rows: Vec<StudentPivotRow>,
    pub class_summary: ClassSummary,
    pub warnings: Vec<IntegrityIssue>,
}

/// Filter, resolve columns, pivot, summarize. Pure over its inputs.
pub fn assemble(
    kind: PivotKind,
    criteria: &FilterCriteria,
    records: Vec<EventRecord>,
    students: &HashMap<String, Student>,
) -> ViewModel {
    let scoped = filter_records(records, criteria);
    let columns = resolve_columns(kind, &scoped);
    let pivot = build_pivot(kind, &scoped, students);
    let class_summary = class_summary(kind, &pivot.rows);
    ViewModel {
        kind,
        criteria: criteria.clone(),
        columns,
        rows: pivot.rows,
        class_summary,
        warnings: pivot.warnings,
    }
}

pub fn build_view(
    conn: &Connection,
    kind: PivotKind,
    criteria: &FilterCriteria,
) -> anyhow::Result<ViewModel> {
    let snapshot = store::fetch_records(conn, kind, criteria)?;
    let students = store::fetch_students_for(conn, &snapshot.records)?;
    let mut view = assemble(kind, criteria, snapshot.records, &students);
    if !snapshot.issues.is_empty() {
        let mut warnings = snapshot.issues;
        warnings.append(&mut view.warnings);
        view.warnings = warnings;
    }
    tracing::debug!(
        kind = ?kind,
        rows = view.rows.len(),
        columns = view.columns.len(),
        warnings = view.warnings.len(),
        "view rebuilt"
    );
    Ok(view)
}

impl ViewModel {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pads the pivot with empty rows for roster students without records and
    /// recomputes the class summary over the padded rows.
    pub fn with_roster(mut self, roster: &[Student]) -> Self {
        self.rows = union_roster(self.kind, self.rows, roster);
        self.class_summary = class_summary(self.kind, &self.rows);
        self
    }

    pub fn export(&self, bands: &GradeBands) -> ExportTable {
        tabulate(self.kind, &self.columns, &self.rows, bands)
    }

    /// Wire form: cells aligned with `columns`, plus the display strings the
    /// UI would otherwise have to derive ("-" vs "0%").
    pub fn to_json(&self, bands: &GradeBands) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let cells: Vec<serde_json::Value> = row
                    .cells(&self.columns)
                    .map(|cell| match cell {
                        Some(r) => json!({
                            "recordId": r.record_id,
                            "value": r.value,
                            "note": r.note,
                            "eventDate": r.event_date,
                        }),
                        None => serde_json::Value::Null,
                    })
                    .collect();
                let display = match &row.summary {
                    Summary::Attendance(s) => json!({ "percentage": format_percentage(s) }),
                    Summary::Grade(g) => json!({
                        "average": format_average(g),
                        "letter": bands.letter_for(g).map(String::from),
                    }),
                };
                json!({
                    "student": row.student,
                    "cells": cells,
                    "summary": row.summary,
                    "display": display,
                })
            })
            .collect();

        json!({
            "kind": self.kind,
            "criteria": self.criteria,
            "columns": self.columns,
            "rows": rows,
            "classSummary": self.class_summary,
            "warnings": self.warnings,
            "empty": self.is_empty(),
        })
    }
}
