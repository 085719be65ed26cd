use super::metrics::NO_DATA;
use super::{
    format_average, format_percentage, EventColumn, EventRecord, EventValue, GradeBands,
    PivotKind, StudentPivotRow, Summary,
};
use serde::Serialize;

/// Row-major table in the layout spreadsheet/PDF exporters expect:
/// `No`, `Name`, one column per event, then summary columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn summary_headers(kind: PivotKind) -> &'static [&'static str] {
    match kind {
        PivotKind::Attendance => &["H", "I", "S", "A", "Total", "%"],
        PivotKind::Grades => &["Average", "Letter"],
    }
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.0}")
    } else {
        format!("{score}")
    }
}

fn cell_text(record: Option<&EventRecord>) -> String {
    match record.map(|r| &r.value) {
        Some(EventValue::Attendance(status)) => status.code().to_string(),
        Some(EventValue::Grade(score)) => format_score(*score),
        Some(EventValue::Unrecognized(_)) | None => NO_DATA.to_string(),
    }
}

fn summary_cells(summary: &Summary, bands: &GradeBands) -> Vec<String> {
    match summary {
        Summary::Attendance(s) => vec![
            s.present.to_string(),
            s.excused.to_string(),
            s.sick.to_string(),
            s.absent.to_string(),
            s.total.to_string(),
            format_percentage(s),
        ],
        Summary::Grade(g) => vec![
            format_average(g),
            bands
                .letter_for(g)
                .map(String::from)
                .unwrap_or_else(|| NO_DATA.to_string()),
        ],
    }
}

pub fn tabulate(
    kind: PivotKind,
    columns: &[EventColumn],
    rows: &[StudentPivotRow],
    bands: &GradeBands,
) -> ExportTable {
    let mut header = vec!["No".to_string(), "Name".to_string()];
    header.extend(columns.iter().map(|c| c.label.clone()));
    header.extend(summary_headers(kind).iter().map(|h| h.to_string()));

    let rows = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut line = vec![(i + 1).to_string(), row.student.full_name.clone()];
            line.extend(row.cells(columns).map(cell_text));
            line.extend(summary_cells(&row.summary, bands));
            line
        })
        .collect();

    ExportTable { header, rows }
}
