use crate::config;
use crate::ipc::helpers::{get_optional_date, get_required_str, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::pivot::{
    format_average, format_percentage, FilterCriteria, GradeSummary, PivotKind, Scope, Summary,
};
use crate::store;
use crate::view;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

/// Class-teacher dashboard: attendance and grades of every student in the
/// class across all subjects, with students under the attendance threshold
/// flagged. Only the class's homeroom teacher may open it.
fn homeroom_overview(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let class_id = get_required_str(params, "classId")?;

    let class: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT name, homeroom_teacher_id FROM classes WHERE id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((class_name, homeroom)) = class else {
        return Err(HandlerErr::not_found("class"));
    };
    if homeroom.as_deref() != Some(teacher_id.as_str()) {
        tracing::warn!(class_id = %class_id, teacher_id = %teacher_id, "homeroom overview refused");
        return Err(HandlerErr::new(
            "forbidden",
            "only the homeroom teacher may open this class overview",
        ));
    }

    let criteria = FilterCriteria {
        subject: Scope::Any,
        class: Scope::Only(class_id.clone()),
        owner_id: None,
        from: get_optional_date(params, "from")?,
        to: get_optional_date(params, "to")?,
    };
    let roster = store::class_roster(conn, &class_id).map_err(HandlerErr::query)?;
    let attendance = view::build_view(conn, PivotKind::Attendance, &criteria)
        .map_err(HandlerErr::query)?
        .with_roster(&roster);
    let grades = view::build_view(conn, PivotKind::Grades, &criteria)
        .map_err(HandlerErr::query)?
        .with_roster(&roster);
    let threshold = config::warn_below_percent(conn).map_err(HandlerErr::query)?;
    let bands = config::grade_bands(conn).map_err(HandlerErr::query)?;

    let grade_by_student: HashMap<&str, GradeSummary> = grades
        .rows
        .iter()
        .filter_map(|row| match row.summary {
            Summary::Grade(g) => Some((row.student.student_id.as_str(), g)),
            _ => None,
        })
        .collect();

    let mut flagged = 0usize;
    let students: Vec<serde_json::Value> = attendance
        .rows
        .iter()
        .filter_map(|row| match row.summary {
            Summary::Attendance(a) => Some((row, a)),
            _ => None,
        })
        .map(|(row, a)| {
            let grade = grade_by_student
                .get(row.student.student_id.as_str())
                .copied()
                .unwrap_or_default();
            // Students with no lessons yet are not flagged.
            let below = a.total > 0 && a.percentage() < threshold;
            if below {
                flagged += 1;
            }
            json!({
                "student": row.student,
                "attendance": a,
                "percentage": format_percentage(&a),
                "grades": grade,
                "average": format_average(&grade),
                "letter": bands.letter_for(&grade).map(String::from),
                "belowThreshold": below
            })
        })
        .collect();

    Ok(json!({
        "class": { "id": class_id, "name": class_name },
        "warnBelowPercent": threshold,
        "students": students,
        "flaggedCount": flagged,
        "attendanceSummary": attendance.class_summary,
        "gradesSummary": grades.class_summary,
        "warnings": attendance.warnings.iter().chain(grades.warnings.iter()).collect::<Vec<_>>()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "homeroom.overview" => Some(with_conn(state, req, homeroom_overview)),
        _ => None,
    }
}
