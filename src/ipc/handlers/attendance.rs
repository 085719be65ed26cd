use crate::ipc::handlers::views::pivot_result;
use crate::ipc::helpers::{
    get_optional_note, get_optional_str, get_recorded_at, get_required_str, require_row,
    require_subject_owner, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::pivot::{AttendanceStatus, PivotKind};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn parse_status(params: &serde_json::Value) -> Result<AttendanceStatus, HandlerErr> {
    let raw = get_required_str(params, "status")?;
    AttendanceStatus::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params(format!("unknown attendance status: {}", raw))
            .with_details(json!({ "allowed": ["Hadir", "Izin", "Sakit", "Alpha"] }))
    })
}

/// The student must sit in the class the journal's subject is taught to.
fn check_student_in_journal_class(
    conn: &Connection,
    journal_id: &str,
    student_id: &str,
) -> Result<String, HandlerErr> {
    let journal: Option<(String, String)> = conn
        .query_row(
            "SELECT sub.id, sub.class_id
             FROM journals j
             JOIN subjects sub ON sub.id = j.subject_id
             WHERE j.id = ?",
            [journal_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some((subject_id, class_id)) = journal else {
        return Err(HandlerErr::not_found("journal"));
    };
    let student_class: Option<String> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    match student_class {
        None => Err(HandlerErr::not_found("student")),
        Some(c) if c == class_id => Ok(subject_id),
        Some(_) => Err(HandlerErr::bad_params("student is not in the journal's class")),
    }
}

/// Appends an entry. Earlier entries for the same lesson stay in the table;
/// the pivot keeps the latest one.
fn attendance_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let journal_id = get_required_str(params, "journalId")?;
    let student_id = get_required_str(params, "studentId")?;
    let status = parse_status(params)?;
    let note = get_optional_note(params)?;
    let recorded_at = get_recorded_at(params)?;
    let subject_id = check_student_in_journal_class(conn, &journal_id, &student_id)?;
    require_subject_owner(conn, &subject_id, get_optional_str(params, "ownerId").as_deref())?;

    let record_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attendance(id, journal_id, student_id, status, note, recorded_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &record_id,
            &journal_id,
            &student_id,
            status.as_str(),
            &note,
            &recorded_at,
        ),
    )
    .map_err(|e| HandlerErr::write("db_insert_failed", "attendance", e))?;
    Ok(json!({ "recordId": record_id, "recordedAt": recorded_at }))
}

/// Corrects an entry in place and restamps it so it wins over any other
/// entry for the same lesson.
fn attendance_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    let subject_id: Option<String> = conn
        .query_row(
            "SELECT j.subject_id
             FROM attendance a
             JOIN journals j ON j.id = a.journal_id
             WHERE a.id = ?",
            [&record_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(subject_id) = subject_id else {
        return Err(HandlerErr::not_found("attendance record"));
    };
    require_subject_owner(conn, &subject_id, get_optional_str(params, "ownerId").as_deref())?;

    let status = match params.get("status") {
        None => None,
        Some(_) => Some(parse_status(params)?),
    };
    let recorded_at = get_recorded_at(params)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if let Some(status) = status {
        tx.execute(
            "UPDATE attendance SET status = ? WHERE id = ?",
            (status.as_str(), &record_id),
        )
        .map_err(|e| HandlerErr::write("db_update_failed", "attendance", e))?;
    }
    if params.get("note").is_some() {
        let note = get_optional_note(params)?;
        tx.execute(
            "UPDATE attendance SET note = ? WHERE id = ?",
            (&note, &record_id),
        )
        .map_err(|e| HandlerErr::write("db_update_failed", "attendance", e))?;
    }
    tx.execute(
        "UPDATE attendance SET recorded_at = ? WHERE id = ?",
        (&recorded_at, &record_id),
    )
    .map_err(|e| HandlerErr::write("db_update_failed", "attendance", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true, "recordedAt": recorded_at }))
}

fn attendance_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    require_row(
        conn,
        "SELECT 1 FROM attendance WHERE id = ?",
        &record_id,
        "attendance record",
    )?;
    conn.execute("DELETE FROM attendance WHERE id = ?", [&record_id])
        .map_err(|e| HandlerErr::write("db_delete_failed", "attendance", e))?;
    Ok(json!({ "ok": true }))
}

fn attendance_pivot(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    pivot_result(conn, PivotKind::Attendance, params)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(with_conn(state, req, attendance_record)),
        "attendance.update" => Some(with_conn(state, req, attendance_update)),
        "attendance.delete" => Some(with_conn(state, req, attendance_delete)),
        "attendance.pivot" => Some(with_conn(state, req, attendance_pivot)),
        _ => None,
    }
}
