use crate::ipc::handlers::views::pivot_result;
use crate::ipc::helpers::{
    get_optional_note, get_optional_str, get_recorded_at, get_required_str, require_row,
    require_subject_owner, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::pivot::{PivotKind, SCORE_MAX, SCORE_MIN};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn parse_score(params: &serde_json::Value) -> Result<f64, HandlerErr> {
    let score = params
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params("score must be a number"))?;
    if !score.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(&score) {
        return Err(HandlerErr::bad_params(format!(
            "score must be in {}..={}",
            SCORE_MIN, SCORE_MAX
        )));
    }
    Ok(score)
}

fn task_subject(conn: &Connection, task_id: &str) -> Result<(String, String), HandlerErr> {
    conn.query_row(
        "SELECT sub.id, sub.class_id
         FROM tasks t
         JOIN subjects sub ON sub.id = t.subject_id
         WHERE t.id = ?",
        [task_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()
    .map_err(HandlerErr::query)?
    .ok_or_else(|| HandlerErr::not_found("task"))
}

fn grades_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let task_id = get_required_str(params, "taskId")?;
    let student_id = get_required_str(params, "studentId")?;
    let score = parse_score(params)?;
    let note = get_optional_note(params)?;
    let recorded_at = get_recorded_at(params)?;

    let (subject_id, class_id) = task_subject(conn, &task_id)?;
    require_subject_owner(conn, &subject_id, get_optional_str(params, "ownerId").as_deref())?;
    let student_class: Option<String> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    match student_class {
        None => return Err(HandlerErr::not_found("student")),
        Some(c) if c != class_id => {
            return Err(HandlerErr::bad_params("student is not in the task's class"))
        }
        Some(_) => {}
    }

    let grade_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, task_id, student_id, score, note, recorded_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&grade_id, &task_id, &student_id, score, &note, &recorded_at),
    )
    .map_err(|e| HandlerErr::write("db_insert_failed", "grades", e))?;
    Ok(json!({ "recordId": grade_id, "recordedAt": recorded_at }))
}

/// Regrade: new score (and optionally note), restamped so it is the latest.
fn grades_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    let task_id: Option<String> = conn
        .query_row(
            "SELECT task_id FROM grades WHERE id = ?",
            [&record_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(task_id) = task_id else {
        return Err(HandlerErr::not_found("grade"));
    };
    let (subject_id, _) = task_subject(conn, &task_id)?;
    require_subject_owner(conn, &subject_id, get_optional_str(params, "ownerId").as_deref())?;

    let score = parse_score(params)?;
    let recorded_at = get_recorded_at(params)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE grades SET score = ?, recorded_at = ? WHERE id = ?",
        (score, &recorded_at, &record_id),
    )
    .map_err(|e| HandlerErr::write("db_update_failed", "grades", e))?;
    if params.get("note").is_some() {
        let note = get_optional_note(params)?;
        tx.execute("UPDATE grades SET note = ? WHERE id = ?", (&note, &record_id))
            .map_err(|e| HandlerErr::write("db_update_failed", "grades", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true, "recordedAt": recorded_at }))
}

fn grades_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let record_id = get_required_str(params, "recordId")?;
    require_row(conn, "SELECT 1 FROM grades WHERE id = ?", &record_id, "grade")?;
    conn.execute("DELETE FROM grades WHERE id = ?", [&record_id])
        .map_err(|e| HandlerErr::write("db_delete_failed", "grades", e))?;
    Ok(json!({ "ok": true }))
}

fn grades_pivot(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    pivot_result(conn, PivotKind::Grades, params)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.record" => Some(with_conn(state, req, grades_record)),
        "grades.update" => Some(with_conn(state, req, grades_update)),
        "grades.delete" => Some(with_conn(state, req, grades_delete)),
        "grades.pivot" => Some(with_conn(state, req, grades_pivot)),
        _ => None,
    }
}
