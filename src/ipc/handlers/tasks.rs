use crate::db::DATE_FORMAT;
use crate::ipc::helpers::{
    get_optional_str, get_required_date, get_required_str, require_row, require_subject_owner,
    with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn tasks_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    let title = get_required_str(params, "title")?;
    let task_date = get_required_date(params, "taskDate")?;
    require_row(conn, "SELECT 1 FROM subjects WHERE id = ?", &subject_id, "subject")?;
    require_subject_owner(conn, &subject_id, get_optional_str(params, "ownerId").as_deref())?;

    let task_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tasks(id, subject_id, title, task_date) VALUES(?, ?, ?, ?)",
        (
            &task_id,
            &subject_id,
            &title,
            task_date.format(DATE_FORMAT).to_string(),
        ),
    )
    .map_err(|e| HandlerErr::write("db_insert_failed", "tasks", e))?;
    Ok(json!({ "taskId": task_id }))
}

fn tasks_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    require_row(conn, "SELECT 1 FROM subjects WHERE id = ?", &subject_id, "subject")?;

    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.title, t.task_date,
                    (SELECT COUNT(*) FROM grades g WHERE g.task_id = t.id) AS grade_count
             FROM tasks t
             WHERE t.subject_id = ?
             ORDER BY t.task_date, t.title",
        )
        .map_err(HandlerErr::query)?;
    let tasks = stmt
        .query_map([&subject_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "taskDate": r.get::<_, String>(2)?,
                "gradeCount": r.get::<_, i64>(3)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "tasks": tasks }))
}

fn tasks_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let task_id = get_required_str(params, "taskId")?;
    require_row(conn, "SELECT 1 FROM tasks WHERE id = ?", &task_id, "task")?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let removed = tx
        .execute("DELETE FROM grades WHERE task_id = ?", [&task_id])
        .map_err(|e| HandlerErr::write("db_delete_failed", "grades", e))?;
    tx.execute("DELETE FROM tasks WHERE id = ?", [&task_id])
        .map_err(|e| HandlerErr::write("db_delete_failed", "tasks", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true, "gradesRemoved": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tasks.create" => Some(with_conn(state, req, tasks_create)),
        "tasks.list" => Some(with_conn(state, req, tasks_list)),
        "tasks.delete" => Some(with_conn(state, req, tasks_delete)),
        _ => None,
    }
}
