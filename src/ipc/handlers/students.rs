use crate::ipc::helpers::{get_optional_str, get_required_str, require_row, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::pivot::compare_names;
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    require_row(conn, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class")?;
    let mut roster = store::class_roster(conn, &class_id).map_err(HandlerErr::query)?;
    // SQLite orders by byte value; class lists follow name collation.
    roster.sort_by(|a, b| compare_names(&a.full_name, &b.full_name));
    Ok(json!({ "students": roster }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let full_name = get_required_str(params, "fullName")?;
    let student_no = get_required_str(params, "studentNumber")?;
    let photo_url = get_optional_str(params, "photoUrl");
    require_row(conn, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class")?;

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, full_name, student_no, photo_url)
         VALUES(?, ?, ?, ?, ?)",
        (&student_id, &class_id, &full_name, &student_no, &photo_url),
    )
    .map_err(|e| HandlerErr::write("db_insert_failed", "students", e))?;
    Ok(json!({ "studentId": student_id }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    require_row(conn, "SELECT 1 FROM students WHERE id = ?", &student_id, "student")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for (k, v) in patch {
        let (column, value): (&str, Option<String>) = match k.as_str() {
            "fullName" | "studentNumber" => {
                let s = v.as_str().map(str::trim).unwrap_or("");
                if s.is_empty() {
                    return Err(HandlerErr::bad_params(format!("{} must not be empty", k)));
                }
                let column = if k == "fullName" { "full_name" } else { "student_no" };
                (column, Some(s.to_string()))
            }
            "photoUrl" => match v {
                serde_json::Value::Null => ("photo_url", None),
                serde_json::Value::String(s) => ("photo_url", Some(s.trim().to_string())),
                _ => return Err(HandlerErr::bad_params("photoUrl must be string or null")),
            },
            "classId" => {
                let s = v.as_str().map(str::trim).unwrap_or("");
                require_row(&tx, "SELECT 1 FROM classes WHERE id = ?", s, "class")?;
                ("class_id", Some(s.to_string()))
            }
            other => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown student field: {}",
                    other
                )))
            }
        };
        tx.execute(
            &format!("UPDATE students SET {} = ? WHERE id = ?", column),
            (&value, &student_id),
        )
        .map_err(|e| HandlerErr::write("db_update_failed", "students", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_row(conn, "SELECT 1 FROM students WHERE id = ?", &student_id, "student")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for table in ["attendance", "grades"] {
        tx.execute(
            &format!("DELETE FROM {} WHERE student_id = ?", table),
            [&student_id],
        )
        .map_err(|e| HandlerErr::write("db_delete_failed", table, e))?;
    }
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr::write("db_delete_failed", "students", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.update" => Some(with_conn(state, req, students_update)),
        "students.delete" => Some(with_conn(state, req, students_delete)),
        _ => None,
    }
}
