use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, require_row, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Correlated subqueries so the counts are not multiplied by joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.homeroom_teacher_id,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM subjects sub WHERE sub.class_id = c.id) AS subject_count
         FROM classes c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let homeroom: Option<String> = row.get(2)?;
            let student_count: i64 = row.get(3)?;
            let subject_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "homeroomTeacherId": homeroom,
                "studentCount": student_count,
                "subjectCount": subject_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn check_homeroom_teacher(conn: &Connection, teacher_id: Option<&str>) -> Result<(), HandlerErr> {
    match teacher_id {
        Some(t) => require_row(conn, "SELECT 1 FROM teachers WHERE id = ?", t, "teacher"),
        None => Ok(()),
    }
}

fn classes_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let homeroom = get_optional_str(params, "homeroomTeacherId");
    check_homeroom_teacher(conn, homeroom.as_deref())?;

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, homeroom_teacher_id) VALUES(?, ?, ?)",
        (&class_id, &name, &homeroom),
    )
    .map_err(|e| HandlerErr::write("db_insert_failed", "classes", e))?;

    Ok(json!({ "classId": class_id, "name": name }))
}

fn classes_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    require_row(conn, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class")?;

    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                let name = v.as_str().map(str::trim).unwrap_or("");
                if name.is_empty() {
                    return Err(HandlerErr::bad_params("name must not be empty"));
                }
                conn.execute("UPDATE classes SET name = ? WHERE id = ?", (name, &class_id))
                    .map_err(|e| HandlerErr::write("db_update_failed", "classes", e))?;
            }
            "homeroomTeacherId" => {
                let teacher = match v {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim()),
                    _ => {
                        return Err(HandlerErr::bad_params(
                            "homeroomTeacherId must be string or null",
                        ))
                    }
                };
                check_homeroom_teacher(conn, teacher)?;
                conn.execute(
                    "UPDATE classes SET homeroom_teacher_id = ? WHERE id = ?",
                    (teacher, &class_id),
                )
                .map_err(|e| HandlerErr::write("db_update_failed", "classes", e))?;
            }
            other => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown class field: {}",
                    other
                )))
            }
        }
    }
    Ok(json!({ "ok": true }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Dependency order; there is no ON DELETE CASCADE.
    let steps: [(&str, &str); 7] = [
        (
            "grades",
            "DELETE FROM grades WHERE task_id IN (
               SELECT t.id FROM tasks t
               JOIN subjects sub ON sub.id = t.subject_id
               WHERE sub.class_id = ?
             )",
        ),
        (
            "tasks",
            "DELETE FROM tasks WHERE subject_id IN (SELECT id FROM subjects WHERE class_id = ?)",
        ),
        (
            "attendance",
            "DELETE FROM attendance WHERE journal_id IN (
               SELECT j.id FROM journals j
               JOIN subjects sub ON sub.id = j.subject_id
               WHERE sub.class_id = ?
             )",
        ),
        (
            "journals",
            "DELETE FROM journals WHERE subject_id IN (SELECT id FROM subjects WHERE class_id = ?)",
        ),
        ("subjects", "DELETE FROM subjects WHERE class_id = ?"),
        ("students", "DELETE FROM students WHERE class_id = ?"),
        ("classes", "DELETE FROM classes WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&class_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    tracing::info!(class_id = %class_id, "class deleted");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(with_conn(state, req, classes_create)),
        "classes.update" => Some(with_conn(state, req, classes_update)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
