use crate::ipc::helpers::{get_optional_str, get_required_str, require_row, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use uuid::Uuid;

fn subjects_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let class_id = get_required_str(params, "classId")?;
    let teacher_id = get_required_str(params, "teacherId")?;
    require_row(conn, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class")?;
    require_row(conn, "SELECT 1 FROM teachers WHERE id = ?", &teacher_id, "teacher")?;

    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name, class_id, teacher_id) VALUES(?, ?, ?, ?)",
        (&subject_id, &name, &class_id, &teacher_id),
    )
    .map_err(|e| HandlerErr::write("db_insert_failed", "subjects", e))?;
    Ok(json!({ "subjectId": subject_id, "name": name }))
}

/// Lists subjects, optionally narrowed to one class and/or one teacher. A
/// teacher's picker passes `teacherId` so only their own subjects appear.
fn subjects_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut sql = String::from(
        "SELECT sub.id, sub.name, sub.class_id, c.name, sub.teacher_id, t.full_name
         FROM subjects sub
         JOIN classes c ON c.id = sub.class_id
         JOIN teachers t ON t.id = sub.teacher_id
         WHERE 1 = 1",
    );
    let mut args: Vec<Value> = Vec::new();
    if let Some(class_id) = get_optional_str(params, "classId").filter(|s| s != "all") {
        sql.push_str(" AND sub.class_id = ?");
        args.push(Value::Text(class_id));
    }
    if let Some(teacher_id) = get_optional_str(params, "teacherId") {
        sql.push_str(" AND sub.teacher_id = ?");
        args.push(Value::Text(teacher_id));
    }
    sql.push_str(" ORDER BY c.name, sub.name");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let subjects = stmt
        .query_map(params_from_iter(args), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "classId": r.get::<_, String>(2)?,
                "className": r.get::<_, String>(3)?,
                "teacherId": r.get::<_, String>(4)?,
                "teacherName": r.get::<_, String>(5)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "subjects": subjects }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.create" => Some(with_conn(state, req, subjects_create)),
        "subjects.list" => Some(with_conn(state, req, subjects_list)),
        _ => None,
    }
}
