use crate::ipc::helpers::{get_optional_str, get_required_str, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn teachers_list(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT
               t.id,
               t.full_name,
               t.employee_no,
               (SELECT COUNT(*) FROM subjects sub WHERE sub.teacher_id = t.id) AS subject_count
             FROM teachers t
             ORDER BY t.full_name",
        )
        .map_err(HandlerErr::query)?;
    let teachers = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "fullName": r.get::<_, String>(1)?,
                "employeeNo": r.get::<_, Option<String>>(2)?,
                "subjectCount": r.get::<_, i64>(3)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "teachers": teachers }))
}

fn teachers_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let full_name = get_required_str(params, "fullName")?;
    let employee_no = get_optional_str(params, "employeeNo");
    let teacher_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, full_name, employee_no) VALUES(?, ?, ?)",
        (&teacher_id, &full_name, &employee_no),
    )
    .map_err(|e| HandlerErr::write("db_insert_failed", "teachers", e))?;
    Ok(json!({ "teacherId": teacher_id, "fullName": full_name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(with_conn(state, req, teachers_list)),
        "teachers.create" => Some(with_conn(state, req, teachers_create)),
        _ => None,
    }
}
