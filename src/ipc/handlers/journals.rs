use crate::db::DATE_FORMAT;
use crate::ipc::helpers::{
    get_optional_date, get_optional_str, get_required_date, get_required_str, require_row,
    require_subject_owner, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use uuid::Uuid;

fn journals_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    let lesson_date = get_required_date(params, "lessonDate")?;
    let topic = get_required_str(params, "topic")?;
    let notes = get_optional_str(params, "notes");
    require_row(conn, "SELECT 1 FROM subjects WHERE id = ?", &subject_id, "subject")?;
    require_subject_owner(conn, &subject_id, get_optional_str(params, "ownerId").as_deref())?;

    let journal_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO journals(id, subject_id, lesson_date, topic, notes) VALUES(?, ?, ?, ?, ?)",
        (
            &journal_id,
            &subject_id,
            lesson_date.format(DATE_FORMAT).to_string(),
            &topic,
            &notes,
        ),
    )
    .map_err(|e| HandlerErr::write("db_insert_failed", "journals", e))?;
    Ok(json!({ "journalId": journal_id }))
}

/// Teaching journal list for a subject (or for all subjects of an owner),
/// newest lesson first, with how many attendance entries each has.
fn journals_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_optional_str(params, "subjectId").filter(|s| s != "all");
    let owner_id = get_optional_str(params, "ownerId");
    if subject_id.is_none() && owner_id.is_none() {
        return Err(HandlerErr::bad_params("subjectId or ownerId is required"));
    }
    let from = get_optional_date(params, "from")?;
    let to = get_optional_date(params, "to")?;

    let mut sql = String::from(
        "SELECT j.id, j.subject_id, sub.name, j.lesson_date, j.topic, j.notes,
                (SELECT COUNT(*) FROM attendance a WHERE a.journal_id = j.id) AS entry_count
         FROM journals j
         JOIN subjects sub ON sub.id = j.subject_id
         WHERE 1 = 1",
    );
    let mut args: Vec<Value> = Vec::new();
    if let Some(s) = subject_id {
        sql.push_str(" AND j.subject_id = ?");
        args.push(Value::Text(s));
    }
    if let Some(o) = owner_id {
        sql.push_str(" AND sub.teacher_id = ?");
        args.push(Value::Text(o));
    }
    if let Some(d) = from {
        sql.push_str(" AND j.lesson_date >= ?");
        args.push(Value::Text(d.format(DATE_FORMAT).to_string()));
    }
    if let Some(d) = to {
        sql.push_str(" AND j.lesson_date <= ?");
        args.push(Value::Text(d.format(DATE_FORMAT).to_string()));
    }
    sql.push_str(" ORDER BY j.lesson_date DESC, j.rowid DESC");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let journals = stmt
        .query_map(params_from_iter(args), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "subjectId": r.get::<_, String>(1)?,
                "subjectName": r.get::<_, String>(2)?,
                "lessonDate": r.get::<_, String>(3)?,
                "topic": r.get::<_, String>(4)?,
                "notes": r.get::<_, Option<String>>(5)?,
                "attendanceCount": r.get::<_, i64>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "journals": journals }))
}

fn journals_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let journal_id = get_required_str(params, "journalId")?;
    require_row(conn, "SELECT 1 FROM journals WHERE id = ?", &journal_id, "journal")?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let removed = tx
        .execute("DELETE FROM attendance WHERE journal_id = ?", [&journal_id])
        .map_err(|e| HandlerErr::write("db_delete_failed", "attendance", e))?;
    tx.execute("DELETE FROM journals WHERE id = ?", [&journal_id])
        .map_err(|e| HandlerErr::write("db_delete_failed", "journals", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true, "attendanceRemoved": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "journals.create" => Some(with_conn(state, req, journals_create)),
        "journals.list" => Some(with_conn(state, req, journals_list)),
        "journals.delete" => Some(with_conn(state, req, journals_delete)),
        _ => None,
    }
}
