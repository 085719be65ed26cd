use crate::db::{DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::pivot::{FilterCriteria, Scope};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn write(code: &'static str, table: &str, e: impl std::fmt::Display) -> Self {
        Self::new(code, e.to_string()).with_details(json!({ "table": table }))
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Runs `f` against the open workspace and wraps the outcome in the response
/// envelope.
pub fn with_conn<F>(state: &AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn get_required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(&get_required_str(params, key)?, key)
}

pub fn get_optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    get_optional_str(params, key)
        .map(|s| parse_date(&s, key))
        .transpose()
}

/// `recordedAt` may be given explicitly (imports, corrections of old
/// entries); otherwise the entry is stamped with local time.
pub fn get_recorded_at(params: &Value) -> Result<String, HandlerErr> {
    let Some(raw) = get_optional_str(params, "recordedAt") else {
        return Ok(chrono::Local::now()
            .naive_local()
            .format(TIMESTAMP_FORMAT)
            .to_string());
    };
    let parsed = NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| HandlerErr::bad_params("recordedAt must be YYYY-MM-DD HH:MM:SS"))?;
    Ok(parsed.format(TIMESTAMP_FORMAT).to_string())
}

pub fn get_optional_note(params: &Value) -> Result<Option<String>, HandlerErr> {
    match params.get("note") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok((!t.is_empty()).then(|| t.to_string()))
        }
        Some(_) => Err(HandlerErr::bad_params("note must be string or null")),
    }
}

/// `sql` must select a single column for the given id.
pub fn row_exists(conn: &Connection, sql: &str, id: &str) -> Result<bool, HandlerErr> {
    conn.query_row(sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
        .map_err(HandlerErr::query)
}

pub fn require_row(conn: &Connection, sql: &str, id: &str, what: &str) -> Result<(), HandlerErr> {
    if row_exists(conn, sql, id)? {
        Ok(())
    } else {
        Err(HandlerErr::not_found(what))
    }
}

/// When the caller acts as a teacher (`ownerId`), the subject must be theirs.
pub fn require_subject_owner(
    conn: &Connection,
    subject_id: &str,
    owner_id: Option<&str>,
) -> Result<(), HandlerErr> {
    let Some(owner) = owner_id else {
        return Ok(());
    };
    let teacher: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM subjects WHERE id = ?",
            [subject_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    match teacher {
        None => Err(HandlerErr::not_found("subject")),
        Some(t) if t == owner => Ok(()),
        Some(_) => {
            tracing::warn!(subject_id, owner_id = owner, "write outside owner scope refused");
            Err(HandlerErr::new("forbidden", "subject is not taught by this teacher"))
        }
    }
}

/// Reads pivot filter params. `subjectId`/`classId` accept `"all"`.
pub fn parse_criteria(params: &Value) -> Result<FilterCriteria, HandlerErr> {
    let criteria = FilterCriteria {
        subject: Scope::parse(params.get("subjectId").and_then(|v| v.as_str())),
        class: Scope::parse(params.get("classId").and_then(|v| v.as_str())),
        owner_id: get_optional_str(params, "ownerId"),
        from: get_optional_date(params, "from")?,
        to: get_optional_date(params, "to")?,
    };
    if let (Some(from), Some(to)) = (criteria.from, criteria.to) {
        if from > to {
            return Err(HandlerErr::bad_params("from must not be after to"));
        }
    }
    Ok(criteria)
}
