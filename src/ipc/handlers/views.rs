use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, parse_criteria, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::pivot::PivotKind;
use crate::session::{Completion, ViewSession};
use crate::store;
use crate::view::{self, ViewModel};
use rusqlite::Connection;
use serde_json::json;

fn view_json(conn: &Connection, view: &ViewModel) -> Result<serde_json::Value, HandlerErr> {
    let bands = config::grade_bands(conn).map_err(HandlerErr::query)?;
    Ok(view.to_json(&bands))
}

/// One-shot pivot for `attendance.pivot` / `grades.pivot`. With
/// `includeRoster` and a single class, students without records get empty
/// rows.
pub fn pivot_result(
    conn: &Connection,
    kind: PivotKind,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let criteria = parse_criteria(params)?;
    let mut view = view::build_view(conn, kind, &criteria).map_err(HandlerErr::query)?;
    let include_roster = params
        .get("includeRoster")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if include_roster {
        if let Some(class_id) = criteria.class.as_id() {
            let roster = store::class_roster(conn, class_id).map_err(HandlerErr::query)?;
            view = view.with_roster(&roster);
        }
    }
    view_json(conn, &view)
}

fn parse_kind(params: &serde_json::Value) -> Result<PivotKind, HandlerErr> {
    let raw = get_required_str(params, "kind")?;
    PivotKind::parse(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown view kind: {}", raw)))
}

fn parse_seq(params: &serde_json::Value) -> Result<Option<u64>, HandlerErr> {
    match params.get("seq") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params("seq must be a non-negative integer")),
    }
}

fn current_json(
    conn: &Connection,
    session: &ViewSession<ViewModel>,
) -> Result<serde_json::Value, HandlerErr> {
    session
        .current()
        .map(|v| view_json(conn, v))
        .transpose()
        .map(|v| v.unwrap_or(serde_json::Value::Null))
}

/// Rebuilds a view from scratch. Only the most recently issued `seq` for a
/// `viewId` may replace what the view shows.
fn handle_views_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let params = &req.params;
    let parsed = get_required_str(params, "viewId").and_then(|view_id| {
        let kind = parse_kind(params)?;
        let seq = parse_seq(params)?;
        let criteria_params = params.get("criteria").cloned().unwrap_or_else(|| json!({}));
        let criteria = parse_criteria(&criteria_params)?;
        Ok((view_id, kind, seq, criteria))
    });
    let (view_id, kind, seq, criteria) = match parsed {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let session = state.views.entry(view_id.clone()).or_default();
    let ticket = session.begin(seq);
    // Stale tickets are not worth a query.
    let result = if session.is_latest(ticket) {
        view::build_view(conn, kind, &criteria)
    } else {
        Err(anyhow::anyhow!("superseded"))
    };
    let completion = session.complete(ticket, result);

    let current = match current_json(conn, session) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match completion {
        Completion::Applied => ok(
            &req.id,
            json!({ "status": "applied", "seq": ticket.seq(), "view": current }),
        ),
        Completion::Stale { latest } => ok(
            &req.id,
            json!({
                "status": "stale",
                "seq": ticket.seq(),
                "latestSeq": latest,
                "view": current
            }),
        ),
        Completion::Failed { message } => {
            tracing::warn!(view_id = %view_id, seq = ticket.seq(), "view refresh failed: {message}");
            err(
                &req.id,
                "fetch_failed",
                message,
                Some(json!({
                    "seq": ticket.seq(),
                    "appliedSeq": session.applied_seq(),
                    "view": current
                })),
            )
        }
    }
}

fn handle_views_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let view_id = match get_required_str(&req.params, "viewId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(session) = state.views.get(&view_id) else {
        return err(&req.id, "not_found", "view not found", None);
    };
    match current_json(conn, session) {
        Ok(view) => ok(
            &req.id,
            json!({
                "appliedSeq": session.applied_seq(),
                "issuedSeq": session.issued_seq(),
                "lastError": session.last_error(),
                "view": view
            }),
        ),
        Err(e) => e.response(&req.id),
    }
}

fn handle_views_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let view_id = match get_required_str(&req.params, "viewId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(view) = state.views.get(&view_id).and_then(|s| s.current()) else {
        return err(&req.id, "not_found", "view has no applied result", None);
    };
    let bands = match config::grade_bands(conn) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let table = view.export(&bands);
    ok(
        &req.id,
        json!({ "kind": view.kind, "header": table.header, "rows": table.rows }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "views.refresh" => Some(handle_views_refresh(state, req)),
        "views.current" => Some(handle_views_current(state, req)),
        "views.export" => Some(handle_views_export(state, req)),
        _ => None,
    }
}
