use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

/// Handler families in dispatch order; each claims the methods it knows.
const FAMILIES: &[TryHandle] = &[
    handlers::core::try_handle,
    handlers::classes::try_handle,
    handlers::teachers::try_handle,
    handlers::subjects::try_handle,
    handlers::students::try_handle,
    handlers::journals::try_handle,
    handlers::attendance::try_handle,
    handlers::tasks::try_handle,
    handlers::grades::try_handle,
    handlers::homeroom::try_handle,
    handlers::views::try_handle,
    handlers::setup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for try_handle in FAMILIES {
        if let Some(resp) = try_handle(state, &req) {
            return resp;
        }
    }

    tracing::debug!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
