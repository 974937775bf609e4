use std::time::Instant;

use super::handlers;
use super::helpers::page_result;
use super::types::{AppState, Request};
use crate::ipc::error::{err, event};

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::session::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::ui::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::pages::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::groups::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::achievements::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::observations::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::preenrollment::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::admission::try_handle(state, &req) {
        return resp;
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

/// Runs the open page's debounced search when its timer has elapsed and
/// returns the `search.results` event to emit.
pub fn fire_due_search(state: &mut AppState, now: Instant) -> Option<serde_json::Value> {
    let (fired, notice) = state.with_page(|page, ctx| page.fire_due(ctx, now))?;
    if !fired {
        return None;
    }
    let kind = state.page.as_ref()?.kind();
    Some(event("search.results", kind.as_str(), page_result(state, notice)))
}

/// Earliest pending debounce deadline of the open page.
pub fn next_due(state: &AppState) -> Option<Instant> {
    state.page.as_ref().and_then(|p| p.next_due())
}
