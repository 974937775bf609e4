use std::time::Instant;

use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, page_result, required_str};
use crate::ipc::types::{AppState, Request};
use crate::pages::{Page, PageKind};
use crate::search::InputOutcome;

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match required_str(req, "page") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(kind) = PageKind::parse(&raw) else {
        return err(&req.id, "bad_params", format!("unknown page: {}", raw), None);
    };
    let notice = state.open_page(kind);
    ok(&req.id, page_result(state, notice))
}

fn handle_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, page_result(state, None))
}

fn handle_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.page = None;
    state.modals.close_all();
    ok(&req.id, page_result(state, None))
}

fn outcome_json(outcome: InputOutcome, now: Instant) -> serde_json::Value {
    match outcome {
        InputOutcome::Cleared => json!({ "state": "cleared" }),
        InputOutcome::TooShort => json!({ "state": "tooShort" }),
        InputOutcome::Scheduled { due } => json!({
            "state": "scheduled",
            "dueInMs": due.saturating_duration_since(now).as_millis() as u64,
        }),
    }
}

/// A keystroke in the open page's search box. Never sends a request itself.
fn handle_input(state: &mut AppState, req: &Request) -> serde_json::Value {
    let text = optional_str(req, "text").unwrap_or_default();
    let now = Instant::now();
    let Some(page) = state.page.as_mut() else {
        return err(&req.id, "no_page", "no page is open", None);
    };
    let outcome = match page {
        Page::Students(p) => Some(p.input(text, now)),
        Page::Groups(p) => Some(p.input(text, now)),
        Page::Grades(p) => Some(p.input(text, now)),
        Page::Observations(p) => Some(p.input(text, now)),
        Page::Preenrollment(p) => Some(p.input(text, now)),
        Page::Users(p) => Some(InputOutcome::Scheduled {
            due: p.input(text, now),
        }),
        Page::Achievements(_) => None,
    };
    let Some(outcome) = outcome else {
        return err(&req.id, "bad_params", "this page has no search box", None);
    };
    let mut result = page_result(state, None);
    result["input"] = outcome_json(outcome, now);
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "page.open" => Some(handle_open(state, req)),
        "page.view" => Some(handle_view(state, req)),
        "page.close" => Some(handle_close(state, req)),
        "page.input" => Some(handle_input(state, req)),
        _ => None,
    }
}
