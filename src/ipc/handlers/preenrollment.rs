use crate::ipc::helpers::{optional_str, page_action, params_as, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::pages::preenrollment::{InterviewDraft, PreenrollmentPage, StateChange};
use crate::pages::{Page, PageContext, PageKind};

fn on_page(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut PreenrollmentPage, &mut PageContext),
) -> serde_json::Value {
    page_action(state, req, PageKind::Preenrollment, |page, ctx| {
        if let Page::Preenrollment(p) = page {
            f(p, ctx)
        }
    })
}

fn handle_open_dialog(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_i64(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if req.method == "preenrollment.openSchedule" {
        on_page(state, req, |p, ctx| p.open_schedule(ctx, id))
    } else {
        on_page(state, req, |p, ctx| p.open_state_change(ctx, id))
    }
}

fn handle_confirm_schedule(state: &mut AppState, req: &Request) -> serde_json::Value {
    let draft: InterviewDraft = match params_as(req, "draft") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.confirm_schedule(ctx, draft))
}

fn handle_confirm_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let change: StateChange = match params_as(req, "change") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.confirm_state_change(ctx, change))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "preenrollment.search" => {
            let query = optional_str(req, "query").unwrap_or_default().to_string();
            on_page(state, req, |p, ctx| p.search(ctx, &query))
        }
        "preenrollment.openSchedule" | "preenrollment.openStateChange" => {
            handle_open_dialog(state, req)
        }
        "preenrollment.confirmSchedule" => handle_confirm_schedule(state, req),
        "preenrollment.confirmStateChange" => handle_confirm_state(state, req),
        _ => return None,
    };
    Some(resp)
}
