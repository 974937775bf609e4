use crate::ipc::helpers::{optional_str, page_action, params_as, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::pages::observations::{ObservationDraft, ObservationsPage};
use crate::pages::{Page, PageContext, PageKind};

fn on_page(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut ObservationsPage, &mut PageContext),
) -> serde_json::Value {
    page_action(state, req, PageKind::Observations, |page, ctx| {
        if let Page::Observations(p) = page {
            f(p, ctx)
        }
    })
}

fn handle_with_id(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = if req.method == "observations.selectStudent" { "code" } else { "id" };
    let id = match required_i64(req, key) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match req.method.as_str() {
        "observations.selectStudent" => on_page(state, req, |p, ctx| p.select_student(ctx, id)),
        "observations.openEdit" => on_page(state, req, |p, ctx| p.open_edit(ctx, id)),
        _ => on_page(state, req, |p, ctx| p.request_delete(ctx, id)),
    }
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let draft: ObservationDraft = match params_as(req, "draft") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.save(ctx, draft))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "observations.search" => {
            let query = optional_str(req, "query").unwrap_or_default().to_string();
            on_page(state, req, |p, ctx| p.search(ctx, &query))
        }
        "observations.selectStudent" | "observations.openEdit" | "observations.requestDelete" => {
            handle_with_id(state, req)
        }
        "observations.openCreate" => on_page(state, req, |p, ctx| p.open_create(ctx)),
        "observations.save" => handle_save(state, req),
        "observations.confirmDelete" => on_page(state, req, |p, ctx| p.confirm_delete(ctx)),
        "observations.profile" => on_page(state, req, |p, ctx| p.show_profile(ctx)),
        _ => return None,
    };
    Some(resp)
}
