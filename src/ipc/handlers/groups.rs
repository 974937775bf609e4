use crate::ipc::helpers::{optional_str, page_action, params_as, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::pages::groups::{GroupDraft, GroupsPage};
use crate::pages::{Page, PageContext, PageKind};

fn on_page(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut GroupsPage, &mut PageContext),
) -> serde_json::Value {
    page_action(state, req, PageKind::Groups, |page, ctx| {
        if let Page::Groups(p) = page {
            f(p, ctx)
        }
    })
}

fn handle_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let query = optional_str(req, "query").unwrap_or_default().to_string();
    on_page(state, req, |p, ctx| p.search(ctx, &query))
}

fn handle_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_i64(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.select_group(ctx, id))
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let draft: GroupDraft = match params_as(req, "draft") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.save(ctx, draft))
}

fn handle_submit_citations(state: &mut AppState, req: &Request) -> serde_json::Value {
    let date = optional_str(req, "date").map(str::to_string);
    let codes: Vec<i64> = match params_as(req, "students") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.submit_citations(ctx, date.as_deref(), &codes))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "groups.search" => handle_search(state, req),
        "groups.select" => handle_select(state, req),
        "groups.openCreate" => on_page(state, req, |p, ctx| p.open_create(ctx)),
        "groups.openEdit" => on_page(state, req, |p, ctx| p.open_edit(ctx)),
        "groups.save" => handle_save(state, req),
        "groups.requestDelete" => on_page(state, req, |p, ctx| p.request_delete(ctx)),
        "groups.confirmDelete" => on_page(state, req, |p, ctx| p.confirm_delete(ctx)),
        "groups.rosterReport" => on_page(state, req, |p, ctx| p.roster_report(ctx)),
        "groups.openCitations" => {
            let now = chrono::Local::now().naive_local();
            on_page(state, req, |p, ctx| p.open_citations(ctx, now))
        }
        "groups.submitCitations" => handle_submit_citations(state, req),
        _ => return None,
    };
    Some(resp)
}
