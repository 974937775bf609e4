use crate::ipc::error::err;
use crate::ipc::helpers::{optional_category, page_action, params_as, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::pages::achievements::{AchievementDraft, AchievementsPage};
use crate::pages::{Page, PageContext, PageKind};

fn on_page(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut AchievementsPage, &mut PageContext),
) -> serde_json::Value {
    page_action(state, req, PageKind::Achievements, |page, ctx| {
        if let Page::Achievements(p) = page {
            f(p, ctx)
        }
    })
}

fn handle_select_category(state: &mut AppState, req: &Request) -> serde_json::Value {
    let category = match optional_category(req, "category") {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "bad_params", "missing category", None),
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.select_category(ctx, category))
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let draft: AchievementDraft = match params_as(req, "draft") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.save(ctx, draft))
}

fn handle_with_id(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_i64(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if req.method == "achievements.openEdit" {
        on_page(state, req, |p, ctx| p.open_edit(ctx, id))
    } else {
        on_page(state, req, |p, ctx| p.request_delete(ctx, id))
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "achievements.selectCategory" => handle_select_category(state, req),
        "achievements.openCreate" => on_page(state, req, |p, ctx| p.open_create(ctx)),
        "achievements.openEdit" | "achievements.requestDelete" => handle_with_id(state, req),
        "achievements.save" => handle_save(state, req),
        "achievements.confirmDelete" => on_page(state, req, |p, ctx| p.confirm_delete(ctx)),
        _ => return None,
    };
    Some(resp)
}
