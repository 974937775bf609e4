use crate::ipc::helpers::{optional_str, page_action, params_as, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::pages::users::{UserDraft, UsersPage};
use crate::pages::{Page, PageContext, PageKind};

fn on_page(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut UsersPage, &mut PageContext),
) -> serde_json::Value {
    page_action(state, req, PageKind::Users, |page, ctx| {
        if let Page::Users(p) = page {
            f(p, ctx)
        }
    })
}

fn handle_draft(state: &mut AppState, req: &Request) -> serde_json::Value {
    let draft: UserDraft = match params_as(req, "draft") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if req.method == "users.create" {
        on_page(state, req, |p, ctx| p.create(ctx, draft))
    } else {
        on_page(state, req, |p, ctx| p.confirm_edit(ctx, draft))
    }
}

fn handle_with_id(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_i64(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match req.method.as_str() {
        "users.openEdit" => on_page(state, req, |p, ctx| p.open_edit(ctx, id)),
        "users.toggleActive" => on_page(state, req, |p, ctx| p.toggle_active(ctx, id)),
        _ => on_page(state, req, |p, ctx| p.open_password(ctx, id)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "users.openCreate" => on_page(state, req, |p, ctx| p.open_create(ctx)),
        "users.chooseRole" => {
            let role = optional_str(req, "role").map(str::to_string);
            on_page(state, req, |p, _| p.choose_role(role))
        }
        "users.create" | "users.saveEdit" => handle_draft(state, req),
        "users.openEdit" | "users.toggleActive" | "users.openPassword" => handle_with_id(state, req),
        "users.changePassword" => {
            let password = optional_str(req, "password").map(str::to_string);
            on_page(state, req, |p, ctx| p.confirm_password(ctx, password.as_deref()))
        }
        _ => return None,
    };
    Some(resp)
}
