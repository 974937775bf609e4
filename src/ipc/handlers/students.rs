use crate::ipc::helpers::{optional_i64, page_action, params_as, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::pages::students::{StudentDraft, StudentFilters, StudentsPage};
use crate::pages::{Page, PageContext, PageKind};

fn on_page(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut StudentsPage, &mut PageContext),
) -> serde_json::Value {
    page_action(state, req, PageKind::Students, |page, ctx| {
        if let Page::Students(p) = page {
            f(p, ctx)
        }
    })
}

fn handle_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let filters: StudentFilters = match params_as(req, "filters") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.search(ctx, filters))
}

fn handle_save_edit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let draft: StudentDraft = match params_as(req, "draft") {
        Ok(v) => v,
        Err(e) => return e,
    };
    on_page(state, req, |p, ctx| p.confirm_edit(ctx, draft))
}

fn handle_with_id(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_i64(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match req.method.as_str() {
        "students.requestStateChange" => on_page(state, req, |p, ctx| p.request_state_change(ctx, id)),
        "students.openAssign" => on_page(state, req, |p, ctx| p.open_assign(ctx, id)),
        "students.openEdit" => on_page(state, req, |p, ctx| p.open_edit(ctx, id)),
        _ => on_page(state, req, |p, ctx| p.request_unlink(ctx, id)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "students.search" => handle_search(state, req),
        "students.reload" => on_page(state, req, |p, ctx| p.load_all(ctx)),
        "students.clearFilters" => on_page(state, req, |p, ctx| p.clear_filters(ctx)),
        "students.toggleGroupMode" => on_page(state, req, |p, _| {
            p.toggle_group_mode();
        }),
        "students.requestStateChange"
        | "students.openAssign"
        | "students.openEdit"
        | "students.requestUnlink" => handle_with_id(state, req),
        "students.confirmStateChange" => on_page(state, req, |p, ctx| p.confirm_state_change(ctx)),
        "students.cancelStateChange" => on_page(state, req, |p, ctx| p.cancel_state_change(ctx)),
        "students.selectAssignGrade" => {
            let grade = optional_i64(req, "gradeId");
            on_page(state, req, |p, ctx| p.select_assign_grade(ctx, grade))
        }
        "students.confirmAssign" => {
            let group = optional_i64(req, "groupId");
            on_page(state, req, |p, ctx| p.confirm_assign(ctx, group))
        }
        "students.saveEdit" => handle_save_edit(state, req),
        "students.confirmUnlink" => on_page(state, req, |p, ctx| p.confirm_unlink(ctx)),
        _ => return None,
    };
    Some(resp)
}
