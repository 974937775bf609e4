use crate::ipc::helpers::{optional_category, optional_i64, optional_str, page_action, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::pages::grades::GradesPage;
use crate::pages::{Page, PageContext, PageKind};

fn on_page(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&mut GradesPage, &mut PageContext),
) -> serde_json::Value {
    page_action(state, req, PageKind::Grades, |page, ctx| {
        if let Page::Grades(p) = page {
            f(p, ctx)
        }
    })
}

fn handle_category(state: &mut AppState, req: &Request) -> serde_json::Value {
    let category = match optional_category(req, "category") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if req.method == "grades.assignCategory" {
        on_page(state, req, |p, ctx| p.assign_category(ctx, category))
    } else {
        on_page(state, req, |p, ctx| p.modify_category(ctx, category))
    }
}

fn handle_with_id(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = if req.method == "grades.selectStudent" { "code" } else { "id" };
    let id = match required_i64(req, key) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match req.method.as_str() {
        "grades.selectStudent" => on_page(state, req, |p, ctx| p.select_student(ctx, id)),
        "grades.openModify" => on_page(state, req, |p, ctx| p.open_modify(ctx, id)),
        _ => on_page(state, req, |p, ctx| p.request_delete(ctx, id)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "grades.search" => {
            let query = optional_str(req, "query").unwrap_or_default().to_string();
            on_page(state, req, |p, ctx| p.search(ctx, &query))
        }
        "grades.selectStudent" | "grades.openModify" | "grades.requestDelete" => {
            handle_with_id(state, req)
        }
        "grades.filterPeriod" => {
            let period = optional_i64(req, "periodId");
            on_page(state, req, |p, _| p.filter_period(period))
        }
        "grades.openAssign" => on_page(state, req, |p, ctx| p.open_assign(ctx)),
        "grades.assignCategory" | "grades.modifyCategory" => handle_category(state, req),
        "grades.confirmAssign" => {
            let period = optional_i64(req, "periodId");
            let achievement = optional_i64(req, "achievementId");
            on_page(state, req, |p, ctx| p.confirm_assign(ctx, period, achievement))
        }
        "grades.confirmModify" => {
            let achievement = optional_i64(req, "achievementId");
            on_page(state, req, |p, ctx| p.confirm_modify(ctx, achievement))
        }
        "grades.confirmDelete" => on_page(state, req, |p, ctx| p.confirm_delete(ctx)),
        "grades.history" => on_page(state, req, |p, ctx| p.history(ctx)),
        "grades.openReportCard" => on_page(state, req, |p, ctx| p.open_report_card(ctx)),
        "grades.confirmReportCard" => {
            let period = optional_i64(req, "periodId");
            on_page(state, req, |p, ctx| p.confirm_report_card(ctx, period))
        }
        _ => return None,
    };
    Some(resp)
}
