use serde_json::json;
use std::path::PathBuf;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::report::VIEWER_MODAL;

fn modal_result(state: &AppState, changed: bool) -> serde_json::Value {
    json!({ "changed": changed, "modals": state.modals.visible() })
}

fn handle_modal(state: &mut AppState, req: &Request) -> serde_json::Value {
    if req.method == "modal.list" {
        return ok(&req.id, modal_result(state, false));
    }
    let id = match required_str(req, "modalId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let changed = match req.method.as_str() {
        "modal.open" => {
            let before = state.modals.is_open(&id);
            state.modals.open(&id);
            !before
        }
        "modal.close" => state.modals.close(&id),
        _ => {
            let on_backdrop = req
                .params
                .get("onBackdrop")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            state.modals.backdrop_click(&id, on_backdrop)
        }
    };
    // The viewer owns a file; closing its modal releases it.
    if changed && id == VIEWER_MODAL && !state.modals.is_open(VIEWER_MODAL) {
        state.reports.close();
    }
    ok(&req.id, modal_result(state, changed))
}

fn handle_report_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "report": state.reports.current() }))
}

fn handle_report_download(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out = optional_str(req, "outPath").map(PathBuf::from);
    let default_dir = state.download_dir();
    match state.reports.download(out.as_deref(), &default_dir) {
        Ok(path) => ok(&req.id, json!({ "path": path.to_string_lossy() })),
        Err(e) => err(&req.id, "download_failed", format!("{e:#}"), None),
    }
}

fn handle_report_print(state: &mut AppState, req: &Request) -> serde_json::Value {
    let viewer_open = state.modals.is_open(VIEWER_MODAL);
    match state.reports.print(viewer_open) {
        Some(action) => ok(&req.id, json!(action)),
        None => err(&req.id, "no_report", "no hay documento abierto", None),
    }
}

fn handle_report_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.modals.close(VIEWER_MODAL);
    let released = state.reports.close();
    ok(
        &req.id,
        json!({ "released": released, "modals": state.modals.visible() }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "modal.open" | "modal.close" | "modal.backdropClick" | "modal.list" => {
            Some(handle_modal(state, req))
        }
        "reports.current" => Some(handle_report_current(state, req)),
        "reports.download" => Some(handle_report_download(state, req)),
        "reports.print" => Some(handle_report_print(state, req)),
        "reports.close" => Some(handle_report_close(state, req)),
        _ => None,
    }
}
