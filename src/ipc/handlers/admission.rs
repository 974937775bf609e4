use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::params_as;
use crate::ipc::types::{AppState, Request};
use crate::pages::admission::{self, AdmissionError, AdmissionForm};
use crate::ui::Notice;

/// Public form: no session or page needed.
fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let form: AdmissionForm = match params_as(req, "form") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = chrono::Local::now().naive_local();
    match admission::submit(&state.api, &form, now) {
        Ok(receipt) => ok(
            &req.id,
            json!({ "notice": Notice::success(admission::SUCCESS), "receipt": receipt }),
        ),
        Err(e @ AdmissionError::MissingBirthDate) => {
            ok(&req.id, json!({ "notice": Notice::warning(e.to_string()) }))
        }
        Err(e) => err(
            &req.id,
            "admission_failed",
            format!("Error al registrar la solicitud: {e}"),
            Some(json!({ "created": e.created() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admission.submit" => Some(handle_submit(state, req)),
        _ => None,
    }
}
