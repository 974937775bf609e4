use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::Category;
use crate::pages::{Page, PageContext, PageKind};
use crate::ui::Notice;

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, Value> {
    optional_i64(req, key)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Numbers, or numeric strings as `<select>` values arrive.
pub fn optional_i64(req: &Request, key: &str) -> Option<i64> {
    match req.params.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn optional_category(req: &Request, key: &str) -> Result<Option<Category>, Value> {
    match optional_str(req, key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Category::parse(raw).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("unknown category: {}", raw),
                None,
            )
        }),
    }
}

/// Deserializes `params[key]`; absent means the type's default.
pub fn params_as<T: DeserializeOwned + Default>(req: &Request, key: &str) -> Result<T, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("invalid {}: {}", key, e),
                None,
            )
        }),
    }
}

/// What the shell renders after any page action.
pub fn page_result(state: &AppState, notice: Option<Notice>) -> Value {
    json!({
        "page": state.page.as_ref().map(|p| p.kind().as_str()),
        "view": state.page.as_ref().map(Page::view),
        "notice": notice,
        "modals": state.modals.visible(),
        "report": state.reports.current(),
    })
}

/// Runs an action on the open page when it is `kind`.
pub fn page_action(
    state: &mut AppState,
    req: &Request,
    kind: PageKind,
    f: impl FnOnce(&mut Page, &mut PageContext),
) -> Value {
    match state.page.as_ref().map(Page::kind) {
        Some(open) if open == kind => {}
        Some(open) => {
            return err(
                &req.id,
                "no_page",
                format!("{} is not open (current: {})", kind.as_str(), open.as_str()),
                None,
            )
        }
        None => return err(&req.id, "no_page", "no page is open", None),
    }
    let notice = state.with_page(f).and_then(|(_, n)| n);
    ok(&req.id, page_result(state, notice))
}
