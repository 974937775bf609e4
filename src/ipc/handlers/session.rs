use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, params_as, required_str};
use crate::ipc::types::{AppState, Request};
use crate::nav::{self, MenuLink};
use crate::session::{self, Role, Session};
use crate::ui::Notice;

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, state.session.to_json())
}

/// Updates the in-memory session and, with a workspace open, the store.
fn remember(state: &mut AppState, user_name: &str, role: &str) -> anyhow::Result<bool> {
    state.session = Session {
        user_name: Some(user_name.to_string()).filter(|v| !v.trim().is_empty()),
        role: Role::parse(role),
    };
    match state.db.as_ref() {
        Some(conn) => {
            Session::store(conn, user_name, role)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn handle_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user_name = match required_str(req, "userName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role = optional_str(req, "role").unwrap_or_default().to_string();
    match remember(state, &user_name, &role) {
        Ok(persisted) => ok(
            &req.id,
            json!({ "session": state.session.to_json(), "persisted": persisted }),
        ),
        Err(e) => err(&req.id, "db_write_failed", format!("{e:#}"), None),
    }
}

fn handle_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = Session::clear(conn) {
            return err(&req.id, "db_write_failed", format!("{e:#}"), None);
        }
    }
    tracing::info!(user = state.session.display_name(), "signed out");
    state.session = Session::default();
    state.page = None;
    state.modals.close_all();
    state.reports.close();
    ok(&req.id, json!({ "navigate": nav::LOGIN_PAGE }))
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user_name = match required_str(req, "username") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = optional_str(req, "password").unwrap_or_default();
    match session::login(&state.api, user_name.trim(), password) {
        Ok(granted) => match remember(state, &granted.user_name, &granted.role) {
            Ok(persisted) => {
                tracing::info!(user = %granted.user_name, role = %granted.role, "signed in");
                ok(
                    &req.id,
                    json!({
                        "session": state.session.to_json(),
                        "persisted": persisted,
                        "navigate": nav::LANDING_PAGE,
                    }),
                )
            }
            Err(e) => err(&req.id, "db_write_failed", format!("{e:#}"), None),
        },
        Err(message) => {
            tracing::info!(user = %user_name, "login refused");
            ok(
                &req.id,
                json!({ "notice": Notice::error(message), "navigate": null }),
            )
        }
    }
}

fn handle_menu(state: &mut AppState, req: &Request) -> serde_json::Value {
    let current_url = optional_str(req, "currentUrl").unwrap_or_default();
    let links: Option<Vec<MenuLink>> = match params_as(req, "entries") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let links = links.unwrap_or_else(nav::default_menu);
    let menu = nav::build_menu(state.session.role, current_url, &links);
    ok(
        &req.id,
        json!({
            "user": state.session.display_name(),
            "role": state.session.display_role(),
            "entries": menu.entries,
            "redirect": menu.redirect,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.get" => Some(handle_get(state, req)),
        "session.set" => Some(handle_set(state, req)),
        "session.clear" => Some(handle_clear(state, req)),
        "session.login" => Some(handle_login(state, req)),
        "nav.menu" => Some(handle_menu(state, req)),
        _ => None,
    }
}
