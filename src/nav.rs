use serde::{Deserialize, Serialize};

use crate::session::Role;

pub const LANDING_PAGE: &str = "panelGestion.html";
pub const LOGIN_PAGE: &str = "inicioSesion.html";

pub const STUDENTS_PAGE: &str = "gestionarEstudiantes.html";
pub const GROUPS_PAGE: &str = "gestionarGrupos.html";
pub const ACHIEVEMENTS_PAGE: &str = "gestionarLogros.html";
pub const GRADES_PAGE: &str = "gestionarCalificaciones.html";
pub const USERS_PAGE: &str = "gestionarUsuarios.html";
pub const PREENROLLMENT_PAGE: &str = "gestionarPreinscripciones.html";

/// Pages each role may see in the menu. Cosmetic only: the backend decides access.
pub fn allowed_pages(role: Role) -> &'static [&'static str] {
    match role {
        Role::Administrator => &[
            STUDENTS_PAGE,
            GROUPS_PAGE,
            ACHIEVEMENTS_PAGE,
            USERS_PAGE,
            PREENROLLMENT_PAGE,
        ],
        Role::Teacher => &[GROUPS_PAGE, GRADES_PAGE],
        Role::Guardian => &[GRADES_PAGE],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuLink {
    pub label: String,
    #[serde(default)]
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuEntry {
    pub label: String,
    pub href: Option<String>,
    pub visible: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub entries: Vec<MenuEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

pub fn default_menu() -> Vec<MenuLink> {
    [
        ("Inicio", LANDING_PAGE),
        ("Estudiantes", STUDENTS_PAGE),
        ("Grupos", GROUPS_PAGE),
        ("Logros", ACHIEVEMENTS_PAGE),
        ("Calificaciones", GRADES_PAGE),
        ("Usuarios", USERS_PAGE),
        ("Preinscripciones", PREENROLLMENT_PAGE),
        ("Cerrar Sesión", LOGIN_PAGE),
    ]
    .into_iter()
    .map(|(label, href)| MenuLink {
        label: label.to_string(),
        href: Some(href.to_string()),
    })
    .collect()
}

/// Links that are never hidden: placeholders, home and sign-out.
fn always_shown(href: Option<&str>) -> bool {
    match href {
        None => true,
        Some(h) => h.is_empty() || h == "#" || h.contains(LANDING_PAGE) || h.contains(LOGIN_PAGE),
    }
}

pub fn build_menu(role: Option<Role>, current_url: &str, links: &[MenuLink]) -> Menu {
    let Some(role) = role else {
        return Menu {
            entries: Vec::new(),
            redirect: Some(LOGIN_PAGE.to_string()),
        };
    };
    let allowed = allowed_pages(role);

    let mut entries: Vec<MenuEntry> = links
        .iter()
        .map(|link| {
            let href = link.href.as_deref();
            let visible = always_shown(href)
                || href
                    .map(|h| allowed.iter().any(|page| h.contains(page)))
                    .unwrap_or(false);
            MenuEntry {
                label: link.label.clone(),
                href: link.href.clone(),
                visible,
                active: false,
            }
        })
        .collect();

    let matched = entries.iter().position(|e| match e.href.as_deref() {
        Some(h) => !h.is_empty() && h != "#" && h != LOGIN_PAGE && current_url.contains(h),
        None => false,
    });
    let active = matched.or_else(|| {
        if !current_url.contains(LANDING_PAGE) {
            return None;
        }
        entries
            .iter()
            .position(|e| e.href.as_deref() == Some("#"))
            .or(if entries.is_empty() { None } else { Some(0) })
    });
    if let Some(i) = active {
        entries[i].active = true;
    }

    Menu {
        entries,
        redirect: None,
    }
}
