use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{ApiClient, ApiError, Method};
use crate::db;

pub const USER_NAME_KEY: &str = "nombreUsuario";
pub const ROLE_KEY: &str = "rolUsuario";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Administrador")]
    Administrator,
    #[serde(rename = "Profesor")]
    Teacher,
    #[serde(rename = "Acudiente")]
    Guardian,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Administrator, Role::Teacher, Role::Guardian];

    pub fn parse(raw: &str) -> Option<Role> {
        Self::ALL.into_iter().find(|r| r.as_str() == raw.trim())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Administrator => "Administrador",
            Role::Teacher => "Profesor",
            Role::Guardian => "Acudiente",
        }
    }
}

/// Who is signed in, as far as the UI knows. Never an authorization decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user_name: Option<String>,
    pub role: Option<Role>,
}

impl Session {
    pub fn load(conn: &Connection) -> anyhow::Result<Session> {
        let user_name = db::value_get(conn, USER_NAME_KEY)?.filter(|v| !v.trim().is_empty());
        let role = db::value_get(conn, ROLE_KEY)?.and_then(|r| Role::parse(&r));
        Ok(Session { user_name, role })
    }

    pub fn store(conn: &Connection, user_name: &str, role: &str) -> anyhow::Result<()> {
        db::value_set(conn, USER_NAME_KEY, user_name)?;
        db::value_set(conn, ROLE_KEY, role)?;
        Ok(())
    }

    pub fn clear(conn: &Connection) -> anyhow::Result<()> {
        db::value_delete(conn, USER_NAME_KEY)?;
        db::value_delete(conn, ROLE_KEY)?;
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or("Usuario")
    }

    pub fn display_role(&self) -> &str {
        self.role.map(Role::as_str).unwrap_or("Sin rol")
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "userName": self.user_name,
            "role": self.role.map(Role::as_str),
            "displayName": self.display_name(),
            "displayRole": self.display_role(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginGranted {
    pub user_name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    #[serde(default)]
    rol: Option<String>,
}

/// Checks credentials against the backend. The error is the text to show.
pub fn login(api: &ApiClient, user_name: &str, password: &str) -> Result<LoginGranted, String> {
    let body = json!({ "nombreUsuario": user_name, "contrasena": password });
    match api.send(Method::Post, "/token_usuario/validarLogin", Some(body)) {
        Ok(value) => {
            let reply: LoginReply = serde_json::from_value(value).unwrap_or(LoginReply { rol: None });
            Ok(LoginGranted {
                user_name: user_name.to_string(),
                role: reply.rol.unwrap_or_default(),
            })
        }
        Err(ApiError::Transport(_)) => Err(
            "No se pudo conectar con el servicio de autenticación. Verifica tu conexión.".to_string(),
        ),
        Err(e) => Err(e.user_message("Usuario o Contraseña incorrecta.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;

    #[test]
    fn role_strings_match_backend() {
        assert_eq!(Role::parse("Acudiente"), Some(Role::Guardian));
        assert_eq!(Role::parse(" Profesor "), Some(Role::Teacher));
        assert_eq!(Role::parse("Rector"), None);
        assert_eq!(
            serde_json::to_value(Role::Administrator).expect("json"),
            serde_json::json!("Administrador")
        );
    }

    #[test]
    fn session_round_trips_through_store() {
        let ws = std::env::temp_dir().join(format!("gestiond-session-{}", uuid::Uuid::new_v4()));
        let conn = db::open_db(&ws).expect("open db");
        assert_eq!(Session::load(&conn).expect("load"), Session::default());

        Session::store(&conn, "lgomez", "Profesor").expect("store");
        let s = Session::load(&conn).expect("load");
        assert_eq!(s.user_name.as_deref(), Some("lgomez"));
        assert!(s.is(Role::Teacher));

        Session::clear(&conn).expect("clear");
        let s = Session::load(&conn).expect("load");
        assert_eq!(s.display_name(), "Usuario");
        assert_eq!(s.display_role(), "Sin rol");
    }

    #[test]
    fn login_messages() {
        let backend = ScriptedTransport::new();
        backend
            .on(
                Method::Post,
                "/token_usuario/validarLogin",
                200,
                serde_json::json!({ "rol": "Acudiente", "mensaje": "ok" }),
            )
            .on(
                Method::Post,
                "/token_usuario/validarLogin",
                401,
                serde_json::json!({ "error": true }),
            );
        let api = backend.client();
        let granted = login(&api, "acu1", "secreta").expect("granted");
        assert_eq!(granted.role, "Acudiente");
        assert_eq!(
            login(&api, "acu1", "mala").expect_err("denied"),
            "Usuario o Contraseña incorrecta."
        );

        let down = ScriptedTransport::new();
        down.fail(Method::Post, "/token_usuario/validarLogin", "refused");
        let err = login(&down.client(), "x", "y").expect_err("down");
        assert!(err.starts_with("No se pudo conectar"));
    }
}
