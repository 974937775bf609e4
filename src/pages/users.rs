use std::time::Instant;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{PageContext, RowAction};
use crate::api::{ApiError, ApiRequest, Method};
use crate::crud::{self, default_failure, Creatable, FormMode, Labels, Resource, SaveFailure};
use crate::model::{self, UserAccount};
use crate::search::{Debouncer, ViewState, FAST_DEBOUNCE};
use crate::ui::Notice;
use crate::validate::{self, ValidationError};

pub const CREATE_MODAL: &str = "modal-crear-usuario";
pub const EDIT_MODAL: &str = "modal-editar-usuario";
pub const PASSWORD_MODAL: &str = "modal-cambiar-password";

pub const ROLES: [&str; 3] = ["Administrador", "Profesor", "Acudiente"];
const GUARDIAN_ROLE: &str = "Acudiente";
const PASSWORD_MIN: usize = 6;
const PASSWORD_TOO_SHORT: &str = "La contraseña debe tener al menos 6 caracteres";

/// Both user forms. Creation reads the person fields; editing reads `active`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDraft {
    pub role: Option<String>,
    pub document: Option<String>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub active: Option<bool>,
}

pub struct UserResource;

impl UserResource {
    fn create_body(draft: &UserDraft) -> Result<Value, ValidationError> {
        let role = validate::required("rol", draft.role.as_deref(), "Por favor seleccione un rol")?;
        let document = validate::required(
            "documento",
            draft.document.as_deref(),
            "Por favor ingrese el documento de la persona",
        )?;
        let user_name = validate::required(
            "nombreUsuario",
            draft.user_name.as_deref(),
            "Por favor ingrese un nombre de usuario",
        )?;
        let password = validate::required(
            "contrasena",
            draft.password.as_deref(),
            "Por favor ingrese una contraseña",
        )?;
        // Guardians link to an existing person by document only.
        let persona = if role == GUARDIAN_ROLE {
            json!({
                "documento": document,
                "nombre": null,
                "apellido": null,
                "fechaDeNacimiento": null,
                "genero": null,
            })
        } else {
            let first = validate::optional(draft.first_name.as_deref());
            let last = validate::optional(draft.last_name.as_deref());
            if first.is_none() || last.is_none() {
                return Err(ValidationError::new(
                    "persona",
                    format!("Para crear un {role}, Nombre y Apellido son obligatorios."),
                ));
            }
            json!({
                "documento": document,
                "nombre": first,
                "apellido": last,
                "fechaDeNacimiento": draft.birth_date.as_deref().and_then(model::date_to_backend),
                "genero": validate::optional(draft.gender.as_deref()),
            })
        };
        Ok(json!({
            "nombreUsuario": user_name,
            "contrasena": password,
            "rol": role,
            "estado": true,
            "persona": persona,
        }))
    }

    fn update_body(draft: &UserDraft) -> Result<Value, ValidationError> {
        let incomplete = "Por favor complete todos los campos obligatorios";
        let user_name = validate::required("nombreUsuario", draft.user_name.as_deref(), incomplete)?;
        let role = validate::required("rol", draft.role.as_deref(), incomplete)?;
        let mut body = Map::new();
        body.insert("nombreUsuario".into(), json!(user_name));
        body.insert("estado".into(), json!(draft.active.unwrap_or(true)));
        body.insert("rol".into(), json!(role));
        // Blank keeps the current password.
        if let Some(password) = draft.password.as_deref().filter(|p| !p.is_empty()) {
            validate::min_chars("contrasena", password, PASSWORD_MIN, PASSWORD_TOO_SHORT)?;
            body.insert("contrasena".into(), json!(password));
        }
        Ok(Value::Object(body))
    }
}

impl Resource for UserResource {
    type Record = UserAccount;
    type Draft = UserDraft;

    const NAME: &'static str = "user";
    const LABELS: Labels = Labels {
        updated: "Usuario modificado exitosamente",
        load_failed: "Error al cargar los datos del usuario",
        save_failed: "No se pudo crear el usuario",
    };

    fn item_path(id: i64) -> String {
        format!("/token_usuario/{id}")
    }

    fn body(draft: &UserDraft, mode: FormMode) -> Result<Value, ValidationError> {
        match mode {
            FormMode::Create => Self::create_body(draft),
            FormMode::Edit { .. } => Self::update_body(draft),
        }
    }

    fn save_failure(err: &ApiError, mode: FormMode) -> Notice {
        match mode {
            FormMode::Create => default_failure(err, Self::LABELS.save_failed),
            FormMode::Edit { .. } => default_failure(err, "Error al modificar el usuario"),
        }
    }
}

impl Creatable for UserResource {
    const CREATED: &'static str = "Usuario creado y asociado correctamente";

    fn create_path() -> String {
        "/token_usuario/crear".to_string()
    }
}

/// Which parts of the create form the shell shows for the chosen role.
fn create_layout(role: Option<&str>) -> Value {
    match role {
        None | Some("") => json!({ "showDocument": false, "showPerson": false, "showAccount": false, "help": "" }),
        Some(GUARDIAN_ROLE) => json!({
            "showDocument": true,
            "showPerson": false,
            "showAccount": true,
            "help": "El documento debe corresponder a un acudiente existente.",
        }),
        Some(_) => json!({
            "showDocument": true,
            "showPerson": true,
            "showAccount": true,
            "help": "Si la persona no existe, se creará con los datos ingresados a continuación.",
        }),
    }
}

fn matches(u: &UserAccount, needle: &str) -> bool {
    let name = u.full_name().to_lowercase();
    let user = u.user_name.as_deref().unwrap_or_default().to_lowercase();
    let role = u.role.as_deref().unwrap_or_default().to_lowercase();
    name.contains(needle) || user.contains(needle) || role.contains(needle)
}

fn row(u: &UserAccount) -> Value {
    let active = u.active.unwrap_or(false);
    let name = u.full_name();
    json!({
        "id": u.id,
        "name": if name.is_empty() { "Sin nombre".to_string() } else { name },
        "userName": u.user_name,
        "role": u.role,
        "active": active,
        "state": if active { "Activo" } else { "Inactivo" },
        "stateClass": if active { "estado-activo" } else { "estado-inactivo" },
        "actions": [
            RowAction::new("edit", true, "Editar"),
            RowAction::new("toggle", true, "Cambiar estado"),
            RowAction::new("password", true, "Cambiar contraseña"),
        ],
    })
}

#[derive(Debug, Clone)]
struct EditForm {
    id: i64,
    user_name: String,
    role: String,
    active: bool,
}

pub struct UsersPage {
    list: ViewState<UserAccount>,
    filter: String,
    debounce: Debouncer,
    create_role: Option<String>,
    creating: bool,
    editing: Option<EditForm>,
    password_for: Option<i64>,
}

impl UsersPage {
    pub fn open(ctx: &mut PageContext) -> Self {
        let mut page = Self {
            list: ViewState::Empty,
            filter: String::new(),
            debounce: Debouncer::new(FAST_DEBOUNCE),
            create_role: None,
            creating: false,
            editing: None,
            password_for: None,
        };
        page.load(ctx);
        page
    }

    fn load(&mut self, ctx: &mut PageContext) {
        self.list = ViewState::Loading;
        let req = ApiRequest::new(Method::Get, "/token_usuario");
        let outcome = ctx.api.get_list::<UserAccount>(&req);
        self.list = match outcome {
            Ok(items) if items.is_empty() => ViewState::NoResults,
            Ok(items) => ViewState::Results { items },
            Err(e) => {
                tracing::warn!(error = %e, "user list failed");
                ViewState::Error {
                    message: "Error al cargar usuarios".to_string(),
                }
            }
        };
    }

    /// The filter never reaches the backend; it applies to the loaded list.
    pub fn input(&mut self, text: &str, now: Instant) -> Instant {
        self.debounce.schedule(text, now)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.debounce.take_due(now) {
            Some(text) => {
                self.filter = text.trim().to_lowercase();
                true
            }
            None => false,
        }
    }

    fn table(&self) -> ViewState<Value> {
        match &self.list {
            ViewState::Results { items } => {
                let rows: Vec<Value> = items
                    .iter()
                    .filter(|u| self.filter.is_empty() || matches(u, &self.filter))
                    .map(row)
                    .collect();
                if rows.is_empty() {
                    ViewState::NoResults
                } else {
                    ViewState::Results { items: rows }
                }
            }
            other => other.map(row),
        }
    }

    pub fn open_create(&mut self, ctx: &mut PageContext) {
        self.creating = true;
        self.create_role = None;
        ctx.modals.open(CREATE_MODAL);
    }

    pub fn choose_role(&mut self, role: Option<String>) {
        self.create_role = role.filter(|r| !r.is_empty());
    }

    /// A refused creation leaves the dialog and the list untouched.
    pub fn create(&mut self, ctx: &mut PageContext, draft: UserDraft) {
        match crud::save::<UserResource>(ctx.api, FormMode::Create, &draft) {
            Ok(notice) => {
                self.creating = false;
                self.create_role = None;
                ctx.modals.close(CREATE_MODAL);
                ctx.notify(notice);
                self.load(ctx);
            }
            Err(failure) => ctx.notify(failure.into_notice()),
        }
    }

    pub fn open_edit(&mut self, ctx: &mut PageContext, id: i64) {
        match crud::fetch::<UserResource>(ctx.api, id) {
            Ok(u) => {
                self.editing = Some(EditForm {
                    id,
                    user_name: u.user_name.unwrap_or_default(),
                    role: u.role.unwrap_or_default(),
                    active: u.active.unwrap_or(false),
                });
                ctx.modals.open(EDIT_MODAL);
            }
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn confirm_edit(&mut self, ctx: &mut PageContext, draft: UserDraft) {
        let Some(form) = self.editing.as_ref() else {
            return;
        };
        let mode = FormMode::Edit { id: form.id };
        match crud::save::<UserResource>(ctx.api, mode, &draft) {
            Ok(notice) => {
                self.editing = None;
                ctx.modals.close(EDIT_MODAL);
                ctx.notify(notice);
                self.load(ctx);
            }
            Err(SaveFailure::Invalid(notice)) => ctx.notify(notice),
            Err(SaveFailure::Rejected { notice, .. }) => ctx.notify(notice),
        }
    }

    /// The list is reloaded either way so the switch shows the stored value.
    pub fn toggle_active(&mut self, ctx: &mut PageContext, id: i64) {
        let path = format!("/token_usuario/{id}/cambiar-estado");
        match ctx.api.send(Method::Patch, &path, None) {
            Ok(_) => {
                tracing::info!(id, "user state toggled");
                ctx.notify(Notice::success("Estado modificado exitosamente"));
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "user state toggle failed");
                ctx.notify(default_failure(&e, "Error al cambiar el estado"));
            }
        }
        self.load(ctx);
    }

    pub fn open_password(&mut self, ctx: &mut PageContext, id: i64) {
        self.password_for = Some(id);
        ctx.modals.open(PASSWORD_MODAL);
    }

    pub fn confirm_password(&mut self, ctx: &mut PageContext, password: Option<&str>) {
        let Some(id) = self.password_for else {
            return;
        };
        let checked = validate::required("contrasena", password, "La contraseña es obligatoria")
            .and_then(|p| {
                validate::min_chars("contrasena", &p, PASSWORD_MIN, PASSWORD_TOO_SHORT)?;
                Ok(p)
            });
        let password = match checked {
            Ok(p) => p,
            Err(e) => {
                ctx.notify(e.into());
                return;
            }
        };
        let path = format!("/token_usuario/{id}/cambiar-password");
        match ctx.api.send(Method::Patch, &path, Some(json!({ "contrasena": password }))) {
            Ok(_) => {
                tracing::info!(id, "user password changed");
                self.password_for = None;
                ctx.modals.close(PASSWORD_MODAL);
                ctx.notify(Notice::success("Contraseña actualizada exitosamente"));
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "password change failed");
                ctx.notify(default_failure(&e, "Error al cambiar la contraseña"));
            }
        }
    }

    pub fn view(&self) -> Value {
        json!({
            "page": "users",
            "filter": self.filter,
            "table": self.table(),
            "roles": ROLES,
            "create": self.creating.then(|| json!({
                "role": self.create_role,
                "layout": create_layout(self.create_role.as_deref()),
            })),
            "edit": self.editing.as_ref().map(|f| json!({
                "id": f.id,
                "userName": f.user_name,
                "role": f.role,
                "state": if f.active { "Activo" } else { "Inactivo" },
            })),
            "passwordFor": self.password_for,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::testing::Harness;
    use crate::session::Role;
    use crate::ui::NoticeKind;
    use std::time::Duration;

    fn accounts() -> Value {
        json!([
            { "idTokenUsuario": 1, "nombreUsuario": "admin", "rol": "Administrador", "estado": true,
              "persona": { "nombre": "Ana", "apellido": "Ruiz" } },
            { "idTokenUsuario": 2, "nombreUsuario": "pcastro", "rol": "Profesor", "estado": false,
              "persona": { "nombre": "Pedro", "apellido": "Castro" } },
            { "idTokenUsuario": 3, "nombreUsuario": "acu", "rol": "Acudiente", "estado": true }
        ])
    }

    fn opened() -> (Harness, UsersPage) {
        let mut h = Harness::new(Some(Role::Administrator), "admin");
        h.backend.on(Method::Get, "/token_usuario", 200, accounts());
        let (page, _) = h.run(UsersPage::open);
        (h, page)
    }

    #[test]
    fn filter_is_local_and_debounced() {
        let (h, mut page) = opened();
        let t0 = Instant::now();
        page.input("prof", t0);
        assert!(!page.fire_due(t0 + Duration::from_millis(200)));
        assert_eq!(page.view()["table"]["items"].as_array().map(Vec::len), Some(3));
        assert!(page.fire_due(t0 + Duration::from_millis(300)));
        let view = page.view();
        assert_eq!(view["table"]["items"].as_array().map(Vec::len), Some(1));
        assert_eq!(view["table"]["items"][0]["userName"], "pcastro");
        assert_eq!(view["table"]["items"][0]["stateClass"], "estado-inactivo");
        assert_eq!(h.backend.calls().len(), 1);

        page.input("nadie", t0);
        page.fire_due(t0 + Duration::from_secs(1));
        assert_eq!(page.view()["table"]["state"], "noResults");
    }

    #[test]
    fn missing_person_renders_placeholder() {
        let (_h, page) = opened();
        assert_eq!(page.view()["table"]["items"][2]["name"], "Sin nombre");
    }

    #[test]
    fn teacher_needs_name_and_surname() {
        let (mut h, mut page) = opened();
        h.run(|ctx| page.open_create(ctx));
        page.choose_role(Some("Profesor".into()));
        assert_eq!(page.view()["create"]["layout"]["showPerson"], true);
        let draft = UserDraft {
            role: Some("Profesor".into()),
            document: Some("123".into()),
            user_name: Some("nuevo".into()),
            password: Some("secreto".into()),
            first_name: Some("Rosa".into()),
            ..UserDraft::default()
        };
        let (_, notice) = h.run(|ctx| page.create(ctx, draft));
        let notice = notice.expect("warning");
        assert_eq!(notice.kind, NoticeKind::Warning);
        assert_eq!(notice.text, "Para crear un Profesor, Nombre y Apellido son obligatorios.");
        assert_eq!(h.backend.calls_to(Method::Post, "/token_usuario/crear"), 0);
    }

    #[test]
    fn guardian_creation_error_is_verbatim_and_changes_nothing() {
        let (mut h, mut page) = opened();
        h.backend.on(
            Method::Post,
            "/token_usuario/crear",
            400,
            json!({ "error": true, "mensaje": "No existe un acudiente con el documento 999" }),
        );
        h.run(|ctx| page.open_create(ctx));
        page.choose_role(Some("Acudiente".into()));
        let before = page.view()["table"].clone();
        let draft = UserDraft {
            role: Some("Acudiente".into()),
            document: Some("999".into()),
            user_name: Some("acu2".into()),
            password: Some("clave1".into()),
            first_name: Some("ignorado".into()),
            ..UserDraft::default()
        };
        let (_, notice) = h.run(|ctx| page.create(ctx, draft));
        let notice = notice.expect("error");
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(notice.text, "No existe un acudiente con el documento 999");
        assert!(h.modals.is_open(CREATE_MODAL));
        assert_eq!(page.view()["table"], before);
        assert_eq!(h.backend.calls_to(Method::Get, "/token_usuario"), 1);

        let post = h
            .backend
            .calls()
            .into_iter()
            .find(|c| c.method == Method::Post)
            .expect("post");
        let body = post.body.expect("body");
        assert_eq!(body["persona"]["documento"], "999");
        assert!(body["persona"]["nombre"].is_null());
        assert_eq!(body["estado"], true);
    }

    #[test]
    fn edit_checks_password_length_and_omits_blank() {
        let (mut h, mut page) = opened();
        h.backend.on(Method::Get, "/token_usuario/2", 200, accounts()[1].clone());
        h.backend.on(Method::Put, "/token_usuario/2", 200, accounts()[1].clone());
        h.run(|ctx| page.open_edit(ctx, 2));
        assert_eq!(page.view()["edit"]["state"], "Inactivo");

        let short = UserDraft {
            user_name: Some("pcastro".into()),
            role: Some("Profesor".into()),
            password: Some("123".into()),
            ..UserDraft::default()
        };
        let (_, notice) = h.run(|ctx| page.confirm_edit(ctx, short));
        assert_eq!(notice.expect("warning").text, PASSWORD_TOO_SHORT);

        let keep = UserDraft {
            user_name: Some("pcastro".into()),
            role: Some("Profesor".into()),
            password: Some(String::new()),
            active: Some(true),
            ..UserDraft::default()
        };
        let (_, notice) = h.run(|ctx| page.confirm_edit(ctx, keep));
        assert_eq!(notice.expect("success").text, "Usuario modificado exitosamente");
        let put = h
            .backend
            .calls()
            .into_iter()
            .find(|c| c.method == Method::Put)
            .expect("put");
        assert_eq!(
            put.body,
            Some(json!({ "nombreUsuario": "pcastro", "estado": true, "rol": "Profesor" }))
        );
    }

    #[test]
    fn toggle_reloads_even_when_refused() {
        let (mut h, mut page) = opened();
        h.backend.on(
            Method::Patch,
            "/token_usuario/1/cambiar-estado",
            404,
            json!({ "mensaje": "Usuario no encontrado" }),
        );
        let (_, notice) = h.run(|ctx| page.toggle_active(ctx, 1));
        assert_eq!(notice.expect("error").text, "Usuario no encontrado");
        assert_eq!(h.backend.calls_to(Method::Get, "/token_usuario"), 2);
    }

    #[test]
    fn password_change_sends_new_secret() {
        let (mut h, mut page) = opened();
        h.backend.on(Method::Patch, "/token_usuario/3/cambiar-password", 200, json!({}));
        h.run(|ctx| page.open_password(ctx, 3));
        let (_, notice) = h.run(|ctx| page.confirm_password(ctx, Some("abc")));
        assert_eq!(notice.expect("warning").text, PASSWORD_TOO_SHORT);
        let (_, notice) = h.run(|ctx| page.confirm_password(ctx, Some("nueva123")));
        assert_eq!(notice.expect("success").text, "Contraseña actualizada exitosamente");
        assert!(!h.modals.is_open(PASSWORD_MODAL));
    }
}
