use std::time::Instant;

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{PageContext, RowAction};
use crate::api::{ApiError, ApiRequest, Method};
use crate::crud::CONNECTION_FAILED;
use crate::model::{self, Guardian, Preenrollment, Student};
use crate::search::{InputOutcome, SearchController, Ticket, ViewState, SLOW_DEBOUNCE};
use crate::ui::Notice;
use crate::validate::ValidationError;

pub const SCHEDULE_MODAL: &str = "modal-programar-entrevista";
pub const STATE_MODAL: &str = "modal-cambiar-estado";

const LOAD_FAILED: &str = "Error al cargar preinscripciones";
const NO_NAME: &str = "Sin nombre";
const MISSING_PROFILE: &str = "Para aprobar al estudiante es OBLIGATORIO llenar la hoja de vida.\n\n\
Si el estudiante no tiene alergias o enfermedades, por favor escriba \"Ninguna\".";

/// Interview form as the shell's `datetime-local` input sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterviewDraft {
    pub date_time: Option<String>,
    pub place: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateChange {
    pub new_state: Option<String>,
    pub allergies: Option<String>,
    pub illnesses: Option<String>,
    pub learning_issues: Option<String>,
    pub guardian_phone: Option<String>,
}

/// Read-only part of the state dialog.
#[derive(Debug, Clone)]
struct StateForm {
    id: i64,
    applicant: String,
    birth_date: Option<String>,
    guardian: String,
    guardian_phone: String,
}

fn applicant_name(s: Option<&Student>) -> String {
    s.and_then(|s| s.persona.as_ref())
        .map(|p| p.full_name())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| NO_NAME.to_string())
}

fn guardian_name(g: Option<&Guardian>) -> String {
    g.and_then(|g| g.persona.as_ref())
        .map(|p| p.full_name())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| NO_NAME.to_string())
}

fn row(p: &Preenrollment) -> Value {
    let state = p.state();
    json!({
        "id": p.id,
        "applicant": applicant_name(p.applicant.as_ref()),
        "guardian": guardian_name(p.guardian.as_ref()),
        "interview": model::display_date(p.interview_at.as_deref())
            .unwrap_or_else(|| "Sin fecha".to_string()),
        "stateClass": model::state_class(&state),
        "state": state,
        "actions": [
            RowAction::new("schedule", true, "Programar Entrevista"),
            RowAction::new("changeState", true, "Gestionar Estado"),
        ],
    })
}

/// `mensaje` from a success body, when the backend sent one.
fn reply_message(v: &Value) -> Option<String> {
    v.get("mensaje")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn trimmed(v: Option<&str>) -> String {
    v.map(str::trim).unwrap_or_default().to_string()
}

pub struct PreenrollmentPage {
    list: ViewState<Preenrollment>,
    search: SearchController<Preenrollment>,
    scheduling: Option<i64>,
    state_form: Option<StateForm>,
}

impl PreenrollmentPage {
    pub fn open(ctx: &mut PageContext) -> Self {
        let mut page = Self {
            list: ViewState::Empty,
            search: SearchController::new(SLOW_DEBOUNCE),
            scheduling: None,
            state_form: None,
        };
        page.load(ctx);
        page
    }

    fn load(&mut self, ctx: &mut PageContext) {
        self.list = ViewState::Loading;
        let req = ApiRequest::new(Method::Get, "/preinscripcion");
        let outcome = ctx.api.get_list::<Preenrollment>(&req);
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "pre-enrollment list failed");
        }
        self.list = match outcome {
            Ok(items) if items.is_empty() => ViewState::NoResults,
            Ok(items) => ViewState::Results { items },
            Err(_) => ViewState::Error {
                message: LOAD_FAILED.to_string(),
            },
        };
    }

    /// Clearing the box shows the full list again; one character changes nothing.
    pub fn input(&mut self, text: &str, now: Instant) -> InputOutcome {
        self.search.input(text, now)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.search.next_due()
    }

    pub fn fire_due(&mut self, ctx: &mut PageContext, now: Instant) -> bool {
        let Some(ticket) = self.search.take_due(now) else {
            return false;
        };
        self.execute(ctx, ticket);
        true
    }

    pub fn search(&mut self, ctx: &mut PageContext, query: &str) {
        if query.trim().is_empty() {
            self.search.reset();
            return;
        }
        let ticket = self.search.trigger(query);
        self.execute(ctx, ticket);
    }

    fn execute(&mut self, ctx: &mut PageContext, ticket: Ticket) {
        let req = ApiRequest::new(Method::Get, "/preinscripcion/buscar")
            .query("textoBusqueda", &ticket.query);
        let outcome = ctx.api.get_list::<Preenrollment>(&req);
        self.search
            .complete(ticket.token, outcome, "Error al buscar preinscripciones");
    }

    fn fetch(&self, ctx: &mut PageContext, id: i64) -> Option<Preenrollment> {
        match ctx.api.get::<Preenrollment>(&format!("/preinscripcion/{id}")) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(id, error = %e, "pre-enrollment load failed");
                ctx.notify(Notice::error("Error al cargar los datos de la preinscripción"));
                None
            }
        }
    }

    pub fn open_schedule(&mut self, ctx: &mut PageContext, id: i64) {
        if self.fetch(ctx, id).is_none() {
            return;
        }
        self.scheduling = Some(id);
        ctx.modals.open(SCHEDULE_MODAL);
    }

    pub fn confirm_schedule(&mut self, ctx: &mut PageContext, draft: InterviewDraft) {
        let Some(id) = self.scheduling else {
            return;
        };
        let date_time = trimmed(draft.date_time.as_deref());
        let place = trimmed(draft.place.as_deref());
        if date_time.is_empty() || place.is_empty() {
            ctx.notify(Notice::warning("Por favor complete todos los campos obligatorios"));
            return;
        }
        if NaiveDateTime::parse_from_str(&date_time, "%Y-%m-%dT%H:%M").is_err() {
            ctx.notify(Notice::warning("La fecha de la entrevista no es válida"));
            return;
        }
        let body = json!({
            "fechaEntrevista": format!("{date_time}:00"),
            "lugarEntrevista": place,
        });
        let path = format!("/preinscripcion/{id}/programar-entrevista");
        match ctx.api.send(Method::Patch, &path, Some(body)) {
            Ok(reply) => {
                tracing::info!(id, "interview scheduled");
                self.scheduling = None;
                ctx.modals.close(SCHEDULE_MODAL);
                ctx.notify(Notice::success(
                    reply_message(&reply).unwrap_or_else(|| "Entrevista programada exitosamente".into()),
                ));
                self.load(ctx);
            }
            Err(e) => self.patch_failed(ctx, e, SCHEDULE_MODAL, "Error al programar la entrevista"),
        }
    }

    pub fn open_state_change(&mut self, ctx: &mut PageContext, id: i64) {
        let Some(p) = self.fetch(ctx, id) else {
            return;
        };
        let birth_date = p
            .applicant
            .as_ref()
            .and_then(|a| a.persona.as_ref())
            .and_then(|p| p.birth_date.as_deref())
            .and_then(model::parse_backend_date)
            .map(|d| d.format("%Y-%m-%d").to_string());
        self.state_form = Some(StateForm {
            id,
            applicant: applicant_name(p.applicant.as_ref()),
            birth_date,
            guardian: guardian_name(p.guardian.as_ref()),
            guardian_phone: p
                .guardian
                .as_ref()
                .and_then(|g| g.phone.clone())
                .unwrap_or_default(),
        });
        ctx.modals.open(STATE_MODAL);
    }

    pub fn confirm_state_change(&mut self, ctx: &mut PageContext, change: StateChange) {
        let Some(form) = self.state_form.as_ref() else {
            return;
        };
        let selected = trimmed(change.new_state.as_deref());
        if selected.is_empty() {
            ctx.notify(Notice::warning("Por favor seleccione un nuevo estado"));
            return;
        }
        let (state, allergies, illnesses, issues) = if selected == "Aprobado" {
            let allergies = trimmed(change.allergies.as_deref());
            let illnesses = trimmed(change.illnesses.as_deref());
            if allergies.is_empty() || illnesses.is_empty() {
                let missing = ValidationError::new("alergias", MISSING_PROFILE).titled("Faltan Datos");
                ctx.notify(missing.into());
                return;
            }
            let issues = trimmed(change.learning_issues.as_deref());
            ("Activo".to_string(), allergies, illnesses, issues)
        } else {
            (selected, String::new(), String::new(), String::new())
        };
        let phone = change
            .guardian_phone
            .as_deref()
            .map(str::trim)
            .map(str::to_string)
            .unwrap_or_else(|| form.guardian_phone.clone());
        let body = json!({
            "alergias": allergies,
            "enfermedades": illnesses,
            "problemasAprendizaje": issues,
            "telefonoAcudiente": phone,
            "nuevoEstado": state,
        });
        let id = form.id;
        let path = format!("/preinscripcion/{id}/cambiar-estado");
        match ctx.api.send(Method::Patch, &path, Some(body)) {
            Ok(reply) => {
                tracing::info!(id, state = %state, "pre-enrollment state changed");
                self.state_form = None;
                ctx.modals.close(STATE_MODAL);
                ctx.notify(Notice::success(
                    reply_message(&reply).unwrap_or_else(|| "Estado actualizado exitosamente".into()),
                ));
                self.load(ctx);
            }
            Err(e) => self.patch_failed(ctx, e, STATE_MODAL, "Error al cambiar el estado"),
        }
    }

    /// Business refusals keep the dialog open; a lost connection closes it.
    fn patch_failed(&mut self, ctx: &mut PageContext, e: ApiError, modal: &str, fallback: &str) {
        tracing::warn!(error = %e, modal, "pre-enrollment update failed");
        match e {
            ApiError::Transport(_) => {
                ctx.modals.close(modal);
                ctx.notify(Notice::error(CONNECTION_FAILED));
            }
            other => ctx.notify(Notice::error(other.user_message(fallback))),
        }
    }

    pub fn view(&self) -> Value {
        let table = if self.search.last_query().is_some() {
            self.search.view().map(row)
        } else {
            self.list.map(row)
        };
        json!({
            "page": "preenrollment",
            "table": table,
            "searching": self.search.last_query().is_some(),
            "scheduling": self.scheduling,
            "stateForm": self.state_form.as_ref().map(|f| json!({
                "id": f.id,
                "applicant": f.applicant,
                "birthDate": f.birth_date,
                "guardian": f.guardian,
                "guardianPhone": f.guardian_phone,
                "states": ["Aprobado", "Rechazado", "En revisión"],
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::testing::Harness;
    use crate::session::Role;
    use std::time::Duration;

    fn sample() -> Value {
        json!([{
            "idPreinscripcion": 3,
            "fechaEntrevista": "2025-03-10T09:30:00",
            "aspirante": {
                "codigoEstudiante": 20,
                "estado": "Pendiente",
                "persona": { "nombre": "Sara", "apellido": "Gil", "fechaDeNacimiento": "2018-05-02T00:00:00" }
            },
            "acudiente": { "telefono": "3105550000", "persona": { "nombre": "Luz", "apellido": "Gil" } }
        }, {
            "idPreinscripcion": 4,
            "aspirante": { "estado": "Activo" }
        }])
    }

    fn opened() -> (Harness, PreenrollmentPage) {
        let mut h = Harness::new(Some(Role::Administrator), "admin");
        h.backend.on(Method::Get, "/preinscripcion", 200, sample());
        h.backend.on(Method::Get, "/preinscripcion/3", 200, sample()[0].clone());
        let (page, _) = h.run(PreenrollmentPage::open);
        (h, page)
    }

    #[test]
    fn rows_fall_back_for_missing_data() {
        let (_h, page) = opened();
        let view = page.view();
        let first = &view["table"]["items"][0];
        assert_eq!(first["applicant"], "Sara Gil");
        assert_eq!(first["interview"], "10/3/2025");
        assert_eq!(first["stateClass"], "estado-pendiente");
        let second = &view["table"]["items"][1];
        assert_eq!(second["applicant"], "Sin nombre");
        assert_eq!(second["guardian"], "Sin nombre");
        assert_eq!(second["interview"], "Sin fecha");
        assert_eq!(second["stateClass"], "estado-aprobado");
    }

    #[test]
    fn load_failure_shows_error_state() {
        let mut h = Harness::new(Some(Role::Administrator), "admin");
        h.backend.on(Method::Get, "/preinscripcion", 500, json!({ "mensaje": "caído" }));
        let (page, _) = h.run(PreenrollmentPage::open);
        assert_eq!(page.view()["table"]["state"], "error");
    }

    #[test]
    fn search_waits_and_clearing_restores_list() {
        let (mut h, mut page) = opened();
        h.backend.on(Method::Get, "/preinscripcion/buscar", 404, Value::Null);
        let t0 = Instant::now();
        page.input("Sa", t0);
        let (fired, _) = h.run(|ctx| page.fire_due(ctx, t0 + Duration::from_millis(100)));
        assert!(!fired);
        let (fired, _) = h.run(|ctx| page.fire_due(ctx, t0 + Duration::from_millis(500)));
        assert!(fired);
        assert_eq!(page.view()["table"]["state"], "noResults");

        assert_eq!(page.input("", t0), InputOutcome::Cleared);
        assert_eq!(page.view()["table"]["state"], "results");
        let sent = h
            .backend
            .calls()
            .into_iter()
            .find(|c| c.path == "/preinscripcion/buscar")
            .expect("search call");
        assert_eq!(sent.query_value("textoBusqueda"), Some("Sa"));
    }

    #[test]
    fn interview_appends_seconds() {
        let (mut h, mut page) = opened();
        h.backend.on(
            Method::Patch,
            "/preinscripcion/3/programar-entrevista",
            200,
            json!({ "mensaje": "Entrevista programada" }),
        );
        h.run(|ctx| page.open_schedule(ctx, 3));
        assert!(h.modals.is_open(SCHEDULE_MODAL));

        let (_, notice) = h.run(|ctx| page.confirm_schedule(ctx, InterviewDraft {
            date_time: Some("2025-04-01T10:00".into()),
            place: None,
        }));
        assert_eq!(notice.expect("warning").text, "Por favor complete todos los campos obligatorios");

        let (_, notice) = h.run(|ctx| page.confirm_schedule(ctx, InterviewDraft {
            date_time: Some("2025-04-01T10:00".into()),
            place: Some(" Rectoría ".into()),
        }));
        assert_eq!(notice.expect("success").text, "Entrevista programada");
        assert!(!h.modals.is_open(SCHEDULE_MODAL));
        let patch = h
            .backend
            .calls()
            .into_iter()
            .find(|c| c.method == Method::Patch)
            .expect("patch");
        assert_eq!(
            patch.body,
            Some(json!({ "fechaEntrevista": "2025-04-01T10:00:00", "lugarEntrevista": "Rectoría" }))
        );
    }

    #[test]
    fn approval_requires_profile_and_sends_active() {
        let (mut h, mut page) = opened();
        h.backend.on(Method::Patch, "/preinscripcion/3/cambiar-estado", 200, Value::Null);
        h.run(|ctx| page.open_state_change(ctx, 3));
        assert_eq!(page.view()["stateForm"]["birthDate"], "2018-05-02");
        assert_eq!(page.view()["stateForm"]["guardianPhone"], "3105550000");

        let (_, notice) = h.run(|ctx| page.confirm_state_change(ctx, StateChange {
            new_state: Some("Aprobado".into()),
            allergies: Some("Ninguna".into()),
            ..StateChange::default()
        }));
        let notice = notice.expect("warning");
        assert_eq!(notice.title, "Faltan Datos");
        assert_eq!(h.backend.calls_to(Method::Patch, "/preinscripcion/3/cambiar-estado"), 0);

        let (_, notice) = h.run(|ctx| page.confirm_state_change(ctx, StateChange {
            new_state: Some("Aprobado".into()),
            allergies: Some("Ninguna".into()),
            illnesses: Some("Asma".into()),
            ..StateChange::default()
        }));
        assert_eq!(notice.expect("success").text, "Estado actualizado exitosamente");
        let patch = h
            .backend
            .calls()
            .into_iter()
            .find(|c| c.method == Method::Patch)
            .expect("patch");
        let body = patch.body.expect("body");
        assert_eq!(body["nuevoEstado"], "Activo");
        assert_eq!(body["enfermedades"], "Asma");
        assert_eq!(body["telefonoAcudiente"], "3105550000");
    }

    #[test]
    fn rejection_sends_blank_profile_and_keeps_dialog_on_refusal() {
        let (mut h, mut page) = opened();
        h.backend.on(
            Method::Patch,
            "/preinscripcion/3/cambiar-estado",
            400,
            json!({ "mensaje": "Estado no permitido" }),
        );
        h.run(|ctx| page.open_state_change(ctx, 3));
        let (_, notice) = h.run(|ctx| page.confirm_state_change(ctx, StateChange {
            new_state: Some("Rechazado".into()),
            allergies: Some("Polen".into()),
            ..StateChange::default()
        }));
        assert_eq!(notice.expect("error").text, "Estado no permitido");
        assert!(h.modals.is_open(STATE_MODAL));
        let body = h
            .backend
            .calls()
            .into_iter()
            .find(|c| c.method == Method::Patch)
            .and_then(|c| c.body)
            .expect("body");
        assert_eq!(body["nuevoEstado"], "Rechazado");
        assert_eq!(body["alergias"], "");
    }
}
