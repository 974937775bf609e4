use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{PageContext, RowAction};
use crate::api::{ApiRequest, Method};
use crate::crud::{self, Creatable, FormMode, Labels, Removable, Resource, SaveFailure};
use crate::model::{Observation, Student};
use crate::search::{InputOutcome, SearchController, Ticket, ViewState, SLOW_DEBOUNCE};
use crate::ui::Notice;
use crate::validate::{self, ValidationError};

pub const FORM_MODAL: &str = "modal-observacion";
pub const DELETE_MODAL: &str = "modal-confirmar-eliminar";
pub const PROFILE_MODAL: &str = "modal-hoja-vida";

const NO_STUDENT: &str = "No hay ningún estudiante seleccionado";
const NOT_RECORDED: &str = "No registrado";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObservationDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(skip)]
    pub student_code: Option<i64>,
}

pub struct ObservationResource;

impl Resource for ObservationResource {
    type Record = Observation;
    type Draft = ObservationDraft;

    const NAME: &'static str = "observation";
    const LABELS: Labels = Labels {
        updated: "Observación actualizada exitosamente",
        load_failed: "Error al cargar los datos de la observación",
        save_failed: "Error al guardar la observación",
    };

    fn item_path(id: i64) -> String {
        format!("/observaciones/{id}")
    }

    fn body(draft: &ObservationDraft, _mode: FormMode) -> Result<Value, ValidationError> {
        let title = validate::required("titulo", draft.title.as_deref(), "El título es obligatorio")?;
        let description = validate::required(
            "descripcion",
            draft.description.as_deref(),
            "La descripción es obligatoria",
        )?;
        validate::max_chars("titulo", &title, 200, "El título no puede exceder 200 caracteres")?;
        validate::max_chars(
            "descripcion",
            &description,
            1000,
            "La descripción no puede exceder 1000 caracteres",
        )?;
        let code = validate::required_id("estudiante", draft.student_code, NO_STUDENT)?;
        Ok(json!({
            "titulo": title,
            "descripcion": description,
            "estudiante": { "codigoEstudiante": code },
        }))
    }
}

impl Creatable for ObservationResource {
    const CREATED: &'static str = "Observación creada exitosamente";

    fn create_path() -> String {
        "/observaciones".to_string()
    }
}

impl Removable for ObservationResource {
    const DELETED: &'static str = "Observación eliminada exitosamente";
    const DELETE_FAILED: &'static str = "Error al eliminar la observación";
}

/// Student sheet shown from the observation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSheet {
    pub name: String,
    pub grade: String,
    pub group: String,
    pub state: String,
    pub state_class: String,
    pub guardian: String,
    pub phone: String,
    pub email: String,
}

impl ProfileSheet {
    pub fn from_student(s: &Student) -> Self {
        let state = s.state.clone().unwrap_or_default();
        let guardian = s.guardian.as_ref();
        let non_blank = |v: Option<&String>| {
            v.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| NOT_RECORDED.to_string())
        };
        Self {
            name: s.full_name(),
            grade: s
                .group
                .as_ref()
                .map(|g| g.grade_name())
                .unwrap_or_else(|| "N/A".to_string()),
            group: s
                .group
                .as_ref()
                .and_then(|g| g.number)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "Sin asignar".to_string()),
            state_class: format!("estado-{}", state.to_lowercase()),
            state,
            guardian: guardian
                .and_then(|g| g.persona.as_ref())
                .map(|p| p.full_name())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| NOT_RECORDED.to_string()),
            phone: non_blank(guardian.and_then(|g| g.phone.as_ref())),
            email: non_blank(guardian.and_then(|g| g.email.as_ref())),
        }
    }
}

fn card(o: &Observation) -> Value {
    json!({
        "id": o.id,
        "title": o.title,
        "description": o.description,
        "actions": [
            RowAction::new("edit", true, "Editar observación"),
            RowAction::new("delete", true, "Eliminar observación"),
        ],
    })
}

pub struct ObservationsPage {
    search: SearchController<Student>,
    student: Option<Student>,
    observations: Vec<Observation>,
    form: Option<(FormMode, ObservationDraft)>,
    pending_delete: Option<(i64, String)>,
    profile: Option<ProfileSheet>,
}

impl ObservationsPage {
    pub fn open() -> Self {
        Self {
            search: SearchController::new(SLOW_DEBOUNCE),
            student: None,
            observations: Vec::new(),
            form: None,
            pending_delete: None,
            profile: None,
        }
    }

    pub fn input(&mut self, text: &str, now: Instant) -> InputOutcome {
        let outcome = self.search.input(text, now);
        if outcome == InputOutcome::Cleared {
            self.clear_student();
        }
        outcome
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
            ctx.notify(Notice::warning("Por favor ingrese un nombre o ID para buscar"));
            return;
        }
        let ticket = self.search.trigger(query);
        self.execute(ctx, ticket);
    }

    fn execute(&mut self, ctx: &mut PageContext, ticket: Ticket) {
        self.clear_student();
        let req = ApiRequest::new(Method::Get, "/estudiante/buscar").query("textoBusqueda", &ticket.query);
        let outcome = ctx.api.get_list::<Student>(&req);
        let failed = matches!(&outcome, Err(e) if !e.is_not_found());
        if !self.search.complete(ticket.token, outcome, "Error al buscar el estudiante") {
            return;
        }
        if failed {
            ctx.notify(Notice::error("Error al buscar el estudiante"));
            self.search.set_view(ViewState::Empty);
            return;
        }
        if let [only] = self.search.items() {
            let only = only.clone();
            self.load_student(ctx, only);
        }
    }

    fn clear_student(&mut self) {
        self.student = None;
        self.observations.clear();
        self.profile = None;
    }

    pub fn select_student(&mut self, ctx: &mut PageContext, code: i64) {
        let Some(student) = self
            .search
            .items()
            .iter()
            .find(|s| s.code == Some(code))
            .cloned()
        else {
            return;
        };
        self.load_student(ctx, student);
    }

    fn load_student(&mut self, ctx: &mut PageContext, student: Student) {
        let code = student.code.unwrap_or_default();
        let req = ApiRequest::new(Method::Get, format!("/observaciones/estudiante/{code}"));
        // A student without observations answers 404; treat every failure as an empty log.
        self.observations = ctx.api.get_list(&req).unwrap_or_default();
        self.profile = None;
        self.student = Some(student);
    }

    fn reload(&mut self, ctx: &mut PageContext) {
        if let Some(student) = self.student.clone() {
            self.load_student(ctx, student);
        }
    }

    pub fn open_create(&mut self, ctx: &mut PageContext) {
        if self.student.is_none() {
            ctx.notify(Notice::warning(NO_STUDENT));
            return;
        }
        self.form = Some((FormMode::Create, ObservationDraft::default()));
        ctx.modals.open(FORM_MODAL);
    }

    pub fn open_edit(&mut self, ctx: &mut PageContext, id: i64) {
        match crud::fetch::<ObservationResource>(ctx.api, id) {
            Ok(o) => {
                let draft = ObservationDraft {
                    title: o.title,
                    description: o.description,
                    student_code: None,
                };
                self.form = Some((FormMode::Edit { id }, draft));
                ctx.modals.open(FORM_MODAL);
            }
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn save(&mut self, ctx: &mut PageContext, mut draft: ObservationDraft) {
        let mode = self
            .form
            .as_ref()
            .map(|(mode, _)| *mode)
            .unwrap_or(FormMode::Create);
        draft.student_code = self.student.as_ref().and_then(|s| s.code);
        match crud::save::<ObservationResource>(ctx.api, mode, &draft) {
            Ok(notice) => {
                self.form = None;
                ctx.modals.close(FORM_MODAL);
                ctx.notify(notice);
                self.reload(ctx);
            }
            Err(SaveFailure::Invalid(notice)) => ctx.notify(notice),
            Err(SaveFailure::Rejected { notice, status }) => {
                if status.is_none() {
                    ctx.modals.close(FORM_MODAL);
                }
                ctx.notify(notice);
            }
        }
    }

    pub fn request_delete(&mut self, ctx: &mut PageContext, id: i64) {
        let title = self
            .observations
            .iter()
            .find(|o| o.id == Some(id))
            .and_then(|o| o.title.clone())
            .unwrap_or_default();
        self.pending_delete = Some((id, title));
        ctx.modals.open(DELETE_MODAL);
    }

    pub fn confirm_delete(&mut self, ctx: &mut PageContext) {
        let Some((id, _)) = self.pending_delete.take() else {
            return;
        };
        let result = crud::delete::<ObservationResource>(ctx.api, id);
        ctx.modals.close(DELETE_MODAL);
        match result {
            Ok(notice) => {
                ctx.notify(notice);
                self.reload(ctx);
            }
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn show_profile(&mut self, ctx: &mut PageContext) {
        let Some(student) = self.student.as_ref() else {
            ctx.notify(Notice::warning(NO_STUDENT));
            return;
        };
        self.profile = Some(ProfileSheet::from_student(student));
        ctx.modals.open(PROFILE_MODAL);
    }

    pub fn view(&self) -> Value {
        json!({
            "page": "observations",
            "matches": self.search.view().map(|s| json!({
                "code": s.code,
                "name": s.full_name(),
                "group": s.group_label(),
            })),
            "student": self.student.as_ref().map(|s| json!({
                "code": s.code,
                "name": s.full_name(),
            })),
            "observations": self.observations.iter().map(card).collect::<Vec<_>>(),
            "form": self.form.as_ref().map(|(mode, draft)| json!({
                "mode": mode,
                "title": if mode.is_edit() { "Editar Observación" } else { "Nueva Observación" },
                "draft": draft,
            })),
            "pendingDelete": self.pending_delete.as_ref().map(|(id, title)| json!({ "id": id, "title": title })),
            "profile": self.profile,
        })
    }
}
