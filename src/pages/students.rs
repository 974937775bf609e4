use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{PageContext, RowAction, SelectOption};
use crate::api::{ApiError, ApiRequest, Method};
use crate::crud::{self, FormMode, Labels, Resource, SaveFailure};
use crate::model::{self, Grade, Group, Student};
use crate::search::{InputOutcome, SearchController, Ticket, ViewState, FAST_DEBOUNCE};
use crate::ui::Notice;
use crate::validate::{self, ValidationError};

pub const STATE_MODAL: &str = "modal-confirmar-cambio-estado";
pub const ASSIGN_MODAL: &str = "modal-asignar-grupo";
pub const EDIT_MODAL: &str = "modal-modificar-estudiante";
pub const UNLINK_MODAL: &str = "modal-desvincular";

const DB_ERROR: &str = "Error en la base de datos";
const GROUP_FULL: &str = "Grupo completo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentFilters {
    pub text: String,
    pub gender: Option<String>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub alphabetical: bool,
}

impl Default for StudentFilters {
    fn default() -> Self {
        Self {
            text: String::new(),
            gender: None,
            min_age: None,
            max_age: None,
            alphabetical: true,
        }
    }
}

impl StudentFilters {
    pub fn check(&self) -> Result<(), ValidationError> {
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            if min > max {
                return Err(ValidationError::new(
                    "edadMinima",
                    "La edad mínima no puede ser mayor que la edad máxima",
                ));
            }
        }
        Ok(())
    }

    pub fn request(&self) -> ApiRequest {
        let mut req = ApiRequest::new(Method::Get, "/estudiante/buscar");
        let text = self.text.trim();
        if !text.is_empty() {
            req = req.query("textoBusqueda", text);
        }
        if let Some(g) = self.gender.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            req = req.query("genero", g);
        }
        if let Some(min) = self.min_age {
            req = req.query("edadMinima", min.to_string());
        }
        if let Some(max) = self.max_age {
            req = req.query("edadMaxima", max.to_string());
        }
        req.query("ordenAlfabetico", self.alphabetical.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentDraft {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub document: Option<String>,
    pub birth_date: Option<String>,
}

impl StudentDraft {
    fn from_record(s: &Student) -> Self {
        let p = s.persona.clone().unwrap_or_default();
        Self {
            first_name: p.first_name,
            last_name: p.last_name,
            document: p.document,
            birth_date: p
                .birth_date
                .as_deref()
                .and_then(model::parse_backend_date)
                .map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

pub struct StudentResource;

impl Resource for StudentResource {
    type Record = Student;
    type Draft = StudentDraft;

    const NAME: &'static str = "student";
    const LABELS: Labels = Labels {
        updated: "Estudiante modificado exitosamente",
        load_failed: "Error al cargar los datos del estudiante",
        save_failed: DB_ERROR,
    };

    fn item_path(id: i64) -> String {
        format!("/estudiante/{id}")
    }

    fn body(draft: &StudentDraft, _mode: FormMode) -> Result<Value, ValidationError> {
        const MISSING: &str = "Por favor complete todos los campos obligatorios";
        let nombre = validate::required("nombre", draft.first_name.as_deref(), MISSING)?;
        let apellido = validate::required("apellido", draft.last_name.as_deref(), MISSING)?;
        let documento = validate::required("documento", draft.document.as_deref(), MISSING)?;
        let mut body = json!({
            "nombre": nombre,
            "apellido": apellido,
            "documento": documento,
        });
        if let Some(raw) = validate::optional(draft.birth_date.as_deref()) {
            let Some(date) = model::date_to_backend(&raw) else {
                return Err(ValidationError::new(
                    "fechaNacimiento",
                    "La fecha de nacimiento no es válida",
                ));
            };
            body["fechaNacimiento"] = json!(date);
        }
        Ok(body)
    }

    fn save_failure(err: &ApiError, _mode: FormMode) -> Notice {
        match err.status() {
            Some(400) => Notice::warning(err.user_message("Datos ingresados no válidos")),
            Some(409) => Notice::warning("Ya existe un registro con este documento"),
            _ => db_failure(err),
        }
    }
}

fn db_failure(err: &ApiError) -> Notice {
    match err {
        ApiError::Transport(_) | ApiError::Decode(_) => Notice::error(DB_ERROR),
        other => Notice::error(other.user_message(DB_ERROR)),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub code: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub grade: String,
    pub group: String,
    pub state: String,
    pub state_class: &'static str,
    pub actions: Vec<RowAction>,
}

fn row(s: &Student, group_mode: bool) -> StudentRow {
    let persona = s.persona.clone().unwrap_or_default();
    let active = s.is_active();
    let actions = if group_mode {
        let has_group = s.has_group();
        vec![
            RowAction::new(
                "assignGroup",
                active && !has_group,
                if !active {
                    "Estudiante inactivo"
                } else if has_group {
                    "El estudiante ya tiene grupo asignado"
                } else {
                    "Asignar a grupo"
                },
            ),
            RowAction::new(
                "unlinkGroup",
                active && has_group,
                if !active {
                    "Estudiante inactivo"
                } else if !has_group {
                    "El estudiante no tiene grupo asignado"
                } else {
                    "Desvincular de grupo"
                },
            ),
        ]
    } else {
        vec![
            RowAction::new(
                "edit",
                active,
                if active { "Editar" } else { "Estudiante inactivo" },
            ),
            RowAction::new("toggleState", true, "Gestionar estado del estudiante"),
        ]
    };
    StudentRow {
        code: s.code,
        first_name: persona.first_name.unwrap_or_default(),
        last_name: persona.last_name.unwrap_or_default(),
        grade: s
            .group
            .as_ref()
            .map(Group::grade_name)
            .unwrap_or_else(|| "N/A".to_string()),
        group: s.group_label(),
        state: s.state.clone().unwrap_or_default(),
        state_class: if active {
            "estado-activo"
        } else {
            "estado-inactivo"
        },
        actions,
    }
}

#[derive(Debug, Default)]
struct AssignDialog {
    student_id: i64,
    grades: Vec<SelectOption>,
    grade_id: Option<i64>,
    groups: Vec<Group>,
}

#[derive(Debug, Clone)]
struct Pending {
    id: i64,
    name: String,
}

pub struct StudentsPage {
    search: SearchController<Student>,
    filters: StudentFilters,
    /// Refreshes repeat the last filtered search instead of listing everything.
    searched: bool,
    group_mode: bool,
    pending_state: Option<Pending>,
    pending_unlink: Option<Pending>,
    assign: Option<AssignDialog>,
    edit: Option<(i64, StudentDraft)>,
}

impl StudentsPage {
    pub fn open(ctx: &mut PageContext) -> Self {
        let mut page = Self {
            search: SearchController::new(FAST_DEBOUNCE),
            filters: StudentFilters::default(),
            searched: false,
            group_mode: false,
            pending_state: None,
            pending_unlink: None,
            assign: None,
            edit: None,
        };
        page.load_all(ctx);
        page
    }

    pub fn load_all(&mut self, ctx: &mut PageContext) {
        self.search.reset();
        self.searched = false;
        let view = match ctx
            .api
            .get_list::<Student>(&ApiRequest::new(Method::Get, "/estudiante"))
        {
            Ok(items) if items.is_empty() => ViewState::Empty,
            Ok(items) => ViewState::Results { items },
            Err(e) => {
                tracing::warn!(error = %e, "student list failed");
                ViewState::Error {
                    message: "Error al cargar estudiantes".to_string(),
                }
            }
        };
        self.search.set_view(view);
    }

    pub fn input(&mut self, text: &str, now: Instant) -> InputOutcome {
        self.filters.text = text.trim().to_string();
        self.search.input(text, now)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.search.next_due()
    }

    pub fn fire_due(&mut self, ctx: &mut PageContext, now: Instant) -> bool {
        if self.search.next_due().map_or(true, |due| due > now) {
            return false;
        }
        let previous = self.search.view().clone();
        let Some(ticket) = self.search.take_due(now) else {
            return false;
        };
        if let Err(e) = self.filters.check() {
            self.search.set_view(previous);
            ctx.notify(e.into());
            return true;
        }
        self.execute(ctx, ticket);
        true
    }

    /// Search button: text plus the optional filters, no minimum length.
    pub fn search(&mut self, ctx: &mut PageContext, filters: StudentFilters) {
        if let Err(e) = filters.check() {
            ctx.notify(e.into());
            return;
        }
        self.filters = filters;
        let ticket = self.search.trigger(&self.filters.text.clone());
        self.execute(ctx, ticket);
    }

    fn execute(&mut self, ctx: &mut PageContext, ticket: Ticket) {
        let mut filters = self.filters.clone();
        filters.text = ticket.query.clone();
        self.searched = true;

        let outcome = ctx.api.get_list::<Student>(&filters.request());
        if !self.search.is_current(ticket.token) {
            return;
        }
        match &outcome {
            Err(e) if e.is_not_found() => ctx.notify(Notice::info(e.user_message(
                "No se encontró ningún estudiante con los criterios especificados",
            ))),
            Err(e) => ctx.notify(db_failure(e)),
            Ok(_) => {}
        }
        self.search.complete(ticket.token, outcome, DB_ERROR);
    }

    fn refresh(&mut self, ctx: &mut PageContext) {
        if self.searched {
            let ticket = self.search.trigger(&self.filters.text.clone());
            self.execute(ctx, ticket);
        } else {
            self.load_all(ctx);
        }
    }

    pub fn clear_filters(&mut self, ctx: &mut PageContext) {
        self.filters = StudentFilters::default();
        self.load_all(ctx);
    }

    pub fn toggle_group_mode(&mut self) -> bool {
        self.group_mode = !self.group_mode;
        self.group_mode
    }

    fn find(&self, id: i64) -> Option<&Student> {
        self.search.items().iter().find(|s| s.code == Some(id))
    }

    fn pending_for(&self, id: i64) -> Pending {
        Pending {
            id,
            name: self.find(id).map(Student::full_name).unwrap_or_default(),
        }
    }

    pub fn request_state_change(&mut self, ctx: &mut PageContext, id: i64) {
        self.pending_state = Some(self.pending_for(id));
        ctx.modals.open(STATE_MODAL);
    }

    pub fn confirm_state_change(&mut self, ctx: &mut PageContext) {
        let Some(pending) = self.pending_state.take() else {
            return;
        };
        let result = ctx.api.send(
            Method::Patch,
            &format!("/estudiante/{}/cambiar-estado", pending.id),
            None,
        );
        ctx.modals.close(STATE_MODAL);
        match result {
            Ok(_) => {
                ctx.notify(Notice::success("Estado modificado exitosamente"));
                self.refresh(ctx);
            }
            Err(e) => ctx.notify(db_failure(&e)),
        }
    }

    /// Cancelling re-runs the search so the switch snaps back.
    pub fn cancel_state_change(&mut self, ctx: &mut PageContext) {
        self.pending_state = None;
        ctx.modals.close(STATE_MODAL);
        self.refresh(ctx);
    }

    pub fn open_assign(&mut self, ctx: &mut PageContext, id: i64) {
        if let Some(s) = self.find(id) {
            if !s.is_active() {
                ctx.notify(Notice::warning("Estudiante inactivo"));
                return;
            }
            if s.has_group() {
                ctx.notify(Notice::warning("El estudiante ya tiene grupo asignado"));
                return;
            }
        }
        let grades = match ctx.api.get::<Vec<Grade>>("/grados") {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(error = %e, "grade catalogue failed");
                ctx.notify(Notice::error("Error al cargar los grados disponibles"));
                Vec::new()
            }
        };
        self.assign = Some(AssignDialog {
            student_id: id,
            grades: grade_options(&grades),
            ..AssignDialog::default()
        });
        ctx.modals.open(ASSIGN_MODAL);
    }

    pub fn select_assign_grade(&mut self, ctx: &mut PageContext, grade_id: Option<i64>) {
        let Some(dialog) = self.assign.as_mut() else {
            return;
        };
        dialog.grade_id = grade_id;
        dialog.groups.clear();
        let Some(grade_id) = grade_id else {
            return;
        };
        match ctx
            .api
            .get_list::<Group>(&ApiRequest::new(Method::Get, format!("/grupos/grado/{grade_id}")))
        {
            Ok(groups) => dialog.groups = groups,
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(grade_id, error = %e, "groups of grade failed");
                ctx.notify(Notice::error("Error al cargar los grupos disponibles"));
            }
        }
    }

    pub fn confirm_assign(&mut self, ctx: &mut PageContext, group_id: Option<i64>) {
        let Some(dialog) = self.assign.as_ref() else {
            return;
        };
        let (Some(_), Some(group_id)) = (dialog.grade_id, group_id) else {
            ctx.notify(Notice::info("Por favor seleccione un grado y un grupo"));
            return;
        };
        if dialog
            .groups
            .iter()
            .any(|g| g.id == Some(group_id) && g.is_full())
        {
            ctx.notify(Notice::warning(GROUP_FULL));
            return;
        }
        let path = format!(
            "/estudiante/{}/asignar-grupo/{}",
            dialog.student_id, group_id
        );
        match ctx.api.send(Method::Post, &path, None) {
            Ok(_) => {
                self.assign = None;
                ctx.modals.close(ASSIGN_MODAL);
                ctx.notify(Notice::success("Estudiante asignado exitosamente"));
                self.refresh(ctx);
            }
            Err(e) if e.server_message() == Some(GROUP_FULL) => {
                ctx.notify(Notice::warning(GROUP_FULL));
            }
            Err(e) => ctx.notify(db_failure(&e)),
        }
    }

    pub fn open_edit(&mut self, ctx: &mut PageContext, id: i64) {
        match crud::fetch::<StudentResource>(ctx.api, id) {
            Ok(student) => {
                self.edit = Some((id, StudentDraft::from_record(&student)));
                ctx.modals.open(EDIT_MODAL);
            }
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn confirm_edit(&mut self, ctx: &mut PageContext, draft: StudentDraft) {
        let Some((id, _)) = self.edit.as_ref() else {
            return;
        };
        let id = *id;
        match crud::update::<StudentResource>(ctx.api, id, &draft) {
            Ok(notice) => {
                self.edit = None;
                ctx.modals.close(EDIT_MODAL);
                ctx.notify(notice);
                self.refresh(ctx);
            }
            Err(SaveFailure::Invalid(notice)) => ctx.notify(notice),
            Err(SaveFailure::Rejected { notice, status }) => {
                // 400 and 409 keep the form open for correction.
                if matches!(status, Some(400) | Some(409)) {
                    self.edit = Some((id, draft));
                    ctx.modals.open(EDIT_MODAL);
                } else {
                    ctx.modals.close(EDIT_MODAL);
                }
                ctx.notify(notice);
            }
        }
    }

    pub fn request_unlink(&mut self, ctx: &mut PageContext, id: i64) {
        self.pending_unlink = Some(self.pending_for(id));
        ctx.modals.open(UNLINK_MODAL);
    }

    pub fn confirm_unlink(&mut self, ctx: &mut PageContext) {
        let Some(pending) = self.pending_unlink.take() else {
            return;
        };
        let result = ctx.api.send(
            Method::Delete,
            &format!("/estudiante/{}/desvincular-grupo", pending.id),
            None,
        );
        ctx.modals.close(UNLINK_MODAL);
        match result {
            Ok(_) => {
                ctx.notify(Notice::success("Estudiante desvinculado satisfactoriamente"));
                self.refresh(ctx);
            }
            Err(e) => ctx.notify(db_failure(&e)),
        }
    }

    pub fn view(&self) -> Value {
        let group_mode = self.group_mode;
        json!({
            "page": "students",
            "filters": self.filters,
            "groupMode": group_mode,
            "optionsHeader": if group_mode { "Gestión de Grupos" } else { "Opciones" },
            "list": self.search.view().map(|s| row(s, group_mode)),
            "pendingStateChange": self.pending_state.as_ref().map(|p| json!({ "id": p.id, "name": p.name })),
            "pendingUnlink": self.pending_unlink.as_ref().map(|p| json!({ "id": p.id, "name": p.name })),
            "assign": self.assign.as_ref().map(|d| json!({
                "studentId": d.student_id,
                "grades": d.grades,
                "gradeId": d.grade_id,
                "groups": d.groups.iter().map(|g| json!({
                    "value": g.id,
                    "label": g.option_label(),
                    "full": g.is_full(),
                })).collect::<Vec<_>>(),
            })),
            "edit": self.edit.as_ref().map(|(id, draft)| json!({ "id": id, "form": draft })),
        })
    }
}

pub fn grade_options(grades: &[Grade]) -> Vec<SelectOption> {
    grades
        .iter()
        .filter_map(|g| {
            Some(SelectOption {
                value: g.id?,
                label: g.name.clone().unwrap_or_default(),
            })
        })
        .collect()
}
