//! Grade assignments per student and period, plus history and report cards.
//!
//! Guardians never search: the page lists the students linked to their account
//! and is read-only for them.

use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use super::{PageContext, RowAction, SelectOption};
use crate::api::{ApiError, ApiRequest, Method};
use crate::crud::CONNECTION_FAILED;
use crate::model::{self, Achievement, Category, GradeAssignment, GradeHistory, Period, Student};
use crate::report::{file_name_part, VIEWER_MODAL};
use crate::search::{InputOutcome, SearchController, Ticket, ViewState, SLOW_DEBOUNCE};
use crate::session::Role;
use crate::ui::{Notice, NoticeKind};

pub const ASSIGN_MODAL: &str = "modal-asignar-logro";
pub const MODIFY_MODAL: &str = "modal-modificar-asignacion";
pub const DELETE_MODAL: &str = "modal-confirmar-eliminar";
pub const REPORT_PERIOD_MODAL: &str = "modal-seleccionar-periodo-boletin";

const NO_STUDENT: &str = "No hay ningún estudiante seleccionado";
const NOT_APPLIED: &str = "El servidor no aplicó el cambio de logro. La calificación conserva su logro anterior.";

/// Achievement selector inside the assign/modify dialogs.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct Picker {
    category: Option<Category>,
    options: Vec<SelectOption>,
    enabled: bool,
    placeholder: &'static str,
}

impl Picker {
    fn new() -> Self {
        Self {
            placeholder: "Primero seleccione una categoría",
            ..Self::default()
        }
    }

    fn load(&mut self, ctx: &PageContext, category: Option<Category>) {
        self.category = category;
        self.options.clear();
        self.enabled = false;
        let Some(category) = category else {
            self.placeholder = "Primero seleccione una categoría";
            return;
        };
        let req = ApiRequest::new(Method::Get, format!("/logros/categoria/{}", category.as_str()));
        match ctx.api.get_list::<Achievement>(&req) {
            Ok(list) => {
                self.options = list
                    .into_iter()
                    .filter_map(|a| {
                        Some(SelectOption {
                            value: a.id?,
                            label: a.name.unwrap_or_default(),
                        })
                    })
                    .collect();
                self.enabled = true;
                self.placeholder = "Seleccione un logro";
            }
            Err(ApiError::Transport(_)) | Err(ApiError::Decode(_)) => {
                self.placeholder = "Error al cargar logros";
            }
            Err(_) => self.placeholder = "No hay logros en esta categoría",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPeriod {
    period: String,
    achievements: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryReport {
    student: String,
    total: u32,
    periods: Vec<HistoryPeriod>,
}

impl HistoryReport {
    /// Groups achievement names by period, keeping first-seen period order.
    pub fn from_history(h: &GradeHistory) -> Self {
        let mut periods: Vec<HistoryPeriod> = Vec::new();
        for a in &h.assignments {
            let period = a
                .period
                .as_ref()
                .and_then(|p| p.name.clone())
                .unwrap_or_default();
            let name = a
                .achievement
                .as_ref()
                .and_then(|l| l.name.clone())
                .unwrap_or_default();
            match periods.iter_mut().find(|p| p.period == period) {
                Some(p) => p.achievements.push(name),
                None => periods.push(HistoryPeriod {
                    period,
                    achievements: vec![name],
                }),
            }
        }
        Self {
            student: h
                .student
                .as_ref()
                .map(Student::full_name)
                .unwrap_or_default(),
            total: h.total.unwrap_or(h.assignments.len() as u32),
            periods,
        }
    }

    pub fn text(&self) -> String {
        let mut out = format!(
            "Estudiante: {}\nTotal de logros: {}\n",
            self.student, self.total
        );
        if !self.periods.is_empty() {
            out.push_str("\nLogros por período:\n");
            for p in &self.periods {
                out.push_str(&format!("\n{}:\n", p.period));
                for a in &p.achievements {
                    out.push_str(&format!("• {a}\n"));
                }
            }
        }
        out
    }
}

struct Modify {
    assignment: GradeAssignment,
    picker: Picker,
}

pub struct GradesPage {
    user_name: Option<String>,
    guardian: bool,
    periods: Vec<Period>,
    guardian_students: Vec<Student>,
    search: SearchController<Student>,
    student: Option<Student>,
    assignments: Vec<GradeAssignment>,
    period_filter: Option<i64>,
    assign: Option<Picker>,
    modify: Option<Modify>,
    pending_delete: Option<(i64, String)>,
    history: Option<HistoryReport>,
}

impl GradesPage {
    pub fn open(ctx: &mut PageContext) -> Self {
        let periods = match ctx.api.get::<Vec<Period>>("/periodos") {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "periods unavailable");
                Vec::new()
            }
        };
        let mut page = Self {
            user_name: ctx.session.user_name.clone(),
            guardian: ctx.session.is(Role::Guardian),
            periods,
            guardian_students: Vec::new(),
            search: SearchController::new(SLOW_DEBOUNCE),
            student: None,
            assignments: Vec::new(),
            period_filter: None,
            assign: None,
            modify: None,
            pending_delete: None,
            history: None,
        };
        if page.guardian {
            page.load_guardian_students(ctx);
        }
        page
    }

    fn load_guardian_students(&mut self, ctx: &mut PageContext) {
        let Some(user) = self.user_name.clone() else {
            ctx.notify(Notice::error("No se pudo identificar el usuario"));
            return;
        };
        let req = ApiRequest::new(Method::Get, format!("/estudiante/mis-estudiantes/{user}"));
        match ctx.api.get_list::<Student>(&req) {
            Ok(students) if students.is_empty() => {
                ctx.notify(Notice::info("No tiene estudiantes asignados"));
            }
            Ok(students) => {
                let first = students[0].clone();
                self.guardian_students = students;
                self.load_student(ctx, first);
            }
            Err(e) => {
                tracing::warn!(user = %user, error = %e, "guardian students failed");
                ctx.notify(Notice::error("Error al cargar estudiantes asignados"));
            }
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
            ctx.notify(Notice::warning(
                "Por favor ingrese un nombre o documento para buscar",
            ));
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
        self.assignments.clear();
        self.history = None;
    }

    /// Picks one of several matches, or another of the guardian's students.
    pub fn select_student(&mut self, ctx: &mut PageContext, code: i64) {
        let pool = if self.guardian {
            self.guardian_students.as_slice()
        } else {
            self.search.items()
        };
        let Some(student) = pool.iter().find(|s| s.code == Some(code)).cloned() else {
            return;
        };
        self.load_student(ctx, student);
    }

    fn load_student(&mut self, ctx: &mut PageContext, student: Student) {
        self.assignments = fetch_assignments(ctx, &student).unwrap_or_default();
        self.history = None;
        self.student = Some(student);
    }

    fn reload(&mut self, ctx: &mut PageContext) {
        if let Some(student) = self.student.clone() {
            self.load_student(ctx, student);
        }
    }

    pub fn filter_period(&mut self, period_id: Option<i64>) {
        self.period_filter = period_id;
    }

    fn visible(&self) -> impl Iterator<Item = &GradeAssignment> {
        let filter = self.period_filter;
        self.assignments
            .iter()
            .filter(move |a| filter.is_none() || a.period_id() == filter)
    }

    fn student_code(&self) -> Option<i64> {
        self.student.as_ref().and_then(|s| s.code)
    }

    pub fn open_assign(&mut self, ctx: &mut PageContext) {
        if self.student.is_none() {
            ctx.notify(Notice::warning(NO_STUDENT));
            return;
        }
        self.assign = Some(Picker::new());
        ctx.modals.open(ASSIGN_MODAL);
    }

    pub fn assign_category(&mut self, ctx: &mut PageContext, category: Option<Category>) {
        if let Some(picker) = self.assign.as_mut() {
            picker.load(ctx, category);
        }
    }

    pub fn confirm_assign(
        &mut self,
        ctx: &mut PageContext,
        period_id: Option<i64>,
        achievement_id: Option<i64>,
    ) {
        let Some(code) = self.student_code() else {
            ctx.notify(Notice::warning(NO_STUDENT));
            return;
        };
        let Some(period_id) = period_id else {
            ctx.notify(Notice::warning("Por favor seleccione un período"));
            return;
        };
        let Some(achievement_id) = achievement_id else {
            ctx.notify(Notice::warning("Por favor seleccione un logro"));
            return;
        };
        let body = json!({
            "codigoEstudiante": code,
            "idLogro": achievement_id,
            "idPeriodo": period_id,
            "nombreUsuario": self.user_name,
        });
        match ctx.api.send(Method::Post, "/calificaciones/asignar", Some(body)) {
            Ok(_) => {
                self.assign = None;
                ctx.modals.close(ASSIGN_MODAL);
                ctx.notify(Notice::success("Logro asignado exitosamente"));
                self.reload(ctx);
            }
            Err(e) => ctx.notify(failure(&e, "Error al asignar el logro")),
        }
    }

    pub fn open_modify(&mut self, ctx: &mut PageContext, assignment_id: i64) {
        let Some(student) = self.student.clone() else {
            ctx.notify(Notice::warning(NO_STUDENT));
            return;
        };
        let found = fetch_assignments(ctx, &student)
            .ok()
            .and_then(|list| list.into_iter().find(|a| a.id == Some(assignment_id)));
        let Some(assignment) = found else {
            ctx.notify(Notice::error("Error al cargar los datos de la calificación"));
            return;
        };
        self.modify = Some(Modify {
            assignment,
            picker: Picker {
                placeholder: "Seleccione una categoría",
                ..Picker::new()
            },
        });
        ctx.modals.open(MODIFY_MODAL);
    }

    pub fn modify_category(&mut self, ctx: &mut PageContext, category: Option<Category>) {
        if let Some(m) = self.modify.as_mut() {
            m.picker.load(ctx, category);
            if category.is_none() {
                m.picker.placeholder = "Seleccione una categoría";
            }
        }
    }

    /// Replaces the achievement in place. Success is reported only once the
    /// stored row carries the new achievement; a failed or ignored update
    /// leaves the dialog open and the assignment as it was.
    pub fn confirm_modify(&mut self, ctx: &mut PageContext, achievement_id: Option<i64>) {
        let Some(achievement_id) = achievement_id else {
            ctx.notify(Notice::warning("Por favor seleccione un nuevo logro"));
            return;
        };
        let Some((id, period_id)) = self
            .modify
            .as_ref()
            .and_then(|m| Some((m.assignment.id?, m.assignment.period_id())))
        else {
            ctx.notify(Notice::error("Error: No se puede identificar la calificación"));
            return;
        };
        let body = json!({
            "idLogro": achievement_id,
            "idPeriodo": period_id,
            "nombreUsuario": self.user_name,
        });
        let reply = match ctx.api.send(Method::Put, &format!("/calificaciones/{id}"), Some(body)) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(assignment = id, error = %e, "assignment update failed");
                ctx.notify(failure(&e, "Error al modificar el logro"));
                return;
            }
        };

        // The reply echoes the stored row when the backend sends one; otherwise
        // the reloaded list is the only evidence.
        let echoed = serde_json::from_value::<GradeAssignment>(reply)
            .ok()
            .and_then(|a| a.achievement_id());
        self.reload(ctx);
        let stored = echoed.or_else(|| {
            self.assignments
                .iter()
                .find(|a| a.id == Some(id))
                .and_then(GradeAssignment::achievement_id)
        });
        if stored != Some(achievement_id) {
            tracing::warn!(
                assignment = id,
                requested = achievement_id,
                stored = ?stored,
                "backend accepted the update but kept the previous achievement"
            );
            ctx.notify(Notice::error(NOT_APPLIED));
            return;
        }

        tracing::info!(assignment = id, achievement = achievement_id, "assignment updated");
        self.modify = None;
        ctx.modals.close(MODIFY_MODAL);
        ctx.notify(Notice::success("Logro modificado exitosamente"));
    }

    pub fn request_delete(&mut self, ctx: &mut PageContext, assignment_id: i64) {
        let name = self
            .assignments
            .iter()
            .find(|a| a.id == Some(assignment_id))
            .and_then(|a| a.achievement.as_ref())
            .and_then(|l| l.name.clone())
            .unwrap_or_default();
        self.pending_delete = Some((assignment_id, name));
        ctx.modals.open(DELETE_MODAL);
    }

    pub fn confirm_delete(&mut self, ctx: &mut PageContext) {
        let Some((id, _)) = self.pending_delete.take() else {
            return;
        };
        let result = ctx
            .api
            .send(Method::Delete, &format!("/calificaciones/{id}"), None);
        ctx.modals.close(DELETE_MODAL);
        match result {
            Ok(_) => {
                ctx.notify(Notice::success("Logro eliminado exitosamente"));
                self.reload(ctx);
            }
            Err(e) => ctx.notify(failure(&e, "Error al eliminar el logro")),
        }
    }

    pub fn history(&mut self, ctx: &mut PageContext) {
        let Some(code) = self.student_code() else {
            ctx.notify(Notice::warning(NO_STUDENT));
            return;
        };
        match ctx
            .api
            .get::<GradeHistory>(&format!("/calificaciones/historial/{code}"))
        {
            Ok(h) => {
                let report = HistoryReport::from_history(&h);
                ctx.notify(Notice::new(
                    NoticeKind::Info,
                    "Histórico de Logros",
                    report.text(),
                ));
                self.history = Some(report);
            }
            Err(e) => {
                tracing::warn!(student = code, error = %e, "history failed");
                ctx.notify(Notice::error("Error al consultar el historial"));
            }
        }
    }

    pub fn open_report_card(&mut self, ctx: &mut PageContext) {
        if self.student.is_none() {
            ctx.notify(Notice::warning(NO_STUDENT));
            return;
        }
        ctx.modals.open(REPORT_PERIOD_MODAL);
    }

    pub fn confirm_report_card(&mut self, ctx: &mut PageContext, period_id: Option<i64>) {
        let Some(student) = self.student.as_ref() else {
            ctx.notify(Notice::warning(NO_STUDENT));
            return;
        };
        let Some(period_id) = period_id else {
            ctx.notify(Notice::warning("Por favor seleccione un periodo"));
            return;
        };
        ctx.modals.close(REPORT_PERIOD_MODAL);

        let period_name = self
            .periods
            .iter()
            .find(|p| p.id == Some(period_id))
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| period_id.to_string());
        let file_name = format!(
            "Boletin_{}_{}.pdf",
            file_name_part(&student.full_name()),
            file_name_part(&period_name)
        );
        let path = format!(
            "/boletin/generar/{}/{}",
            student.code.unwrap_or_default(),
            period_id
        );
        match ctx
            .reports
            .fetch(ctx.api, &path, &file_name, "Error al generar el boletín")
        {
            Ok(_) => ctx.modals.open(VIEWER_MODAL),
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn view(&self) -> Value {
        let editable = !self.guardian;
        let periods: Vec<SelectOption> = self
            .periods
            .iter()
            .filter_map(|p| {
                Some(SelectOption {
                    value: p.id?,
                    label: p.name.clone().unwrap_or_default(),
                })
            })
            .collect();
        let rows: Vec<Value> = self.visible().map(|a| assignment_row(a, editable)).collect();
        json!({
            "page": "grades",
            "guardianMode": self.guardian,
            "showSearch": !self.guardian,
            "showActions": editable && self.student.is_some(),
            "periods": periods,
            "periodFilter": self.period_filter,
            "guardianStudents": self.guardian_students.iter().filter_map(|s| Some(SelectOption {
                value: s.code?,
                label: s.full_name(),
            })).collect::<Vec<_>>(),
            "matches": self.search.view().map(|s| json!({
                "code": s.code,
                "name": s.full_name(),
                "group": s.group_label(),
            })),
            "student": self.student.as_ref().map(|s| json!({
                "code": s.code,
                "name": s.full_name(),
                "total": rows.len(),
            })),
            "assignments": rows,
            "assign": self.assign,
            "modify": self.modify.as_ref().map(|m| json!({
                "id": m.assignment.id,
                "period": m.assignment.period.as_ref().and_then(|p| p.name.clone()),
                "currentCategory": m.assignment.achievement.as_ref()
                    .and_then(|l| l.category.as_deref())
                    .map(category_label),
                "currentAchievement": m.assignment.achievement.as_ref().and_then(|l| l.name.clone()),
                "picker": m.picker,
            })),
            "pendingDelete": self.pending_delete.as_ref().map(|(id, name)| json!({ "id": id, "name": name })),
            "history": self.history,
        })
    }
}

fn fetch_assignments(ctx: &PageContext, student: &Student) -> Result<Vec<GradeAssignment>, ApiError> {
    let code = student.code.unwrap_or_default();
    let req = ApiRequest::new(Method::Get, format!("/calificaciones/estudiante/{code}"));
    ctx.api.get_list(&req).map_err(|e| {
        tracing::debug!(student = code, error = %e, "assignments unavailable");
        e
    })
}

fn failure(err: &ApiError, fallback: &str) -> Notice {
    match err {
        ApiError::Transport(_) => Notice::error(CONNECTION_FAILED),
        other => Notice::error(other.user_message(fallback)),
    }
}

fn category_label(raw: &str) -> String {
    Category::parse(raw)
        .map(|c| c.display_name().to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn assignment_row(a: &GradeAssignment, editable: bool) -> Value {
    let achievement = a.achievement.clone().unwrap_or_default();
    let category = achievement.category.clone().unwrap_or_default();
    let actions = if editable {
        vec![
            RowAction::new("edit", true, "Editar"),
            RowAction::new("delete", true, "Eliminar"),
        ]
    } else {
        Vec::new()
    };
    json!({
        "id": a.id,
        "period": a.period.as_ref().and_then(|p| p.name.clone()),
        "category": category_label(&category),
        "categoryClass": format!("categoria-{}", category.to_lowercase()),
        "achievement": achievement.name,
        "assignedAt": model::display_date(a.assigned_at.as_deref()),
        "actions": actions,
    })
}
