use std::time::Instant;

use chrono::{Duration as Days, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::students::grade_options;
use super::PageContext;
use crate::api::{ApiError, ApiRequest, Method};
use crate::crud::{
    self, Creatable, FormMode, Labels, Removable, Resource, SaveFailure, CONNECTION_FAILED,
};
use crate::model::{Grade, Group, Student, GROUP_CAPACITY};
use crate::report::{file_name_part, VIEWER_MODAL};
use crate::search::{InputOutcome, SearchController, Ticket, ViewState, FAST_DEBOUNCE};
use crate::session::Role;
use crate::ui::Notice;
use crate::validate::{self, ValidationError};

pub const FORM_MODAL: &str = "modal-grupo";
pub const DELETE_MODAL: &str = "modal-confirmar-eliminar";
pub const CITATIONS_MODAL: &str = "modal-citaciones";

const NOTHING_SELECTED: &str = "No hay ningún grupo seleccionado";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupDraft {
    pub grade_id: Option<i64>,
    pub number: Option<i64>,
    pub director_document: Option<String>,
}

impl GroupDraft {
    fn from_record(g: &Group) -> Self {
        Self {
            grade_id: g.grade.as_ref().and_then(|gr| gr.id),
            number: g.number,
            director_document: g
                .director
                .as_ref()
                .and_then(|d| d.persona.as_ref())
                .and_then(|p| p.document.clone()),
        }
    }
}

pub struct GroupResource;

impl Resource for GroupResource {
    type Record = Group;
    type Draft = GroupDraft;

    const NAME: &'static str = "group";
    const LABELS: Labels = Labels {
        updated: "Grupo actualizado exitosamente",
        load_failed: "Error al cargar el grupo",
        save_failed: "Error al guardar el grupo",
    };

    fn item_path(id: i64) -> String {
        format!("/grupos/{id}")
    }

    fn update_path(id: i64) -> String {
        format!("/grupos/actualizar/{id}")
    }

    fn body(draft: &GroupDraft, _mode: FormMode) -> Result<Value, ValidationError> {
        const MISSING: &str = "Por favor complete todos los campos obligatorios";
        let grade_id = validate::required_id("grado", draft.grade_id, MISSING)?;
        let number = validate::required_id("numeroGrupo", draft.number, MISSING)?;
        Ok(json!({
            "grado": { "idGrado": grade_id },
            "numeroGrupo": number,
            "documentoDirector": validate::optional(draft.director_document.as_deref()),
        }))
    }
}

impl Creatable for GroupResource {
    const CREATED: &'static str = "Grupo creado exitosamente";

    fn create_path() -> String {
        "/grupos/crear".to_string()
    }
}

impl Removable for GroupResource {
    const DELETED: &'static str = "Grupo eliminado exitosamente";
    const DELETE_FAILED: &'static str = "Error al eliminar el grupo";

    fn delete_path(id: i64) -> String {
        format!("/grupos/eliminar/{id}")
    }
}

fn title(g: &Group) -> String {
    format!("{} - Grupo {}", g.grade_name(), g.number.unwrap_or_default())
}

fn card(g: &Group) -> Value {
    json!({
        "id": g.id,
        "title": title(g),
        "director": g.director_name().unwrap_or_else(|| "Sin director asignado".to_string()),
        "students": format!("{} / {}", g.count(), GROUP_CAPACITY),
        "capacity": format!("{}%", g.occupancy_percent()),
        "full": g.is_full(),
    })
}

fn roster_row(s: &Student) -> Value {
    let state = s.state.clone().unwrap_or_else(|| "Pendiente".to_string());
    let class = match state.as_str() {
        "Activo" => "estado-activo",
        "Inactivo" => "estado-inactivo",
        _ => "estado-pendiente",
    };
    let persona = s.persona.as_ref();
    json!({
        "code": s.code,
        "firstName": persona.and_then(|p| p.first_name.clone()).unwrap_or_else(|| "Sin Nombre".to_string()),
        "lastName": persona.and_then(|p| p.last_name.clone()).unwrap_or_else(|| "Sin Apellido".to_string()),
        "state": state,
        "stateClass": class,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CitationEntry {
    code: Option<i64>,
    name: String,
    guardian: Option<String>,
    selectable: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CitationDialog {
    group: String,
    total: usize,
    min_date: String,
    date: String,
    students: Vec<CitationEntry>,
}

#[derive(Debug, Deserialize)]
struct CitationReply {
    #[serde(rename = "citacionesCreadas", default)]
    created: Option<u64>,
}

const DATE_TIME_INPUT: &str = "%Y-%m-%dT%H:%M";

/// Tomorrow at 14:00, the suggested citation slot.
pub fn default_citation_time(now: NaiveDateTime) -> NaiveDateTime {
    let two_pm = NaiveTime::from_hms_opt(14, 0, 0).unwrap_or_default();
    (now.date() + Days::days(1)).and_time(two_pm)
}

pub struct GroupsPage {
    search: SearchController<Group>,
    grades: Vec<Grade>,
    selected: Option<Group>,
    roster: Vec<Student>,
    can_manage: bool,
    form: Option<(FormMode, GroupDraft)>,
    pending_delete: Option<String>,
    citations: Option<CitationDialog>,
}

impl GroupsPage {
    pub fn open(ctx: &mut PageContext) -> Self {
        let grades = match ctx.api.get::<Vec<Grade>>("/grados") {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(error = %e, "grade catalogue failed");
                ctx.notify(Notice::error("Error al cargar los grados disponibles"));
                Vec::new()
            }
        };
        Self {
            search: SearchController::new(FAST_DEBOUNCE),
            grades,
            selected: None,
            roster: Vec::new(),
            can_manage: !ctx.session.is(Role::Teacher),
            form: None,
            pending_delete: None,
            citations: None,
        }
    }

    pub fn input(&mut self, text: &str, now: Instant) -> InputOutcome {
        let outcome = self.search.input(text, now);
        if !matches!(outcome, InputOutcome::Scheduled { .. }) {
            self.clear_selection();
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

    /// Enter in the search box. One character is enough here: `3` finds every group 3.
    pub fn search(&mut self, ctx: &mut PageContext, query: &str) {
        if query.trim().is_empty() {
            self.search.reset();
            self.clear_selection();
            return;
        }
        let ticket = self.search.trigger(query);
        self.execute(ctx, ticket);
    }

    fn clear_selection(&mut self) {
        self.selected = None;
        self.roster.clear();
    }

    fn execute(&mut self, ctx: &mut PageContext, ticket: Ticket) {
        self.clear_selection();
        let outcome = self.find_groups(ctx, &ticket.query);
        if let Err(e) = &outcome {
            tracing::warn!(query = %ticket.query, error = %e, "group search failed");
        }
        if !self.search.complete(ticket.token, outcome, "Error al buscar grupos") {
            return;
        }
        if let [only] = self.search.items() {
            let only = only.clone();
            self.show_group(ctx, only);
        }
        if let ViewState::Error { message } = self.search.view() {
            let message = message.clone();
            ctx.notify(Notice::error(message));
        }
    }

    /// Grade names first; a bare number falls back to matching group numbers.
    fn find_groups(&self, ctx: &PageContext, query: &str) -> Result<Vec<Group>, ApiError> {
        let needle = query.trim().to_lowercase();
        let grades = ctx.api.get::<Vec<Grade>>("/grados")?;
        let matching: Vec<&Grade> = grades
            .iter()
            .filter(|g| {
                g.name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .collect();

        if !matching.is_empty() {
            let mut found = Vec::new();
            for grade in matching {
                let Some(id) = grade.id else { continue };
                match groups_of_grade(ctx, id) {
                    Ok(groups) => found.extend(groups),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
            return Ok(found);
        }

        let Ok(number) = needle.parse::<i64>() else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for id in grades.iter().filter_map(|g| g.id) {
            // Grades whose groups cannot be listed are skipped.
            if let Ok(groups) = groups_of_grade(ctx, id) {
                found.extend(groups.into_iter().filter(|g| g.number == Some(number)));
            }
        }
        Ok(found)
    }

    /// Card click: shows one group and its roster.
    pub fn select_group(&mut self, ctx: &mut PageContext, id: i64) {
        let Some(group) = self
            .search
            .items()
            .iter()
            .find(|g| g.id == Some(id))
            .cloned()
        else {
            ctx.notify(Notice::warning(NOTHING_SELECTED));
            return;
        };
        self.show_group(ctx, group);
    }

    fn show_group(&mut self, ctx: &mut PageContext, group: Group) {
        let id = group.id.unwrap_or_default();
        self.selected = Some(group);
        let req = ApiRequest::new(Method::Get, format!("/estudiante/grupo/{id}"));
        self.roster = match ctx.api.get_list::<Student>(&req) {
            Ok(students) => students,
            Err(ApiError::Transport(e)) | Err(ApiError::Decode(e)) => {
                tracing::warn!(group = id, error = %e, "roster failed");
                ctx.notify(Notice::error("Error al cargar los estudiantes del grupo"));
                Vec::new()
            }
            Err(_) => Vec::new(),
        };
    }

    fn refresh(&mut self, ctx: &mut PageContext) {
        let Some(query) = self.search.last_query().map(str::to_string) else {
            return;
        };
        let ticket = self.search.trigger(&query);
        self.execute(ctx, ticket);
    }

    pub fn open_create(&mut self, ctx: &mut PageContext) {
        self.form = Some((FormMode::Create, GroupDraft::default()));
        ctx.modals.open(FORM_MODAL);
    }

    pub fn open_edit(&mut self, ctx: &mut PageContext) {
        let Some(group) = self.selected.as_ref() else {
            ctx.notify(Notice::warning(NOTHING_SELECTED));
            return;
        };
        let mode = FormMode::Edit {
            id: group.id.unwrap_or_default(),
        };
        self.form = Some((mode, GroupDraft::from_record(group)));
        ctx.modals.open(FORM_MODAL);
    }

    pub fn save(&mut self, ctx: &mut PageContext, draft: GroupDraft) {
        let mode = match self.form.as_ref() {
            Some((mode, _)) => *mode,
            None => FormMode::Create,
        };
        match crud::save::<GroupResource>(ctx.api, mode, &draft) {
            Ok(notice) => {
                self.form = None;
                ctx.modals.close(FORM_MODAL);
                ctx.notify(notice);
                self.refresh(ctx);
            }
            Err(SaveFailure::Invalid(notice)) => ctx.notify(notice),
            Err(SaveFailure::Rejected { notice, status }) => {
                self.form = Some((mode, draft));
                if status.is_none() {
                    ctx.modals.close(FORM_MODAL);
                }
                ctx.notify(notice);
            }
        }
    }

    pub fn request_delete(&mut self, ctx: &mut PageContext) {
        let Some(group) = self.selected.as_ref() else {
            ctx.notify(Notice::warning(NOTHING_SELECTED));
            return;
        };
        self.pending_delete = Some(title(group));
        ctx.modals.open(DELETE_MODAL);
    }

    pub fn confirm_delete(&mut self, ctx: &mut PageContext) {
        let Some(id) = self.selected.as_ref().and_then(|g| g.id) else {
            return;
        };
        let result = crud::delete::<GroupResource>(ctx.api, id);
        self.pending_delete = None;
        ctx.modals.close(DELETE_MODAL);
        match result {
            Ok(notice) => {
                self.clear_selection();
                self.search.reset();
                ctx.notify(notice);
            }
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn roster_report(&mut self, ctx: &mut PageContext) {
        let Some(group) = self.selected.as_ref() else {
            ctx.notify(Notice::warning(NOTHING_SELECTED));
            return;
        };
        let id = group.id.unwrap_or_default();
        let file_name = format!(
            "Listado_{}_Grupo{}.pdf",
            file_name_part(&group.grade_name()),
            group.number.unwrap_or_default()
        );
        let path = format!("/grupos/{id}/generar-listado-pdf");
        match ctx
            .reports
            .fetch(ctx.api, &path, &file_name, "Error al generar el listado PDF")
        {
            Ok(_) => ctx.modals.open(VIEWER_MODAL),
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn open_citations(&mut self, ctx: &mut PageContext, now: NaiveDateTime) {
        let Some(group) = self.selected.as_ref() else {
            ctx.notify(Notice::warning(NOTHING_SELECTED));
            return;
        };
        if self.roster.is_empty() {
            ctx.notify(Notice::warning("Este grupo no tiene estudiantes asignados"));
            return;
        }
        let students = self
            .roster
            .iter()
            .map(|s| {
                let guardian = s.guardian.as_ref().filter(|g| g.id.is_some());
                CitationEntry {
                    code: s.code,
                    name: s.full_name(),
                    guardian: guardian.map(|g| {
                        g.persona
                            .as_ref()
                            .map(|p| p.full_name())
                            .unwrap_or_else(|| "Sin información".to_string())
                    }),
                    selectable: guardian.is_some(),
                }
            })
            .collect();
        self.citations = Some(CitationDialog {
            group: title(group),
            total: self.roster.len(),
            min_date: now.format(DATE_TIME_INPUT).to_string(),
            date: default_citation_time(now).format(DATE_TIME_INPUT).to_string(),
            students,
        });
        ctx.modals.open(CITATIONS_MODAL);
    }

    pub fn submit_citations(&mut self, ctx: &mut PageContext, date: Option<&str>, codes: &[i64]) {
        let Some(dialog) = self.citations.as_ref() else {
            return;
        };
        let Some(date) = validate::optional(date) else {
            ctx.notify(Notice::warning(
                "Por favor seleccione una fecha y hora para la citación",
            ));
            return;
        };
        // Students without a guardian cannot be cited.
        let selected: Vec<i64> = codes
            .iter()
            .copied()
            .filter(|c| {
                dialog
                    .students
                    .iter()
                    .any(|s| s.code == Some(*c) && s.selectable)
            })
            .collect();
        if selected.is_empty() {
            ctx.notify(Notice::warning("Por favor seleccione al menos un estudiante"));
            return;
        }
        let body = json!({ "codigosEstudiantes": selected, "fechaCitacion": date });
        match ctx
            .api
            .send(Method::Post, "/citaciones/crear-multiples", Some(body))
        {
            Ok(reply) => {
                let created = serde_json::from_value::<CitationReply>(reply)
                    .ok()
                    .and_then(|r| r.created)
                    .unwrap_or(selected.len() as u64);
                tracing::info!(created, "citations created");
                self.citations = None;
                ctx.modals.close(CITATIONS_MODAL);
                ctx.notify(Notice::success(format!(
                    "Se generaron {created} citación(es) exitosamente"
                )));
            }
            Err(ApiError::Transport(_)) => ctx.notify(Notice::error(CONNECTION_FAILED)),
            Err(e) => ctx.notify(Notice::error(
                e.user_message("Error al generar las citaciones"),
            )),
        }
    }

    pub fn view(&self) -> Value {
        let selected = self.selected.as_ref();
        json!({
            "page": "groups",
            "canManage": self.can_manage,
            "grades": grade_options(&self.grades),
            "query": self.search.last_query(),
            "list": self.search.view().map(card),
            "selected": selected.map(|g| json!({
                "id": g.id,
                "title": title(g),
                "roster": self.roster.iter().map(roster_row).collect::<Vec<_>>(),
                "canEdit": self.can_manage,
                "canDelete": self.can_manage,
            })),
            "form": self.form.as_ref().map(|(mode, draft)| json!({ "mode": mode, "draft": draft })),
            "pendingDelete": self.pending_delete,
            "citations": self.citations,
        })
    }
}

fn groups_of_grade(ctx: &PageContext, grade_id: i64) -> Result<Vec<Group>, ApiError> {
    ctx.api
        .get_list::<Group>(&ApiRequest::new(Method::Get, format!("/grupos/grado/{grade_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::testing::Harness;
    use crate::ui::NoticeKind;
    use chrono::NaiveDate;

    fn grades() -> Value {
        json!([
            { "idGrado": 1, "nombreGrado": "Sexto" },
            { "idGrado": 2, "nombreGrado": "Séptimo" }
        ])
    }

    fn group(id: i64, number: i64, grade: &str, count: u32) -> Value {
        json!({
            "idGrupo": id,
            "numeroGrupo": number,
            "numeroEstudiantes": count,
            "grado": { "nombreGrado": grade },
        })
    }

    fn harness(role: Role) -> Harness {
        let h = Harness::new(Some(role), "usr");
        h.backend.on(Method::Get, "/grados", 200, grades());
        h.backend.on(
            Method::Get,
            "/grupos/grado/1",
            200,
            json!([group(11, 1, "Sexto", 4), group(12, 2, "Sexto", 10)]),
        );
        h.backend.on(
            Method::Get,
            "/grupos/grado/2",
            200,
            json!([group(21, 1, "Séptimo", 7)]),
        );
        h
    }

    #[test]
    fn grade_name_search_lists_cards() {
        let mut h = harness(Role::Administrator);
        let (mut page, _) = h.run(GroupsPage::open);
        h.run(|ctx| page.search(ctx, "sex"));
        let view = page.view();
        assert_eq!(view["list"]["state"], "results");
        assert_eq!(view["list"]["items"][1]["students"], "10 / 10");
        assert_eq!(view["list"]["items"][1]["capacity"], "100%");
        assert_eq!(view["list"]["items"][0]["director"], "Sin director asignado");
        assert!(view["selected"].is_null());
    }

    #[test]
    fn numeric_query_matches_group_numbers_across_grades() {
        let mut h = harness(Role::Teacher);
        h.backend.on(Method::Get, "/estudiante/grupo/12", 200, json!([]));
        let (mut page, _) = h.run(GroupsPage::open);
        h.run(|ctx| page.search(ctx, "1"));
        assert_eq!(page.view()["list"]["items"].as_array().map(Vec::len), Some(2));

        h.run(|ctx| page.search(ctx, "2"));
        let view = page.view();
        assert_eq!(view["selected"]["title"], "Sexto - Grupo 2");
        assert_eq!(view["canManage"], false);
        assert_eq!(h.backend.calls_to(Method::Get, "/estudiante/grupo/12"), 1);
    }

    #[test]
    fn unknown_text_is_no_results() {
        let mut h = harness(Role::Administrator);
        let (mut page, _) = h.run(GroupsPage::open);
        h.run(|ctx| page.search(ctx, "Once"));
        assert_eq!(page.view()["list"]["state"], "noResults");
    }

    #[test]
    fn save_without_grade_is_refused_locally() {
        let mut h = harness(Role::Administrator);
        let (mut page, _) = h.run(GroupsPage::open);
        h.run(|ctx| page.open_create(ctx));
        let draft = GroupDraft {
            number: Some(3),
            ..GroupDraft::default()
        };
        let (_, notice) = h.run(|ctx| page.save(ctx, draft));
        assert_eq!(
            notice.expect("warning").text,
            "Por favor complete todos los campos obligatorios"
        );
        assert_eq!(h.backend.calls_to(Method::Post, "/grupos/crear"), 0);
        assert!(h.modals.is_open(FORM_MODAL));
    }

    #[test]
    fn delete_clears_selection() {
        let mut h = harness(Role::Administrator);
        h.backend.on(Method::Get, "/estudiante/grupo/21", 200, json!([]));
        h.backend.on(Method::Delete, "/grupos/eliminar/21", 204, Value::Null);
        let (mut page, _) = h.run(GroupsPage::open);
        h.run(|ctx| page.search(ctx, "sépt"));
        h.run(|ctx| page.request_delete(ctx));
        assert_eq!(page.view()["pendingDelete"], "Séptimo - Grupo 1");
        let (_, notice) = h.run(|ctx| page.confirm_delete(ctx));
        assert_eq!(notice.expect("success").text, "Grupo eliminado exitosamente");
        let view = page.view();
        assert!(view["selected"].is_null());
        assert_eq!(view["list"]["state"], "empty");
    }

    #[test]
    fn citations_skip_students_without_guardian() {
        let mut h = harness(Role::Administrator);
        h.backend.on(
            Method::Get,
            "/estudiante/grupo/21",
            200,
            json!([
                { "codigoEstudiante": 1, "persona": { "nombre": "Ana", "apellido": "Ruiz" },
                  "acudiente": { "idAcudiente": 5, "persona": { "nombre": "Rosa", "apellido": "Ruiz" } } },
                { "codigoEstudiante": 2, "persona": { "nombre": "Leo", "apellido": "Gil" } }
            ]),
        );
        h.backend.on(
            Method::Post,
            "/citaciones/crear-multiples",
            200,
            json!({ "citacionesCreadas": 1 }),
        );
        let (mut page, _) = h.run(GroupsPage::open);
        h.run(|ctx| page.search(ctx, "sépt"));
        let now = NaiveDate::from_ymd_opt(2024, 5, 10)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .expect("now");
        h.run(|ctx| page.open_citations(ctx, now));
        let view = page.view();
        assert_eq!(view["citations"]["date"], "2024-05-11T14:00");
        assert_eq!(view["citations"]["students"][1]["selectable"], false);

        let (_, notice) = h.run(|ctx| page.submit_citations(ctx, Some("2024-05-11T14:00"), &[2]));
        assert_eq!(
            notice.expect("warning").text,
            "Por favor seleccione al menos un estudiante"
        );

        let (_, notice) = h.run(|ctx| page.submit_citations(ctx, Some("2024-05-11T14:00"), &[1, 2]));
        let notice = notice.expect("success");
        assert_eq!(notice.kind, NoticeKind::Success);
        assert_eq!(notice.text, "Se generaron 1 citación(es) exitosamente");
        let post = h.backend.calls().pop().expect("post");
        assert_eq!(
            post.body,
            Some(json!({ "codigosEstudiantes": [1], "fechaCitacion": "2024-05-11T14:00" }))
        );
    }

    #[test]
    fn roster_report_opens_viewer_with_listing_name() {
        let mut h = harness(Role::Administrator);
        h.backend.on(Method::Get, "/estudiante/grupo/21", 200, json!([]));
        h.backend.on_bytes(
            Method::Get,
            "/grupos/21/generar-listado-pdf",
            200,
            "application/pdf",
            b"%PDF-1.4 listado",
        );
        let (mut page, _) = h.run(GroupsPage::open);
        h.run(|ctx| page.search(ctx, "sépt"));
        let (_, notice) = h.run(|ctx| page.roster_report(ctx));
        assert!(notice.is_none());
        assert!(h.modals.is_open(VIEWER_MODAL));
        let doc = h.reports.current().expect("document");
        assert_eq!(doc.file_name, "Listado_Séptimo_Grupo1.pdf");
    }
}
