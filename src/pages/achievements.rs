use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{PageContext, RowAction};
use crate::api::{ApiRequest, Method};
use crate::crud::{self, Creatable, FormMode, Labels, Removable, Resource, SaveFailure};
use crate::model::{Achievement, Category};
use crate::search::ViewState;
use crate::ui::Notice;
use crate::validate::{self, ValidationError};

pub const FORM_MODAL: &str = "modal-logro";
pub const DELETE_MODAL: &str = "modal-confirmar-eliminar";

const NAME_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AchievementDraft {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Filled from the selected category, never from the form.
    #[serde(skip_deserializing)]
    pub category: Option<Category>,
}

pub struct AchievementResource;

impl Resource for AchievementResource {
    type Record = Achievement;
    type Draft = AchievementDraft;

    const NAME: &'static str = "achievement";
    const LABELS: Labels = Labels {
        updated: "Logro actualizado exitosamente",
        load_failed: "Error al cargar los datos del logro",
        save_failed: "Error al guardar el logro",
    };

    fn item_path(id: i64) -> String {
        format!("/logros/{id}")
    }

    fn body(draft: &AchievementDraft, _mode: FormMode) -> Result<Value, ValidationError> {
        let name = validate::required(
            "nombreLogro",
            draft.name.as_deref(),
            "El nombre del logro es obligatorio",
        )?;
        let description = validate::required(
            "descripcion",
            draft.description.as_deref(),
            "La descripción es obligatoria",
        )?;
        validate::max_chars(
            "nombreLogro",
            &name,
            NAME_MAX,
            "El nombre del logro no puede exceder 200 caracteres",
        )?;
        validate::max_chars(
            "descripcion",
            &description,
            DESCRIPTION_MAX,
            "La descripción no puede exceder 500 caracteres",
        )?;
        let category = draft.category.ok_or_else(|| {
            ValidationError::new("categoria", "Por favor seleccione una categoría primero")
        })?;
        Ok(json!({
            "nombreLogro": name,
            "descripcion": description,
            "categoria": category.as_str(),
        }))
    }
}

impl Creatable for AchievementResource {
    const CREATED: &'static str = "Logro creado exitosamente";

    fn create_path() -> String {
        "/logros".to_string()
    }
}

impl Removable for AchievementResource {
    const DELETED: &'static str = "Logro eliminado exitosamente";
    const DELETE_FAILED: &'static str = "Error al eliminar el logro";
}

fn row(a: &Achievement) -> Value {
    json!({
        "id": a.id,
        "name": a.name,
        "description": a.description,
        "actions": [
            RowAction::new("edit", true, "Editar logro"),
            RowAction::new("delete", true, "Eliminar logro"),
        ],
    })
}

pub struct AchievementsPage {
    category: Option<Category>,
    list: ViewState<Achievement>,
    form: Option<(FormMode, AchievementDraft)>,
    pending_delete: Option<(i64, String)>,
}

impl AchievementsPage {
    /// Nothing loads until a category is picked.
    pub fn open() -> Self {
        Self {
            category: None,
            list: ViewState::Empty,
            form: None,
            pending_delete: None,
        }
    }

    pub fn select_category(&mut self, ctx: &mut PageContext, category: Category) {
        self.category = Some(category);
        self.reload(ctx);
    }

    fn reload(&mut self, ctx: &mut PageContext) {
        let Some(category) = self.category else {
            return;
        };
        self.list = ViewState::Loading;
        let req = ApiRequest::new(Method::Get, format!("/logros/categoria/{}", category.as_str()));
        let outcome = ctx.api.get_list::<Achievement>(&req);
        match &outcome {
            Err(e) if !e.is_not_found() => {
                tracing::warn!(category = category.as_str(), error = %e, "achievement list failed");
                ctx.notify(Notice::error("Error al cargar los logros"));
            }
            _ => {}
        }
        self.list = ViewState::from_outcome(outcome, "Error al cargar los logros");
    }

    pub fn open_create(&mut self, ctx: &mut PageContext) {
        if self.category.is_none() {
            ctx.notify(Notice::warning("Por favor seleccione una categoría primero"));
            return;
        }
        self.form = Some((FormMode::Create, AchievementDraft::default()));
        ctx.modals.open(FORM_MODAL);
    }

    pub fn open_edit(&mut self, ctx: &mut PageContext, id: i64) {
        match crud::fetch::<AchievementResource>(ctx.api, id) {
            Ok(a) => {
                let draft = AchievementDraft {
                    name: a.name,
                    description: a.description,
                    category: a.category.as_deref().and_then(Category::parse),
                };
                self.form = Some((FormMode::Edit { id }, draft));
                ctx.modals.open(FORM_MODAL);
            }
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn save(&mut self, ctx: &mut PageContext, mut draft: AchievementDraft) {
        let mode = self
            .form
            .as_ref()
            .map(|(mode, _)| *mode)
            .unwrap_or(FormMode::Create);
        draft.category = self.category;
        match crud::save::<AchievementResource>(ctx.api, mode, &draft) {
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
        let name = self
            .list
            .items()
            .iter()
            .find(|a| a.id == Some(id))
            .and_then(|a| a.name.clone())
            .unwrap_or_default();
        self.pending_delete = Some((id, name));
        ctx.modals.open(DELETE_MODAL);
    }

    pub fn confirm_delete(&mut self, ctx: &mut PageContext) {
        let Some((id, _)) = self.pending_delete.take() else {
            return;
        };
        let result = crud::delete::<AchievementResource>(ctx.api, id);
        ctx.modals.close(DELETE_MODAL);
        match result {
            Ok(notice) => {
                ctx.notify(notice);
                self.reload(ctx);
            }
            Err(notice) => ctx.notify(notice),
        }
    }

    pub fn view(&self) -> Value {
        json!({
            "page": "achievements",
            "categories": Category::ALL.iter().map(|c| json!({
                "value": c.as_str(),
                "label": c.display_name(),
            })).collect::<Vec<_>>(),
            "category": self.category.map(|c| json!({
                "value": c.as_str(),
                "label": c.display_name(),
            })),
            "list": self.list.map(row),
            "form": self.form.as_ref().map(|(mode, draft)| json!({ "mode": mode, "draft": draft })),
            "pendingDelete": self.pending_delete.as_ref().map(|(id, name)| json!({ "id": id, "name": name })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::testing::Harness;
    use crate::session::Role;
    use crate::ui::NoticeKind;

    fn harness() -> Harness {
        Harness::new(Some(Role::Administrator), "admin")
    }

    #[test]
    fn empty_category_is_no_results() {
        let mut h = harness();
        h.backend.on(Method::Get, "/logros/categoria/deportivos", 404, Value::Null);
        let mut page = AchievementsPage::open();
        let (_, notice) = h.run(|ctx| page.select_category(ctx, Category::Deportivos));
        assert!(notice.is_none());
        let view = page.view();
        assert_eq!(view["list"]["state"], "noResults");
        assert_eq!(view["category"]["label"], "Deportivos");
    }

    #[test]
    fn create_needs_a_category() {
        let mut h = harness();
        let mut page = AchievementsPage::open();
        let (_, notice) = h.run(|ctx| page.open_create(ctx));
        assert_eq!(
            notice.expect("warning").text,
            "Por favor seleccione una categoría primero"
        );
        assert!(!h.modals.is_open(FORM_MODAL));
    }

    #[test]
    fn overlong_description_is_rejected_locally() {
        let mut h = harness();
        h.backend.on(Method::Get, "/logros/categoria/academicos", 200, json!([]));
        let mut page = AchievementsPage::open();
        h.run(|ctx| page.select_category(ctx, Category::Academicos));
        h.run(|ctx| page.open_create(ctx));
        let draft = AchievementDraft {
            name: Some("Lectura".into()),
            description: Some("x".repeat(501)),
            category: None,
        };
        let (_, notice) = h.run(|ctx| page.save(ctx, draft));
        let notice = notice.expect("warning");
        assert_eq!(notice.kind, NoticeKind::Warning);
        assert_eq!(notice.text, "La descripción no puede exceder 500 caracteres");
        assert_eq!(h.backend.calls_to(Method::Post, "/logros"), 0);
    }

    #[test]
    fn create_posts_category_and_reloads() {
        let mut h = harness();
        h.backend
            .on(Method::Get, "/logros/categoria/culturales", 200, json!([]))
            .on(
                Method::Get,
                "/logros/categoria/culturales",
                200,
                json!([{ "idLogro": 4, "nombreLogro": "Danza", "descripcion": "Baile", "categoria": "culturales" }]),
            );
        h.backend.on(Method::Post, "/logros", 201, json!({ "idLogro": 4 }));
        let mut page = AchievementsPage::open();
        h.run(|ctx| page.select_category(ctx, Category::Culturales));
        h.run(|ctx| page.open_create(ctx));
        let draft = AchievementDraft {
            name: Some(" Danza ".into()),
            description: Some("Baile".into()),
            category: None,
        };
        let (_, notice) = h.run(|ctx| page.save(ctx, draft));
        assert_eq!(notice.expect("success").text, "Logro creado exitosamente");
        assert!(!h.modals.is_open(FORM_MODAL));

        let post = h
            .backend
            .calls()
            .into_iter()
            .find(|c| c.method == Method::Post)
            .expect("post");
        assert_eq!(
            post.body,
            Some(json!({ "nombreLogro": "Danza", "descripcion": "Baile", "categoria": "culturales" }))
        );
        assert_eq!(page.view()["list"]["items"][0]["name"], "Danza");
    }

    #[test]
    fn delete_accepts_no_content() {
        let mut h = harness();
        h.backend.on(
            Method::Get,
            "/logros/categoria/artisticos",
            200,
            json!([{ "idLogro": 9, "nombreLogro": "Pintura" }]),
        );
        h.backend.on(Method::Delete, "/logros/9", 204, Value::Null);
        let mut page = AchievementsPage::open();
        h.run(|ctx| page.select_category(ctx, Category::Artisticos));
        h.run(|ctx| page.request_delete(ctx, 9));
        assert_eq!(page.view()["pendingDelete"]["name"], "Pintura");
        let (_, notice) = h.run(|ctx| page.confirm_delete(ctx));
        assert_eq!(notice.expect("success").text, "Logro eliminado exitosamente");
        assert!(!h.modals.is_open(DELETE_MODAL));
    }
}
