//! One fetch → validate → submit → refresh flow shared by every editable entity.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::api::{ApiClient, ApiError, Method};
use crate::ui::Notice;
use crate::validate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum FormMode {
    Create,
    Edit { id: i64 },
}

impl FormMode {
    pub fn is_edit(self) -> bool {
        matches!(self, FormMode::Edit { .. })
    }
}

pub struct Labels {
    pub updated: &'static str,
    pub load_failed: &'static str,
    pub save_failed: &'static str,
}

pub const CONNECTION_FAILED: &str = "Error al comunicarse con el servidor";

pub trait Resource {
    type Record: DeserializeOwned;
    type Draft;

    const NAME: &'static str;
    const LABELS: Labels;

    fn item_path(id: i64) -> String;

    fn update_method() -> Method {
        Method::Put
    }

    fn update_path(id: i64) -> String {
        Self::item_path(id)
    }

    /// Checks the draft and builds the request body.
    fn body(draft: &Self::Draft, mode: FormMode) -> Result<Value, ValidationError>;

    fn save_failure(err: &ApiError, _mode: FormMode) -> Notice {
        default_failure(err, Self::LABELS.save_failed)
    }
}

/// A resource the pages can also create.
pub trait Creatable: Resource {
    const CREATED: &'static str;

    fn create_path() -> String;
}

/// A resource the pages can also delete.
pub trait Removable: Resource {
    const DELETED: &'static str;
    const DELETE_FAILED: &'static str;

    fn delete_path(id: i64) -> String {
        Self::item_path(id)
    }
}

pub fn default_failure(err: &ApiError, fallback: &str) -> Notice {
    match err {
        ApiError::Transport(_) => Notice::error(CONNECTION_FAILED),
        other => Notice::error(other.user_message(fallback)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveFailure {
    /// Rejected locally; no request was sent.
    Invalid(Notice),
    Rejected { notice: Notice, status: Option<u16> },
}

impl SaveFailure {
    pub fn into_notice(self) -> Notice {
        match self {
            SaveFailure::Invalid(n) => n,
            SaveFailure::Rejected { notice, .. } => notice,
        }
    }
}

pub fn fetch<R: Resource>(api: &ApiClient, id: i64) -> Result<R::Record, Notice> {
    api.get::<R::Record>(&R::item_path(id)).map_err(|e| {
        tracing::warn!(resource = R::NAME, id, error = %e, "load failed");
        default_failure(&e, R::LABELS.load_failed)
    })
}

pub fn save<R: Creatable>(
    api: &ApiClient,
    mode: FormMode,
    draft: &R::Draft,
) -> Result<Notice, SaveFailure> {
    match mode {
        FormMode::Create => submit::<R>(api, mode, Method::Post, &R::create_path(), R::CREATED, draft),
        FormMode::Edit { id } => update::<R>(api, id, draft),
    }
}

pub fn update<R: Resource>(api: &ApiClient, id: i64, draft: &R::Draft) -> Result<Notice, SaveFailure> {
    submit::<R>(
        api,
        FormMode::Edit { id },
        R::update_method(),
        &R::update_path(id),
        R::LABELS.updated,
        draft,
    )
}

fn submit<R: Resource>(
    api: &ApiClient,
    mode: FormMode,
    method: Method,
    path: &str,
    done: &'static str,
    draft: &R::Draft,
) -> Result<Notice, SaveFailure> {
    let body = R::body(draft, mode).map_err(|e| SaveFailure::Invalid(e.into()))?;
    match api.send(method, path, Some(body)) {
        Ok(_) => {
            tracing::info!(resource = R::NAME, ?mode, "saved");
            Ok(Notice::success(done))
        }
        Err(e) => {
            tracing::warn!(resource = R::NAME, ?mode, error = %e, "save failed");
            Err(SaveFailure::Rejected {
                notice: R::save_failure(&e, mode),
                status: e.status(),
            })
        }
    }
}

/// 200 and 204 both count as deleted.
pub fn delete<R: Removable>(api: &ApiClient, id: i64) -> Result<Notice, Notice> {
    match api.send(Method::Delete, &R::delete_path(id), None) {
        Ok(_) => {
            tracing::info!(resource = R::NAME, id, "deleted");
            Ok(Notice::success(R::DELETED))
        }
        Err(e) => {
            tracing::warn!(resource = R::NAME, id, error = %e, "delete failed");
            Err(default_failure(&e, R::DELETE_FAILED))
        }
    }
}
