use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::api::ApiClient;
use crate::config::Config;
use crate::db;
use crate::modal::ModalManager;
use crate::pages::{Page, PageContext, PageKind};
use crate::report::ReportViewer;
use crate::session::Session;
use crate::ui::Notice;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub api: ApiClient,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Session,
    pub modals: ModalManager,
    pub reports: ReportViewer,
    pub page: Option<Page>,
}

impl AppState {
    pub fn new(config: Config, api: ApiClient) -> Self {
        Self {
            config,
            api,
            workspace: None,
            db: None,
            session: Session::default(),
            modals: ModalManager::new(),
            reports: ReportViewer::new(std::env::temp_dir().join("gestiond-reports")),
            page: None,
        }
    }

    /// Opens the session store and points report files into the workspace.
    pub fn select_workspace(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let conn = db::open_db(&path)?;
        self.session = Session::load(&conn)?;
        self.reports.set_dir(path.join("reports"));
        tracing::info!(
            workspace = %path.to_string_lossy(),
            role = self.session.display_role(),
            "workspace selected"
        );
        self.db = Some(conn);
        self.workspace = Some(path);
        Ok(())
    }

    /// Replaces the open page. Modals belong to the page, so they go with it.
    pub fn open_page(&mut self, kind: PageKind) -> Option<Notice> {
        self.page = None;
        self.modals.close_all();
        let mut ctx = PageContext::new(&self.api, &self.session, &mut self.modals, &mut self.reports);
        let page = Page::open(kind, &mut ctx);
        let notice = ctx.notice;
        self.page = Some(page);
        notice
    }

    /// Runs `f` on the open page; `None` when no page is open.
    pub fn with_page<R>(
        &mut self,
        f: impl FnOnce(&mut Page, &mut PageContext) -> R,
    ) -> Option<(R, Option<Notice>)> {
        let page = self.page.as_mut()?;
        let mut ctx = PageContext::new(&self.api, &self.session, &mut self.modals, &mut self.reports);
        let out = f(page, &mut ctx);
        Some((out, ctx.notice))
    }

    /// Where downloads go when the caller names no target.
    pub fn download_dir(&self) -> PathBuf {
        match &self.workspace {
            Some(ws) => ws.join("downloads"),
            None => std::env::temp_dir(),
        }
    }
}
