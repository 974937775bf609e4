//! Page controllers. Each one owns the state of a single open screen; opening a
//! page drops whatever the previous one held.

pub mod achievements;
pub mod admission;
pub mod grades;
pub mod groups;
pub mod observations;
pub mod preenrollment;
pub mod students;
pub mod users;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ApiClient;
use crate::modal::{ModalManager, MESSAGE_MODAL};
use crate::report::ReportViewer;
use crate::session::Session;
use crate::ui::Notice;

/// Everything a page action may touch besides its own state.
pub struct PageContext<'a> {
    pub api: &'a ApiClient,
    pub session: &'a Session,
    pub modals: &'a mut ModalManager,
    pub reports: &'a mut ReportViewer,
    pub notice: Option<Notice>,
}

impl<'a> PageContext<'a> {
    pub fn new(
        api: &'a ApiClient,
        session: &'a Session,
        modals: &'a mut ModalManager,
        reports: &'a mut ReportViewer,
    ) -> Self {
        Self {
            api,
            session,
            modals,
            reports,
            notice: None,
        }
    }

    /// Shows the message dialog. A later notice in the same action replaces it.
    pub fn notify(&mut self, notice: Notice) {
        self.modals.open(MESSAGE_MODAL);
        self.notice = Some(notice);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageKind {
    Students,
    Groups,
    Achievements,
    Grades,
    Observations,
    Preenrollment,
    Users,
}

impl PageKind {
    pub fn parse(raw: &str) -> Option<PageKind> {
        serde_json::from_value(Value::String(raw.to_string())).ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageKind::Students => "students",
            PageKind::Groups => "groups",
            PageKind::Achievements => "achievements",
            PageKind::Grades => "grades",
            PageKind::Observations => "observations",
            PageKind::Preenrollment => "preenrollment",
            PageKind::Users => "users",
        }
    }
}

pub enum Page {
    Students(students::StudentsPage),
    Groups(groups::GroupsPage),
    Achievements(achievements::AchievementsPage),
    Grades(grades::GradesPage),
    Observations(observations::ObservationsPage),
    Preenrollment(preenrollment::PreenrollmentPage),
    Users(users::UsersPage),
}

impl Page {
    /// Builds the controller and runs its initial load.
    pub fn open(kind: PageKind, ctx: &mut PageContext) -> Page {
        tracing::info!(page = kind.as_str(), role = ctx.session.display_role(), "page opened");
        match kind {
            PageKind::Students => Page::Students(students::StudentsPage::open(ctx)),
            PageKind::Groups => Page::Groups(groups::GroupsPage::open(ctx)),
            PageKind::Achievements => Page::Achievements(achievements::AchievementsPage::open()),
            PageKind::Grades => Page::Grades(grades::GradesPage::open(ctx)),
            PageKind::Observations => Page::Observations(observations::ObservationsPage::open()),
            PageKind::Preenrollment => {
                Page::Preenrollment(preenrollment::PreenrollmentPage::open(ctx))
            }
            PageKind::Users => Page::Users(users::UsersPage::open(ctx)),
        }
    }

    pub fn kind(&self) -> PageKind {
        match self {
            Page::Students(_) => PageKind::Students,
            Page::Groups(_) => PageKind::Groups,
            Page::Achievements(_) => PageKind::Achievements,
            Page::Grades(_) => PageKind::Grades,
            Page::Observations(_) => PageKind::Observations,
            Page::Preenrollment(_) => PageKind::Preenrollment,
            Page::Users(_) => PageKind::Users,
        }
    }

    pub fn view(&self) -> Value {
        match self {
            Page::Students(p) => p.view(),
            Page::Groups(p) => p.view(),
            Page::Achievements(p) => p.view(),
            Page::Grades(p) => p.view(),
            Page::Observations(p) => p.view(),
            Page::Preenrollment(p) => p.view(),
            Page::Users(p) => p.view(),
        }
    }

    /// Earliest pending debounce deadline, if any.
    pub fn next_due(&self) -> Option<Instant> {
        match self {
            Page::Students(p) => p.next_due(),
            Page::Groups(p) => p.next_due(),
            Page::Achievements(_) => None,
            Page::Grades(p) => p.next_due(),
            Page::Observations(p) => p.next_due(),
            Page::Preenrollment(p) => p.next_due(),
            Page::Users(p) => p.next_due(),
        }
    }

    /// Runs a debounced query whose timer has elapsed. True when one fired.
    pub fn fire_due(&mut self, ctx: &mut PageContext, now: Instant) -> bool {
        match self {
            Page::Students(p) => p.fire_due(ctx, now),
            Page::Groups(p) => p.fire_due(ctx, now),
            Page::Achievements(_) => false,
            Page::Grades(p) => p.fire_due(ctx, now),
            Page::Observations(p) => p.fire_due(ctx, now),
            Page::Preenrollment(p) => p.fire_due(ctx, now),
            Page::Users(p) => p.fire_due(now),
        }
    }
}

/// Option entry for the shell's `<select>` elements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub value: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowAction {
    pub name: &'static str,
    pub enabled: bool,
    pub title: &'static str,
}

impl RowAction {
    pub fn new(name: &'static str, enabled: bool, title: &'static str) -> Self {
        Self {
            name,
            enabled,
            title,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use crate::session::Role;

    /// Owns what a `PageContext` borrows so page tests stay short.
    pub struct Harness {
        pub backend: ScriptedTransport,
        pub api: ApiClient,
        pub session: Session,
        pub modals: ModalManager,
        pub reports: ReportViewer,
    }

    impl Harness {
        pub fn new(role: Option<Role>, user: &str) -> Self {
            let backend = ScriptedTransport::new();
            let api = backend.client();
            let dir = std::env::temp_dir().join(format!("gestiond-page-{}", uuid::Uuid::new_v4()));
            Self {
                backend,
                api,
                session: Session {
                    user_name: Some(user.to_string()),
                    role,
                },
                modals: ModalManager::new(),
                reports: ReportViewer::new(dir),
            }
        }

        pub fn ctx(&mut self) -> PageContext<'_> {
            PageContext::new(&self.api, &self.session, &mut self.modals, &mut self.reports)
        }

        /// Runs one page action and hands back the notice it raised.
        pub fn run<R>(&mut self, f: impl FnOnce(&mut PageContext) -> R) -> (R, Option<Notice>) {
            let mut ctx = self.ctx();
            let out = f(&mut ctx);
            (out, ctx.notice)
        }
    }
}
