use std::time::{Duration, Instant};

use serde::Serialize;

use crate::api::ApiError;

/// Free-text queries shorter than this never reach the backend.
pub const MIN_QUERY_LEN: usize = 2;

pub const FAST_DEBOUNCE: Duration = Duration::from_millis(300);
pub const SLOW_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ViewState<T> {
    Empty,
    Loading,
    Results { items: Vec<T> },
    NoResults,
    Error { message: String },
}

impl<T> ViewState<T> {
    pub fn items(&self) -> &[T] {
        match self {
            ViewState::Results { items } => items,
            _ => &[],
        }
    }

    /// Maps a list fetch onto the view: empty and 404 are "no results", never errors.
    pub fn from_outcome(outcome: Result<Vec<T>, ApiError>, error_text: &str) -> Self {
        match outcome {
            Ok(items) if items.is_empty() => ViewState::NoResults,
            Ok(items) => ViewState::Results { items },
            Err(e) if e.is_not_found() => ViewState::NoResults,
            Err(e) => ViewState::Error {
                message: e.user_message(error_text),
            },
        }
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> ViewState<U> {
        match self {
            ViewState::Empty => ViewState::Empty,
            ViewState::Loading => ViewState::Loading,
            ViewState::Results { items } => ViewState::Results {
                items: items.iter().map(f).collect(),
            },
            ViewState::NoResults => ViewState::NoResults,
            ViewState::Error { message } => ViewState::Error {
                message: message.clone(),
            },
        }
    }
}

/// Trailing-edge debounce: each call restarts the wait, only the last text fires.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule(&mut self, text: &str, now: Instant) -> Instant {
        let due = now + self.delay;
        self.pending = Some((text.to_string(), due));
        due
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, due)) if *due <= now => self.pending.take().map(|(text, _)| text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub token: u64,
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Cleared,
    TooShort,
    Scheduled { due: Instant },
}

pub struct SearchController<T> {
    debounce: Debouncer,
    min_len: usize,
    last_token: u64,
    last_query: Option<String>,
    view: ViewState<T>,
}

impl<T> SearchController<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            debounce: Debouncer::new(delay),
            min_len: MIN_QUERY_LEN,
            last_token: 0,
            last_query: None,
            view: ViewState::Empty,
        }
    }

    /// A keystroke in the search box.
    pub fn input(&mut self, text: &str, now: Instant) -> InputOutcome {
        let query = text.trim();
        if query.chars().count() < self.min_len {
            self.debounce.cancel();
            self.invalidate();
            self.view = ViewState::Empty;
            if query.is_empty() {
                self.last_query = None;
                return InputOutcome::Cleared;
            }
            return InputOutcome::TooShort;
        }
        InputOutcome::Scheduled {
            due: self.debounce.schedule(query, now),
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn take_due(&mut self, now: Instant) -> Option<Ticket> {
        let query = self.debounce.take_due(now)?;
        Some(self.issue(query))
    }

    /// Explicit search (button, Enter): skips the timer.
    pub fn trigger(&mut self, query: &str) -> Ticket {
        self.debounce.cancel();
        self.issue(query.trim().to_string())
    }

    fn issue(&mut self, query: String) -> Ticket {
        self.last_token += 1;
        self.view = ViewState::Loading;
        self.last_query = Some(query.clone());
        Ticket {
            token: self.last_token,
            query,
        }
    }

    fn invalidate(&mut self) {
        self.last_token += 1;
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.last_token
    }

    /// Applies a response. Returns false when a newer ticket superseded it.
    pub fn complete(
        &mut self,
        token: u64,
        outcome: Result<Vec<T>, ApiError>,
        error_text: &str,
    ) -> bool {
        if !self.is_current(token) {
            tracing::debug!(token, latest = self.last_token, "dropping stale search response");
            return false;
        }
        self.view = ViewState::from_outcome(outcome, error_text);
        true
    }

    pub fn set_view(&mut self, view: ViewState<T>) {
        self.view = view;
    }

    pub fn reset(&mut self) {
        self.debounce.cancel();
        self.invalidate();
        self.last_query = None;
        self.view = ViewState::Empty;
    }

    pub fn view(&self) -> &ViewState<T> {
        &self.view
    }

    pub fn items(&self) -> &[T] {
        self.view.items()
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn short_input_never_schedules() {
        let mut c: SearchController<String> = SearchController::new(FAST_DEBOUNCE);
        let t0 = Instant::now();
        assert_eq!(c.input("J", t0), InputOutcome::TooShort);
        assert_eq!(c.input("  ", t0), InputOutcome::Cleared);
        assert!(c.next_due().is_none());
        assert!(c.take_due(t0 + ms(10_000)).is_none());
        assert_eq!(c.view(), &ViewState::Empty);
    }

    #[test]
    fn typing_within_window_fires_only_last_query() {
        let mut c: SearchController<String> = SearchController::new(FAST_DEBOUNCE);
        let t0 = Instant::now();
        c.input("Juan", t0);
        c.input("Juana", t0 + ms(100));

        assert!(c.take_due(t0 + ms(350)).is_none());
        let ticket = c.take_due(t0 + ms(400)).expect("due");
        assert_eq!(ticket.query, "Juana");
        assert!(c.take_due(t0 + ms(5_000)).is_none());
        assert_eq!(c.view(), &ViewState::Loading);
    }

    #[test]
    fn shrinking_below_minimum_cancels_pending_query() {
        let mut c: SearchController<String> = SearchController::new(SLOW_DEBOUNCE);
        let t0 = Instant::now();
        c.input("Ma", t0);
        c.input("M", t0 + ms(50));
        assert!(c.take_due(t0 + ms(2_000)).is_none());
    }

    #[test]
    fn stale_responses_are_discarded() {
        let mut c: SearchController<String> = SearchController::new(FAST_DEBOUNCE);
        let first = c.trigger("Ped");
        let second = c.trigger("Pedro");

        assert!(c.complete(second.token, Ok(vec!["Pedro Gil".into()]), "Error"));
        assert!(!c.complete(first.token, Ok(vec!["Pedraza".into()]), "Error"));
        assert_eq!(c.items(), ["Pedro Gil".to_string()]);
    }

    #[test]
    fn clearing_invalidates_in_flight_ticket() {
        let mut c: SearchController<String> = SearchController::new(FAST_DEBOUNCE);
        let ticket = c.trigger("Laura");
        c.input("", Instant::now());
        assert!(!c.complete(ticket.token, Ok(vec!["Laura".into()]), "Error"));
        assert_eq!(c.view(), &ViewState::Empty);
    }

    #[test]
    fn empty_and_not_found_are_no_results() {
        let mut c: SearchController<String> = SearchController::new(FAST_DEBOUNCE);
        let t = c.trigger("zz");
        c.complete(t.token, Ok(vec![]), "Error");
        assert_eq!(c.view(), &ViewState::NoResults);

        let t = c.trigger("zzz");
        c.complete(t.token, Err(ApiError::NotFound { message: None }), "Error");
        assert_eq!(c.view(), &ViewState::NoResults);

        let t = c.trigger("zzzz");
        c.complete(
            t.token,
            Err(ApiError::Transport("refused".into())),
            "Error al buscar",
        );
        assert_eq!(
            c.view(),
            &ViewState::Error {
                message: "Error al buscar".into()
            }
        );
    }

    #[test]
    fn view_state_serializes_with_tag() {
        let v: ViewState<u8> = ViewState::Results { items: vec![1, 2] };
        assert_eq!(
            serde_json::to_value(&v).expect("json"),
            serde_json::json!({ "state": "results", "items": [1, 2] })
        );
        let v: ViewState<u8> = ViewState::NoResults;
        assert_eq!(
            serde_json::to_value(&v).expect("json"),
            serde_json::json!({ "state": "noResults" })
        );
    }
}
