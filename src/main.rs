mod api;
mod config;
mod crud;
mod db;
mod ipc;
mod modal;
mod model;
mod nav;
mod pages;
mod report;
mod search;
mod session;
mod ui;
mod validate;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::api::{ApiClient, UreqTransport};
use crate::config::Config;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn write_line(stdout: &mut impl Write, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
    let _ = stdout.flush();
}

fn main() {
    let config = Config::parse();
    init_tracing(&config.log_level);

    let transport = UreqTransport::new(config.base_url(), config.http_timeout());
    let mut state = ipc::AppState::new(config.clone(), ApiClient::new(Box::new(transport)));
    tracing::info!(api = %config.base_url(), "gestiond started");

    if let Some(ws) = config.workspace.clone() {
        if let Err(e) = state.select_workspace(ws) {
            tracing::error!(error = %format!("{e:#}"), "startup workspace could not be opened");
        }
    }

    // Stdin is read on its own thread so pending debounce timers can fire between lines.
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdout = io::stdout();
    loop {
        let received = match ipc::next_due(&state) {
            Some(due) => rx.recv_timeout(due.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let line = match received {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(ev) = ipc::fire_due_search(&mut state, Instant::now()) {
                    write_line(&mut stdout, &ev);
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Echo the id when the line was JSON at all.
                let id = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
                    .unwrap_or_default();
                tracing::warn!(error = %e, "unparseable request line");
                write_line(&mut stdout, &ipc::err(&id, "bad_json", e.to_string(), None));
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
    }
    tracing::info!("stdin closed; exiting");
}
