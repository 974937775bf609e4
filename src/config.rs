use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

#[derive(Debug, Parser, Clone)]
#[clap(name = "gestiond", version, about = "Client core sidecar for the school management UI")]
pub struct Config {
    /// Base address of the REST backend.
    #[clap(long, env = "GESTIOND_API_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Workspace opened at startup (session store and report files).
    #[clap(long, env = "GESTIOND_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Per-request read/connect timeout; unset keeps the transport default.
    #[clap(long, env = "GESTIOND_HTTP_TIMEOUT_MS")]
    pub http_timeout_ms: Option<u64>,

    #[clap(long, env = "GESTIOND_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_ms.map(Duration::from_millis)
    }

    pub fn base_url(&self) -> String {
        self.api_base_url.trim_end_matches('/').to_string()
    }
}
