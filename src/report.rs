use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::api::{error_message, ApiClient, ApiRequest, ApiResponse, Method};
use crate::ui::Notice;

pub const VIEWER_MODAL: &str = "modal-previsualizacion-pdf";

/// Raw error bodies at least this long are not shown to the user.
const RAW_ERROR_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    /// Local object reference the viewer loads, e.g. `blob:6f1c...`.
    pub handle: String,
    pub file_name: String,
    pub path: PathBuf,
    pub content_type: String,
    pub size: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PrintAction {
    ViewerPrint { handle: String },
    OpenWindow { handle: String },
}

/// One embedded document viewer. Opening a document releases the previous one.
#[derive(Debug)]
pub struct ReportViewer {
    dir: PathBuf,
    current: Option<ReportDocument>,
}

impl ReportViewer {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            current: None,
        }
    }

    pub fn set_dir(&mut self, dir: PathBuf) {
        self.dir = dir;
    }

    pub fn current(&self) -> Option<&ReportDocument> {
        self.current.as_ref()
    }

    /// Downloads a document and loads it into the viewer.
    /// The error is the notice to show; nothing changes in the viewer on failure.
    pub fn fetch(
        &mut self,
        api: &ApiClient,
        path: &str,
        file_name: &str,
        fallback: &str,
    ) -> Result<&ReportDocument, Notice> {
        let req = ApiRequest::new(Method::Get, path);
        let resp = match api.execute_raw(&req) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path, error = %e, "report request failed");
                return Err(Notice::error(format!("Error de conexión: {fallback}")));
            }
        };
        if !resp.is_success() {
            let message = document_error_message(&resp, fallback);
            tracing::info!(path, status = resp.status, %message, "report refused by backend");
            return Err(Notice::new(
                crate::ui::NoticeKind::Warning,
                "No se pudo generar",
                message,
            ));
        }
        let content_type = resp
            .content_type
            .clone()
            .unwrap_or_else(|| "application/pdf".to_string());
        self.open(&resp.body, &content_type, file_name)
            .map_err(|e| {
                tracing::error!(error = %format!("{e:#}"), "storing report failed");
                Notice::error("No se pudo preparar el documento para su visualización")
            })
    }

    pub fn open(
        &mut self,
        bytes: &[u8],
        content_type: &str,
        file_name: &str,
    ) -> anyhow::Result<&ReportDocument> {
        self.close();
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create directory {}", self.dir.to_string_lossy()))?;

        let id = uuid::Uuid::new_v4();
        let path = self.dir.join(format!("{id}.pdf"));
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let doc = ReportDocument {
            handle: format!("blob:{id}"),
            file_name: file_name.to_string(),
            path,
            content_type: content_type.to_string(),
            size: bytes.len(),
            sha256: format!("{:x}", hasher.finalize()),
        };
        tracing::info!(handle = %doc.handle, size = doc.size, "report opened");
        Ok(self.current.insert(doc))
    }

    /// Copies the open document to `out` (or to its suggested name inside `default_dir`).
    pub fn download(&self, out: Option<&Path>, default_dir: &Path) -> anyhow::Result<PathBuf> {
        let doc = self
            .current
            .as_ref()
            .context("no hay documento abierto")?;
        let target = match out {
            Some(p) => p.to_path_buf(),
            None => default_dir.join(&doc.file_name),
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
        std::fs::copy(&doc.path, &target).with_context(|| {
            format!(
                "failed to copy {} to {}",
                doc.path.to_string_lossy(),
                target.to_string_lossy()
            )
        })?;
        Ok(target)
    }

    pub fn print(&self, viewer_can_print: bool) -> Option<PrintAction> {
        let handle = self.current.as_ref()?.handle.clone();
        Some(if viewer_can_print {
            PrintAction::ViewerPrint { handle }
        } else {
            PrintAction::OpenWindow { handle }
        })
    }

    /// Releases the handle and its backing file.
    pub fn close(&mut self) -> bool {
        let Some(doc) = self.current.take() else {
            return false;
        };
        if let Err(e) = std::fs::remove_file(&doc.path) {
            tracing::warn!(path = %doc.path.to_string_lossy(), error = %e, "report file already gone");
        }
        tracing::debug!(handle = %doc.handle, "report released");
        true
    }
}

impl Drop for ReportViewer {
    fn drop(&mut self) {
        self.close();
    }
}

/// JSON `mensaje`/`message`, else short raw text, else the fallback.
pub fn document_error_message(resp: &ApiResponse, fallback: &str) -> String {
    if let Some(m) = error_message(&resp.body) {
        return m;
    }
    // An unreadable JSON error body is never worth showing raw.
    if resp.is_json() {
        return fallback.to_string();
    }
    let text = resp.text();
    let text = text.trim();
    if !text.is_empty() && text.chars().count() < RAW_ERROR_LIMIT {
        return text.to_string();
    }
    fallback.to_string()
}

/// `Nombre Apellido` → `Nombre_Apellido`.
pub fn file_name_part(raw: &str) -> String {
    raw.trim().replace(' ', "_")
}
