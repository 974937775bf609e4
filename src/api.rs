use std::io::Read;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Bodies above this size are cut off; report PDFs stay well below it.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    #[cfg(test)]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// One HTTP exchange with the backend. Status codes are data here, not errors.
pub trait Transport {
    fn execute(&self, req: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl UreqTransport {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout_connect(timeout).timeout_read(timeout);
        }
        Self {
            agent: builder.build(),
            base_url: base_url.into(),
        }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, req: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut call = self.agent.request(req.method.as_str(), &url);
        for (key, value) in &req.query {
            call = call.query(key, value);
        }
        let result = match &req.body {
            Some(body) => call
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => call.call(),
        };
        let response = match result {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(e)) => return Err(TransportError(e.to_string())),
        };

        let status = response.status();
        let content_type = response.header("Content-Type").map(|v| v.to_string());
        let body = read_limited(response.into_reader(), MAX_BODY_BYTES)?;
        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Reads the whole body, failing instead of truncating past `limit` bytes.
fn read_limited(reader: impl Read, limit: u64) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut body)
        .map_err(|e| TransportError(format!("reading response body: {e}")))?;
    if body.len() as u64 > limit {
        return Err(TransportError(format!("response body exceeds {limit} bytes")));
    }
    Ok(body)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound { message: Option<String> },
    #[error("could not reach the backend: {0}")]
    Transport(String),
    #[error("unreadable response: {0}")]
    Decode(String),
    #[error("backend answered {status}")]
    Server { status: u16, message: Option<String> },
}

impl ApiError {
    /// The backend's own `mensaje`, when it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::NotFound { message } | ApiError::Server { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// Server business messages are shown verbatim; everything else gets the caller's text.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message()
            .filter(|m| !m.trim().is_empty())
            .map(|m| m.to_string())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Pulls `mensaje` (or `message`) out of a JSON error body.
pub fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["mensaje", "message"]
        .iter()
        .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

pub struct ApiClient {
    transport: Box<dyn Transport>,
}

impl ApiClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Sends the request without interpreting the status code.
    pub fn execute_raw(&self, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
        tracing::debug!(method = req.method.as_str(), path = %req.path, "backend request");
        match self.transport.execute(req) {
            Ok(resp) => {
                tracing::debug!(status = resp.status, path = %req.path, "backend response");
                Ok(resp)
            }
            Err(e) => {
                tracing::warn!(path = %req.path, error = %e, "backend unreachable");
                Err(ApiError::Transport(e.0))
            }
        }
    }

    pub fn execute(&self, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let resp = self.execute_raw(req)?;
        if resp.is_success() {
            return Ok(resp);
        }
        let message = error_message(&resp.body);
        if resp.status == 404 {
            return Err(ApiError::NotFound { message });
        }
        Err(ApiError::Server {
            status: resp.status,
            message,
        })
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_as(&ApiRequest::new(Method::Get, path))
    }

    /// Lists treat an empty 2xx body as no rows.
    pub fn get_list<T: DeserializeOwned>(&self, req: &ApiRequest) -> Result<Vec<T>, ApiError> {
        let resp = self.execute(req)?;
        if resp.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        decode(&resp.body)
    }

    pub fn request_as<T: DeserializeOwned>(&self, req: &ApiRequest) -> Result<T, ApiError> {
        let resp = self.execute(req)?;
        decode(&resp.body)
    }

    /// Mutations: any 2xx (including 204 without a body) is success.
    pub fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let mut req = ApiRequest::new(method, path);
        req.body = body;
        let resp = self.execute(&req)?;
        if resp.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Null);
        }
        // Some endpoints answer with plain text on success.
        Ok(serde_json::from_slice(&resp.body).unwrap_or_else(|_| Value::String(resp.text())))
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Reply = Result<ApiResponse, TransportError>;

    #[derive(Default)]
    struct Script {
        routes: Vec<(Method, String, VecDeque<Reply>)>,
        calls: Vec<ApiRequest>,
    }

    /// In-memory backend: replies are queued per (method, path); the last one repeats.
    #[derive(Clone, Default)]
    pub struct ScriptedTransport {
        inner: Rc<RefCell<Script>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn client(&self) -> ApiClient {
            ApiClient::new(Box::new(self.clone()))
        }

        pub fn on(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
            let body = if body.is_null() {
                Vec::new()
            } else {
                body.to_string().into_bytes()
            };
            self.push(
                method,
                path,
                Ok(ApiResponse {
                    status,
                    content_type: Some("application/json".to_string()),
                    body,
                }),
            )
        }

        pub fn on_bytes(
            &self,
            method: Method,
            path: &str,
            status: u16,
            content_type: &str,
            body: &[u8],
        ) -> &Self {
            self.push(
                method,
                path,
                Ok(ApiResponse {
                    status,
                    content_type: Some(content_type.to_string()),
                    body: body.to_vec(),
                }),
            )
        }

        pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
            self.push(method, path, Err(TransportError(message.to_string())))
        }

        /// Drops whatever the route still had queued, then answers with `body`.
        pub fn replace(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
            if let Some((_, _, replies)) = self
                .inner
                .borrow_mut()
                .routes
                .iter_mut()
                .find(|(m, p, _)| *m == method && p == path)
            {
                replies.clear();
            }
            self.on(method, path, status, body)
        }

        fn push(&self, method: Method, path: &str, reply: Reply) -> &Self {
            let mut script = self.inner.borrow_mut();
            match script
                .routes
                .iter_mut()
                .find(|(m, p, _)| *m == method && p == path)
            {
                Some((_, _, replies)) => replies.push_back(reply),
                None => script
                    .routes
                    .push((method, path.to_string(), VecDeque::from([reply]))),
            }
            self
        }

        pub fn calls(&self) -> Vec<ApiRequest> {
            self.inner.borrow_mut().calls.clone()
        }

        pub fn calls_to(&self, method: Method, path: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.method == method && c.path == path)
                .count()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, req: &ApiRequest) -> Result<ApiResponse, TransportError> {
            let mut script = self.inner.borrow_mut();
            script.calls.push(req.clone());
            let Some((_, _, replies)) = script
                .routes
                .iter_mut()
                .find(|(m, p, _)| *m == req.method && *p == req.path)
            else {
                return Err(TransportError(format!(
                    "no scripted reply for {} {}",
                    req.method.as_str(),
                    req.path
                )));
            };
            if replies.len() > 1 {
                return replies
                    .pop_front()
                    .unwrap_or_else(|| Err(TransportError("empty script".into())));
            }
            replies
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError("empty script".into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;
    use serde_json::json;

    #[test]
    fn oversized_body_is_an_error_not_a_prefix() {
        assert_eq!(read_limited(&b"%PDF-1.7"[..], 8).expect("fits"), b"%PDF-1.7");
        let err = read_limited(&b"%PDF-1.7 tail"[..], 8).expect_err("too long");
        assert_eq!(err.0, "response body exceeds 8 bytes");
    }

    #[test]
    fn not_found_keeps_server_message() {
        let backend = ScriptedTransport::new();
        backend.on(
            Method::Get,
            "/estudiante/buscar",
            404,
            json!({ "error": true, "mensaje": "No se encontraron estudiantes" }),
        );
        let client = backend.client();
        let err = client
            .get_list::<Value>(&ApiRequest::new(Method::Get, "/estudiante/buscar"))
            .expect_err("404");
        assert!(err.is_not_found());
        assert_eq!(err.server_message(), Some("No se encontraron estudiantes"));
    }

    #[test]
    fn no_content_is_success() {
        let backend = ScriptedTransport::new();
        backend.on(Method::Delete, "/logros/4", 204, Value::Null);
        let client = backend.client();
        let out = client.send(Method::Delete, "/logros/4", None).expect("204 ok");
        assert!(out.is_null());
    }

    #[test]
    fn server_errors_surface_mensaje_or_fallback() {
        let backend = ScriptedTransport::new();
        backend.on(
            Method::Post,
            "/token_usuario/crear",
            400,
            json!({ "error": true, "mensaje": "No existe un acudiente con ese documento" }),
        );
        backend.on(Method::Put, "/logros/1", 500, json!({ "trace": "boom" }));
        let client = backend.client();

        let err = client
            .send(Method::Post, "/token_usuario/crear", Some(json!({})))
            .expect_err("400");
        assert_eq!(
            err.user_message("Error al crear"),
            "No existe un acudiente con ese documento"
        );

        let err = client
            .send(Method::Put, "/logros/1", Some(json!({})))
            .expect_err("500");
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.user_message("Error al guardar"), "Error al guardar");
    }

    #[test]
    fn transport_failures_and_bad_json_are_distinct() {
        let backend = ScriptedTransport::new();
        backend.fail(Method::Get, "/periodos", "connection refused");
        backend.on_bytes(Method::Get, "/grados", 200, "text/html", b"<html>");
        let client = backend.client();

        let err = client.get::<Vec<Value>>("/periodos").expect_err("down");
        assert!(matches!(err, ApiError::Transport(_)));

        let err = client.get::<Vec<Value>>("/grados").expect_err("html");
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn scripted_replies_are_consumed_in_order() {
        let backend = ScriptedTransport::new();
        backend
            .on(Method::Get, "/grados", 500, json!({}))
            .on(Method::Get, "/grados", 200, json!([]));
        let client = backend.client();
        assert!(client.get::<Vec<Value>>("/grados").is_err());
        assert!(client.get::<Vec<Value>>("/grados").expect("ok").is_empty());
        assert!(client.get::<Vec<Value>>("/grados").expect("repeat").is_empty());
        assert_eq!(backend.calls_to(Method::Get, "/grados"), 3);
    }
}
