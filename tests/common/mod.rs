#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tiny_http::{Header, Response, Server, StatusCode};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub body: String,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

type Routes = Arc<Mutex<HashMap<(String, String), (u16, Option<Value>)>>>;

/// REST backend stand-in. Unrouted paths answer 404 with an empty body.
pub struct FakeBackend {
    pub base_url: String,
    routes: Routes,
    calls: Arc<Mutex<Vec<Recorded>>>,
    stop: Arc<AtomicBool>,
}

impl FakeBackend {
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").expect("http server");
        let base_url = format!("http://{}", server.server_addr());
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let (routes_t, calls_t, stop_t) = (routes.clone(), calls.clone(), stop.clone());
        thread::spawn(move || {
            while !stop_t.load(Ordering::Relaxed) {
                let mut req = match server.recv_timeout(Duration::from_millis(100)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };
                let mut body = String::new();
                let _ = req.as_reader().read_to_string(&mut body);
                let method = req.method().to_string().to_uppercase();
                let url = req.url().to_string();
                let path = url.split('?').next().unwrap_or_default().to_string();
                calls_t.lock().expect("calls").push(Recorded {
                    method: method.clone(),
                    url,
                    body,
                });
                let route = routes_t.lock().expect("routes").get(&(method, path)).cloned();
                let response = match route {
                    Some((status, Some(value))) => Response::from_string(value.to_string())
                        .with_status_code(StatusCode(status))
                        .with_header(
                            Header::from_bytes("Content-Type", "application/json")
                                .expect("content type"),
                        ),
                    Some((status, None)) => {
                        Response::from_string(String::new()).with_status_code(StatusCode(status))
                    }
                    None => Response::from_string(String::new()).with_status_code(StatusCode(404)),
                };
                let _ = req.respond(response);
            }
        });

        Self {
            base_url,
            routes,
            calls,
            stop,
        }
    }

    pub fn on(&self, method: &str, path: &str, status: u16, body: Value) -> &Self {
        let body = if body.is_null() { None } else { Some(body) };
        self.routes
            .lock()
            .expect("routes")
            .insert((method.to_string(), path.to_string()), (status, body));
        self
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path() == path)
            .collect()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// The sidecar process. Responses and events arrive on one channel.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<Value>,
    pub events: Vec<Value>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn(backend: &FakeBackend, workspace: Option<&PathBuf>) -> Self {
        let exe = env!("CARGO_BIN_EXE_gestiond");
        let mut cmd = Command::new(exe);
        cmd.arg("--api-base-url")
            .arg(&backend.base_url)
            .arg("--http-timeout-ms")
            .arg("3000")
            .env("GESTIOND_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(ws) = workspace {
            cmd.arg("--workspace").arg(ws);
        }
        let mut child = cmd.spawn().expect("spawn gestiond");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(line.trim()).expect("parse output json");
                if tx.send(value).is_err() {
                    break;
                }
            }
        });

        Self {
            child,
            stdin,
            lines: rx,
            events: Vec::new(),
            next_id: 0,
        }
    }

    pub fn send_raw(&mut self, line: &str) {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
    }

    pub fn next_line(&mut self, timeout: Duration) -> Option<Value> {
        self.lines.recv_timeout(timeout).ok()
    }

    /// Sends a request and returns its envelope; events seen meanwhile are kept.
    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        self.send_raw(&payload.to_string());
        loop {
            let line = self
                .next_line(Duration::from_secs(10))
                .unwrap_or_else(|| panic!("no response for {}", method));
            if line.get("event").is_some() {
                self.events.push(line);
                continue;
            }
            assert_eq!(line.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
            return line;
        }
    }

    /// Like `request`, but fails the test on an error envelope.
    pub fn call(&mut self, method: &str, params: Value) -> Value {
        let resp = self.request(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
        resp["result"].clone()
    }

    pub fn wait_event(&mut self, name: &str, timeout: Duration) -> Option<Value> {
        if let Some(i) = self.events.iter().position(|e| e["event"] == name) {
            return Some(self.events.remove(i));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            let line = self.next_line(left)?;
            if line["event"] == name {
                return Some(line);
            }
            self.events.push(line);
        }
    }

    pub fn sign_in_as(&mut self, user: &str, role: &str) {
        let _ = self.call("session.set", json!({ "userName": user, "role": role }));
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
