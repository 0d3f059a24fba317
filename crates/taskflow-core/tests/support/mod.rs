#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use taskflow_core::gateway::Gateway;
use taskflow_core::session::Session;
use taskflow_core::task::User;
use taskflow_core::transport::{ApiRequest, ApiResponse, Method, Transport, TransportError};

pub const BASE_URL: &str = "http://api.test/api-root";

struct Scripted {
    method: Method,
    path: String,
    response: Result<ApiResponse, TransportError>,
}

#[derive(Default)]
struct Inner {
    script: Vec<Scripted>,
    calls: Vec<ApiRequest>,
}

/// In-memory transport. Responses are matched by method and path in the
/// order they were scripted; every request is recorded.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("calls", &self.inner.lock().calls.len())
            .finish()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: Method, path: &str, response: Result<ApiResponse, TransportError>) {
        self.inner.lock().script.push(Scripted {
            method,
            path: path.to_string(),
            response,
        });
    }

    pub fn json(&self, method: Method, path: &str, status: u16, body: Value) {
        self.respond(
            method,
            path,
            Ok(ApiResponse {
                status,
                content_type: Some("application/json; charset=utf-8".to_string()),
                body: serde_json::to_vec(&body).expect("encode body"),
            }),
        );
    }

    pub fn empty(&self, method: Method, path: &str, status: u16) {
        self.respond(
            method,
            path,
            Ok(ApiResponse {
                status,
                content_type: None,
                body: Vec::new(),
            }),
        );
    }

    pub fn fail(&self, method: Method, path: &str, message: &str) {
        self.respond(method, path, Err(TransportError(message.to_string())));
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }

    pub fn unanswered(&self) -> usize {
        self.inner.lock().script.len()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send {
        let response = {
            let mut inner = self.inner.lock();
            let path = request
                .url
                .strip_prefix(BASE_URL)
                .unwrap_or(&request.url)
                .to_string();
            let position = inner
                .script
                .iter()
                .position(|entry| entry.method == request.method && entry.path == path);
            inner.calls.push(request);
            match position {
                Some(idx) => inner.script.remove(idx).response,
                None => Err(TransportError(format!("nothing scripted for {path}"))),
            }
        };
        async move { response }
    }
}

pub fn user() -> User {
    User {
        id: Some("u1".to_string()),
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
    }
}

pub fn signed_in_session() -> Session {
    let session = Session::new();
    session
        .set("token-1".to_string(), user())
        .expect("in-memory session");
    session
}

pub fn gateway(transport: &ScriptedTransport, session: Session) -> Gateway<ScriptedTransport> {
    Gateway::new(transport.clone(), session, &format!("{BASE_URL}/"))
}

pub fn task_json(id: &str, title: &str, priority: &str, list: &str, completed: bool) -> Value {
    json!({
        "_id": id,
        "title": title,
        "priority": priority,
        "dueDate": "2025-08-25T00:00:00.000Z",
        "listId": list,
        "isCompleted": completed,
    })
}

pub fn list_json(id: &str, name: &str) -> Value {
    json!({ "_id": id, "name": name })
}

pub fn seed_tasks() -> Value {
    json!([
        task_json("t1", "Finish Q2 financial report", "High", "l1", false),
        task_json("t2", "Schedule team meeting", "Medium", "l1", false),
        task_json("t3", "Call the dentist", "High", "l2", false),
        task_json("t4", "Buy milk and eggs", "Low", "l3", true),
    ])
}

pub fn seed_lists() -> Value {
    json!([
        list_json("l1", "Work"),
        list_json("l2", "Personal"),
        list_json("l3", "Shopping"),
    ])
}
