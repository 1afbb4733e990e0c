//! In-process mock of the Pipes API
//!
//! Replies are scripted per path (and per `next_token` for continued pages).
//! A path with several queued replies serves them in order and then repeats
//! the last one.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::Response;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use pipes_connectors::{ExecutionContext, PipesClient, RetryPolicy};

pub const TOKEN: &str = "tpt_test";

#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    body: String,
    retry_after: Option<u64>,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: value.to_string(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body: json!({"detail": "scripted failure"}).to_string(),
            retry_after: None,
        }
    }

    pub fn raw(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.to_string(),
            retry_after: None,
        }
    }

    pub fn retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

/// A listing page body
pub fn page(items: Value, next_token: Option<&str>) -> Reply {
    Reply::json(json!({"items": items, "next_token": next_token}))
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct MockState {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<Recorded>>,
}

pub struct MockApi {
    state: Arc<MockState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
        }
    }

    /// Caller returned by `/actor`
    pub fn with_actor(self, actor: Value) -> Self {
        self.on("/actor", Reply::json(actor))
    }

    /// Script a reply for an API path (relative to /api/v0)
    pub fn on(self, path: &str, reply: Reply) -> Self {
        self.state
            .replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Script the page served for `next_token`
    pub fn on_page(self, path: &str, next_token: &str, reply: Reply) -> Self {
        self.on(&format!("{}?next_token={}", path, next_token), reply)
    }

    pub async fn start(self) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().expect("failed to get addr");

        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&self.state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server failed");
        });

        MockServer {
            addr,
            state: self.state,
        }
    }
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockServer {
    pub fn base_url(&self) -> String {
        format!("http://{}/api/v0", self.addr)
    }

    pub fn client(&self) -> PipesClient {
        PipesClient::new(self.base_url(), TOKEN, Duration::from_secs(5)).unwrap()
    }

    pub fn ctx(&self) -> ExecutionContext {
        ExecutionContext::new(self.client(), fast_policy())
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of requests made to an API path (relative to /api/v0)
    pub fn hits(&self, path: &str) -> usize {
        let full = format!("/api/v0{}", path);
        self.requests().iter().filter(|r| r.path == full).count()
    }
}

/// Retry policy with millisecond delays
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(
        Duration::from_millis(1),
        Duration::from_millis(5),
        4,
        Duration::from_secs(5),
    )
}

pub fn alice() -> Value {
    json!({"id": "u_1", "handle": "alice", "display_name": "Alice", "tenant_id": "t_1"})
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().unwrap_or_default().to_string();
    state.requests.lock().unwrap().push(Recorded {
        path: path.clone(),
        query: query.clone(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let relative = path.strip_prefix("/api/v0").unwrap_or(&path);
    let key = match query
        .split('&')
        .find_map(|pair| pair.strip_prefix("next_token="))
    {
        Some(token) => format!("{}?next_token={}", relative, token),
        None => relative.to_string(),
    };

    let reply = {
        let mut replies = state.replies.lock().unwrap();
        match replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };
    let reply = reply.unwrap_or_else(|| Reply::status(404));

    let mut builder = Response::builder()
        .status(reply.status)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(secs) = reply.retry_after {
        builder = builder.header(header::RETRY_AFTER, secs.to_string());
    }
    builder.body(Body::from(reply.body)).unwrap()
}
