//! Local HTTP server standing in for the model host.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, StreamExt};

pub const MODEL_PATH: &str = "/model.gguf";
pub const MISSING_PATH: &str = "/missing.gguf";

#[derive(Debug, Clone, Default)]
struct Behaviour {
    ignore_ranges: bool,
    /// Drop the connection after this many body bytes, once
    fail_after: Option<usize>,
    /// Stop sending after this many body bytes and never finish, once
    stall_after: Option<usize>,
}

struct Shared {
    payload: Bytes,
    requests: AtomicUsize,
    behaviour: Mutex<Behaviour>,
    ranges: Mutex<Vec<Option<String>>>,
}

pub struct ModelServer {
    base: String,
    shared: Arc<Shared>,
}

impl ModelServer {
    pub async fn start(payload: Vec<u8>) -> Self {
        let shared = Arc::new(Shared {
            payload: Bytes::from(payload),
            requests: AtomicUsize::new(0),
            behaviour: Mutex::new(Behaviour::default()),
            ranges: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(MODEL_PATH, get(serve_model))
            .route(MISSING_PATH, get(|| async { StatusCode::NOT_FOUND }))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            shared,
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base, MODEL_PATH)
    }

    pub fn missing_url(&self) -> String {
        format!("{}{}", self.base, MISSING_PATH)
    }

    pub fn payload(&self) -> &[u8] {
        &self.shared.payload
    }

    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    /// `Range` header of every request so far, in order.
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.shared.ranges.lock().unwrap().clone()
    }

    /// Answer every request with the full body and 200.
    pub fn ignore_ranges(&self) {
        self.shared.behaviour.lock().unwrap().ignore_ranges = true;
    }

    /// Cut the next response after `bytes` body bytes.
    pub fn fail_next_after(&self, bytes: usize) {
        self.shared.behaviour.lock().unwrap().fail_after = Some(bytes);
    }

    /// Make the next response hang after `bytes` body bytes.
    pub fn stall_next_after(&self, bytes: usize) {
        self.shared.behaviour.lock().unwrap().stall_after = Some(bytes);
    }
}

fn requested_offset(headers: &HeaderMap) -> Option<usize> {
    let value = headers.get(RANGE)?.to_str().ok()?;
    let start = value.strip_prefix("bytes=")?.strip_suffix('-')?;
    start.parse().ok()
}

async fn serve_model(State(shared): State<Arc<Shared>>, headers: HeaderMap) -> Response {
    shared.requests.fetch_add(1, Ordering::SeqCst);
    shared.ranges.lock().unwrap().push(
        headers
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let (ignore_ranges, fail_after, stall_after) = {
        let mut behaviour = shared.behaviour.lock().unwrap();
        (
            behaviour.ignore_ranges,
            behaviour.fail_after.take(),
            behaviour.stall_after.take(),
        )
    };

    let total = shared.payload.len();
    let offset = if ignore_ranges {
        None
    } else {
        requested_offset(&headers)
    };

    let (status, body_bytes, content_range) = match offset {
        Some(start) if start >= total => {
            return (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(CONTENT_RANGE, format!("bytes */{}", total))],
            )
                .into_response();
        }
        Some(start) => (
            StatusCode::PARTIAL_CONTENT,
            shared.payload.slice(start..),
            Some(format!("bytes {}-{}/{}", start, total - 1, total)),
        ),
        None => (StatusCode::OK, shared.payload.clone(), None),
    };

    let length = body_bytes.len();
    let body = if let Some(cut) = fail_after {
        let head = body_bytes.slice(..cut.min(length));
        let tail = stream::once(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<Bytes, std::io::Error>(std::io::Error::other("connection cut by fixture"))
        });
        Body::from_stream(stream::iter([Ok(head)]).chain(tail))
    } else if let Some(cut) = stall_after {
        let head = body_bytes.slice(..cut.min(length));
        Body::from_stream(
            stream::iter([Ok::<Bytes, std::io::Error>(head)]).chain(stream::pending()),
        )
    } else {
        Body::from(body_bytes)
    };

    let mut response = Response::builder()
        .status(status)
        .header(CONTENT_LENGTH, length);
    if let Some(range) = content_range {
        response = response.header(CONTENT_RANGE, range);
    }
    response.body(body).unwrap()
}

/// Deterministic, non-repeating-looking test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 7) % 251) as u8).collect()
}
