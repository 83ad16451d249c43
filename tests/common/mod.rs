//! An in-memory drive speaking just enough of the resumable upload protocol
//! to exercise `HttpTransport` end to end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Debug, Clone, Default)]
pub struct StoredItem {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct Session {
    parent_id: String,
    name: String,
    total: Option<u64>,
    data: Vec<u8>,
    // inclusive, merged
    received: Vec<(u64, u64)>,
}

impl Session {
    fn missing(&self) -> Vec<String> {
        let Some(total) = self.total else {
            return vec!["0-".to_string()];
        };
        let mut missing = Vec::new();
        let mut next = 0;
        for &(from, to) in &self.received {
            if from > next {
                missing.push(format!("{next}-{}", from - 1));
            }
            next = to + 1;
        }
        if next < total {
            missing.push(format!("{next}-"));
        }
        missing
    }

    fn receive(&mut self, from: u64, to: u64, bytes: &[u8]) {
        let end = to as usize + 1;
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[from as usize..end].copy_from_slice(bytes);

        self.received.push((from, to));
        self.received.sort();
        let mut merged: Vec<(u64, u64)> = Vec::new();
        for &(from, to) in &self.received {
            match merged.last_mut() {
                Some(last) if from <= last.1 + 1 => last.1 = last.1.max(to),
                _ => merged.push((from, to)),
            }
        }
        self.received = merged;
    }

    fn is_complete(&self) -> bool {
        self.total.is_some() && self.missing().is_empty()
    }
}

#[derive(Debug, Default)]
struct Drive {
    base: String,
    sessions: HashMap<String, Session>,
    items: Vec<StoredItem>,
    next_id: u64,
    // answer the final fragment with an empty body, as some servers do
    withhold_item: bool,
    // ranges a chunk response pretends are still missing
    forced_missing: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct MockDrive {
    state: Arc<Mutex<Drive>>,
    pub addr: SocketAddr,
}

impl MockDrive {
    pub async fn start() -> MockDrive {
        let state = Arc::new(Mutex::new(Drive::default()));
        let app = Router::new()
            .route("/drives/{drive}/items/{*rest}", get(get_item).post(create_session))
            .route("/upload/{session}", put(put_fragment))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        state.lock().unwrap().base = format!("http://{addr}");
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockDrive { state, addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn withhold_item(&self) {
        self.state.lock().unwrap().withhold_item = true;
    }

    pub fn force_missing(&self, ranges: &[&str]) {
        self.state.lock().unwrap().forced_missing = Some(ranges.iter().map(|r| r.to_string()).collect());
    }

    pub fn insert(&self, parent_id: &str, name: &str, data: &[u8]) -> String {
        let mut drive = self.state.lock().unwrap();
        let id = drive.allocate_id();
        drive.items.push(StoredItem {
            id: id.clone(),
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            data: data.to_vec(),
        });
        id
    }

    pub fn items(&self) -> Vec<StoredItem> {
        self.state.lock().unwrap().items.clone()
    }
}

impl Drive {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("item-{}", self.next_id)
    }
}

fn item_json(item: &StoredItem) -> Value {
    json!({ "id": item.id, "name": item.name, "size": item.data.len() })
}

type SharedDrive = Arc<Mutex<Drive>>;

async fn create_session(
    State(state): State<SharedDrive>,
    Path((_drive, rest)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    // {parent}:/{name}:/upload.createSession
    let Some((parent_id, name)) = rest
        .strip_suffix(":/upload.createSession")
        .and_then(|rest| rest.split_once(":/"))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if body["item"]["name"] != name {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let mut drive = state.lock().unwrap();
    let session_id = format!("session-{}", drive.sessions.len() + 1);
    drive.sessions.insert(
        session_id.clone(),
        Session {
            parent_id: parent_id.to_string(),
            name: name.to_string(),
            total: None,
            data: Vec::new(),
            received: Vec::new(),
        },
    );

    Json(json!({
        "uploadUrl": format!("{}/upload/{session_id}", drive.base),
        "expirationDateTime": "2099-01-01T00:00:00Z",
        "nextExpectedRanges": ["0-"],
    }))
    .into_response()
}

fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let (span, total) = value.strip_prefix("bytes ")?.split_once('/')?;
    let (from, to) = span.split_once('-')?;
    Some((from.parse().ok()?, to.parse().ok()?, total.parse().ok()?))
}

async fn put_fragment(
    State(state): State<SharedDrive>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some((from, to, total)) = headers
        .get(header::CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_range)
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if to < from || to >= total || body.len() as u64 != to - from + 1 {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }

    let mut drive = state.lock().unwrap();
    let drive = &mut *drive;
    let Some(session) = drive.sessions.get_mut(&session_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    session.total = Some(total);
    session.receive(from, to, &body);

    if let Some(missing) = &drive.forced_missing {
        return (StatusCode::ACCEPTED, Json(json!({ "nextExpectedRanges": missing }))).into_response();
    }
    if !session.is_complete() {
        return (StatusCode::ACCEPTED, Json(json!({ "nextExpectedRanges": session.missing() }))).into_response();
    }

    let Some(session) = drive.sessions.remove(&session_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let item = StoredItem {
        id: drive.allocate_id(),
        parent_id: session.parent_id,
        name: session.name,
        data: session.data,
    };
    let response = item_json(&item);
    drive.items.push(item);

    if drive.withhold_item {
        StatusCode::OK.into_response()
    } else {
        (StatusCode::CREATED, Json(response)).into_response()
    }
}

async fn get_item(
    State(state): State<SharedDrive>,
    Path((_drive, rest)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let drive = state.lock().unwrap();

    if let Some(parent_id) = rest.strip_suffix("/children") {
        let children: Vec<Value> = drive.items.iter().filter(|item| item.parent_id == parent_id).map(item_json).collect();
        return Json(json!({ "value": children })).into_response();
    }

    let Some(item) = rest
        .strip_suffix("/content")
        .and_then(|id| drive.items.iter().find(|item| item.id == id))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let offset = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
        .and_then(|value| value.strip_suffix('-'))
        .and_then(|value| value.parse::<usize>().ok());
    match offset {
        Some(offset) if offset < item.data.len() => {
            let len = item.data.len();
            (
                StatusCode::PARTIAL_CONTENT,
                [(header::CONTENT_RANGE, format!("bytes {offset}-{}/{len}", len - 1))],
                item.data[offset..].to_vec(),
            )
                .into_response()
        }
        Some(_) => StatusCode::RANGE_NOT_SATISFIABLE.into_response(),
        None => item.data.clone().into_response(),
    }
}
