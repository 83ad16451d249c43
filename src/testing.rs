//! Scripted collaborators for the orchestrator and client tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::json;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::session::Item;
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Answers requests from a queue, recording each one.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<TransportRequest>>,
    stalled: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    /// Never answers.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub fn respond(&self, status: StatusCode, body: &str) {
        self.responses.lock().unwrap().push_back(TransportResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
        });
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request);
        if self.stalled {
            return futures::future::pending().await;
        }
        let response = self.responses.lock().unwrap().pop_front();
        Ok(response.unwrap_or_else(|| panic!("no response scripted for request #{}", self.requests().len())))
    }
}

/// A catalog holding at most one item, which matches any lookup.
#[derive(Default)]
pub struct FixedCatalog {
    item: Option<Item>,
    lookups: Mutex<Vec<(String, String)>>,
}

impl FixedCatalog {
    pub fn empty() -> Self {
        FixedCatalog::default()
    }

    pub fn with(item: Item) -> Self {
        FixedCatalog { item: Some(item), ..FixedCatalog::default() }
    }

    /// `(parent_id, name)` of every lookup so far.
    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Catalog for FixedCatalog {
    async fn find_child(&self, _drive_id: &str, parent_id: &str, name: &str) -> Result<Option<Item>> {
        self.lookups.lock().unwrap().push((parent_id.to_string(), name.to_string()));
        Ok(self.item.clone())
    }
}

pub fn session_json(upload_url: &str, ranges: &[&str]) -> String {
    json!({
        "uploadUrl": upload_url,
        "expirationDateTime": "2099-01-01T00:00:00Z",
        "nextExpectedRanges": ranges,
    })
    .to_string()
}

pub fn update_json(ranges: &[&str]) -> String {
    json!({ "nextExpectedRanges": ranges }).to_string()
}

pub fn item_json(id: &str, name: &str, size: u64) -> String {
    json!({ "id": id, "name": name, "size": size }).to_string()
}
