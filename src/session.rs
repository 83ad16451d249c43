use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::RangeError;
use crate::range::{RangeItem, RangeSet};
use crate::transport::path_segment;

/// A server issued handle for one resumable upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Where fragment PUT requests go.
    pub upload_url: Url,

    #[serde(rename = "expirationDateTime")]
    pub expiration: DateTime<Utc>,

    /// Byte ranges the server is still missing, in `Range` item syntax.
    /// Empty means the whole entity. Not always a full list.
    #[serde(rename = "nextExpectedRanges", default, deserialize_with = "null_as_empty")]
    pub missing_ranges: Vec<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl UploadSession {
    /// The missing ranges as a `bytes` [`RangeSet`]; `bytes=*` when the
    /// server listed none.
    pub fn missing_range_set(&self) -> Result<RangeSet, RangeError> {
        if self.missing_ranges.is_empty() {
            return Ok(RangeSet::entire());
        }
        let items = self
            .missing_ranges
            .iter()
            .map(|item| RangeItem::parse(item.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        RangeSet::bytes(items)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    /// A new session carrying whatever `update` specifies and this session's
    /// values for the rest.
    pub fn apply(&self, update: SessionUpdate) -> UploadSession {
        UploadSession {
            upload_url: update.upload_url.unwrap_or_else(|| self.upload_url.clone()),
            expiration: update.expiration.unwrap_or(self.expiration),
            missing_ranges: update.next_expected_ranges.unwrap_or_default(),
        }
    }
}

/// The body of a fragment response that did not finish the upload.
///
/// Fragment responses usually leave out `uploadUrl`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<Url>,

    #[serde(rename = "expirationDateTime", default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_expected_ranges: Option<Vec<String>>,
}

/// Remote item metadata, as far as uploads care about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<Url>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date_time: Option<DateTime<Utc>>,

    /// Every other facet the server sent.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// What the server does when the destination name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictBehavior {
    Fail,
    #[default]
    Replace,
    Rename,
}

/// Where an upload lands: `name` inside folder `parent_id` of drive `drive_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadTarget {
    pub drive_id: String,
    pub parent_id: String,
    pub name: String,
}

impl UploadTarget {
    pub fn new(drive_id: impl Into<String>, parent_id: impl Into<String>, name: impl Into<String>) -> Self {
        UploadTarget {
            drive_id: drive_id.into(),
            parent_id: parent_id.into(),
            name: name.into(),
        }
    }

    pub(crate) fn create_session_path(&self) -> String {
        format!(
            "drives/{}/items/{}:/{}:/upload.createSession",
            path_segment(&self.drive_id),
            path_segment(&self.parent_id),
            path_segment(&self.name)
        )
    }
}

/// Body of the session creation request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateSession<'a> {
    pub item: SessionItem<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SessionItem<'a> {
    pub name: &'a str,
    #[serde(rename = "@name.conflictBehavior")]
    pub conflict_behavior: ConflictBehavior,
}

/// How a chunk response ended: either the finished item, or more session
/// state to continue with.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResponse {
    Completed(Item),
    Continue(SessionUpdate),
}

/// Result of driving a session until the server stops asking for bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    CompletedItem(Item),
    /// The server never returned the item; look it up by name.
    NeedsReconciliation,
}
