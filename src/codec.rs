use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::session::{ChunkResponse, Item, SessionUpdate};

/// Turns typed records into request bodies and response bodies back into
/// typed records.
pub trait Codec: Send + Sync {
    /// `Content-Type` of the bodies produced by [`Codec::encode`].
    fn content_type(&self) -> &'static str;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes>;

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T>;

    /// Classifies the body of a successful chunk PUT. `None` when the body is
    /// neither a finished item nor a session update.
    fn decode_chunk_response(&self, body: &[u8]) -> Option<ChunkResponse>;
}

/// JSON with camelCase property names, the format the drive API speaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

const SESSION_FIELDS: [&str; 3] = ["uploadUrl", "nextExpectedRanges", "expirationDateTime"];

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(body)?)
    }

    fn decode_chunk_response(&self, body: &[u8]) -> Option<ChunkResponse> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "chunk response is not JSON");
                return None;
            }
        };
        let object = value.as_object()?;

        if object.contains_key("id") {
            return match serde_json::from_value::<Item>(value) {
                Ok(item) => Some(ChunkResponse::Completed(item)),
                Err(e) => {
                    warn!(error = %e, "chunk response has an id but is not an item");
                    None
                }
            };
        }
        if SESSION_FIELDS.iter().any(|field| object.contains_key(*field)) {
            return match serde_json::from_value::<SessionUpdate>(value) {
                Ok(update) => Some(ChunkResponse::Continue(update)),
                Err(e) => {
                    warn!(error = %e, "chunk response is not a session update");
                    None
                }
            };
        }
        None
    }
}
