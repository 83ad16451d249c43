//! The upload state machine.
//!
//! ```text
//! SessionCreated -> Uploading -> Continuing -> Uploading -> ...
//!                            \-> Completed   -> Done
//!                            \-> Reconciling -> Done | Failed
//! ```
//!
//! Chunks go out strictly one after another: every response can change what
//! the server still wants, so nothing is sent ahead of it.

use chrono::Utc;
use futures::StreamExt;
use reqwest::header::CONTENT_RANGE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::catalog::Catalog;
use crate::codec::Codec;
use crate::config::UploadConfig;
use crate::error::{Result, UploadError};
use crate::normalize::NormalizedRangeItem;
use crate::session::{ChunkResponse, CreateSession, Item, SessionItem, SessionUpdate, UploadOutcome, UploadSession, UploadTarget};
use crate::stream::{Chunk, ChunkStream};
use crate::transport::{Transport, TransportRequest, TransportResponse};
use crate::UploadSource;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug)]
enum UploadState {
    SessionCreated(UploadSession),
    Uploading {
        session: UploadSession,
        // the batch sent in the previous round, if any
        sent: Option<Vec<NormalizedRangeItem>>,
    },
    Continuing {
        session: UploadSession,
        update: SessionUpdate,
        sent: Vec<NormalizedRangeItem>,
    },
    Completed(Item),
    Reconciling,
}

/// Drives one upload from session creation to the finished item.
///
/// Borrows its collaborators; each call to [`UploadOrchestrator::upload`] owns
/// its own session and read buffer.
pub struct UploadOrchestrator<'a, T: ?Sized, C, K: ?Sized> {
    transport: &'a T,
    codec: &'a C,
    catalog: &'a K,
    config: &'a UploadConfig,
    cancel: CancellationToken,
}

impl<'a, T, C, K> UploadOrchestrator<'a, T, C, K>
where
    T: Transport + ?Sized,
    C: Codec,
    K: Catalog + ?Sized,
{
    pub fn new(transport: &'a T, codec: &'a C, catalog: &'a K, config: &'a UploadConfig) -> Self {
        UploadOrchestrator {
            transport,
            codec,
            catalog,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts the upload when `cancel` fires, between chunks or in the middle
    /// of a request. The session is left as it is on the server.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns a cancellation token for this upload.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads all of `source` as `target.name` into `target.parent_id`.
    ///
    /// Returns the finished item, either as sent back by the server or, when
    /// the server never sent it, as found by looking the name up in the
    /// catalog.
    #[instrument(skip_all, fields(file = %target.name, size = source.byte_size()))]
    pub async fn upload<B>(&self, target: &UploadTarget, source: &mut B) -> Result<Item>
    where
        B: UploadSource + Unpin + Send,
    {
        self.config.validate()?;

        let session = self.create_session(target).await?;
        match self.run(UploadState::SessionCreated(session), source).await? {
            UploadOutcome::CompletedItem(item) => {
                info!(id = %item.id, "upload complete");
                Ok(item)
            }
            UploadOutcome::NeedsReconciliation => self.reconcile(target).await,
        }
    }

    /// Asks the server for a new upload session for `target`.
    pub async fn create_session(&self, target: &UploadTarget) -> Result<UploadSession> {
        let body = CreateSession {
            item: SessionItem {
                name: &target.name,
                conflict_behavior: self.config.conflict_behavior,
            },
        };
        let request = TransportRequest::post(target.create_session_path())
            .body(self.codec.content_type(), self.codec.encode(&body)?)?;

        let response = self.send(request).await?;
        let session: UploadSession = self.codec.decode(&response.body)?;
        info!(url = %session.upload_url, expiration = %session.expiration, "upload session created");
        Ok(session)
    }

    /// Uploads whatever `session` is missing until the server either returns
    /// the finished item or stops giving directions.
    pub async fn resume<B>(&self, session: UploadSession, source: &mut B) -> Result<UploadOutcome>
    where
        B: UploadSource + Unpin + Send,
    {
        self.config.validate()?;
        self.run(UploadState::SessionCreated(session), source).await
    }

    async fn run<B>(&self, mut state: UploadState, source: &mut B) -> Result<UploadOutcome>
    where
        B: UploadSource + Unpin + Send,
    {
        let total_length = source.byte_size();

        loop {
            state = match state {
                UploadState::SessionCreated(session) => UploadState::Uploading { session, sent: None },

                UploadState::Uploading { session, sent } => {
                    if session.is_expired(Utc::now()) {
                        warn!(expiration = %session.expiration, "upload session has expired");
                    }

                    let ranges = session.missing_range_set()?.normalize(total_length)?;
                    if ranges.is_empty() {
                        debug!("nothing left to send");
                        UploadState::Reconciling
                    } else if sent.as_ref() == Some(&ranges) {
                        warn!(ranges = ?ranges, "server asked for the same ranges again");
                        UploadState::Reconciling
                    } else {
                        match self.upload_batch(&session.upload_url, &ranges, total_length, source).await? {
                            Some(ChunkResponse::Completed(item)) => UploadState::Completed(item),
                            Some(ChunkResponse::Continue(update)) => UploadState::Continuing { session, update, sent: ranges },
                            None => {
                                warn!("last chunk response was neither an item nor a session");
                                UploadState::Reconciling
                            }
                        }
                    }
                }

                UploadState::Continuing { session, update, sent } => {
                    let session = session.apply(update);
                    debug!(missing = ?session.missing_ranges, "continuing upload session");
                    UploadState::Uploading { session, sent: Some(sent) }
                }

                UploadState::Completed(item) => return Ok(UploadOutcome::CompletedItem(item)),

                UploadState::Reconciling => return Ok(UploadOutcome::NeedsReconciliation),
            };
        }
    }

    /// Sends every chunk of `ranges`. Returns early on a finished item,
    /// otherwise whatever the last response said.
    async fn upload_batch<B>(
        &self,
        upload_url: &Url,
        ranges: &[NormalizedRangeItem],
        total_length: u64,
        source: &mut B,
    ) -> Result<Option<ChunkResponse>>
    where
        B: UploadSource + Unpin + Send,
    {
        let chunk_size = self.config.chunk_size;
        let mut chunks = ChunkStream::new(source, ranges.iter().flat_map(|range| range.chunks(chunk_size)));
        let mut last = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            let chunk = match chunks.next().await {
                Some(chunk) => chunk?,
                None => break,
            };

            let response = self.put_chunk(upload_url, &chunk, total_length).await?;
            match self.codec.decode_chunk_response(&response.body) {
                Some(ChunkResponse::Completed(item)) => {
                    if chunks.remaining() > 0 {
                        debug!(remaining = chunks.remaining(), "server finished the upload early");
                    }
                    return Ok(Some(ChunkResponse::Completed(item)));
                }
                response => last = response,
            }
        }

        Ok(last)
    }

    async fn put_chunk(&self, upload_url: &Url, chunk: &Chunk, total_length: u64) -> Result<TransportResponse> {
        debug!(offset = chunk.range.from(), len = chunk.range.len(), "uploading chunk");
        let request = TransportRequest::put(upload_url.clone())
            .header(CONTENT_RANGE, &chunk.range.content_range(total_length))?
            .body(OCTET_STREAM, chunk.data.clone())?;
        self.send(request).await
    }

    /// Looks the target up by name after the server failed to return it.
    pub async fn reconcile(&self, target: &UploadTarget) -> Result<Item> {
        warn!(parent = %target.parent_id, name = %target.name, "upload ended without an item, looking it up");
        let lookup = self.catalog.find_child(&target.drive_id, &target.parent_id, &target.name);
        let found = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
            found = lookup => found?,
        };
        found.ok_or_else(|| UploadError::ReconciliationNotFound {
            parent_id: target.parent_id.clone(),
            name: target.name.clone(),
        })
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
            response = self.transport.send(request) => response,
        }
    }
}
