//! # range-upload
//!
//! Resumable, chunked uploads to a remote drive, driven by HTTP byte ranges.
//!
//! The server hands out an upload session and tells the client which byte
//! ranges it is still missing. [`UploadOrchestrator`] normalizes those ranges,
//! reads them from any [`UploadSource`] in fixed size chunks and `PUT`s each
//! chunk with a `Content-Range` until the server returns the finished item.
//!
//! The range model ([`RangeItem`], [`RangeSet`], [`NormalizedRangeItem`]) is
//! usable on its own.
//!
//! Any type implementing both [`AsyncRead`] and [`AsyncSeekStart`] can be
//! uploaded through the [`KnownSize`] adapter struct. There is also special
//! cased support for [`tokio::fs::File`], see the [`KnownSize::file`] method.
//!
//! [`AsyncSeekStart`] is a trait defined by this crate which only allows
//! seeking from the start of a file. It is automatically implemented for any
//! type implementing [`AsyncSeek`].
//!
//! ```no_run
//! use range_upload::{DriveClient, HttpTransport, KnownSize, UploadTarget};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn upload() -> range_upload::Result<()> {
//! let client = DriveClient::new(HttpTransport::new(range_upload::DEFAULT_API_BASE)?);
//! let mut source = KnownSize::open("backup.tar").await?;
//! let target = UploadTarget::new("drive-id", "folder-id", "backup.tar");
//!
//! let item = client.upload_file(&target, &mut source, CancellationToken::new()).await?;
//! println!("uploaded {} ({:?} bytes)", item.id, item.size);
//! # Ok(())
//! # }
//! ```

mod catalog;
mod client;
mod codec;
mod config;
mod error;
mod file;
mod normalize;
mod range;
mod session;
mod stream;
mod transport;
mod upload;

#[cfg(test)]
mod testing;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek};

pub use catalog::Catalog;
pub use client::DriveClient;
pub use codec::{Codec, JsonCodec};
pub use config::{UploadConfig, CHUNK_SIZE_ENV, CONFLICT_BEHAVIOR_ENV, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use error::{RangeError, Result, UploadError};
pub use file::KnownSize;
pub use normalize::{Chunks, NormalizedRangeItem};
pub use range::{RangeItem, RangeSet, BYTES_UNIT};
pub use session::{ChunkResponse, ConflictBehavior, Item, SessionUpdate, UploadOutcome, UploadSession, UploadTarget};
pub use stream::{Chunk, ChunkStream};
pub use transport::{path_segment, HttpTransport, Resource, Transport, TransportRequest, TransportResponse, DEFAULT_API_BASE};
pub use upload::UploadOrchestrator;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait UploadSource: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying data.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// The upload session is sized from it; a source that turns out shorter
    /// fails the upload with [`UploadError::ShortRead`].
    fn byte_size(&self) -> u64;
}
