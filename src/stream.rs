use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::io::ReadBuf;

use crate::error::UploadError;
use crate::normalize::NormalizedRangeItem;
use crate::UploadSource;

/// One planned piece of an upload together with its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub range: NormalizedRangeItem,
    pub data: Bytes,
}

/// Reads a batch of chunks from an [`UploadSource`], seeking to each chunk's
/// offset. Implements [`Stream`].
///
/// Every yielded [`Chunk`] holds exactly `range.len()` bytes. A source that
/// ends early yields [`UploadError::ShortRead`] and then nothing more.
pub struct ChunkStream<'a, B> {
    state: StreamState,
    pending: VecDeque<NormalizedRangeItem>,
    body: &'a mut B,
}

impl<'a, B: UploadSource + Unpin> ChunkStream<'a, B> {
    pub fn new(body: &'a mut B, chunks: impl IntoIterator<Item = NormalizedRangeItem>) -> Self {
        ChunkStream {
            state: StreamState::Next,
            pending: chunks.into_iter().collect(),
            body,
        }
    }

    /// Chunks not yet read.
    pub fn remaining(&self) -> usize {
        self.pending.len() + usize::from(!matches!(self.state, StreamState::Next | StreamState::Finished))
    }
}

#[derive(Debug)]
enum StreamState {
    Next,
    Seek { range: NormalizedRangeItem },
    Seeking { range: NormalizedRangeItem },
    Reading { range: NormalizedRangeItem, buffer: BytesMut },
    Finished,
}

impl<B: UploadSource + Unpin> Stream for ChunkStream<'_, B> {
    type Item = Result<Chunk, UploadError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<Result<Chunk, UploadError>>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                StreamState::Next => {
                    match this.pending.pop_front() {
                        Some(range) => { this.state = StreamState::Seek { range }; }
                        None => {
                            this.state = StreamState::Finished;
                            return Poll::Ready(None);
                        }
                    }
                }

                StreamState::Seek { range } => {
                    let range = *range;
                    if let Err(e) = Pin::new(&mut *this.body).start_seek(range.from()) {
                        this.state = StreamState::Finished;
                        return Poll::Ready(Some(Err(e.into())));
                    }
                    this.state = StreamState::Seeking { range };
                }

                StreamState::Seeking { range } => {
                    let range = *range;
                    match Pin::new(&mut *this.body).poll_complete(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            this.state = StreamState::Finished;
                            return Poll::Ready(Some(Err(e.into())));
                        }
                        Poll::Ready(Ok(())) => {
                            let buffer = allocate_buffer(range.len());
                            this.state = StreamState::Reading { range, buffer };
                        }
                    }
                }

                StreamState::Reading { range, buffer } => {
                    let range = *range;
                    let wanted = usize::try_from(range.len()).unwrap_or(usize::MAX);
                    if buffer.len() == wanted {
                        let data = std::mem::take(buffer).freeze();
                        this.state = StreamState::Next;
                        return Poll::Ready(Some(Ok(Chunk { range, data })));
                    }

                    let remaining = wanted - buffer.len();
                    let uninit = buffer.spare_capacity_mut();

                    // never read past the end of this chunk
                    let nbytes = std::cmp::min(uninit.len(), remaining);

                    let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

                    match Pin::new(&mut *this.body).poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            this.state = StreamState::Finished;
                            return Poll::Ready(Some(Err(e.into())));
                        }
                        Poll::Ready(Ok(())) => {
                            match read_buf.filled().len() {
                                0 => {
                                    let actual = buffer.len() as u64;
                                    this.state = StreamState::Finished;
                                    return Poll::Ready(Some(Err(UploadError::ShortRead {
                                        offset: range.from(),
                                        expected: range.len(),
                                        actual,
                                    })));
                                }
                                n => {
                                    // SAFETY: poll_read has filled the first `n`
                                    // bytes of the spare capacity
                                    unsafe { buffer.set_len(buffer.len() + n); }
                                }
                            }
                        }
                    }
                }

                StreamState::Finished => return Poll::Ready(None),
            }
        }
    }
}

fn allocate_buffer(len: u64) -> BytesMut {
    BytesMut::with_capacity(usize::try_from(len).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;
    use futures::StreamExt;
    use tokio::fs::File;

    use super::*;
    use crate::error::UploadError;
    use crate::KnownSize;

    fn range(from: u64, to: u64) -> NormalizedRangeItem {
        NormalizedRangeItem::new(from, to)
    }

    async fn body() -> KnownSize<File> {
        KnownSize::open("test/fixture.txt").await.unwrap()
    }

    #[tokio::test]
    async fn test_reads_chunks_at_offsets() {
        let mut body = body().await;
        let mut stream = ChunkStream::new(&mut body, [range(35, 39), range(0, 10), range(53, 53)]);
        assert_eq!(3, stream.remaining());

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(range(35, 39), chunk.range);
        assert_eq!(&b"range"[..], &chunk.data[..]);

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&b"Hello world"[..], &chunk.data[..]);

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&b"\n"[..], &chunk.data[..]);

        assert!(stream.next().await.is_none());
        assert_eq!(0, stream.remaining());
    }

    #[tokio::test]
    async fn test_whole_file_in_blocks() {
        let mut body = body().await;
        let chunks: Vec<_> = range(0, 53).chunks(16).collect();
        let data: Vec<u8> = ChunkStream::new(&mut body, chunks)
            .map(|chunk| chunk.unwrap().data.to_vec())
            .concat()
            .await;
        assert_eq!(&b"Hello world this is a file to test range requests on!\n"[..], &data[..]);
    }

    #[tokio::test]
    async fn test_short_read() {
        // claims 100 bytes, has 54
        let file = File::open("test/fixture.txt").await.unwrap();
        let mut body = KnownSize::sized(file, 100);
        let mut stream = ChunkStream::new(&mut body, [range(40, 59), range(60, 79)]);

        assert_matches!(
            stream.next().await,
            Some(Err(UploadError::ShortRead { offset: 40, expected: 20, actual: 14 }))
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_short_read_past_end() {
        let mut body = KnownSize::sized(Cursor::new(vec![7u8; 10]), 20);
        let mut stream = ChunkStream::new(&mut body, [range(15, 19)]);
        assert_matches!(
            stream.next().await,
            Some(Err(UploadError::ShortRead { offset: 15, expected: 5, actual: 0 }))
        );
    }
}
