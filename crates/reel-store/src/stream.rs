//! Chunked, bounded file streaming
//!
//! A [`ChunkStream`] reads a file in fixed-size segments so that artifact
//! transfers never hold a whole video in memory. The byte budget is the
//! file's size when it was opened: bytes appended later are not sent, and a
//! file that shrinks ends the stream at the first empty read.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Default transfer segment size
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Errors raised while opening or reading a streamed file
#[derive(Error, Debug)]
pub enum StreamError {
    /// Chunk size must be at least one byte
    #[error("Invalid chunk size: must be greater than zero")]
    InvalidChunkSize,

    /// The file could not be opened or stat'ed
    #[error("Failed to open {path}: {source}")]
    Open {
        /// File being opened
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A read failed mid-transfer
    #[error("Failed to read chunk from {path}: {source}")]
    Read {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl StreamError {
    /// True when the file did not exist at open time
    pub fn is_not_found(&self) -> bool {
        matches!(self, StreamError::Open { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

struct ReadState {
    file: File,
    path: PathBuf,
    remaining: u64,
    chunk_size: usize,
}

impl ReadState {
    /// Fill one chunk, looping over short reads. `Ok(None)` is end of data.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        let want = self.remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;

        while filled < want {
            let n = self
                .file
                .read(&mut buf[filled..])
                .await
                .map_err(|source| StreamError::Read {
                    path: self.path.clone(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        self.remaining -= filled as u64;
        Ok(Some(Bytes::from(buf)))
    }
}

/// Lazy, finite, non-restartable sequence of file chunks
///
/// The file handle lives inside the stream state and is dropped as soon as
/// the stream ends, fails, or is itself dropped. A dropped response body
/// (client disconnect) therefore releases the handle without extra plumbing.
///
/// # Examples
///
/// ```no_run
/// use futures::StreamExt;
/// use reel_store::{ChunkStream, DEFAULT_CHUNK_SIZE};
///
/// # async fn demo() -> Result<(), reel_store::StreamError> {
/// let mut stream = ChunkStream::open("temp/out.mp4", DEFAULT_CHUNK_SIZE).await?;
/// while let Some(chunk) = stream.next().await {
///     let chunk = chunk?;
///     println!("{} bytes", chunk.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChunkStream {
    file_size: u64,
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>,
}

impl ChunkStream {
    /// Open `path` and capture its current size as the transfer budget
    pub async fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self, StreamError> {
        if chunk_size == 0 {
            return Err(StreamError::InvalidChunkSize);
        }

        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|source| StreamError::Open {
            path: path.clone(),
            source,
        })?;
        let file_size = file
            .metadata()
            .await
            .map_err(|source| StreamError::Open {
                path: path.clone(),
                source,
            })?
            .len();

        tracing::debug!(path = %path.display(), file_size, chunk_size, "Opened chunk stream");

        let state = ReadState {
            file,
            path,
            remaining: file_size,
            chunk_size,
        };

        // `None` state is terminal: the handle has been dropped
        let inner = stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            if state.remaining == 0 {
                return None;
            }
            match state.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(state))),
                Ok(None) => None,
                Err(e) => {
                    tracing::error!(error = %e, "Chunk stream read failed");
                    Some((Err(e), None))
                }
            }
        });

        Ok(Self {
            file_size,
            inner: Box::pin(inner),
        })
    }

    /// Size captured at open time; total bytes this stream will emit at most
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

impl Stream for ChunkStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("file_size", &self.file_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn patterned_file(len: usize) -> (NamedTempFile, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        (file, data)
    }

    #[tokio::test]
    async fn test_chunk_sizes_and_fidelity() {
        let (file, data) = patterned_file(10_000);
        let mut stream = ChunkStream::open(file.path(), 4096).await.unwrap();
        assert_eq!(stream.file_size(), 10_000);

        let mut sizes = Vec::new();
        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            sizes.push(chunk.len());
            received.extend_from_slice(&chunk);
        }

        assert_eq!(sizes, vec![4096, 4096, 1808]);
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_empty_file_yields_nothing() {
        let (file, _) = patterned_file(0);
        let mut stream = ChunkStream::open(file.path(), DEFAULT_CHUNK_SIZE).await.unwrap();
        assert_eq!(stream.file_size(), 0);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_stream_stays_exhausted() {
        let (file, _) = patterned_file(100);
        let mut stream = ChunkStream::open(file.path(), 64).await.unwrap();
        while stream.next().await.is_some() {}

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_bytes_appended_after_open_are_not_sent() {
        let (mut file, data) = patterned_file(5_000);
        let mut stream = ChunkStream::open(file.path(), 1024).await.unwrap();

        file.write_all(&[0xAA; 3_000]).unwrap();
        file.flush().unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_truncated_file_ends_at_eof() {
        let (file, data) = patterned_file(5_000);
        let mut stream = ChunkStream::open(file.path(), 1024).await.unwrap();

        file.as_file().set_len(1_500).unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, &data[..1_500]);
    }

    /// Open descriptors in this process that refer to `path`
    #[cfg(target_os = "linux")]
    fn open_handles(path: &Path) -> usize {
        let target = std::fs::canonicalize(path).unwrap();
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
            .filter(|link| *link == target)
            .count()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_stream_releases_handle() {
        let (file, data) = patterned_file(20_000);
        let baseline = open_handles(file.path());

        let mut first = ChunkStream::open(file.path(), 4096).await.unwrap();
        assert_eq!(open_handles(file.path()), baseline + 1);

        let head = first.next().await.unwrap().unwrap();
        assert_eq!(&head[..], &data[..4096]);
        drop(first);
        assert_eq!(open_handles(file.path()), baseline);

        // A fresh open starts over from the first byte
        let mut second = ChunkStream::open(file.path(), 4096).await.unwrap();
        let head = second.next().await.unwrap().unwrap();
        assert_eq!(&head[..], &data[..4096]);
        drop(second);
        assert_eq!(open_handles(file.path()), baseline);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_finished_stream_releases_handle() {
        let (file, _) = patterned_file(3_000);
        let baseline = open_handles(file.path());

        let mut stream = ChunkStream::open(file.path(), 1024).await.unwrap();
        while stream.next().await.is_some() {}

        // Handle goes with the exhausted state, before the stream is dropped
        assert_eq!(open_handles(file.path()), baseline);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChunkStream::open(dir.path().join("gone.mp4"), 4096)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_zero_chunk_size_rejected() {
        let (file, _) = patterned_file(10);
        let err = ChunkStream::open(file.path(), 0).await.unwrap_err();
        assert!(matches!(err, StreamError::InvalidChunkSize));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_read_surfaces_error_once() {
        // Opening a directory succeeds on Unix; reading it fails
        let dir = tempfile::tempdir().unwrap();
        let mut stream = match ChunkStream::open(dir.path(), 4096).await {
            Ok(stream) => stream,
            Err(_) => return,
        };
        if stream.file_size() == 0 {
            return;
        }

        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(StreamError::Read { .. })));
        assert!(stream.next().await.is_none());
    }
}
