//! Streaming response bodies

use std::io;
use std::time::Duration;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::io::AsyncReadExt;
use torrent::FileStream;

/// Upper bound on bytes read from a source per chunk
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// How long a stream may go without producing data
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60 * 60);

struct CopyState {
    source: FileStream,
    buffer: BytesMut,
    idle_timeout: Duration,
    finished: bool,
}

/// Pull-driven copy of `source` into chunks of at most [`STREAM_BUFFER_SIZE`].
///
/// A read only happens when the consumer polls for the next chunk. The stream
/// ends with an error if the source fails or stays silent for `idle_timeout`.
pub fn copy_stream(
    source: FileStream,
    idle_timeout: Duration,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let state = CopyState {
        source,
        buffer: BytesMut::with_capacity(STREAM_BUFFER_SIZE),
        idle_timeout,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        state.buffer.clear();
        state.buffer.reserve(STREAM_BUFFER_SIZE);
        let mut limited = (&mut state.source).take(STREAM_BUFFER_SIZE as u64);
        let read = tokio::time::timeout(state.idle_timeout, limited.read_buf(&mut state.buffer)).await;

        match read {
            Ok(Ok(0)) => None,
            Ok(Ok(_)) => {
                let chunk = state.buffer.split().freeze();
                Some((Ok(chunk), state))
            }
            Ok(Err(e)) => {
                tracing::warn!("Stream source failed: {}", e);
                state.finished = true;
                Some((Err(e), state))
            }
            Err(_) => {
                tracing::warn!("Stream idle for {:?}, closing", state.idle_timeout);
                state.finished = true;
                Some((
                    Err(io::Error::new(io::ErrorKind::TimedOut, "stream idle timeout")),
                    state,
                ))
            }
        }
    })
}

/// Wrap `source` in a response body
pub fn stream_body(source: FileStream, idle_timeout: Duration) -> Body {
    Body::from_stream(copy_stream(source, idle_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_chunks_are_bounded() {
        let data = vec![7u8; STREAM_BUFFER_SIZE * 2 + 10];
        let source: FileStream = Box::pin(Cursor::new(data.clone()));

        let chunks: Vec<Bytes> = copy_stream(source, STREAM_IDLE_TIMEOUT)
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;

        assert!(chunks.iter().all(|c| c.len() <= STREAM_BUFFER_SIZE));
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let source: FileStream = Box::pin(Cursor::new(Vec::new()));
        let mut stream = Box::pin(copy_stream(source, STREAM_IDLE_TIMEOUT));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_source_times_out() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"head").await.unwrap();

        let source: FileStream = Box::pin(reader);
        let mut stream = Box::pin(copy_stream(source, Duration::from_secs(5)));

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"head"));

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(stream.next().await.is_none());

        drop(writer);
    }

    #[tokio::test]
    async fn test_source_error_ends_stream() {
        let source: FileStream = Box::pin(FailingReader);
        let mut stream = Box::pin(copy_stream(source, STREAM_IDLE_TIMEOUT));
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    /// Reader that holds a shared handle for as long as it is alive
    struct TrackedReader {
        data: Cursor<Vec<u8>>,
        _alive: Arc<()>,
    }

    impl tokio::io::AsyncRead for TrackedReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            tokio::io::AsyncRead::poll_read(std::pin::Pin::new(&mut self.data), cx, buf)
        }
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_source() {
        let alive = Arc::new(());
        let source: FileStream = Box::pin(TrackedReader {
            data: Cursor::new(vec![1u8; STREAM_BUFFER_SIZE * 4]),
            _alive: alive.clone(),
        });

        let mut stream = Box::pin(copy_stream(source, STREAM_IDLE_TIMEOUT));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), STREAM_BUFFER_SIZE);
        assert_eq!(Arc::strong_count(&alive), 2);

        // Client went away before the rest was read
        drop(stream);
        assert_eq!(Arc::strong_count(&alive), 1);
    }

    struct FailingReader;

    impl tokio::io::AsyncRead for FailingReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Err(io::Error::other("disk gone")))
        }
    }
}
