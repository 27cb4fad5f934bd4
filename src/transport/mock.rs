//! Mock serial stream for testing.
//!
//! Stands in for the UART byte stream so the port worker pair can be
//! exercised without hardware. Bytes written by the TX worker accumulate in
//! an inspectable buffer; bytes queued by the test surface in the RX
//! worker's reads. An empty read parks the reader until data is queued or
//! the stream is closed.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Default)]
struct MockInner {
    /// Bytes written to the stream (outgoing direction)
    tx: Vec<u8>,
    /// Bytes waiting to be read (incoming direction)
    rx: VecDeque<u8>,
    /// Parked reader, woken on new data or close
    waker: Option<Waker>,
    closed: bool,
}

/// Bidirectional in-memory serial stream double.
#[derive(Clone, Default)]
pub struct MockSerialStream {
    inner: Arc<Mutex<MockInner>>,
}

impl MockSerialStream {
    pub fn new() -> Self {
        MockSerialStream::default()
    }

    /// Queues bytes for the reader side and wakes it.
    pub fn push_rx(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.rx.extend(data);
        if let Some(w) = inner.waker.take() {
            w.wake();
        }
    }

    /// Bytes written so far by the writer side.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().tx.clone()
    }

    /// Drops all captured and pending bytes.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.tx.clear();
        inner.rx.clear();
    }

    /// Signals end-of-stream to a parked or future reader.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        if let Some(w) = inner.waker.take() {
            w.wake();
        }
    }
}

impl AsyncRead for MockSerialStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.rx.is_empty() {
            if inner.closed {
                return Poll::Ready(Ok(())); // EOF
            }
            inner.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = inner.rx.len().min(buf.remaining());
        let data: Vec<u8> = inner.rx.drain(..n).collect();
        buf.put_slice(&data);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")));
        }
        inner.tx.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.lock().unwrap().closed = true;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_write_captures_bytes() {
        let mut stream = MockSerialStream::new();
        stream.write_all(&[0x01, 0x02]).await.unwrap();
        assert_eq!(stream.written(), vec![0x01, 0x02]);
    }

    #[tokio::test]
    async fn test_read_returns_queued_bytes() {
        let mut stream = MockSerialStream::new();
        stream.push_rx(&[0xAA, 0xBB]);
        let mut buf = [0u8; 8];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn test_read_parks_until_data_arrives() {
        let stream = MockSerialStream::new();
        let mut reader = stream.clone();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let n = reader.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });
        tokio::task::yield_now().await;
        stream.push_rx(&[0x42]);
        assert_eq!(task.await.unwrap(), vec![0x42]);
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let mut stream = MockSerialStream::new();
        stream.close();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }
}
