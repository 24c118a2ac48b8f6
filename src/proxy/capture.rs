// src/proxy/capture.rs
use futures::Stream;
use hyper::body::Bytes;
use hyper::{Body, StatusCode};
use std::pin::Pin;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// What was actually sent back to the caller for one request.
///
/// The first status written sticks; later writes are ignored and report
/// `false`. Until a status is written the capture reports 200.
#[derive(Debug, Default)]
pub struct ResponseCapture {
    // 0 until the header is written
    status: AtomicU16,
    bytes_written: AtomicU64,
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_header(&self, status: StatusCode) -> bool {
        self.status
            .compare_exchange(0, status.as_u16(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn wrote_header(&self) -> bool {
        self.status.load(Ordering::Acquire) != 0
    }

    pub fn status(&self) -> StatusCode {
        match self.status.load(Ordering::Acquire) {
            0 => StatusCode::OK,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::OK),
        }
    }

    pub fn record_bytes(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

/// Response body that counts every chunk handed to the caller and signals
/// once the body is finished, failed, or dropped by the connection.
pub struct CapturedBody {
    inner: Body,
    capture: Arc<ResponseCapture>,
    done: Option<oneshot::Sender<()>>,
}

impl CapturedBody {
    pub fn new(inner: Body, capture: Arc<ResponseCapture>, done: oneshot::Sender<()>) -> Self {
        Self {
            inner,
            capture,
            done: Some(done),
        }
    }

    fn finish(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl Stream for CapturedBody {
    type Item = Result<Bytes, hyper::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.capture.record_bytes(chunk.len());
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for CapturedBody {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_wins() {
        let capture = ResponseCapture::new();
        assert!(!capture.wrote_header());
        assert_eq!(capture.status(), StatusCode::OK);

        assert!(capture.write_header(StatusCode::NOT_FOUND));
        assert!(!capture.write_header(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(capture.status(), StatusCode::NOT_FOUND);
        assert!(capture.wrote_header());
    }

    #[tokio::test]
    async fn counts_bytes_and_signals_completion() {
        let capture = Arc::new(ResponseCapture::new());
        let (tx, rx) = oneshot::channel();
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![Ok("hello "), Ok("world")];
        let inner = Body::wrap_stream(futures::stream::iter(chunks));
        let body = Body::wrap_stream(CapturedBody::new(inner, capture.clone(), tx));

        let bytes = hyper::body::to_bytes(body).await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
        rx.await.unwrap();
        assert_eq!(capture.bytes_written(), 11);
    }

    #[tokio::test]
    async fn dropping_body_still_signals() {
        let capture = Arc::new(ResponseCapture::new());
        let (tx, rx) = oneshot::channel();
        let body = CapturedBody::new(Body::from("unread"), capture.clone(), tx);
        drop(body);

        rx.await.unwrap();
        assert_eq!(capture.bytes_written(), 0);
    }
}
