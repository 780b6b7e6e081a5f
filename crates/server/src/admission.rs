//! Connection admission: a capped count of open connections shared between
//! the accept loop and every live connection.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

/// Back-off after a failed `accept`, e.g. when the process is out of descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

const UNLABELLED: &str = "unbound";

#[derive(Debug, Clone)]
pub struct AdmissionController {
    capacity: u32,
    delay: Duration,
    open: Arc<Mutex<u32>>,
    metrics_label: Arc<str>,
}

impl AdmissionController {
    pub fn new(capacity: u32, delay: Duration) -> Self {
        Self {
            capacity,
            delay,
            open: Arc::new(Mutex::new(0)),
            metrics_label: Arc::from(UNLABELLED),
        }
    }

    /// Label of this controller's `apnsmock_open_connections` series,
    /// normally the listening address.
    pub fn with_metrics_label(mut self, label: impl Into<String>) -> Self {
        self.metrics_label = Arc::from(label.into());
        self
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn open_connections(&self) -> u32 {
        *lock(&self.open)
    }

    /// Reserves a slot if one is free. The slot is released when the guard drops.
    pub fn try_admit(&self) -> Option<ConnectionGuard> {
        let mut open = lock(&self.open);
        if *open >= self.capacity {
            return None;
        }
        *open += 1;
        crate::metrics::set_open_connections(&self.metrics_label, *open);
        Some(ConnectionGuard {
            open: self.open.clone(),
            metrics_label: self.metrics_label.clone(),
        })
    }

    /// Accepts the next connection that fits under the capacity. Connections
    /// over capacity are closed here and never reach the caller.
    pub async fn accept(&self, listener: &TcpListener) -> (AdmittedStream<TcpStream>, SocketAddr) {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let Some(guard) = self.try_admit() else {
                tracing::debug!(peer = %peer, capacity = self.capacity, "connection refused at capacity");
                crate::metrics::observe_connection("refused");
                drop(stream);
                continue;
            };

            tracing::debug!(peer = %peer, open = self.open_connections(), "connection admitted");
            crate::metrics::observe_connection("admitted");

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            return (
                AdmittedStream {
                    inner: stream,
                    _guard: guard,
                },
                peer,
            );
        }
    }
}

fn lock(open: &Mutex<u32>) -> MutexGuard<'_, u32> {
    match open.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<Mutex<u32>>,
    metrics_label: Arc<str>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut open = lock(&self.open);
        *open = open.saturating_sub(1);
        crate::metrics::set_open_connections(&self.metrics_label, *open);
    }
}

/// A stream that holds an admission slot for as long as it lives.
#[derive(Debug)]
pub struct AdmittedStream<S> {
    inner: S,
    _guard: ConnectionGuard,
}

impl<S> AdmittedStream<S> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for AdmittedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for AdmittedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
