//! Embeddable mock server: TCP accept with admission control, TLS with ALPN
//! `h2`, then HTTP/2 into the axum router.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::Router;
use hyper::server::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::CertificateDer;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::admission::{AdmissionController, AdmittedStream};
use crate::config::{MockConfig, StartupError};
use crate::fault::FaultSwitch;
use crate::http::{AppState, PushHandler, router};
use crate::tls::TlsMaterial;

/// Handle to a running mock. Dropping it aborts the server task; call
/// [`MockServer::shutdown`] to stop it and wait for the task to finish.
#[derive(Debug)]
pub struct MockServer {
    local_addr: SocketAddr,
    root_certificate: CertificateDer<'static>,
    fault: FaultSwitch,
    admission: AdmissionController,
    client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Result<Self, StartupError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| StartupError {
                code: "ERR_BIND_FAILED",
                message: format!("failed to bind {}: {e}", config.bind_addr),
            })?;
        Self::from_listener(listener, config)
    }

    /// Serves on an already bound listener. `config.bind_addr` is ignored.
    pub fn from_listener(listener: TcpListener, config: MockConfig) -> Result<Self, StartupError> {
        let local_addr = listener.local_addr().map_err(|e| StartupError {
            code: "ERR_BIND_FAILED",
            message: format!("listener has no local address: {e}"),
        })?;

        let material = TlsMaterial::load(&config.tls)?;
        let acceptor = material.acceptor()?;
        let root_certificate = material
            .root_certificate()
            .cloned()
            .ok_or_else(|| StartupError {
                code: "ERR_TLS_MATERIAL",
                message: "no server certificate".to_string(),
            })?;
        let client = build_client(&root_certificate)?;

        let fault = FaultSwitch::new();
        let admission =
            AdmissionController::new(config.comms.max_conns, config.comms.connection_delay)
                .with_metrics_label(local_addr.to_string());
        let app = router(AppState {
            handler: PushHandler::from(config.handler),
            fault: fault.clone(),
            response_delay: config.comms.response_delay,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            listener,
            admission.clone(),
            acceptor,
            app,
            config.comms.max_concurrent_streams,
            shutdown_rx,
        ));

        tracing::info!(
            local_addr = %local_addr,
            handler = config.handler.as_str(),
            max_conns = config.comms.max_conns,
            max_concurrent_streams = config.comms.max_concurrent_streams,
            "apnsmock listening"
        );

        Ok(Self {
            local_addr,
            root_certificate,
            fault,
            admission,
            client,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL, e.g. `https://127.0.0.1:8443`.
    pub fn url(&self) -> String {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        format!("https://{}", addr)
    }

    pub fn root_certificate(&self) -> &CertificateDer<'static> {
        &self.root_certificate
    }

    /// HTTP/2-only client that trusts this server's certificate.
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    pub fn become_unavailable(&self, status: u16, reason: impl Into<String>) {
        self.fault.install(status, reason);
    }

    pub fn become_available(&self) {
        self.fault.clear();
    }

    pub fn fault_switch(&self) -> &FaultSwitch {
        &self.fault
    }

    pub fn open_connections(&self) -> u32 {
        self.admission.open_connections()
    }

    /// Stops accepting, closes live connections and waits for the server task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
            && !err.is_cancelled()
        {
            tracing::warn!(error = %err, "server task failed");
        }
        tracing::info!(local_addr = %self.local_addr, "apnsmock stopped");
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn build_client(root: &CertificateDer<'static>) -> Result<reqwest::Client, StartupError> {
    let certificate = reqwest::Certificate::from_der(root.as_ref()).map_err(|e| StartupError {
        code: "ERR_TLS_CONFIG",
        message: format!("server certificate rejected by client: {e}"),
    })?;

    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(certificate)
        .http2_prior_knowledge()
        .build()
        .map_err(|e| StartupError {
            code: "ERR_TLS_CONFIG",
            message: format!("failed to build client: {e}"),
        })
}

async fn accept_loop(
    listener: TcpListener,
    admission: AdmissionController,
    acceptor: TlsAcceptor,
    app: Router,
    max_concurrent_streams: u32,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            (stream, peer) = admission.accept(&listener) => {
                let span = tracing::debug_span!("connection", peer = %peer);
                connections.spawn(
                    serve_connection(stream, acceptor.clone(), app.clone(), max_concurrent_streams)
                        .instrument(span),
                );
            }
        }

        while connections.try_join_next().is_some() {}
    }

    connections.shutdown().await;
}

async fn serve_connection(
    stream: AdmittedStream<TcpStream>,
    acceptor: TlsAcceptor,
    app: Router,
    max_concurrent_streams: u32,
) {
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(err) => {
            tracing::debug!(error = %err, "tls handshake failed");
            return;
        }
    };

    let service = TowerToHyperService::new(app);
    if let Err(err) = http2::Builder::new(TokioExecutor::new())
        .max_concurrent_streams(max_concurrent_streams)
        .serve_connection(TokioIo::new(tls), service)
        .await
    {
        tracing::debug!(error = %err, "connection closed with error");
    }
}
