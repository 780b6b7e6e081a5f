use apnsmock_server::config::MockConfig;
use apnsmock_server::{MockServer, http};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match MockConfig::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    let server = match MockServer::start(config.clone()).await {
        Ok(server) => server,
        Err(err) => {
            eprintln!("STARTUP_ERROR {}", err);
            std::process::exit(1);
        }
    };

    if let Some(metrics_addr) = config.metrics_bind_addr {
        let listener = match tokio::net::TcpListener::bind(metrics_addr).await {
            Ok(listener) => listener,
            Err(_) => {
                eprintln!("STARTUP_ERROR ERR_BIND_FAILED: failed to bind metrics listener");
                std::process::exit(1);
            }
        };

        tracing::info!(bind_addr = %metrics_addr, "apnsmock metrics listening");

        let app = http::metrics_router(server.fault_switch().clone());
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "metrics listener failed");
            }
        });
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        eprintln!("STARTUP_ERROR ERR_SERVER_FAILED: {}", err);
        std::process::exit(1);
    }

    server.shutdown().await;
}
