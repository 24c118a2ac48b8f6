// src/main.rs
use anyhow::Result;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use tenant_proxy::{
    config,
    health::HealthChecker,
    metrics::MetricsRegistry,
    proxy::{BackendDirectory, BackendRegistry, Proxy},
    server::{RequestHandler, ServerBuilder},
    store::InMemoryProjectStore,
    telemetry::{build_sink, RequestLogger},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tenant_proxy=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();

    let store = Arc::new(InMemoryProjectStore::new(config.projects.clone()));
    info!("Loaded {} projects", store.len());

    let sink = build_sink(&config.request_log.sink).await?;
    let logger = RequestLogger::from_config(&config.request_log, sink, metrics.clone());

    let registry = Arc::new(BackendRegistry::new());
    let proxy = Arc::new(Proxy::new(
        store,
        registry.clone(),
        logger,
        metrics.clone(),
        config.store.timeout(),
    ));
    let directory = Arc::new(BackendDirectory::new());

    // Start health checker
    let health_checker = Arc::new(HealthChecker::new(
        config.health_check.clone(),
        registry,
        Some(metrics),
    )?);
    tokio::spawn(health_checker.clone().start());

    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, metrics_registry, config.metrics.path.clone());
    }

    info!("Proxy server is running on {}", config.listen);

    ServerBuilder::new(config.listen)
        .with_handler(move |peer| RequestHandler::new(proxy.clone(), directory.clone(), peer))
        .serve_with_shutdown(shutdown_signal())
        .await?;

    health_checker.shutdown();
    Ok(())
}

fn start_metrics_server(addr: SocketAddr, registry: MetricsRegistry, path: String) {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    if req.uri().path() != path.as_str() {
                        let mut response = Response::new(Body::from("Not Found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        return Ok::<_, Infallible>(response);
                    }

                    let response = match registry.gather() {
                        Ok(metrics) => {
                            let mut response = Response::new(Body::from(metrics));
                            response.headers_mut().insert(
                                CONTENT_TYPE,
                                HeaderValue::from_static("text/plain; version=0.0.4"),
                            );
                            response
                        }
                        Err(e) => {
                            error!("Failed to encode metrics: {}", e);
                            let mut response = Response::new(Body::empty());
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            response
                        }
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_service),
        Err(e) => {
            error!("Metrics server failed to bind {}: {}", addr, e);
            return;
        }
    };

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
