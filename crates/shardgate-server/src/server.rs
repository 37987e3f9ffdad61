use crate::config::{Config, MetricsConfig};
use crate::context::ProxyContext;
use crate::coordinator::PreviewBackend;
use crate::session::Session;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use shardgate_core::registry::StatementRegistry;
use shardgate_protocol::backend::write_packet;
use shardgate_protocol::messages::ServerPacket;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

const ER_CON_COUNT_ERROR: u16 = 1040;

pub async fn run(config: Config) -> anyhow::Result<()> {
    if config.metrics.enabled {
        start_metrics(&config.metrics).await?;
    }

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    info!("shardgate listening on {}", config.server.listen_addr);

    let registry = Arc::new(StatementRegistry::new());
    let context = Arc::new(ProxyContext::new(&config, registry, Arc::new(PreviewBackend)));
    let limiter = Arc::new(Semaphore::new(config.server.max_connections));

    loop {
        let (mut socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        };
        let permit = match limiter.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let max_connections = config.server.max_connections;
                warn!("rejecting connection from {peer}: max_connections ({max_connections}) reached");
                counter!("connection_rejected_total").increment(1);
                tokio::spawn(async move {
                    if let Err(err) = reject_connection(&mut socket, max_connections).await {
                        debug!("could not notify rejected client {peer}: {err}");
                    }
                });
                continue;
            }
        };
        counter!("connection_total").increment(1);
        let context = context.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = Session::new(context).run(&mut socket).await {
                error!("connection from {peer} failed: {err}");
            }
        });
    }
    Ok(())
}

/// Answers a client over the connection limit with ERR 1040 in place of the
/// handshake before the socket is dropped.
pub(crate) async fn reject_connection<S: AsyncWrite + Unpin>(
    stream: &mut S,
    max_connections: usize,
) -> anyhow::Result<()> {
    let packet = ServerPacket::Err {
        code: ER_CON_COUNT_ERROR,
        sql_state: "08004".into(),
        message: format!("Too many connections (max_connections = {max_connections})"),
    }
    .into_packet(0);
    write_packet(stream, &packet).await
}

async fn start_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let app = axum::Router::new()
        .route(
            "/metrics",
            axum::routing::get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        )
        .route("/health", axum::routing::get(|| async { "ok" }))
        .route("/ready", axum::routing::get(|| async { "ok" }));
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("metrics listening on {}", config.listen_addr);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!("metrics endpoint stopped: {err}");
        }
    });
    Ok(())
}
