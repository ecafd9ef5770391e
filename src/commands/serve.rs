use anyhow::{Context, Result};
use std::net::SocketAddr;

use topicpulse::config::Config;
use topicpulse::service::ApiServer;

/// Start the analytics API server
///
/// `host` and `port` override the configured bind address.
pub async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let current = config.server.bind_address;
    let host = host.unwrap_or_else(|| current.ip().to_string());
    let port = port.unwrap_or(current.port());

    config.server.bind_address = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid bind address {host}:{port}"))?;

    if let Err(e) = topicpulse::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let server = ApiServer::new(config).context("Failed to create API server")?;

    println!("{}", server.info().display());
    println!();
    println!("Endpoints:");
    println!("  GET  /api/health                                - Health check");
    println!("  GET  /metrics                                   - Prometheus metrics");
    println!("  POST /api/signals/aggregate                     - Aggregate and store documents");
    println!("  POST /api/analysis                              - Run an analysis");
    println!("  GET  /api/rankings/top_topics                   - Rank topics");
    println!("  GET  /api/signals/overview                      - Overview statistics");
    println!("  GET  /api/topics                                - Active topics");
    println!("  GET  /api/topics/{{id}}/trend                     - Topic volume trend");
    println!("  GET  /api/topics/{{id}}/sentiment_distribution    - Dominant sentiment counts");
    println!("  GET  /api/topics/{{id}}/top_keywords              - Top keywords");
    println!("  GET  /api/sentiments/overall_trend              - Sentiment trend per label");
    println!();
    println!("Press Ctrl+C to stop");

    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await
        .context("Server error")?;

    Ok(())
}
