use std::sync::Arc;

use market_data::cache::BookCache;
use market_data::config::GeneratorConfig;
use market_data::generator::OrderBookGenerator;
use market_data::metrics::GeneratorMetrics;
use market_data::publisher::BroadcastPublisher;
use store::MemoryStore;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    tracing::info!("Starting book generator service");

    let config = GeneratorConfig::from_env();
    // Reference store; deployment wires the shared order store here.
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(BookCache::new(config.cache_ttl, config.refresh_margin));
    let publisher = Arc::new(BroadcastPublisher::new(config.broadcast_capacity));
    let metrics = Arc::new(GeneratorMetrics::new());

    let generator = OrderBookGenerator::new(store, cache, publisher, metrics);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        {
            Ok(signal) => signal,
            Err(e) => {
                tracing::error!(error = %e, "Could not install SIGHUP handler");
                return;
            }
        };
        tokio::select! {
            _ = hangup.recv() => tracing::info!("SIGHUP received; shutting down"),
            _ = tokio::signal::ctrl_c() => tracing::info!("Ctrl-C received; shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    generator.run(config.interval, shutdown_rx).await;

    Ok(())
}
