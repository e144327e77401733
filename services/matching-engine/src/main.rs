use std::sync::Arc;

use matching_engine::alerts::LogAlertSink;
use matching_engine::config::MatcherConfig;
use matching_engine::fees::FlatFeeSchedule;
use matching_engine::matcher::Matcher;
use matching_engine::rounds::MatcherMetrics;
use matching_engine::scheduler::ConcurrentMatcherScheduler;
use matching_engine::wallet::MemoryWallet;
use store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    tracing::info!("Starting matcher service");

    let config = MatcherConfig::from_env();
    let store = Arc::new(MemoryStore::new());
    let dirty = store.dirty();

    // Reference collaborators; deployment wires the production wallet
    // ledger and fee schedule at this seam.
    let wallet = Arc::new(MemoryWallet::new());
    let fees = Arc::new(FlatFeeSchedule::default());

    let matcher = Arc::new(Matcher::new(
        store.clone(),
        wallet,
        fees,
        config.matcher_settings(),
    ));
    let metrics = Arc::new(MatcherMetrics::new());

    let (scheduler, handle) = ConcurrentMatcherScheduler::new(
        store,
        matcher,
        dirty,
        config,
        metrics,
        Arc::new(LogAlertSink),
    );

    // SIGHUP or Ctrl-C: finish the in-flight round, then exit.
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
        handle.shutdown();
    });

    scheduler.run().await;

    Ok(())
}
