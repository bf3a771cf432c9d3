use crate::probe::{self, ProbeClient};
use crate::stats::StatsStore;
use crate::types::{ProbeResult, TargetDescriptor};
use anyhow::{Context, Result};
use std::io::Write;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Result-channel capacity: producers stay ahead of aggregation without
/// unbounded buffering.
const RESULT_BUFFER: usize = 20;

/// Probe-run parameters the orchestrator hands to the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Echo requests per target.
    pub count: u16,
    /// Maximum probe tasks in flight at once.
    pub concurrency: usize,
    /// Explicit source address, or `None` for system default.
    pub source: Option<IpAddr>,
}

/// Probe every target with bounded concurrency, streaming results into the
/// given store.
///
/// Spawns one task per target; a counting semaphore of `concurrency` permits
/// gates admission, and each permit is released when its task finishes for any
/// reason, including a panic. Completed probes flow through a bounded channel
/// to a single aggregating consumer; the channel closes once every producer is
/// done. Probe failures and panics are logged and contribute no result. A
/// failure inside the aggregator itself is fatal and surfaces as `Err`.
///
/// Returns the number of results aggregated toward progress (successful probes,
/// including those with 100% loss).
pub async fn run_probes(
    targets: Vec<TargetDescriptor>,
    client: Arc<dyn ProbeClient>,
    config: RunConfig,
    store: Arc<StatsStore>,
) -> Result<u64> {
    let (tx, mut rx) = mpsc::channel::<ProbeResult>(RESULT_BUFFER);

    let consumer_store = store.clone();
    let consumer = tokio::spawn(async move {
        let mut processed: u64 = 0;
        while let Some(result) = rx.recv().await {
            consumer_store.add(result);
            processed += 1;
            print!("\rprobed: {processed}");
            let _ = std::io::stdout().flush();
        }
        // Terminate the in-place progress line before summaries print.
        println!();
        processed
    });

    let sem = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut set = JoinSet::new();
    for target in targets {
        let sem = sem.clone();
        let tx = tx.clone();
        let client = client.clone();
        set.spawn(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore never closed");

            let timeout = probe::exchange_timeout(config.count);
            match client
                .probe(target.address, config.source, config.count, timeout)
                .await
            {
                Ok(stats) => {
                    let result = ProbeResult {
                        source: config.source,
                        dest: target.address,
                        region: target.region,
                        isp: target.isp,
                        sent: stats.sent,
                        received: stats.received,
                        min_rtt: stats.min_rtt,
                        max_rtt: stats.max_rtt,
                        avg_rtt: stats.avg_rtt,
                        duplicates: stats.duplicates,
                        loss_pct: stats.loss_pct,
                    };
                    // Fails only if the aggregator died; its own join below
                    // reports that as fatal.
                    let _ = tx.send(result).await;
                }
                Err(e) => {
                    tracing::warn!(dest = %target.address, error = %e, "probe failed, no result recorded");
                }
            }
        });
    }
    drop(tx);

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "probe task panicked, no result recorded");
        }
    }

    consumer.await.context("aggregator task failed")
}
