use async_trait::async_trait;
use dping_rs::catalog::Isp;
use dping_rs::dispatch::{run_probes, RunConfig};
use dping_rs::probe::{ProbeClient, ProbeError, ProbeStats};
use dping_rs::stats::StatsStore;
use dping_rs::types::TargetDescriptor;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Probe client that sleeps briefly and tracks how many probes run at once.
struct InstrumentedClient {
    active: AtomicUsize,
    max_active: AtomicUsize,
    /// Destinations whose last octet is in this set fail with an error.
    fail_last_octets: Vec<u8>,
}

impl InstrumentedClient {
    fn new(fail_last_octets: Vec<u8>) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            fail_last_octets,
        }
    }
}

#[async_trait]
impl ProbeClient for InstrumentedClient {
    async fn probe(
        &self,
        dest: IpAddr,
        _source: Option<IpAddr>,
        count: u16,
        _timeout: Duration,
    ) -> Result<ProbeStats, ProbeError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let last = match dest {
            IpAddr::V4(v4) => v4.octets()[3],
            IpAddr::V6(_) => 0,
        };
        if self.fail_last_octets.contains(&last) {
            return Err(ProbeError::Socket(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "mock socket failure",
            )));
        }
        Ok(ProbeStats {
            sent: u64::from(count),
            received: u64::from(count),
            min_rtt: Duration::from_millis(10),
            max_rtt: Duration::from_millis(30),
            avg_rtt: Duration::from_millis(20),
            duplicates: 0,
            loss_pct: 0.0,
        })
    }
}

fn targets(n: u16) -> Vec<TargetDescriptor> {
    (0..n)
        .map(|i| TargetDescriptor {
            address: IpAddr::V4(Ipv4Addr::new(10, 1, (i / 250) as u8, (i % 250) as u8)),
            region: "Beijing".to_string(),
            isp: Isp::Telecom,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrency_limit_is_never_exceeded() {
    let client = Arc::new(InstrumentedClient::new(Vec::new()));
    let store = Arc::new(StatsStore::default());
    let config = RunConfig {
        count: 3,
        concurrency: 10,
        source: None,
    };

    let processed = run_probes(targets(200), client.clone(), config, store.clone())
        .await
        .unwrap();

    assert_eq!(processed, 200, "stream closed before all tasks finished");
    assert_eq!(store.len(), 200);
    let max = client.max_active.load(Ordering::SeqCst);
    assert!(max <= 10, "observed {max} probes in flight");
    assert!(max > 1, "probes never overlapped; limiter test is vacuous");
}

#[tokio::test(flavor = "multi_thread")]
async fn probe_errors_are_isolated_from_siblings() {
    let client = Arc::new(InstrumentedClient::new(vec![0, 1, 2]));
    let store = Arc::new(StatsStore::default());
    let config = RunConfig {
        count: 3,
        concurrency: 4,
        source: None,
    };

    let processed = run_probes(targets(10), client, config, store.clone())
        .await
        .unwrap();

    // Three destinations failed: no result posted, the rest unaffected.
    assert_eq!(processed, 7);
    assert_eq!(store.len(), 7);
    for rec in store.snapshot() {
        assert_eq!(rec.total_sent, 3);
        assert_eq!(rec.total_recv, 3);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_target_list_yields_empty_store() {
    let client = Arc::new(InstrumentedClient::new(Vec::new()));
    let store = Arc::new(StatsStore::default());
    let config = RunConfig {
        count: 3,
        concurrency: 10,
        source: None,
    };

    let processed = run_probes(Vec::new(), client, config, store.clone())
        .await
        .unwrap();
    assert_eq!(processed, 0);
    assert!(store.is_empty());
}

/// Full-loss results reach the consumer (they count toward progress) but the
/// store excludes them from aggregation.
struct FullLossClient;

#[async_trait]
impl ProbeClient for FullLossClient {
    async fn probe(
        &self,
        _dest: IpAddr,
        _source: Option<IpAddr>,
        count: u16,
        _timeout: Duration,
    ) -> Result<ProbeStats, ProbeError> {
        Ok(ProbeStats {
            sent: u64::from(count),
            received: 0,
            min_rtt: Duration::ZERO,
            max_rtt: Duration::ZERO,
            avg_rtt: Duration::ZERO,
            duplicates: 0,
            loss_pct: 100.0,
        })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn full_loss_counts_toward_progress_but_not_aggregation() {
    let store = Arc::new(StatsStore::default());
    let config = RunConfig {
        count: 3,
        concurrency: 4,
        source: None,
    };

    let processed = run_probes(targets(5), Arc::new(FullLossClient), config, store.clone())
        .await
        .unwrap();
    assert_eq!(processed, 5);
    assert!(store.is_empty());
}
