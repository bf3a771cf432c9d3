use crate::types::{AggregateRecord, ProbeResult};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;
use time::OffsetDateTime;

/// How many of the newest probe results the store keeps for inspection.
pub const DEFAULT_RECENT_CAPACITY: usize = 25;

/// Sentinel initial minimum RTT; any real sample is smaller.
const MIN_RTT_SENTINEL: Duration = Duration::from_secs(3600);

/// Thread-safe store of per-destination running aggregates plus a bounded
/// recent-history buffer.
///
/// One mutex guards both structures; it is held only for the duration of a
/// single record update and never across I/O.
#[derive(Debug)]
pub struct StatsStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    records: HashMap<IpAddr, AggregateRecord>,
    recent: VecDeque<ProbeResult>,
    recent_cap: usize,
}

impl StatsStore {
    pub fn new(recent_cap: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                records: HashMap::new(),
                recent: VecDeque::with_capacity(recent_cap),
                recent_cap,
            }),
        }
    }

    /// Merge one probe result into the running aggregates.
    ///
    /// A result with 100% loss is dropped entirely: it neither creates nor
    /// mutates a record, and does not enter the recent-history buffer.
    pub fn add(&self, result: ProbeResult) {
        if result.loss_pct >= 100.0 {
            return;
        }
        let mut inner = self.inner.lock().expect("stats store lock poisoned");

        inner.recent.push_back(result.clone());
        if inner.recent.len() > inner.recent_cap {
            inner.recent.pop_front();
        }

        let record = inner
            .records
            .entry(result.dest)
            .or_insert_with(|| AggregateRecord {
                dest: result.dest,
                region: result.region.clone(),
                isp: result.isp,
                total_sent: 0,
                total_recv: 0,
                min_rtt: MIN_RTT_SENTINEL,
                max_rtt: Duration::ZERO,
                avg_rtt: Duration::ZERO,
                min_rtt_avg: Duration::ZERO,
                max_rtt_avg: Duration::ZERO,
                last_updated: OffsetDateTime::now_utc(),
                loss_pct: result.loss_pct,
                duplicates: result.duplicates,
            });

        let prior_recv = record.total_recv;
        record.total_sent += result.sent;
        record.total_recv += result.received;
        record.last_updated = OffsetDateTime::now_utc();

        // Zero min-RTT samples carry no timing information and are skipped.
        if result.min_rtt > Duration::ZERO && result.min_rtt < record.min_rtt {
            record.min_rtt = result.min_rtt;
        }
        if result.max_rtt > record.max_rtt {
            record.max_rtt = result.max_rtt;
        }

        record.avg_rtt = merge_weighted(record.avg_rtt, prior_recv, result.avg_rtt, result.received);
        record.min_rtt_avg =
            merge_weighted(record.min_rtt_avg, prior_recv, result.min_rtt, result.received);
        record.max_rtt_avg =
            merge_weighted(record.max_rtt_avg, prior_recv, result.max_rtt, result.received);
    }

    /// Deep copy of every aggregate record, in no particular order.
    pub fn snapshot(&self) -> Vec<AggregateRecord> {
        let inner = self.inner.lock().expect("stats store lock poisoned");
        inner.records.values().cloned().collect()
    }

    /// Copy of the recent-history buffer, oldest first.
    pub fn recent(&self) -> Vec<ProbeResult> {
        let inner = self.inner.lock().expect("stats store lock poisoned");
        inner.recent.iter().cloned().collect()
    }

    /// Number of distinct destinations aggregated so far.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("stats store lock poisoned");
        inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

/// Incremental weighted-average merge.
///
/// `mean` is the running mean accumulated over `weight` received packets; the
/// new sample contributes value `value` with weight `w`. The first contributing
/// sample (weight == 0) replaces the mean outright.
fn merge_weighted(mean: Duration, weight: u64, value: Duration, w: u64) -> Duration {
    if weight == 0 {
        return value;
    }
    if w == 0 {
        return mean;
    }
    let total = u128::from(weight) + u128::from(w);
    let blended =
        (mean.as_nanos() * u128::from(weight) + value.as_nanos() * u128::from(w)) / total;
    Duration::from_nanos(blended as u64)
}
