use crate::catalog::Isp;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use time::OffsetDateTime;

/// One probe target drawn from the resolver catalog.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub address: IpAddr,
    pub region: String,
    pub isp: Isp,
}

/// The outcome of one completed echo exchange against a single destination.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeResult {
    /// Source address the probe was sent from, when one was bound explicitly.
    pub source: Option<IpAddr>,
    pub dest: IpAddr,
    pub region: String,
    pub isp: Isp,
    pub sent: u64,
    pub received: u64,
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub avg_rtt: Duration,
    pub duplicates: u64,
    /// Percentage of echo requests that went unanswered, 0.0..=100.0.
    pub loss_pct: f64,
}

/// Running per-destination aggregate maintained by the stats store.
///
/// `region`, `isp`, `loss_pct` and `duplicates` keep the values observed when the
/// record was first created; later merges only touch the counters and RTT fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    pub dest: IpAddr,
    pub region: String,
    pub isp: Isp,
    pub total_sent: u64,
    pub total_recv: u64,
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub avg_rtt: Duration,
    /// Received-weighted running mean of per-probe minimum RTTs.
    pub min_rtt_avg: Duration,
    /// Received-weighted running mean of per-probe maximum RTTs.
    pub max_rtt_avg: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub loss_pct: f64,
    pub duplicates: u64,
}
