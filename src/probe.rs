use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};
use thiserror::Error;
use tokio::time;

/// Seconds added to `count` when deriving a probe's overall deadline.
const TIMEOUT_MARGIN_SECS: u64 = 5;

/// How long one echo exchange may wait for its reply.
const PER_ECHO_TIMEOUT: Duration = Duration::from_secs(2);

/// Pacing between consecutive echo requests to one destination.
const ECHO_INTERVAL: Duration = Duration::from_secs(1);

/// ICMP payload size, matching classic `ping`.
const PAYLOAD_SIZE: usize = 56;

/// Overall deadline for one probe: `count` paced echoes plus a fixed margin.
pub fn exchange_timeout(count: u16) -> Duration {
    Duration::from_secs(u64::from(count) + TIMEOUT_MARGIN_SECS)
}

/// Raw statistics from one completed probe, before any aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeStats {
    pub sent: u64,
    pub received: u64,
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub avg_rtt: Duration,
    pub duplicates: u64,
    pub loss_pct: f64,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The ICMP socket could not be opened (typically missing privileges).
    #[error("failed to open ICMP socket: {0}")]
    Socket(#[from] std::io::Error),
}

/// Capability that performs the echo exchange for one destination.
///
/// Individual lost or errored echoes are not probe errors; they surface as
/// loss in the returned statistics. A probe where every echo went unanswered
/// still succeeds, with `loss_pct == 100`.
#[async_trait]
pub trait ProbeClient: Send + Sync {
    async fn probe(
        &self,
        dest: IpAddr,
        source: Option<IpAddr>,
        count: u16,
        timeout: Duration,
    ) -> Result<ProbeStats, ProbeError>;
}

/// `ProbeClient` backed by `surge-ping` raw ICMP sockets.
///
/// Each probe opens its own client so a bound source address never leaks
/// between destinations.
#[derive(Debug, Default, Clone, Copy)]
pub struct IcmpProbeClient;

#[async_trait]
impl ProbeClient for IcmpProbeClient {
    async fn probe(
        &self,
        dest: IpAddr,
        source: Option<IpAddr>,
        count: u16,
        timeout: Duration,
    ) -> Result<ProbeStats, ProbeError> {
        let mut builder = Config::builder();
        if dest.is_ipv6() {
            builder = builder.kind(ICMP::V6);
        }
        if let Some(src) = source {
            builder = builder.bind(SocketAddr::new(src, 0));
        }
        let client = Client::new(&builder.build())?;

        let mut pinger = client.pinger(dest, PingIdentifier(rand::random())).await;
        pinger.timeout(PER_ECHO_TIMEOUT);

        let payload = [0u8; PAYLOAD_SIZE];
        let mut sent: u64 = 0;
        let mut rtts: Vec<Duration> = Vec::with_capacity(usize::from(count));

        let exchange = async {
            let mut ticker = time::interval(ECHO_INTERVAL);
            for seq in 0..count {
                ticker.tick().await;
                sent += 1;
                match pinger.ping(PingSequence(seq), &payload).await {
                    Ok((_, rtt)) => rtts.push(rtt),
                    Err(e) => {
                        tracing::debug!(dest = %dest, seq, error = %e, "echo went unanswered")
                    }
                }
            }
        };
        // On deadline expiry the statistics gathered so far still count.
        if time::timeout(timeout, exchange).await.is_err() {
            tracing::debug!(dest = %dest, "probe deadline expired with partial statistics");
        }

        Ok(stats_from(sent, &rtts))
    }
}

fn stats_from(sent: u64, rtts: &[Duration]) -> ProbeStats {
    let received = rtts.len() as u64;
    let loss_pct = if sent == 0 {
        0.0
    } else {
        (sent - received) as f64 / sent as f64 * 100.0
    };
    let (min_rtt, max_rtt, avg_rtt) = if rtts.is_empty() {
        (Duration::ZERO, Duration::ZERO, Duration::ZERO)
    } else {
        let sum: Duration = rtts.iter().sum();
        (
            *rtts.iter().min().expect("non-empty"),
            *rtts.iter().max().expect("non-empty"),
            sum / received as u32,
        )
    };
    ProbeStats {
        sent,
        received,
        min_rtt,
        max_rtt,
        avg_rtt,
        // Sequence-paced exchanges cannot observe duplicate replies.
        duplicates: 0,
        loss_pct,
    }
}
