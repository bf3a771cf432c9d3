use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dping_rs::catalog::{self, Catalog};
use dping_rs::dispatch::{self, RunConfig};
use dping_rs::netif;
use dping_rs::probe::IcmpProbeClient;
use dping_rs::stats::StatsStore;
use dping_rs::summary::{self, SortField};
use dping_rs::types::AggregateRecord;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// dping-rs — concurrent ICMP latency prober for public DNS resolvers, summarized per ISP and region.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dping-rs",
    version,
    about = "Concurrent ICMP latency prober for public DNS resolvers, summarized per ISP and region.",
    long_about = None
)]
struct Cli {
    /// Region to probe (e.g. Beijing), or "all" for every region in the catalog.
    #[arg(long, default_value = catalog::ALL_REGIONS)]
    region: String,

    /// ISP to probe: telecom, unicom, mobile, or "all".
    #[arg(long, default_value = catalog::ALL_ISPS)]
    isp: String,

    /// Echo requests sent per target.
    #[arg(long, default_value_t = 3)]
    count: u16,

    /// Max concurrent probes in flight.
    #[arg(long, default_value_t = 50)]
    concurrency: usize,

    /// Network interface to source probes from (system default when omitted).
    #[arg(long)]
    interface: Option<String>,

    /// Summary sort field.
    #[arg(long, value_enum, default_value_t = SortField::Loss)]
    sort: SortField,

    /// Sort descending instead of ascending.
    #[arg(long, default_value_t = false)]
    descending: bool,

    /// Write the grouped summary as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    let catalog = Catalog::embedded()?;
    let targets = catalog::select_targets(&catalog, &cli.isp, &cli.region);
    let source = netif::source_address(cli.interface.as_deref());

    println!("dping-rs configuration:");
    println!("  region       : {}", cli.region);
    println!("  isp          : {}", cli.isp);
    println!("  count        : {}", cli.count);
    println!("  concurrency  : {}", cli.concurrency);
    println!(
        "  source       : {}",
        source
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "<system default>".to_string())
    );
    println!("  targets      : {}", targets.len());

    let store = Arc::new(StatsStore::default());
    let client = Arc::new(IcmpProbeClient);
    let config = RunConfig {
        count: cli.count,
        concurrency: cli.concurrency,
        source,
    };
    let processed = dispatch::run_probes(targets, client, config, store.clone()).await?;
    println!("probes completed: {processed}");

    let snapshot = store.snapshot();
    let grouped = summary::grouped_by_isp(&snapshot, cli.sort, cli.descending);
    let lossy = summary::loss_only(&grouped, cli.sort, cli.descending);

    println!("\n====== summary by ISP ======");
    print_summary_table(&grouped);
    println!("\n====== lossy destinations ======");
    print_summary_table(&lossy);

    if let Some(path) = cli.output.as_deref() {
        if let Err(e) = write_summary_json(path, &grouped) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON summary to {}", path.display());
        }
    }

    Ok(())
}

fn fmt_ms(d: Duration) -> String {
    format!("{:.1}ms", d.as_secs_f64() * 1000.0)
}

fn fmt_time(t: time::OffsetDateTime) -> String {
    format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())
}

fn print_summary_table(rows: &[AggregateRecord]) {
    if rows.is_empty() {
        println!("(no records)");
        return;
    }

    let mut dest_w = "dest".len();
    let mut region_w = "region".len();
    for r in rows {
        dest_w = dest_w.max(r.dest.to_string().len());
        region_w = region_w.max(r.region.len());
    }
    let isp_w = "telecom".len();

    println!(
        "{:<dest_w$}  {:<region_w$}  {:<isp_w$}  {:>4}  {:>4}  {:>6}  {:>3}  {:>8}  {:>8}  {:>8}  {:>8}",
        "dest", "region", "isp", "sent", "recv", "loss%", "dup", "minrtt", "maxrtt", "avgrtt", "updated",
    );
    for r in rows {
        println!(
            "{:<dest_w$}  {:<region_w$}  {:<isp_w$}  {:>4}  {:>4}  {:>5.1}%  {:>3}  {:>8}  {:>8}  {:>8}  {:>8}",
            r.dest,
            r.region,
            r.isp,
            r.total_sent,
            r.total_recv,
            r.loss_pct,
            r.duplicates,
            fmt_ms(r.min_rtt),
            fmt_ms(r.max_rtt),
            fmt_ms(r.avg_rtt),
            fmt_time(r.last_updated),
        );
    }

    let t = summary::totals(rows);
    println!(
        "{:<dest_w$}  {:<region_w$}  {:<isp_w$}  {:>4}  {:>4}  {:>5.1}%  {:>3}  {:>8}  {:>8}  {:>8}  {:>8}",
        "",
        "",
        "total",
        t.sent,
        t.recv,
        t.avg_loss_pct,
        t.duplicates,
        fmt_ms(t.min_rtt),
        fmt_ms(t.max_rtt),
        fmt_ms(t.avg_rtt),
        "",
    );
}

fn write_summary_json(path: &std::path::Path, rows: &[AggregateRecord]) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, rows)?;
    Ok(())
}
