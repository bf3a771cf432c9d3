use crate::catalog::Isp;
use crate::types::AggregateRecord;
use clap::ValueEnum;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

/// Field a summary view is ordered by.
///
/// The flat view understands `loss`, `minrtt`, `maxrtt` and `avgrtt`; the
/// ISP-grouped views understand `loss`, `rtt`, `sent` and `recv`. A field that
/// does not apply to a view sorts by `loss`, the default.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Loss,
    Minrtt,
    Maxrtt,
    Avgrtt,
    Rtt,
    Sent,
    Recv,
}

/// Column totals for a rendered summary, matching the table footer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Totals {
    pub sent: u64,
    pub recv: u64,
    pub duplicates: u64,
    /// Unweighted mean of per-row loss percentages.
    pub avg_loss_pct: f64,
    /// Recv-weighted global minimum/maximum/average RTT.
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub avg_rtt: Duration,
}

fn compare_flat(a: &AggregateRecord, b: &AggregateRecord, field: SortField) -> Ordering {
    match field {
        SortField::Minrtt => a.min_rtt.cmp(&b.min_rtt),
        SortField::Maxrtt => a.max_rtt.cmp(&b.max_rtt),
        SortField::Avgrtt => a.avg_rtt.cmp(&b.avg_rtt),
        _ => a.loss_pct.total_cmp(&b.loss_pct),
    }
}

fn compare_grouped(a: &AggregateRecord, b: &AggregateRecord, field: SortField) -> Ordering {
    match field {
        SortField::Rtt => a.avg_rtt.cmp(&b.avg_rtt),
        SortField::Sent => a.total_sent.cmp(&b.total_sent),
        SortField::Recv => a.total_recv.cmp(&b.total_recv),
        _ => a.loss_pct.total_cmp(&b.loss_pct),
    }
}

fn direct(ord: Ordering, descending: bool) -> Ordering {
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

/// Flatten a snapshot into a single list sorted by one field.
pub fn sorted_flat(
    snapshot: &[AggregateRecord],
    field: SortField,
    descending: bool,
) -> Vec<AggregateRecord> {
    let mut rows = snapshot.to_vec();
    rows.sort_by(|a, b| direct(compare_flat(a, b, field), descending));
    rows
}

/// Partition a snapshot by ISP, sort each partition independently and
/// concatenate the partitions.
///
/// Partitions are emitted in a fixed provider order (telecom, unicom, mobile)
/// so two runs over the same snapshot always agree.
pub fn grouped_by_isp(
    snapshot: &[AggregateRecord],
    field: SortField,
    descending: bool,
) -> Vec<AggregateRecord> {
    let mut groups: BTreeMap<Isp, Vec<AggregateRecord>> = BTreeMap::new();
    for rec in snapshot {
        groups.entry(rec.isp).or_default().push(rec.clone());
    }

    let mut rows = Vec::with_capacity(snapshot.len());
    for (_, mut group) in groups {
        group.sort_by(|a, b| direct(compare_grouped(a, b, field), descending));
        rows.extend(group);
    }
    rows
}

/// Filter an already grouped-and-sorted summary down to lossy destinations.
///
/// The filter is stable, so rows that tie under the requested field keep the
/// relative order they had in the input.
pub fn loss_only(
    grouped: &[AggregateRecord],
    field: SortField,
    descending: bool,
) -> Vec<AggregateRecord> {
    let mut rows: Vec<AggregateRecord> = grouped
        .iter()
        .filter(|rec| rec.loss_pct > 0.0)
        .cloned()
        .collect();
    rows.sort_by(|a, b| direct(compare_grouped(a, b, field), descending));
    rows
}

/// Footer totals for a summary view.
pub fn totals(rows: &[AggregateRecord]) -> Totals {
    let mut t = Totals::default();
    let mut loss_sum = 0.0;
    let mut min_acc: u128 = 0;
    let mut max_acc: u128 = 0;
    let mut avg_acc: u128 = 0;

    for rec in rows {
        t.sent += rec.total_sent;
        t.recv += rec.total_recv;
        t.duplicates += rec.duplicates;
        loss_sum += rec.loss_pct;
        let w = u128::from(rec.total_recv);
        min_acc += rec.min_rtt.as_nanos() * w;
        max_acc += rec.max_rtt.as_nanos() * w;
        avg_acc += rec.avg_rtt.as_nanos() * w;
    }

    if !rows.is_empty() {
        t.avg_loss_pct = loss_sum / rows.len() as f64;
    }
    if t.recv > 0 {
        let w = u128::from(t.recv);
        t.min_rtt = Duration::from_nanos((min_acc / w) as u64);
        t.max_rtt = Duration::from_nanos((max_acc / w) as u64);
        t.avg_rtt = Duration::from_nanos((avg_acc / w) as u64);
    }
    t
}
