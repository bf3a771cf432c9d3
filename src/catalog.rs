use crate::types::TargetDescriptor;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Region selector sentinel meaning "every region in the catalog".
pub const ALL_REGIONS: &str = "all";

/// ISP selector string meaning "every ISP in the catalog".
pub const ALL_ISPS: &str = "all";

/// The static resolver catalog shipped with the binary.
const CATALOG_JSON: &str = include_str!("catalog.json");

/// Service-provider category used to group destinations.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Isp {
    Telecom,
    Unicom,
    Mobile,
}

impl Isp {
    /// All providers, in the deterministic order summaries concatenate groups.
    pub const ALL: [Isp; 3] = [Isp::Telecom, Isp::Unicom, Isp::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Isp::Telecom => "telecom",
            Isp::Unicom => "unicom",
            Isp::Mobile => "mobile",
        }
    }

    fn parse(s: &str) -> Option<Isp> {
        match s.to_ascii_lowercase().as_str() {
            "telecom" => Some(Isp::Telecom),
            "unicom" => Some(Isp::Unicom),
            "mobile" => Some(Isp::Mobile),
            _ => None,
        }
    }
}

impl fmt::Display for Isp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which providers a run should probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IspSelector {
    All,
    One(Isp),
}

impl IspSelector {
    /// Parse a selector string (`telecom`, `unicom`, `mobile` or `all`).
    pub fn parse(s: &str) -> Option<IspSelector> {
        if s.eq_ignore_ascii_case(ALL_ISPS) {
            return Some(IspSelector::All);
        }
        Isp::parse(s).map(IspSelector::One)
    }

    /// The concrete providers covered by this selector.
    pub fn isps(&self) -> Vec<Isp> {
        match self {
            IspSelector::All => Isp::ALL.to_vec(),
            IspSelector::One(isp) => vec![*isp],
        }
    }
}

/// One catalog region entry: the resolver addresses to probe there.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegionEntry {
    pub addresses: Vec<String>,
}

/// Nested ISP -> region -> addresses mapping, loaded once and never mutated.
///
/// Regions live in `BTreeMap`s so that target selection is deterministic for a
/// given catalog and set of selectors.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Catalog {
    telecom: BTreeMap<String, RegionEntry>,
    unicom: BTreeMap<String, RegionEntry>,
    mobile: BTreeMap<String, RegionEntry>,
}

impl Catalog {
    /// Parse the catalog embedded in the binary.
    pub fn embedded() -> Result<Catalog> {
        serde_json::from_str(CATALOG_JSON).context("failed to parse embedded resolver catalog")
    }

    /// The region map for one provider.
    pub fn regions(&self, isp: Isp) -> &BTreeMap<String, RegionEntry> {
        match isp {
            Isp::Telecom => &self.telecom,
            Isp::Unicom => &self.unicom,
            Isp::Mobile => &self.mobile,
        }
    }

    /// Resolve a region name (case-insensitively) to its canonical catalog key,
    /// searching the given providers in order.
    pub fn canonical_region(&self, isps: &[Isp], name: &str) -> Option<String> {
        for isp in isps {
            for key in self.regions(*isp).keys() {
                if key.eq_ignore_ascii_case(name) {
                    return Some(key.clone());
                }
            }
        }
        None
    }
}

/// Filter the catalog down to the flat list of targets a run should probe.
///
/// Unknown ISP or region selectors are recovered by falling back to `all` with a
/// warning; they never fail the run. Output order follows provider order
/// (telecom, unicom, mobile) and then the catalog's sorted region order.
pub fn select_targets(catalog: &Catalog, isp: &str, region: &str) -> Vec<TargetDescriptor> {
    let selector = IspSelector::parse(isp).unwrap_or_else(|| {
        tracing::warn!(isp, "unknown ISP selector, falling back to 'all'");
        IspSelector::All
    });
    let isps = selector.isps();

    let region_key = if region.eq_ignore_ascii_case(ALL_REGIONS) {
        None
    } else {
        match catalog.canonical_region(&isps, region) {
            Some(key) => Some(key),
            None => {
                tracing::warn!(region, isp = %isp, "unknown region for selected ISPs, falling back to 'all'");
                None
            }
        }
    };

    let mut targets = Vec::new();
    for isp in isps {
        let regions = catalog.regions(isp);
        match &region_key {
            Some(key) => {
                if let Some(entry) = regions.get(key) {
                    push_targets(&mut targets, entry, key, isp);
                }
            }
            None => {
                for (name, entry) in regions {
                    push_targets(&mut targets, entry, name, isp);
                }
            }
        }
    }
    targets
}

fn push_targets(out: &mut Vec<TargetDescriptor>, entry: &RegionEntry, region: &str, isp: Isp) {
    if entry.addresses.is_empty() {
        tracing::warn!(region, isp = %isp, "catalog region has no addresses");
        return;
    }
    for addr in &entry.addresses {
        match addr.parse::<Ipv4Addr>() {
            Ok(ip) => out.push(TargetDescriptor {
                address: IpAddr::V4(ip),
                region: region.to_string(),
                isp,
            }),
            Err(e) => tracing::warn!(addr = %addr, error = %e, "skipping malformed catalog address"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_parses_and_is_nonempty() {
        let catalog = Catalog::embedded().unwrap();
        for isp in Isp::ALL {
            assert!(!catalog.regions(isp).is_empty(), "{isp} has no regions");
        }
        assert!(catalog.regions(Isp::Telecom).contains_key("Beijing"));
    }

    #[test]
    fn select_one_region_one_isp() {
        let catalog = Catalog::embedded().unwrap();
        let targets = select_targets(&catalog, "telecom", "Beijing");
        assert!(!targets.is_empty());
        assert!(targets
            .iter()
            .all(|t| t.isp == Isp::Telecom && t.region == "Beijing"));
    }

    #[test]
    fn region_match_is_case_insensitive() {
        let catalog = Catalog::embedded().unwrap();
        let lower = select_targets(&catalog, "unicom", "shanghai");
        let upper = select_targets(&catalog, "unicom", "Shanghai");
        assert_eq!(lower, upper);
        assert!(!lower.is_empty());
    }

    #[test]
    fn unknown_isp_falls_back_to_all() {
        let catalog = Catalog::embedded().unwrap();
        let fallback = select_targets(&catalog, "carrier-pigeon", ALL_REGIONS);
        let all = select_targets(&catalog, ALL_ISPS, ALL_REGIONS);
        assert_eq!(fallback, all);
    }

    #[test]
    fn unknown_region_falls_back_to_all_regions() {
        let catalog = Catalog::embedded().unwrap();
        let fallback = select_targets(&catalog, "mobile", "atlantis");
        let all = select_targets(&catalog, "mobile", ALL_REGIONS);
        assert_eq!(fallback, all);
        assert!(!fallback.is_empty());
    }

    #[test]
    fn selection_is_deterministic() {
        let catalog = Catalog::embedded().unwrap();
        let a = select_targets(&catalog, ALL_ISPS, ALL_REGIONS);
        let b = select_targets(&catalog, ALL_ISPS, ALL_REGIONS);
        assert_eq!(a, b);
    }
}
