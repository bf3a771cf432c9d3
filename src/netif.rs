use anyhow::{bail, Result};
use if_addrs::{get_if_addrs, IfAddr};
use std::net::{IpAddr, Ipv4Addr};

/// Find the primary non-loopback IPv4 address of a named interface.
///
/// Errors if the interface does not exist or carries no usable IPv4 address.
pub fn primary_ipv4_of(ifname: &str) -> Result<Ipv4Addr> {
    let mut found = false;
    for iface in get_if_addrs()? {
        if iface.name != ifname {
            continue;
        }
        found = true;
        if let IfAddr::V4(v4) = iface.addr {
            if !v4.ip.is_loopback() {
                return Ok(v4.ip);
            }
        }
    }
    if found {
        bail!("interface {ifname} has no usable IPv4 address");
    }
    bail!("interface {ifname} not found");
}

/// Resolve the optional egress interface to a probe source address.
///
/// A missing or addressless interface is recovered by falling back to
/// system-default source addressing with a warning.
pub fn source_address(ifname: Option<&str>) -> Option<IpAddr> {
    let ifname = ifname?;
    match primary_ipv4_of(ifname) {
        Ok(ip) => Some(IpAddr::V4(ip)),
        Err(e) => {
            tracing::warn!(interface = ifname, error = %e, "falling back to system-default source address");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_interface_is_an_error() {
        let err = primary_ipv4_of("no-such-if0").unwrap_err();
        assert!(err.to_string().contains("no-such-if0"));
    }

    #[test]
    fn missing_interface_falls_back_to_default() {
        assert_eq!(source_address(Some("no-such-if0")), None);
        assert_eq!(source_address(None), None);
    }
}
