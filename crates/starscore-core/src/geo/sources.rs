//! Location sources consulted by the resolver, in priority order.

use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;

use super::{GeoLocation, LocationSource, ResolutionError};

/// `unknown`, empty, and loopback addresses.
pub struct LoopbackSource;

impl LocationSource for LoopbackSource {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn lookup(&self, address: &str) -> Result<Option<GeoLocation>, ResolutionError> {
        let is_sentinel = address.is_empty()
            || address.eq_ignore_ascii_case("unknown")
            || address == "::1"
            || address.starts_with("127.")
            || address
                .parse::<IpAddr>()
                .is_ok_and(|ip| ip.to_canonical().is_loopback());

        Ok(is_sentinel.then(GeoLocation::local))
    }
}

/// RFC 1918, link-local and IPv6 unique-local ranges.
pub struct PrivateNetworkSource;

impl PrivateNetworkSource {
    fn is_private(ip: IpAddr) -> bool {
        match ip.to_canonical() {
            IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
            IpAddr::V6(v6) => v6.is_unique_local() || v6.is_unicast_link_local(),
        }
    }
}

impl LocationSource for PrivateNetworkSource {
    fn name(&self) -> &'static str {
        "private"
    }

    fn lookup(&self, address: &str) -> Result<Option<GeoLocation>, ResolutionError> {
        let private = address
            .parse::<IpAddr>()
            .is_ok_and(Self::is_private);
        Ok(private.then(GeoLocation::private_network))
    }
}

/// Small prefix table of known ranges.
///
/// Matching compares whole octets: a `/N` entry checks the first `N / 8`
/// octets and ignores any remaining bits. A `/12` therefore behaves like a
/// `/8`, and a `/0` through `/7` entry matches every IPv4 address. Only IPv4
/// entries are supported.
pub struct CidrTable {
    entries: Vec<(Ipv4Net, GeoLocation)>,
}

const BUILTIN_RANGES: &[(&str, &str, &str, &str, &str)] = &[
    ("1.0.1.0/24", "China", "Fujian", "Fuzhou", "China Telecom"),
    ("1.0.2.0/24", "China", "Fujian", "Fuzhou", "China Telecom"),
    ("1.0.8.0/24", "China", "Guangdong", "Guangzhou", "China Telecom"),
    ("1.0.32.0/24", "China", "Guangdong", "Guangzhou", "China Telecom"),
    ("192.168.0.0/16", "private", "private network", "private network", "intranet"),
    ("10.0.0.0/8", "private", "private network", "private network", "intranet"),
    ("172.16.0.0/12", "private", "private network", "private network", "intranet"),
    ("127.0.0.0/8", "local", "local", "local", "local"),
];

impl CidrTable {
    #[must_use]
    pub fn new(entries: Vec<(Ipv4Net, GeoLocation)>) -> Self {
        Self { entries }
    }

    /// The table shipped with the service.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = BUILTIN_RANGES
            .iter()
            .filter_map(|(cidr, country, region, city, isp)| {
                let net = cidr.parse::<Ipv4Net>().ok()?;
                Some((net, GeoLocation::new(*country, *region, *city, *isp)))
            })
            .collect();
        Self::new(entries)
    }

    fn matches(net: &Ipv4Net, ip: Ipv4Addr) -> bool {
        let whole_octets = usize::from(net.prefix_len() / 8);
        net.addr().octets()[..whole_octets] == ip.octets()[..whole_octets]
    }
}

impl LocationSource for CidrTable {
    fn name(&self) -> &'static str {
        "cidr"
    }

    fn lookup(&self, address: &str) -> Result<Option<GeoLocation>, ResolutionError> {
        let Ok(ip) = address.parse::<Ipv4Addr>() else {
            return Ok(None);
        };
        Ok(self
            .entries
            .iter()
            .find(|(net, _)| Self::matches(net, ip))
            .map(|(_, location)| location.clone()))
    }

    fn table_size(&self) -> usize {
        self.entries.len()
    }
}

/// Placeholder location derived from fixed bands of the first IPv4 octet.
///
/// This is **not** geographically meaningful. It only keeps the location
/// fields non-empty when nothing better is known, and should be replaced by a
/// real geo database behind the same [`LocationSource`] seam.
pub struct OctetHeuristic;

impl OctetHeuristic {
    fn region(octet: u8) -> &'static str {
        match octet {
            1..=50 => "Beijing",
            51..=100 => "Shanghai",
            101..=150 => "Guangdong",
            151..=200 => "Jiangsu",
            _ => "unknown region",
        }
    }

    fn city(octet: u8) -> &'static str {
        match octet {
            1..=50 => "Beijing",
            51..=100 => "Shanghai",
            101..=150 => "Guangzhou",
            151..=200 => "Nanjing",
            _ => "unknown city",
        }
    }

    fn isp(octet: u8) -> &'static str {
        match octet % 3 {
            0 => "China Telecom",
            1 => "China Unicom",
            _ => "China Mobile",
        }
    }
}

impl LocationSource for OctetHeuristic {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn lookup(&self, address: &str) -> Result<Option<GeoLocation>, ResolutionError> {
        let ip = address
            .parse::<Ipv4Addr>()
            .map_err(|_| ResolutionError::Unparseable(address.to_string()))?;
        let octet = ip.octets()[0];

        Ok(Some(GeoLocation::new(
            "China",
            Self::region(octet),
            Self::city(octet),
            Self::isp(octet),
        )))
    }
}
