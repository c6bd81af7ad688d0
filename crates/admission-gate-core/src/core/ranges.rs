// crates/admission-gate-core/src/core/ranges.rs
// ============================================================================
// Module: IP Range Types
// Description: Category-tagged CIDR blocks published by the payment processor.
// Purpose: Parse and normalize range entries for allow-list membership tests.
// Dependencies: ipnet, serde
// ============================================================================

//! ## Overview
//! Range publishers return CIDR blocks or bare addresses. Bare addresses are
//! normalized to single-host networks (`/32` or `/128`). Caller addresses
//! that arrive as IPv4-mapped IPv6 are folded back to IPv4 before matching.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use ipnet::Ipv4Net;
use ipnet::Ipv6Net;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Category of a published range list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeCategory {
    /// Addresses that deliver webhooks.
    Webhooks,
    /// Addresses that serve the processor API.
    Api,
    /// Other published addresses (dashboards, auxiliary services).
    Auxiliary,
}

impl RangeCategory {
    /// Returns a stable label for status reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Webhooks => "webhooks",
            Self::Api => "api",
            Self::Auxiliary => "auxiliary",
        }
    }
}

impl fmt::Display for RangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CIDR block tagged with the category it was published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaggedRange {
    /// Network block.
    pub network: IpNet,
    /// Publishing category.
    pub category: RangeCategory,
}

impl TaggedRange {
    /// Returns true when the (normalized) address falls inside this block.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.network.contains(&normalize_ip(ip))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a published entry as a CIDR block or a bare address.
///
/// Returns `None` for entries that are neither.
#[must_use]
pub fn parse_range_entry(entry: &str) -> Option<IpNet> {
    let trimmed = entry.trim();
    if let Ok(net) = trimmed.parse::<IpNet>() {
        return Some(net.trunc());
    }
    match trimmed.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Ipv4Net::new(v4, 32).ok().map(IpNet::V4),
        IpAddr::V6(v6) => Ipv6Net::new(v6, 128).ok().map(IpNet::V6),
    }
}

/// Folds IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) back to IPv4.
#[must_use]
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        IpAddr::V4(_) => ip,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test fixtures parse literal addresses.")]

    use super::*;

    #[test]
    fn bare_addresses_become_single_host_networks() {
        let v4 = parse_range_entry("3.18.12.63").unwrap();
        assert_eq!(v4.prefix_len(), 32);
        let v6 = parse_range_entry("2600:1f18::1").unwrap();
        assert_eq!(v6.prefix_len(), 128);
    }

    #[test]
    fn cidr_entries_are_truncated_to_network() {
        let net = parse_range_entry(" 10.1.2.3/24 ").unwrap();
        assert_eq!(net.to_string(), "10.1.2.0/24");
    }

    #[test]
    fn garbage_entries_are_rejected() {
        assert!(parse_range_entry("not-an-ip").is_none());
        assert!(parse_range_entry("10.0.0.0/40").is_none());
    }

    #[test]
    fn mapped_ipv6_callers_match_ipv4_ranges() {
        let range = TaggedRange {
            network: parse_range_entry("54.187.174.169").unwrap(),
            category: RangeCategory::Webhooks,
        };
        let mapped: IpAddr = "::ffff:54.187.174.169".parse().unwrap();
        assert!(range.contains(mapped));
        let other: IpAddr = "::ffff:54.187.174.170".parse().unwrap();
        assert!(!range.contains(other));
    }
}
