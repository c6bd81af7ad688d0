// crates/admission-gate-providers/tests/proptest_document.rs
// ============================================================================
// Module: Range Document Property Tests
// Description: Property checks for publisher document decoding.
// Purpose: Ensure decoded networks always contain the published address.
// ============================================================================

#![allow(clippy::unwrap_used, reason = "Property tests unwrap generated values.")]

use std::net::IpAddr;
use std::net::Ipv4Addr;

use admission_gate_providers::ResponseShape;
use admission_gate_providers::parse_range_document;
use proptest::prelude::*;

proptest! {
    #[test]
    fn decoded_networks_contain_their_address(raw in any::<u32>(), prefix in 0_u8 ..= 32) {
        let addr = Ipv4Addr::from(raw);
        let body = serde_json::to_vec(&vec![format!("{addr}/{prefix}"), addr.to_string()]).unwrap();
        let networks = parse_range_document(&body, &ResponseShape::Array).unwrap();
        prop_assert_eq!(networks.len(), 2);
        for network in networks {
            prop_assert!(network.contains(&IpAddr::V4(addr)));
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0 .. 256)) {
        let _ = parse_range_document(&bytes, &ResponseShape::Auto);
    }
}
