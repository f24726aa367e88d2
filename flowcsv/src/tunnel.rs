//! Tunnel decomposition.
//!
//! A tunneled flow is written as two lines: a synthetic envelope carrying
//! the encapsulation endpoints, then the inner flow itself. Only one level
//! is unwrapped; the envelope never carries tunnel fields of its own.

use flowcsv_schema::{AddrFlags, FlowRecord};

/// Build the envelope record for a tunneled flow, or `None` if the flow is
/// not tunneled.
///
/// The envelope keeps the tunnel protocol, tunnel endpoints and the outer
/// first/last timestamps. Counters, AS numbers, masks and extension flags
/// are all zero. Only `ip_version == 6` marks the endpoints as IPv6.
pub fn decompose(record: &FlowRecord) -> Option<FlowRecord> {
    let tunnel = &record.tunnel;
    if !tunnel.is_tunneled() {
        return None;
    }

    let mut addr_flags = AddrFlags::empty();
    if tunnel.ip_version == 6 {
        addr_flags.insert(AddrFlags::IPV6_ADDR);
    }

    Some(FlowRecord {
        first_seen_ms: record.first_seen_ms,
        last_seen_ms: record.last_seen_ms,
        protocol: tunnel.protocol,
        addr_flags,
        src_addr: tunnel.src_addr,
        dst_addr: tunnel.dst_addr,
        ..FlowRecord::default()
    })
}

/// True if `version` is a tunnel IP version the envelope can be built for.
pub fn is_known_version(version: u8) -> bool {
    matches!(version, 0 | 4 | 6)
}
