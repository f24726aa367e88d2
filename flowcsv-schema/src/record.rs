//! FlowRecord and the raw field types it is built from.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::extension::ExtensionFlags;

/// Number of label-stack entries carried by the MPLS group.
pub const MPLS_STACK_DEPTH: usize = 10;

/// Raw 128-bit address storage as two host-order words `[hi, lo]`.
///
/// IPv4 addresses live in the low 32 bits of `lo` with every other bit zero.
/// Which family a value holds is not recorded here; it comes from the
/// matching bit in [`AddrFlags`] (or the tunnel version for tunnel endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAddr(pub [u64; 2]);

impl RawAddr {
    /// The all-zero address.
    pub const ZERO: RawAddr = RawAddr([0, 0]);

    /// Build from an IPv4 address in host-order integer form.
    pub fn from_v4_bits(bits: u32) -> Self {
        RawAddr([0, bits as u64])
    }

    /// Build from a host-order 128-bit value.
    pub fn from_u128(bits: u128) -> Self {
        RawAddr([(bits >> 64) as u64, bits as u64])
    }

    /// The stored value as a host-order 128-bit integer.
    pub fn as_u128(&self) -> u128 {
        ((self.0[0] as u128) << 64) | self.0[1] as u128
    }

    /// Low 32 bits, i.e. the IPv4 address when the value holds one.
    pub fn v4_bits(&self) -> u32 {
        self.0[1] as u32
    }

    /// True if only the low 32 bits are populated.
    pub fn fits_v4(&self) -> bool {
        self.0[0] == 0 && self.0[1] >> 32 == 0
    }

    /// True if every bit is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0, 0]
    }
}

impl From<Ipv4Addr> for RawAddr {
    fn from(addr: Ipv4Addr) -> Self {
        RawAddr::from_v4_bits(u32::from(addr))
    }
}

impl From<Ipv6Addr> for RawAddr {
    fn from(addr: Ipv6Addr) -> Self {
        RawAddr::from_u128(u128::from(addr))
    }
}

/// Address-family bits of a record.
///
/// Every address-carrying field has its own bit; a cleared bit means IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddrFlags(u8);

impl AddrFlags {
    /// Source and destination addresses are IPv6.
    pub const IPV6_ADDR: AddrFlags = AddrFlags(0x01);
    /// Next-hop address is IPv6.
    pub const IPV6_NEXT_HOP: AddrFlags = AddrFlags(0x04);
    /// BGP next-hop address is IPv6.
    pub const IPV6_BGP_NEXT_HOP: AddrFlags = AddrFlags(0x08);
    /// Router (exporter) address is IPv6.
    pub const IPV6_ROUTER: AddrFlags = AddrFlags(0x10);

    /// No bits set: every address is IPv4.
    pub const fn empty() -> Self {
        AddrFlags(0)
    }

    /// Raw bit pattern.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Construct from a raw bit pattern, keeping unknown bits.
    pub const fn from_bits(bits: u8) -> Self {
        AddrFlags(bits)
    }

    /// True if every bit in `other` is set in `self`.
    pub const fn contains(self, other: AddrFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set every bit in `other`.
    pub fn insert(&mut self, other: AddrFlags) {
        self.0 |= other.0;
    }

    /// Clear every bit in `other`.
    pub fn remove(&mut self, other: AddrFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for AddrFlags {
    type Output = AddrFlags;

    fn bitor(self, rhs: AddrFlags) -> AddrFlags {
        AddrFlags(self.0 | rhs.0)
    }
}

/// Input and output interface SNMP indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnmpIndices {
    pub input: u32,
    pub output: u32,
}

/// Source and destination VLAN ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VlanPair {
    pub src: u16,
    pub dst: u16,
}

/// A pair of 48-bit MAC addresses held in the low bytes of a `u64`.
///
/// Pair 1 carries (input source, output destination); pair 2 carries
/// (input destination, output source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MacPair {
    pub in_mac: u64,
    pub out_mac: u64,
}

/// Network and application latency figures in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Latency {
    pub client_nw_delay_usec: u64,
    pub server_nw_delay_usec: u64,
    pub appl_latency_usec: u64,
}

/// Exporter engine identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouterId {
    pub engine_type: u8,
    pub engine_id: u8,
}

/// Encapsulation header of a tunneled flow.
///
/// `ip_version` is 0 when the flow is not tunneled, otherwise 4 or 6.
/// Endpoints always use full 128-bit storage; IPv4 endpoints are zero-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TunnelInfo {
    pub ip_version: u8,
    pub protocol: u8,
    pub src_addr: RawAddr,
    pub dst_addr: RawAddr,
}

impl TunnelInfo {
    /// True if the record carries an encapsulation header.
    pub fn is_tunneled(&self) -> bool {
        self.ip_version != 0
    }
}

/// One decoded flow record.
///
/// Group payloads that an exporter may leave out are `Option`s; whether a
/// group is *announced* is a separate question answered by `extensions`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowRecord {
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub received_ms: u64,

    pub addr_flags: AddrFlags,
    pub src_addr: RawAddr,
    pub dst_addr: RawAddr,
    pub src_mask: u8,
    pub dst_mask: u8,

    pub protocol: u8,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flags: u8,
    pub fwd_status: u8,
    pub src_tos: u8,
    pub dst_tos: u8,
    pub direction: u8,

    pub in_packets: u64,
    pub in_bytes: u64,
    pub out_packets: Option<u64>,
    pub out_bytes: Option<u64>,

    pub src_as: u32,
    pub dst_as: u32,

    pub router_addr: RawAddr,
    pub next_hop: Option<RawAddr>,
    pub bgp_next_hop: Option<RawAddr>,

    pub snmp: Option<SnmpIndices>,
    pub vlan: Option<VlanPair>,
    pub mac_pair_1: Option<MacPair>,
    pub mac_pair_2: Option<MacPair>,
    pub mpls: Option<[u32; MPLS_STACK_DEPTH]>,
    pub latency: Option<Latency>,
    pub router_id: Option<RouterId>,
    pub exporter_sysid: Option<u32>,

    pub tunnel: TunnelInfo,
    pub extensions: ExtensionFlags,
}

impl FlowRecord {
    /// True if source and destination are IPv6.
    pub fn is_ipv6(&self) -> bool {
        self.addr_flags.contains(AddrFlags::IPV6_ADDR)
    }

    /// Flow duration in milliseconds, zero if the timestamps are inverted.
    pub fn duration_ms(&self) -> u64 {
        self.last_seen_ms.saturating_sub(self.first_seen_ms)
    }

    /// True unless `last_seen_ms` precedes `first_seen_ms`.
    pub fn has_ordered_times(&self) -> bool {
        self.first_seen_ms <= self.last_seen_ms
    }

    /// Serialize to a single-line JSON string.
    pub fn to_json(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Errors from moving records in and out of JSON.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
