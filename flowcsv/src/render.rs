//! Rendering of one record into one CSV line.
//!
//! Rendering is total: every column of every resolved group is written.
//! Values that cannot be rendered become the configured sentinel (addresses,
//! masks, timestamps) or zero (missing group data), and the problem is
//! recorded as a [`RecordIssue`] next to the line.

use std::borrow::Cow;
use std::fmt::Display;

use flowcsv_schema::{
    AddrFlags, ExtensionFlag, FieldGroup, FlowRecord, RawAddr, Schema, SchemaDescriptor,
};
use flowcsv_time::{format_duration, format_received, format_seen, Zone};

use crate::addr::{check_mask, format_addr, AddrError, Family};
use crate::error::RecordIssue;

/// Everything a line needs besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub zone: &'a dyn Zone,
    pub sentinel: &'a str,
}

/// A rendered line, without its newline, and the problems absorbed on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub text: String,
    pub issues: Vec<RecordIssue>,
}

/// Render `record` with the groups in `descriptor`, in order.
pub fn render_line(
    record: &FlowRecord,
    descriptor: &SchemaDescriptor,
    ctx: &RenderContext<'_>,
) -> RenderedLine {
    let mut line = LineWriter::new(ctx);
    for &group in descriptor.groups() {
        render_group(&mut line, record, group, descriptor.schema());
    }
    line.finish()
}

fn render_group(line: &mut LineWriter<'_>, record: &FlowRecord, group: FieldGroup, schema: Schema) {
    let family = Family::from_v6_flag(record.is_ipv6());

    match group {
        FieldGroup::Flow => match schema {
            Schema::Minimal => {
                line.addr("sa", record.src_addr, Ok(family));
                line.addr("da", record.dst_addr, Ok(family));
                line.field(record.in_bytes);
            }
            Schema::Extended => {
                line.seen("ts", record.first_seen_ms);
                line.seen("te", record.last_seen_ms);
                line.duration(record);
                line.addr("sa", record.src_addr, Ok(family));
                line.addr("da", record.dst_addr, Ok(family));
                line.field(record.src_port);
                line.field(record.dst_port);
                line.field(protocol_name(record.protocol));
                line.field(tcp_flags_string(record.tcp_flags));
                line.field(record.fwd_status);
                line.field(record.src_tos);
                line.field(record.in_packets);
                line.field(record.in_bytes);
                line.field(record.out_packets.unwrap_or(0));
                line.field(record.out_bytes.unwrap_or(0));
            }
        },
        FieldGroup::IoSnmp => {
            let snmp = line.require(group, record.snmp);
            line.field(snmp.input);
            line.field(snmp.output);
        }
        FieldGroup::AsNumbers => {
            line.field(record.src_as);
            line.field(record.dst_as);
        }
        FieldGroup::Multiple => {
            line.mask("smk", record.src_mask, family);
            line.mask("dmk", record.dst_mask, family);
            line.field(record.dst_tos);
            line.field(record.direction);
        }
        FieldGroup::NextHop => {
            let hop_family = announced_family(
                record,
                AddrFlags::IPV6_NEXT_HOP,
                ExtensionFlag::NextHopV4,
                ExtensionFlag::NextHopV6,
            );
            let raw = line.require(group, record.next_hop);
            line.addr("nh", raw, hop_family);
        }
        FieldGroup::BgpNextHop => {
            let hop_family = announced_family(
                record,
                AddrFlags::IPV6_BGP_NEXT_HOP,
                ExtensionFlag::BgpNextHopV4,
                ExtensionFlag::BgpNextHopV6,
            );
            let raw = line.require(group, record.bgp_next_hop);
            line.addr("nhb", raw, hop_family);
        }
        FieldGroup::Vlan => {
            let vlan = line.require(group, record.vlan);
            line.field(vlan.src);
            line.field(vlan.dst);
        }
        FieldGroup::MacPair1 => {
            let macs = line.require(group, record.mac_pair_1);
            line.field(format_mac(macs.in_mac));
            line.field(format_mac(macs.out_mac));
        }
        FieldGroup::MacPair2 => {
            let macs = line.require(group, record.mac_pair_2);
            line.field(format_mac(macs.in_mac));
            line.field(format_mac(macs.out_mac));
        }
        FieldGroup::Mpls => {
            let labels = line.require(group, record.mpls);
            for entry in labels {
                line.field(format_mpls(entry));
            }
        }
        FieldGroup::Latency => {
            let latency = line.require(group, record.latency);
            line.field(format_latency(latency.client_nw_delay_usec));
            line.field(format_latency(latency.server_nw_delay_usec));
            line.field(format_latency(latency.appl_latency_usec));
        }
        FieldGroup::RouterIp => {
            let router_family = record.addr_flags.contains(AddrFlags::IPV6_ROUTER);
            line.addr("ra", record.router_addr, Ok(Family::from_v6_flag(router_family)));
        }
        FieldGroup::RouterId => {
            let id = line.require(group, record.router_id);
            line.field(format!("{}/{}", id.engine_type, id.engine_id));
        }
        FieldGroup::ExporterSysId => {
            let sysid = line.require(group, record.exporter_sysid);
            line.field(sysid);
        }
        FieldGroup::Received => line.received(record.received_ms),
    }
}

/// Family of a next-hop style field, checked against the extension flags
/// that announced it.
fn announced_family(
    record: &FlowRecord,
    v6_bit: AddrFlags,
    v4_flag: ExtensionFlag,
    v6_flag: ExtensionFlag,
) -> Result<Family, AddrError> {
    let family = Family::from_v6_flag(record.addr_flags.contains(v6_bit));
    match family {
        Family::V4 if record.extensions.contains(v6_flag) => Err(AddrError::ContradictoryFamily {
            announced: Family::V6,
        }),
        Family::V6 if record.extensions.contains(v4_flag) => Err(AddrError::ContradictoryFamily {
            announced: Family::V4,
        }),
        _ => Ok(family),
    }
}

struct LineWriter<'a> {
    ctx: &'a RenderContext<'a>,
    text: String,
    issues: Vec<RecordIssue>,
}

impl<'a> LineWriter<'a> {
    fn new(ctx: &'a RenderContext<'a>) -> Self {
        Self {
            ctx,
            text: String::with_capacity(128),
            issues: Vec::new(),
        }
    }

    fn field(&mut self, value: impl Display) {
        if !self.text.is_empty() {
            self.text.push(',');
        }
        self.text.push_str(&value.to_string());
    }

    fn sentinel(&mut self) {
        let sentinel = self.ctx.sentinel;
        self.field(sentinel);
    }

    fn addr(&mut self, column: &'static str, raw: RawAddr, family: Result<Family, AddrError>) {
        match family.and_then(|family| format_addr(raw, family)) {
            Ok(text) => self.field(text),
            Err(source) => {
                self.issues
                    .push(RecordIssue::InvalidFamilyFlag { column, source });
                self.sentinel();
            }
        }
    }

    fn mask(&mut self, column: &'static str, mask: u8, family: Family) {
        match check_mask(family, mask) {
            Ok(()) => self.field(mask),
            Err(source) => {
                self.issues
                    .push(RecordIssue::InvalidFamilyFlag { column, source });
                self.sentinel();
            }
        }
    }

    fn seen(&mut self, column: &'static str, msec: u64) {
        match format_seen(msec, self.ctx.zone) {
            Ok(text) => self.field(text),
            Err(source) => {
                self.issues
                    .push(RecordIssue::InvalidTimestamp { column, source });
                self.sentinel();
            }
        }
    }

    fn duration(&mut self, record: &FlowRecord) {
        if !record.has_ordered_times() {
            self.issues.push(RecordIssue::InvertedTimestamps {
                first_seen_ms: record.first_seen_ms,
                last_seen_ms: record.last_seen_ms,
            });
        }
        self.field(format_duration(record.first_seen_ms, record.last_seen_ms));
    }

    // The received column carries its own leading separator.
    fn received(&mut self, msec: u64) {
        match format_received(msec, self.ctx.zone) {
            Ok(text) => self.text.push_str(&text),
            Err(source) => {
                self.issues.push(RecordIssue::InvalidTimestamp {
                    column: "tr",
                    source,
                });
                self.sentinel();
            }
        }
    }

    fn require<T: Default>(&mut self, group: FieldGroup, value: Option<T>) -> T {
        value.unwrap_or_else(|| {
            self.issues.push(RecordIssue::IncompleteRecord { group });
            T::default()
        })
    }

    fn finish(self) -> RenderedLine {
        RenderedLine {
            text: self.text,
            issues: self.issues,
        }
    }
}

/// Protocol name for well-known IP protocol numbers, else the number.
pub fn protocol_name(protocol: u8) -> Cow<'static, str> {
    let name = match protocol {
        1 => "ICMP",
        2 => "IGMP",
        4 => "IPIP",
        6 => "TCP",
        17 => "UDP",
        41 => "IPv6",
        47 => "GRE",
        50 => "ESP",
        51 => "AH",
        58 => "ICMP6",
        89 => "OSPF",
        103 => "PIM",
        112 => "VRRP",
        132 => "SCTP",
        other => return Cow::Owned(other.to_string()),
    };
    Cow::Borrowed(name)
}

const TCP_FLAG_CHARS: [(u8, char); 8] = [
    (0x80, 'C'),
    (0x40, 'E'),
    (0x20, 'U'),
    (0x10, 'A'),
    (0x08, 'P'),
    (0x04, 'R'),
    (0x02, 'S'),
    (0x01, 'F'),
];

/// Eight-character TCP flag string, `.` for each cleared bit.
pub fn tcp_flags_string(flags: u8) -> String {
    TCP_FLAG_CHARS
        .iter()
        .map(|&(bit, c)| if flags & bit != 0 { c } else { '.' })
        .collect()
}

/// MAC address from the low 48 bits of `value`, most significant byte first.
pub fn format_mac(value: u64) -> String {
    let b = value.to_be_bytes();
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b[2], b[3], b[4], b[5], b[6], b[7]
    )
}

/// One MPLS stack entry as `label-exp-bos`.
pub fn format_mpls(entry: u32) -> String {
    format!("{}-{}-{}", entry >> 4, (entry & 0xF) >> 1, entry & 1)
}

/// Microseconds as milliseconds, 3 decimals, width 9.
pub fn format_latency(usec: u64) -> String {
    format!("{:9.3}", usec as f64 / 1000.0)
}
