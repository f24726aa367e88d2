//! Extension flags and column-group selection.
//!
//! A record announces its optional field groups through [`ExtensionFlags`].
//! [`SchemaDescriptor::resolve`] turns those flags into the ordered list of
//! groups a line is rendered from. The order is always the canonical order
//! of [`FieldGroup::ALL`], never the order the flags were set in.

use serde::{Deserialize, Serialize};

/// Named optional field groups an exporter can announce on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ExtensionFlag {
    IoSnmp = 0,
    Multiple = 1,
    NextHopV4 = 2,
    NextHopV6 = 3,
    BgpNextHopV4 = 4,
    BgpNextHopV6 = 5,
    Vlan = 6,
    MacPair1 = 7,
    MacPair2 = 8,
    Mpls = 9,
    Latency = 10,
    RouterId = 11,
    ExporterSysId = 12,
}

impl ExtensionFlag {
    pub const ALL: [ExtensionFlag; 13] = [
        ExtensionFlag::IoSnmp,
        ExtensionFlag::Multiple,
        ExtensionFlag::NextHopV4,
        ExtensionFlag::NextHopV6,
        ExtensionFlag::BgpNextHopV4,
        ExtensionFlag::BgpNextHopV6,
        ExtensionFlag::Vlan,
        ExtensionFlag::MacPair1,
        ExtensionFlag::MacPair2,
        ExtensionFlag::Mpls,
        ExtensionFlag::Latency,
        ExtensionFlag::RouterId,
        ExtensionFlag::ExporterSysId,
    ];

    /// Bit position of this flag inside [`ExtensionFlags`].
    pub const fn bit(self) -> u32 {
        1 << self as u8
    }
}

/// Presence bitset of [`ExtensionFlag`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionFlags(u32);

impl ExtensionFlags {
    /// No groups announced.
    pub const fn empty() -> Self {
        ExtensionFlags(0)
    }

    /// Raw bit pattern, one bit per [`ExtensionFlag::bit`].
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if `flag` is set.
    pub fn contains(self, flag: ExtensionFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Set `flag`.
    pub fn insert(&mut self, flag: ExtensionFlag) {
        self.0 |= flag.bit();
    }

    /// Clear `flag`.
    pub fn remove(&mut self, flag: ExtensionFlag) {
        self.0 &= !flag.bit();
    }

    /// True if no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Flags that are set, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = ExtensionFlag> {
        ExtensionFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(*flag))
    }
}

impl FromIterator<ExtensionFlag> for ExtensionFlags {
    fn from_iter<I: IntoIterator<Item = ExtensionFlag>>(iter: I) -> Self {
        let mut flags = ExtensionFlags::empty();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

/// Output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// `sa,da,ibyt,sas,das,ra,tr`
    #[default]
    Minimal,
    /// Full flow layout with optional groups appended in canonical order.
    Extended,
}

/// Column groups of an output line, declared in canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FieldGroup {
    Flow = 0,
    IoSnmp = 1,
    AsNumbers = 2,
    Multiple = 3,
    NextHop = 4,
    BgpNextHop = 5,
    Vlan = 6,
    MacPair1 = 7,
    MacPair2 = 8,
    Mpls = 9,
    Latency = 10,
    RouterIp = 11,
    RouterId = 12,
    ExporterSysId = 13,
    Received = 14,
}

const MINIMAL_FLOW_COLUMNS: &[&str] = &["sa", "da", "ibyt"];

const EXTENDED_FLOW_COLUMNS: &[&str] = &[
    "ts", "te", "td", "sa", "da", "sp", "dp", "pr", "flg", "fwd", "stos", "ipkt", "ibyt", "opkt",
    "obyt",
];

const MPLS_COLUMNS: &[&str] = &[
    "mpls1", "mpls2", "mpls3", "mpls4", "mpls5", "mpls6", "mpls7", "mpls8", "mpls9", "mpls10",
];

impl FieldGroup {
    pub const ALL: [FieldGroup; 15] = [
        FieldGroup::Flow,
        FieldGroup::IoSnmp,
        FieldGroup::AsNumbers,
        FieldGroup::Multiple,
        FieldGroup::NextHop,
        FieldGroup::BgpNextHop,
        FieldGroup::Vlan,
        FieldGroup::MacPair1,
        FieldGroup::MacPair2,
        FieldGroup::Mpls,
        FieldGroup::Latency,
        FieldGroup::RouterIp,
        FieldGroup::RouterId,
        FieldGroup::ExporterSysId,
        FieldGroup::Received,
    ];

    /// Groups that appear on every line regardless of flags.
    pub fn is_core(self) -> bool {
        matches!(
            self,
            FieldGroup::Flow | FieldGroup::AsNumbers | FieldGroup::RouterIp | FieldGroup::Received
        )
    }

    /// Extension flags announcing this group. Any one of them is enough.
    pub fn announced_by(self) -> &'static [ExtensionFlag] {
        match self {
            FieldGroup::IoSnmp => &[ExtensionFlag::IoSnmp],
            FieldGroup::Multiple => &[ExtensionFlag::Multiple],
            FieldGroup::NextHop => &[ExtensionFlag::NextHopV4, ExtensionFlag::NextHopV6],
            FieldGroup::BgpNextHop => &[ExtensionFlag::BgpNextHopV4, ExtensionFlag::BgpNextHopV6],
            FieldGroup::Vlan => &[ExtensionFlag::Vlan],
            FieldGroup::MacPair1 => &[ExtensionFlag::MacPair1],
            FieldGroup::MacPair2 => &[ExtensionFlag::MacPair2],
            FieldGroup::Mpls => &[ExtensionFlag::Mpls],
            FieldGroup::Latency => &[ExtensionFlag::Latency],
            FieldGroup::RouterId => &[ExtensionFlag::RouterId],
            FieldGroup::ExporterSysId => &[ExtensionFlag::ExporterSysId],
            FieldGroup::Flow
            | FieldGroup::AsNumbers
            | FieldGroup::RouterIp
            | FieldGroup::Received => &[],
        }
    }

    /// True if the group is core or announced by `flags`.
    pub fn is_present(self, flags: ExtensionFlags) -> bool {
        self.is_core() || self.announced_by().iter().any(|flag| flags.contains(*flag))
    }

    /// Header column names this group contributes under `schema`.
    pub fn columns(self, schema: Schema) -> &'static [&'static str] {
        match self {
            FieldGroup::Flow => match schema {
                Schema::Minimal => MINIMAL_FLOW_COLUMNS,
                Schema::Extended => EXTENDED_FLOW_COLUMNS,
            },
            FieldGroup::IoSnmp => &["in", "out"],
            FieldGroup::AsNumbers => &["sas", "das"],
            FieldGroup::Multiple => &["smk", "dmk", "dtos", "dir"],
            FieldGroup::NextHop => &["nh"],
            FieldGroup::BgpNextHop => &["nhb"],
            FieldGroup::Vlan => &["svln", "dvln"],
            FieldGroup::MacPair1 => &["ismc", "odmc"],
            FieldGroup::MacPair2 => &["idmc", "osmc"],
            FieldGroup::Mpls => MPLS_COLUMNS,
            FieldGroup::Latency => &["cl", "sl", "al"],
            FieldGroup::RouterIp => &["ra"],
            FieldGroup::RouterId => &["eng"],
            FieldGroup::ExporterSysId => &["exid"],
            FieldGroup::Received => &["tr"],
        }
    }

    const fn bit(self) -> u32 {
        1 << self as u8
    }
}

/// Set of optional groups a caller has enabled for the extended schema.
///
/// Serialized as a list of group names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<FieldGroup>", into = "Vec<FieldGroup>")]
pub struct GroupSet(u32);

impl GroupSet {
    /// No optional groups.
    pub const fn none() -> Self {
        GroupSet(0)
    }

    /// Every optional group.
    pub fn all() -> Self {
        FieldGroup::ALL
            .into_iter()
            .filter(|group| !group.is_core())
            .collect()
    }

    /// Builder: enable one more group.
    pub fn with(mut self, group: FieldGroup) -> Self {
        self.0 |= group.bit();
        self
    }

    /// Core groups count as always enabled.
    pub fn contains(self, group: FieldGroup) -> bool {
        group.is_core() || self.0 & group.bit() != 0
    }
}

impl Default for GroupSet {
    fn default() -> Self {
        GroupSet::all()
    }
}

impl FromIterator<FieldGroup> for GroupSet {
    fn from_iter<I: IntoIterator<Item = FieldGroup>>(iter: I) -> Self {
        iter.into_iter().fold(GroupSet::none(), GroupSet::with)
    }
}

impl From<Vec<FieldGroup>> for GroupSet {
    fn from(groups: Vec<FieldGroup>) -> Self {
        groups.into_iter().collect()
    }
}

impl From<GroupSet> for Vec<FieldGroup> {
    fn from(set: GroupSet) -> Self {
        FieldGroup::ALL
            .into_iter()
            .filter(|group| !group.is_core() && set.contains(*group))
            .collect()
    }
}

/// Ordered list of groups a line (or the header) is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    schema: Schema,
    groups: Vec<FieldGroup>,
}

impl SchemaDescriptor {
    /// Groups for one record: core groups plus optional groups that are both
    /// enabled and announced by `flags`. The minimal schema never carries
    /// optional groups.
    pub fn resolve(schema: Schema, enabled: GroupSet, flags: ExtensionFlags) -> Self {
        let groups = FieldGroup::ALL
            .into_iter()
            .filter(|group| match schema {
                Schema::Minimal => group.is_core(),
                Schema::Extended => enabled.contains(*group) && group.is_present(flags),
            })
            .collect();
        Self { schema, groups }
    }

    /// Groups for the header line: every enabled group.
    pub fn header(schema: Schema, enabled: GroupSet) -> Self {
        let groups = FieldGroup::ALL
            .into_iter()
            .filter(|group| match schema {
                Schema::Minimal => group.is_core(),
                Schema::Extended => enabled.contains(*group),
            })
            .collect();
        Self { schema, groups }
    }

    /// Layout the groups belong to.
    pub fn schema(&self) -> Schema {
        self.schema
    }

    /// Groups in canonical order.
    pub fn groups(&self) -> &[FieldGroup] {
        &self.groups
    }

    /// True if `group` contributes columns.
    pub fn contains(&self, group: FieldGroup) -> bool {
        self.groups.contains(&group)
    }

    /// Column names in output order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.groups
            .iter()
            .flat_map(move |group| group.columns(self.schema).iter().copied())
    }

    /// Comma-joined column names, without a trailing newline.
    pub fn header_line(&self) -> String {
        self.columns().collect::<Vec<_>>().join(",")
    }
}
