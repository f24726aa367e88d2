//! Flow record schema.
//!
//! Defines the decoded flow record handed to the CSV engine and the
//! selector that decides which column groups a record contributes.

mod extension;
mod record;

pub use extension::{
    ExtensionFlag, ExtensionFlags, FieldGroup, GroupSet, Schema, SchemaDescriptor,
};
pub use record::{
    AddrFlags, FlowRecord, Latency, MacPair, RawAddr, RecordError, RouterId, SnmpIndices,
    TunnelInfo, VlanPair, MPLS_STACK_DEPTH,
};
