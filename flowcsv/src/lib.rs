//! Flow record to CSV serialization.
//!
//! An [`Emitter`] turns decoded [`FlowRecord`]s into comma-separated lines:
//! a header once per output session, then one line per record. Tunneled
//! records produce an extra envelope line first. Two layouts exist, the
//! minimal `sa,da,ibyt,sas,das,ra,tr` and the extended layout whose optional
//! column groups follow the record's extension flags.
//!
//! ```no_run
//! use flowcsv::{Emitter, EmitterConfig, FlowRecord, StderrLogger, Verbosity};
//!
//! let logger = StderrLogger::stderr(Verbosity::Normal);
//! let mut emitter = Emitter::new(EmitterConfig::extended(), &logger)?;
//! let mut out = std::io::stdout().lock();
//!
//! emitter.start_session(&mut out)?;
//! emitter.emit(&FlowRecord::default(), &mut out)?;
//! emitter.end_session(&mut out);
//! # Ok::<(), flowcsv::EmitError>(())
//! ```

pub mod addr;
pub mod config;
pub mod emitter;
pub mod error;
pub mod logger;
pub mod render;
pub mod tunnel;

pub use addr::{format_addr, format_masked, mask_addr, AddrError, Family, IP_STRING_LEN};
pub use config::{ConfigError, EmitterConfig, EmitterSettings, DEFAULT_SENTINEL};
pub use emitter::{EmitReport, Emitter, SessionContext, SessionState, SessionSummary};
pub use error::{EmitError, RecordIssue};
pub use logger::{
    LogEntry, Logger, MockLogger, NullLogger, StderrLogger, StreamLogger, Verbosity,
};
pub use render::{render_line, RenderContext, RenderedLine};
pub use tunnel::decompose;

pub use flowcsv_schema::{
    AddrFlags, ExtensionFlag, ExtensionFlags, FieldGroup, FlowRecord, GroupSet, Latency, MacPair,
    RawAddr, RecordError, RouterId, Schema, SchemaDescriptor, SnmpIndices, TunnelInfo, VlanPair,
    MPLS_STACK_DEPTH,
};
pub use flowcsv_time::{FixedZone, LocalZone, Zone};
