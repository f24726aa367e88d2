//! Error types for the CSV engine.
//!
//! [`EmitError`] ends a call and is returned to the caller. [`RecordIssue`]
//! describes a problem with one record that was absorbed: the line was still
//! written, with sentinel or zero values where data was unusable.

use std::io;

use flowcsv_schema::FieldGroup;
use flowcsv_time::TimeError;
use thiserror::Error;

use crate::addr::AddrError;
use crate::config::ConfigError;

/// Errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("output sink write failed: {0}")]
    Sink(#[from] io::Error),

    #[error("no output session started")]
    SessionNotStarted,

    #[error("output session already started")]
    SessionAlreadyStarted,

    #[error("invalid emitter config: {0}")]
    Config(#[from] ConfigError),
}

/// Per-record problems absorbed during rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordIssue {
    #[error("invalid address in column {column}: {source}")]
    InvalidFamilyFlag {
        column: &'static str,
        #[source]
        source: AddrError,
    },

    #[error("{group:?} group announced but its data is missing")]
    IncompleteRecord { group: FieldGroup },

    #[error("invalid timestamp in column {column}: {source}")]
    InvalidTimestamp {
        column: &'static str,
        #[source]
        source: TimeError,
    },

    #[error("unknown tunnel IP version {0}, envelope rendered as IPv4")]
    UnknownTunnelVersion(u8),

    #[error("last seen {last_seen_ms} ms precedes first seen {first_seen_ms} ms, duration rendered as 0")]
    InvertedTimestamps { first_seen_ms: u64, last_seen_ms: u64 },
}
