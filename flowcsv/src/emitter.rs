//! Record emitter and output session.
//!
//! An [`Emitter`] writes the header once per session, then one line per
//! record, or two for a tunneled record (envelope first). Session state
//! lives in the emitter's own [`SessionContext`], so independent emitters
//! can run side by side without sharing counters.

use std::io::Write;
use std::iter;

use flowcsv_schema::{FlowRecord, SchemaDescriptor};

use crate::config::EmitterConfig;
use crate::error::{EmitError, RecordIssue};
use crate::logger::Logger;
use crate::render::{render_line, RenderContext};
use crate::tunnel::{decompose, is_known_version};

/// Lifecycle state of an output session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No header written yet, or the previous session ended.
    #[default]
    Idle,
    /// Header written; records may be emitted.
    Emitting,
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionContext {
    pub state: SessionState,
    /// Top-level records emitted. Envelope lines are not counted.
    pub record_count: u64,
    /// Record lines written, envelopes included, header excluded.
    pub lines: u64,
}

/// Outcome of one `emit` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmitReport {
    /// Lines written for this record: 1, or 2 for a tunneled record.
    pub lines: usize,
    /// Problems absorbed while rendering.
    pub issues: Vec<RecordIssue>,
}

impl EmitReport {
    /// True if any column fell back to a sentinel or zero.
    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Totals returned when a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub records: u64,
    pub lines: u64,
}

/// Flow record to CSV emitter.
pub struct Emitter<'a> {
    config: EmitterConfig,
    header: SchemaDescriptor,
    logger: &'a dyn Logger,
    session: SessionContext,
}

impl<'a> Emitter<'a> {
    /// Create an emitter after validating `config`.
    pub fn new(config: EmitterConfig, logger: &'a dyn Logger) -> Result<Self, EmitError> {
        config.validate()?;
        let header = SchemaDescriptor::header(config.schema, config.groups);
        Ok(Self {
            config,
            header,
            logger,
            session: SessionContext::default(),
        })
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Records emitted in the current session.
    pub fn record_count(&self) -> u64 {
        self.session.record_count
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Header line for the configured schema, without newline.
    pub fn header_line(&self) -> String {
        self.header.header_line()
    }

    /// Write the header and reset counters.
    pub fn start_session<W: Write>(&mut self, sink: &mut W) -> Result<(), EmitError> {
        if self.session.state == SessionState::Emitting {
            return Err(EmitError::SessionAlreadyStarted);
        }

        self.session = SessionContext::default();
        let header = self.header_line();
        self.write_line(sink, &header)?;
        self.session.state = SessionState::Emitting;

        self.logger
            .verbose(&format!("output session started: {}", header));
        Ok(())
    }

    /// Write the line(s) for one record.
    ///
    /// Problems with the record are absorbed and reported in the returned
    /// [`EmitReport`] and through the logger. Only sink failures and
    /// lifecycle misuse are errors; a sink failure ends the session.
    pub fn emit<W: Write>(
        &mut self,
        record: &FlowRecord,
        sink: &mut W,
    ) -> Result<EmitReport, EmitError> {
        if self.session.state != SessionState::Emitting {
            return Err(EmitError::SessionNotStarted);
        }

        let ordinal = self.session.record_count + 1;
        let mut report = EmitReport::default();

        let envelope = decompose(record);
        if envelope.is_some() {
            let version = record.tunnel.ip_version;
            if !is_known_version(version) {
                report.issues.push(RecordIssue::UnknownTunnelVersion(version));
            }
            self.logger.debug(&format!(
                "record {}: unwrapping IPv{} tunnel, protocol {}",
                ordinal, version, record.tunnel.protocol
            ));
        }

        let ctx = RenderContext {
            zone: self.config.zone.as_ref(),
            sentinel: &self.config.sentinel,
        };

        for line_record in envelope.iter().chain(iter::once(record)) {
            let descriptor = SchemaDescriptor::resolve(
                self.config.schema,
                self.config.groups,
                line_record.extensions,
            );
            let rendered = render_line(line_record, &descriptor, &ctx);
            report.issues.extend(rendered.issues);

            if let Err(e) = write_record_line(sink, &rendered.text) {
                self.session.state = SessionState::Idle;
                log_issues(self.logger, ordinal, &report.issues);
                self.logger
                    .warn(&format!("record {}: output sink failed, session ended", ordinal));
                return Err(e);
            }
            self.session.lines += 1;
            report.lines += 1;
        }

        self.session.record_count = ordinal;
        log_issues(self.logger, ordinal, &report.issues);

        Ok(report)
    }

    /// End the session. Nothing is flushed; the sink belongs to the caller.
    pub fn end_session<W: Write>(&mut self, _sink: &mut W) -> SessionSummary {
        let summary = SessionSummary {
            records: self.session.record_count,
            lines: self.session.lines,
        };
        if self.session.state == SessionState::Emitting {
            self.logger.verbose(&format!(
                "output session ended: {} records, {} lines",
                summary.records, summary.lines
            ));
        }
        self.session.state = SessionState::Idle;
        summary
    }

    fn write_line<W: Write>(&mut self, sink: &mut W, text: &str) -> Result<(), EmitError> {
        write_record_line(sink, text).inspect_err(|_| self.session.state = SessionState::Idle)
    }
}

fn log_issues(logger: &dyn Logger, ordinal: u64, issues: &[RecordIssue]) {
    for issue in issues {
        logger.warn(&format!("record {}: {}", ordinal, issue));
    }
}

fn write_record_line<W: Write>(sink: &mut W, text: &str) -> Result<(), EmitError> {
    sink.write_all(text.as_bytes())?;
    sink.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{MockLogger, NullLogger, Verbosity};
    use flowcsv_schema::{AddrFlags, ExtensionFlag, RawAddr, Schema, TunnelInfo, VlanPair};
    use flowcsv_time::FixedZone;
    use std::io;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn utc_config() -> EmitterConfig {
        EmitterConfig::new().with_zone(FixedZone::utc())
    }

    fn plain_record() -> FlowRecord {
        FlowRecord {
            first_seen_ms: 1_700_000_000_000,
            last_seen_ms: 1_700_000_001_000,
            received_ms: 1_700_000_000_500,
            src_addr: RawAddr::from(Ipv4Addr::new(10, 0, 0, 1)),
            dst_addr: RawAddr::from(Ipv4Addr::new(10, 0, 0, 2)),
            in_bytes: 1500,
            src_as: 65001,
            dst_as: 65002,
            router_addr: RawAddr::from(Ipv4Addr::new(192, 0, 2, 1)),
            ..Default::default()
        }
    }

    fn tunneled_record() -> FlowRecord {
        FlowRecord {
            tunnel: TunnelInfo {
                ip_version: 6,
                protocol: 47,
                src_addr: RawAddr::from("2001:db8::1".parse::<Ipv6Addr>().unwrap()),
                dst_addr: RawAddr::from("2001:db8::2".parse::<Ipv6Addr>().unwrap()),
            },
            ..plain_record()
        }
    }

    fn output(buf: &[u8]) -> Vec<String> {
        String::from_utf8(buf.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Writer that fails after `budget` successful writes.
    struct FailingSink {
        budget: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
            }
            self.budget -= 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // ===========================================
    // Session Lifecycle Tests
    // ===========================================

    #[test]
    fn test_start_session_writes_header() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();

        assert_eq!(emitter.state(), SessionState::Idle);
        emitter.start_session(&mut buf).unwrap();

        assert_eq!(emitter.state(), SessionState::Emitting);
        assert_eq!(output(&buf), vec!["sa,da,ibyt,sas,das,ra,tr"]);
    }

    #[test]
    fn test_emit_before_start_is_rejected() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();

        let err = emitter.emit(&plain_record(), &mut buf).unwrap_err();
        assert!(matches!(err, EmitError::SessionNotStarted));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();

        emitter.start_session(&mut buf).unwrap();
        let err = emitter.start_session(&mut buf).unwrap_err();
        assert!(matches!(err, EmitError::SessionAlreadyStarted));
        assert_eq!(output(&buf).len(), 1);
    }

    #[test]
    fn test_header_written_once_per_session() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();

        emitter.start_session(&mut buf).unwrap();
        for _ in 0..5 {
            emitter.emit(&plain_record(), &mut buf).unwrap();
        }
        emitter.end_session(&mut buf);

        let lines = output(&buf);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "sa,da,ibyt,sas,das,ra,tr");
        assert_eq!(lines.iter().filter(|l| l.starts_with("sa,")).count(), 1);
    }

    #[test]
    fn test_end_session_returns_summary_and_goes_idle() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();

        emitter.start_session(&mut buf).unwrap();
        emitter.emit(&plain_record(), &mut buf).unwrap();
        emitter.emit(&tunneled_record(), &mut buf).unwrap();
        let summary = emitter.end_session(&mut buf);

        assert_eq!(summary, SessionSummary { records: 2, lines: 3 });
        assert_eq!(emitter.state(), SessionState::Idle);
        assert!(matches!(
            emitter.emit(&plain_record(), &mut buf),
            Err(EmitError::SessionNotStarted)
        ));
    }

    #[test]
    fn test_new_session_resets_counter() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();

        emitter.start_session(&mut buf).unwrap();
        emitter.emit(&plain_record(), &mut buf).unwrap();
        emitter.end_session(&mut buf);

        emitter.start_session(&mut buf).unwrap();
        assert_eq!(emitter.record_count(), 0);
        assert_eq!(emitter.session().lines, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let logger = NullLogger;
        let result = Emitter::new(utc_config().with_sentinel("a,b"), &logger);
        assert!(matches!(result, Err(EmitError::Config(_))));
    }

    // ===========================================
    // Emission Tests
    // ===========================================

    #[test]
    fn test_plain_record_one_line() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();
        emitter.start_session(&mut buf).unwrap();

        let report = emitter.emit(&plain_record(), &mut buf).unwrap();

        assert_eq!(report.lines, 1);
        assert!(!report.is_degraded());
        assert_eq!(emitter.record_count(), 1);
        assert_eq!(
            output(&buf)[1],
            "10.0.0.1,10.0.0.2,1500,65001,65002,192.0.2.1,2023-11-14 22:13:20.500"
        );
    }

    #[test]
    fn test_tunneled_record_two_lines_one_count() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();
        emitter.start_session(&mut buf).unwrap();

        let report = emitter.emit(&tunneled_record(), &mut buf).unwrap();

        assert_eq!(report.lines, 2);
        assert_eq!(emitter.record_count(), 1);
        let lines = output(&buf);
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "2001:db8::1,2001:db8::2,0,0,0,0.0.0.0,1970-01-01 00:00:00.000"
        );
        assert_eq!(
            lines[2],
            "10.0.0.1,10.0.0.2,1500,65001,65002,192.0.2.1,2023-11-14 22:13:20.500"
        );
    }

    #[test]
    fn test_ipv4_tunnel_envelope_line() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();
        emitter.start_session(&mut buf).unwrap();

        let record = FlowRecord {
            tunnel: TunnelInfo {
                ip_version: 4,
                protocol: 4,
                src_addr: RawAddr::from(Ipv4Addr::new(198, 51, 100, 1)),
                dst_addr: RawAddr::from(Ipv4Addr::new(198, 51, 100, 2)),
            },
            ..plain_record()
        };
        emitter.emit(&record, &mut buf).unwrap();

        assert!(output(&buf)[1].starts_with("198.51.100.1,198.51.100.2,0,0,0,"));
    }

    #[test]
    fn test_extended_envelope_keeps_timestamps_and_protocol() {
        let logger = NullLogger;
        let config = EmitterConfig::extended().with_zone(FixedZone::utc());
        let mut emitter = Emitter::new(config, &logger).unwrap();
        let mut buf = Vec::new();
        emitter.start_session(&mut buf).unwrap();

        emitter.emit(&tunneled_record(), &mut buf).unwrap();

        let lines = output(&buf);
        assert!(
            lines[1].starts_with(
                "2023-11-14 22:13:20,2023-11-14 22:13:21,1.000,2001:db8::1,2001:db8::2,0,0,GRE,"
            ),
            "{}",
            lines[1]
        );
    }

    #[test]
    fn test_unknown_tunnel_version_is_absorbed() {
        let logger = MockLogger::new();
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();
        emitter.start_session(&mut buf).unwrap();

        let mut record = plain_record();
        record.tunnel.ip_version = 5;
        let report = emitter.emit(&record, &mut buf).unwrap();

        assert_eq!(report.lines, 2);
        assert_eq!(report.issues, vec![RecordIssue::UnknownTunnelVersion(5)]);
        assert!(logger.contains("unknown tunnel IP version 5"));
    }

    #[test]
    fn test_bad_record_does_not_stop_session() {
        let logger = MockLogger::new();
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();
        emitter.start_session(&mut buf).unwrap();

        let bad = FlowRecord {
            src_addr: RawAddr([1, 1]),
            ..plain_record()
        };
        let report = emitter.emit(&bad, &mut buf).unwrap();
        assert!(report.is_degraded());

        let report = emitter.emit(&plain_record(), &mut buf).unwrap();
        assert!(!report.is_degraded());

        let lines = output(&buf);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("invalid,10.0.0.2,"));
        assert!(lines[2].starts_with("10.0.0.1,10.0.0.2,"));
        assert_eq!(emitter.record_count(), 2);

        let warnings = logger.messages_at_level(Verbosity::Normal);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("warning: record 1: invalid address in column sa"));
    }

    #[test]
    fn test_extended_incomplete_group_logged() {
        let logger = MockLogger::new();
        let config = EmitterConfig::extended().with_zone(FixedZone::utc());
        let mut emitter = Emitter::new(config, &logger).unwrap();
        let mut buf = Vec::new();
        emitter.start_session(&mut buf).unwrap();

        let mut record = plain_record();
        record.extensions.insert(ExtensionFlag::Vlan);
        let report = emitter.emit(&record, &mut buf).unwrap();

        assert_eq!(report.issues.len(), 1);
        assert!(logger.contains("Vlan group announced but its data is missing"));

        record.vlan = Some(VlanPair { src: 5, dst: 6 });
        let report = emitter.emit(&record, &mut buf).unwrap();
        assert!(!report.is_degraded());
        assert!(output(&buf)[2].contains(",65001,65002,5,6,192.0.2.1,"));
    }

    #[test]
    fn test_emit_leaves_record_untouched() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();
        emitter.start_session(&mut buf).unwrap();

        let record = FlowRecord {
            addr_flags: AddrFlags::IPV6_ROUTER,
            ..tunneled_record()
        };
        let before = record.clone();
        emitter.emit(&record, &mut buf).unwrap();
        assert_eq!(record, before);
    }

    #[test]
    fn test_session_logging() {
        let logger = MockLogger::new();
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut buf = Vec::new();

        emitter.start_session(&mut buf).unwrap();
        emitter.emit(&tunneled_record(), &mut buf).unwrap();
        emitter.end_session(&mut buf);

        assert_eq!(
            logger.messages_at_level(Verbosity::Verbose),
            vec![
                "output session started: sa,da,ibyt,sas,das,ra,tr",
                "output session ended: 1 records, 2 lines"
            ]
        );
        assert_eq!(
            logger.messages_at_level(Verbosity::Debug),
            vec!["record 1: unwrapping IPv6 tunnel, protocol 47"]
        );
    }

    // ===========================================
    // Sink Failure Tests
    // ===========================================

    #[test]
    fn test_header_write_failure() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        let mut sink = FailingSink { budget: 0 };

        let err = emitter.start_session(&mut sink).unwrap_err();
        assert!(matches!(err, EmitError::Sink(_)));
        assert_eq!(emitter.state(), SessionState::Idle);
    }

    #[test]
    fn test_record_write_failure_ends_session() {
        let logger = MockLogger::new();
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        // header text + newline
        let mut sink = FailingSink { budget: 2 };

        emitter.start_session(&mut sink).unwrap();
        let err = emitter.emit(&plain_record(), &mut sink).unwrap_err();

        assert!(matches!(err, EmitError::Sink(_)));
        assert_eq!(emitter.state(), SessionState::Idle);
        assert_eq!(emitter.record_count(), 0);
        assert!(logger.contains("output sink failed"));
    }

    #[test]
    fn test_issues_logged_before_sink_failure() {
        let logger = MockLogger::new();
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        // header (2 writes) + envelope (2 writes)
        let mut sink = FailingSink { budget: 4 };

        // envelope renders cleanly, the record line carries a bad source
        let mut record = plain_record();
        record.tunnel.ip_version = 5;
        record.src_addr = RawAddr([1, 1]);

        emitter.start_session(&mut sink).unwrap();
        assert!(emitter.emit(&record, &mut sink).is_err());

        let warnings = logger.messages_at_level(Verbosity::Normal);
        assert_eq!(warnings.len(), 3, "{:?}", warnings);
        assert!(warnings[0].contains("record 1: unknown tunnel IP version 5"));
        assert!(warnings[1].contains("record 1: invalid address in column sa"));
        assert!(warnings[2].contains("output sink failed"));
    }

    #[test]
    fn test_envelope_written_but_record_failed_is_not_counted() {
        let logger = NullLogger;
        let mut emitter = Emitter::new(utc_config(), &logger).unwrap();
        // header (2 writes) + envelope (2 writes)
        let mut sink = FailingSink { budget: 4 };

        emitter.start_session(&mut sink).unwrap();
        assert!(emitter.emit(&tunneled_record(), &mut sink).is_err());
        assert_eq!(emitter.record_count(), 0);
        assert_eq!(emitter.session().lines, 1);
    }

    // ===========================================
    // Independent Session Tests
    // ===========================================

    #[test]
    fn test_emitters_do_not_share_counters() {
        let logger = NullLogger;
        let mut a = Emitter::new(utc_config(), &logger).unwrap();
        let mut b = Emitter::new(utc_config().with_schema(Schema::Extended), &logger).unwrap();
        let (mut buf_a, mut buf_b) = (Vec::new(), Vec::new());

        a.start_session(&mut buf_a).unwrap();
        b.start_session(&mut buf_b).unwrap();
        a.emit(&plain_record(), &mut buf_a).unwrap();
        a.emit(&plain_record(), &mut buf_a).unwrap();
        b.emit(&plain_record(), &mut buf_b).unwrap();

        assert_eq!(a.record_count(), 2);
        assert_eq!(b.record_count(), 1);
    }
}
