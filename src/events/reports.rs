/*!
 * Deadlock and Blocking Reports
 * Second-level parse of the XML documents carried by report records
 *
 * A report that fails to parse never aborts the batch: it becomes a
 * degraded record carrying the raw document and the malformed marker.
 */

use super::format::format_wait_ms;
use super::kind::EventKind;
use super::raw::{attr_value, decode_content};
use crate::core::errors::{CaptureError, CaptureResult};
use crate::core::limits::MALFORMED_MARKER;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

/// One participant of a deadlock graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockProcess {
    pub id: String,
    pub session_id: Option<u32>,
    pub login: Option<String>,
    pub host: Option<String>,
    pub application: Option<String>,
    pub database: Option<String>,
    pub wait_resource: Option<String>,
    pub lock_mode: Option<String>,
    pub wait_time_ms: u64,
    pub wait_display: String,
    pub input_buffer: String,
    pub is_victim: bool,
}

/// Parsed deadlock graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockReport {
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub victim_id: Option<String>,
    pub processes: Vec<DeadlockProcess>,
}

/// The waiting side of a blocked-process report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedProcess {
    pub session_id: Option<u32>,
    pub wait_resource: Option<String>,
    pub wait_time_ms: u64,
    pub wait_display: String,
    pub login: Option<String>,
    pub host: Option<String>,
    pub database: Option<String>,
    pub input_buffer: String,
}

/// The lock-holding side of a blocked-process report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingProcess {
    pub session_id: Option<u32>,
    pub login: Option<String>,
    pub host: Option<String>,
    pub database: Option<String>,
    pub input_buffer: String,
    pub status: Option<String>,
}

/// Parsed blocked-process report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingReport {
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub blocked: BlockedProcess,
    pub blocking: BlockingProcess,
}

/// Outcome of parsing one report record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum ReportRecord {
    Deadlock(DeadlockReport),
    Blocking(BlockingReport),
    Degraded {
        kind: EventKind,
        #[serde(with = "time::serde::rfc3339::option")]
        timestamp: Option<OffsetDateTime>,
        raw: String,
        marker: String,
    },
}

impl ReportRecord {
    #[inline]
    pub fn is_degraded(&self) -> bool {
        matches!(self, ReportRecord::Degraded { .. })
    }
}

/// Parse a report payload; parse failures degrade instead of erroring
pub fn parse_report(
    kind: &EventKind,
    timestamp: Option<OffsetDateTime>,
    payload: &str,
) -> ReportRecord {
    let parsed = match kind {
        EventKind::XmlDeadlockReport => parse_deadlock(payload).map(|(victim_id, processes)| {
            ReportRecord::Deadlock(DeadlockReport {
                timestamp,
                victim_id,
                processes,
            })
        }),
        EventKind::BlockedProcessReport => {
            parse_blocking(payload).map(|(blocked, blocking)| {
                ReportRecord::Blocking(BlockingReport {
                    timestamp,
                    blocked,
                    blocking,
                })
            })
        }
        other => Err(CaptureError::MalformedPayload(format!(
            "{} does not carry a report document",
            other
        ))),
    };

    parsed.unwrap_or_else(|e| {
        warn!(kind = %kind, error = %e, "Degrading unparsable report");
        ReportRecord::Degraded {
            kind: kind.clone(),
            timestamp,
            raw: payload.to_string(),
            marker: MALFORMED_MARKER.to_string(),
        }
    })
}

fn parse_deadlock(xml: &str) -> CaptureResult<(Option<String>, Vec<DeadlockProcess>)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut depth = 0usize;
    let mut victim_id: Option<String> = None;
    let mut in_process_list = false;
    let mut current: Option<DeadlockProcess> = None;
    let mut processes = Vec::new();

    loop {
        let (e, empty) = match reader.read_event()? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"process" if in_process_list => processes.extend(current.take()),
                    b"process-list" => in_process_list = false,
                    _ => {}
                }
                depth = close(depth)?;
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        match e.local_name().as_ref() {
            b"deadlock" => {
                if let Some(victim) = attr_value(&e, b"victim") {
                    victim_id = Some(victim);
                }
            }
            b"victimProcess" if victim_id.is_none() => victim_id = attr_value(&e, b"id"),
            b"process-list" => in_process_list = !empty,
            b"process" if in_process_list => {
                let process = deadlock_process(&e);
                if empty {
                    processes.push(process);
                } else {
                    current = Some(process);
                }
            }
            b"inputbuf" if !empty => {
                let text = decode_content(&reader.read_text(e.name())?);
                if let Some(process) = current.as_mut() {
                    process.input_buffer = text;
                }
                continue;
            }
            _ => {}
        }

        if !empty {
            depth += 1;
        }
    }

    ensure_closed(depth)?;
    if processes.is_empty() {
        return Err(CaptureError::MalformedPayload(
            "deadlock graph lists no processes".into(),
        ));
    }

    for process in &mut processes {
        process.is_victim = victim_id.as_deref() == Some(process.id.as_str());
    }
    Ok((victim_id, processes))
}

fn deadlock_process(e: &BytesStart<'_>) -> DeadlockProcess {
    let wait_time_ms = attr_u64(e, b"waittime");
    DeadlockProcess {
        id: attr_value(e, b"id").unwrap_or_default(),
        session_id: attr_value(e, b"spid").and_then(|v| v.parse().ok()),
        login: attr_value(e, b"loginname"),
        host: attr_value(e, b"hostname"),
        application: attr_value(e, b"clientapp"),
        database: database_attr(e),
        wait_resource: attr_value(e, b"waitresource"),
        lock_mode: attr_value(e, b"lockMode"),
        wait_time_ms,
        wait_display: format_wait_ms(wait_time_ms),
        input_buffer: String::new(),
        is_victim: false,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Blocked,
    Blocking,
}

fn parse_blocking(xml: &str) -> CaptureResult<(BlockedProcess, BlockingProcess)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut depth = 0usize;
    let mut side: Option<Side> = None;
    let mut blocked: Option<BlockedProcess> = None;
    let mut blocking: Option<BlockingProcess> = None;

    loop {
        let (e, empty) = match reader.read_event()? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                if matches!(
                    e.local_name().as_ref(),
                    b"blocked-process" | b"blocking-process"
                ) {
                    side = None;
                }
                depth = close(depth)?;
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        match (e.local_name().as_ref(), side) {
            (b"blocked-process", _) if !empty => side = Some(Side::Blocked),
            (b"blocking-process", _) if !empty => side = Some(Side::Blocking),
            (b"process", Some(Side::Blocked)) => {
                let wait_time_ms = attr_u64(&e, b"waittime");
                blocked = Some(BlockedProcess {
                    session_id: attr_value(&e, b"spid").and_then(|v| v.parse().ok()),
                    wait_resource: attr_value(&e, b"waitresource"),
                    wait_time_ms,
                    wait_display: format_wait_ms(wait_time_ms),
                    login: attr_value(&e, b"loginname"),
                    host: attr_value(&e, b"hostname"),
                    database: database_attr(&e),
                    input_buffer: String::new(),
                });
            }
            (b"process", Some(Side::Blocking)) => {
                blocking = Some(BlockingProcess {
                    session_id: attr_value(&e, b"spid").and_then(|v| v.parse().ok()),
                    login: attr_value(&e, b"loginname"),
                    host: attr_value(&e, b"hostname"),
                    database: database_attr(&e),
                    input_buffer: String::new(),
                    status: attr_value(&e, b"status"),
                });
            }
            (b"inputbuf", Some(current_side)) if !empty => {
                let text = decode_content(&reader.read_text(e.name())?);
                match current_side {
                    Side::Blocked => {
                        if let Some(p) = blocked.as_mut() {
                            p.input_buffer = text;
                        }
                    }
                    Side::Blocking => {
                        if let Some(p) = blocking.as_mut() {
                            p.input_buffer = text;
                        }
                    }
                }
                continue;
            }
            _ => {}
        }

        if !empty {
            depth += 1;
        }
    }

    ensure_closed(depth)?;
    match (blocked, blocking) {
        (Some(blocked), Some(blocking)) => Ok((blocked, blocking)),
        (None, _) => Err(CaptureError::MalformedPayload(
            "blocked-process subtree missing".into(),
        )),
        (_, None) => Err(CaptureError::MalformedPayload(
            "blocking-process subtree missing".into(),
        )),
    }
}

fn database_attr(e: &BytesStart<'_>) -> Option<String> {
    attr_value(e, b"currentdbname").or_else(|| attr_value(e, b"currentdb"))
}

fn attr_u64(e: &BytesStart<'_>, key: &[u8]) -> u64 {
    attr_value(e, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn close(depth: usize) -> CaptureResult<usize> {
    depth
        .checked_sub(1)
        .ok_or_else(|| CaptureError::MalformedPayload("unbalanced end tag".into()))
}

fn ensure_closed(depth: usize) -> CaptureResult<()> {
    if depth == 0 {
        Ok(())
    } else {
        Err(CaptureError::MalformedPayload(format!(
            "document truncated with {} open elements",
            depth
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEADLOCK: &str = r#"<deadlock>
  <victim-list><victimProcess id="process2"/></victim-list>
  <process-list>
    <process id="process1" waitresource="KEY: 5:7205 (8194)" waittime="4891" lockMode="U" spid="54" loginname="app" hostname="web01" clientapp="api" currentdbname="sales">
      <executionStack><frame procname="adhoc" line="1"/></executionStack>
      <inputbuf>
   UPDATE orders SET state = 2 WHERE id = 10   </inputbuf>
    </process>
    <process id="process2" waitresource="KEY: 5:7205 (9a1c)" waittime="4870" lockMode="X" spid="61" loginname="etl" hostname="batch01" clientapp="loader" currentdbname="sales">
      <inputbuf>DELETE FROM orders WHERE id = 11</inputbuf>
    </process>
  </process-list>
  <resource-list><keylock hobtid="7205" mode="X"><owner-list><owner id="process1" mode="X"/></owner-list></keylock></resource-list>
</deadlock>"#;

    const BLOCKING: &str = r#"<blocked-process-report monitorLoop="42">
  <blocked-process>
    <process id="process9" waitresource="OBJECT: 5:123:0" waittime="65000" spid="70" loginname="report" hostname="bi01" currentdbname="sales">
      <inputbuf>SELECT * FROM orders</inputbuf>
    </process>
  </blocked-process>
  <blocking-process>
    <process status="sleeping" spid="55" loginname="app" hostname="web01" currentdbname="sales">
      <inputbuf>BEGIN TRAN; UPDATE orders SET state = 3</inputbuf>
    </process>
  </blocking-process>
</blocked-process-report>"#;

    #[test]
    fn test_deadlock_graph_parsed() {
        let record = parse_report(&EventKind::XmlDeadlockReport, None, DEADLOCK);
        let ReportRecord::Deadlock(report) = record else {
            panic!("expected deadlock report, got {:?}", record);
        };

        assert_eq!(report.victim_id.as_deref(), Some("process2"));
        assert_eq!(report.processes.len(), 2);

        let first = &report.processes[0];
        assert_eq!(first.id, "process1");
        assert_eq!(first.session_id, Some(54));
        assert_eq!(first.lock_mode.as_deref(), Some("U"));
        assert_eq!(first.database.as_deref(), Some("sales"));
        assert_eq!(first.wait_display, "4.89s");
        assert_eq!(first.input_buffer, "UPDATE orders SET state = 2 WHERE id = 10");
        assert!(!first.is_victim);
        assert!(report.processes[1].is_victim);
    }

    #[test]
    fn test_legacy_victim_attribute() {
        let xml = r#"<deadlock-list><deadlock victim="p1"><process-list><process id="p1" spid="5"/></process-list></deadlock></deadlock-list>"#;
        let ReportRecord::Deadlock(report) = parse_report(&EventKind::XmlDeadlockReport, None, xml)
        else {
            panic!("expected deadlock report");
        };
        assert!(report.processes[0].is_victim);
    }

    #[test]
    fn test_blocking_report_parsed() {
        let record = parse_report(&EventKind::BlockedProcessReport, None, BLOCKING);
        let ReportRecord::Blocking(report) = record else {
            panic!("expected blocking report, got {:?}", record);
        };

        assert_eq!(report.blocked.session_id, Some(70));
        assert_eq!(report.blocked.wait_resource.as_deref(), Some("OBJECT: 5:123:0"));
        assert_eq!(report.blocked.wait_display, "1.08min");
        assert_eq!(report.blocked.input_buffer, "SELECT * FROM orders");
        assert_eq!(report.blocking.session_id, Some(55));
        assert_eq!(report.blocking.status.as_deref(), Some("sleeping"));
        assert_eq!(
            report.blocking.input_buffer,
            "BEGIN TRAN; UPDATE orders SET state = 3"
        );
    }

    #[test]
    fn test_truncated_deadlock_degrades() {
        let truncated = &DEADLOCK[..DEADLOCK.len() / 2];
        let record = parse_report(&EventKind::XmlDeadlockReport, None, truncated);
        match record {
            ReportRecord::Degraded { raw, marker, .. } => {
                assert_eq!(raw, truncated);
                assert_eq!(marker, MALFORMED_MARKER);
            }
            other => panic!("expected degraded record, got {:?}", other),
        }
    }

    #[test]
    fn test_blocking_report_missing_side_degrades() {
        let xml = r#"<blocked-process-report><blocked-process><process spid="1"/></blocked-process></blocked-process-report>"#;
        assert!(parse_report(&EventKind::BlockedProcessReport, None, xml).is_degraded());
    }

    #[test]
    fn test_standard_kind_is_not_a_report() {
        assert!(parse_report(&EventKind::RpcCompleted, None, "<x/>").is_degraded());
    }
}
