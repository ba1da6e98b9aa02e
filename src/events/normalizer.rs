/*!
 * Event Normalizer
 * Turns raw buffer records into canonical events, dispatching on record shape
 */

use super::kind::EventKind;
use super::model::{CapturedEvent, EventCounters, EventOrigin, EventOutcome};
use super::raw::RawRecord;
use super::reports::{parse_report, ReportRecord};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Normalize a standard-shape record
///
/// Missing or unparsable fields become zero/empty; this never fails.
pub fn normalize(record: &RawRecord) -> CapturedEvent {
    normalize_standard(EventKind::from_name(&record.name), record)
}

/// Normalize an XML-payload record into a structured (or degraded) report
///
/// Callers pick this or [`normalize`] by matching on [`EventKind::shape`].
pub fn normalize_report(record: &RawRecord) -> ReportRecord {
    let kind = EventKind::from_name(&record.name);
    let payload = kind
        .report_field()
        .and_then(|field| record.data(field))
        .unwrap_or_default();
    parse_report(&kind, parse_timestamp(record.timestamp.as_deref()), payload)
}

fn normalize_standard(kind: EventKind, record: &RawRecord) -> CapturedEvent {
    let counters = EventCounters {
        duration_us: parse_u64(record.data("duration")),
        cpu_time_us: parse_u64(record.data("cpu_time")),
        logical_reads: parse_u64(record.data("logical_reads")),
        physical_reads: parse_u64(record.data("physical_reads")),
        writes: parse_u64(record.data("writes")),
        row_count: parse_u64(record.data("row_count")),
    };

    let origin = EventOrigin {
        database: owned(
            record
                .action("database_name")
                .or_else(|| record.data("database_name")),
        ),
        application: owned(record.action("client_app_name")),
        host: owned(record.action("client_hostname")),
        login: owned(
            record
                .action("username")
                .or_else(|| record.action("server_principal_name"))
                .or_else(|| record.data("login_name")),
        ),
        session_id: parse_opt(record.action("session_id")),
        transaction_id: parse_opt(record.action("transaction_id")),
        request_id: parse_opt(record.action("request_id")),
    };

    let outcome = EventOutcome {
        result: owned(record.data_text("result").or_else(|| record.data("result"))),
        error_number: parse_opt(record.data("error_number")),
        error_message: owned(record.data("message")),
    };

    let object_name = owned(record.data("object_name"));
    let text = resolve_text(&kind, record, object_name.as_deref());

    CapturedEvent::new(
        kind,
        parse_timestamp(record.timestamp.as_deref()),
        counters,
        text,
        origin,
        outcome,
    )
    .with_object_name(object_name)
}

/// Batch text, then statement, then action text, then `kind: object` for DDL
fn resolve_text(kind: &EventKind, record: &RawRecord, object_name: Option<&str>) -> String {
    if let Some(text) = record
        .data("batch_text")
        .or_else(|| record.data("statement"))
        .or_else(|| record.action("sql_text"))
    {
        return text.to_string();
    }

    match object_name {
        Some(object) => format!("{}: {}", kind, object),
        None => String::new(),
    }
}

/// RFC 3339 first, then offset-less ISO 8601 read as UTC
pub fn parse_timestamp(raw: Option<&str>) -> Option<OffsetDateTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT).map(|t| t.assume_utc()))
        .ok()
}

#[inline]
fn parse_u64(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

#[inline]
fn parse_opt<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw.and_then(|v| v.trim().parse().ok())
}

#[inline]
fn owned(raw: Option<&str>) -> Option<String> {
    raw.map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::events::raw::RawField;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    fn field(name: &str, value: &str) -> RawField {
        RawField {
            name: name.into(),
            value: value.into(),
            text: None,
        }
    }

    fn batch_record() -> RawRecord {
        RawRecord {
            name: "sql_batch_completed".into(),
            timestamp: Some("2024-03-01T10:00:01.250Z".into()),
            data: vec![
                field("duration", "2500"),
                field("cpu_time", "1200"),
                field("logical_reads", "88"),
                field("row_count", "3"),
                field("batch_text", "SELECT * FROM orders WHERE id = 5"),
                RawField {
                    name: "result".into(),
                    value: "0".into(),
                    text: Some("OK".into()),
                },
            ],
            actions: vec![
                field("database_name", "sales"),
                field("client_app_name", "api"),
                field("client_hostname", "web01"),
                field("username", "app"),
                field("session_id", "57"),
                field("transaction_id", "9001"),
            ],
        }
    }

    #[test]
    fn test_standard_record_normalized() {
        let event = normalize(&batch_record());

        assert_eq!(event.kind, EventKind::SqlBatchCompleted);
        assert_eq!(event.timestamp, Some(datetime!(2024-03-01 10:00:01.25 UTC)));
        assert_eq!(event.counters.duration_us, 2500);
        assert_eq!(event.counters.cpu_time_us, 1200);
        assert_eq!(event.counters.logical_reads, 88);
        assert_eq!(event.counters.physical_reads, 0);
        assert_eq!(event.origin.database.as_deref(), Some("sales"));
        assert_eq!(event.origin.login.as_deref(), Some("app"));
        assert_eq!(event.origin.session_id, Some(57));
        assert_eq!(event.origin.transaction_id, Some(9001));
        assert_eq!(event.outcome.result.as_deref(), Some("OK"));
        assert_eq!(event.duration_display, "2.50ms");
        assert_eq!(event.fingerprint, fingerprint("select * from orders where id = 1"));
    }

    #[test]
    fn test_normalization_is_pure() {
        let record = batch_record();
        assert_eq!(normalize(&record), normalize(&record));
    }

    #[test]
    fn test_text_falls_back_to_statement_then_action() {
        let mut record = batch_record();
        record.data.retain(|f| f.name != "batch_text");
        record.data.push(field("statement", "EXEC dbo.Sync"));
        assert_eq!(normalize(&record).text, "EXEC dbo.Sync");

        record.data.retain(|f| f.name != "statement");
        record.actions.push(field("sql_text", "EXEC dbo.Other"));
        assert_eq!(normalize(&record).text, "EXEC dbo.Other");
    }

    #[test]
    fn test_schema_change_text_synthesized() {
        let record = RawRecord {
            name: "object_altered".into(),
            timestamp: None,
            data: vec![field("object_name", "dbo.orders")],
            actions: vec![],
        };
        let event = normalize(&record);
        assert_eq!(event.text, "object_altered: dbo.orders");
        assert_eq!(event.object_name.as_deref(), Some("dbo.orders"));
    }

    #[test]
    fn test_missing_fields_default() {
        let record = RawRecord {
            name: "login".into(),
            ..RawRecord::default()
        };
        let event = normalize(&record);
        assert_eq!(event.timestamp, None);
        assert_eq!(event.counters, EventCounters::default());
        assert_eq!(event.text, "");
        assert_eq!(event.duration_display, "0µs");
    }

    #[test]
    fn test_offsetless_timestamp_assumed_utc() {
        assert_eq!(
            parse_timestamp(Some("2024-03-01T10:00:00.123")),
            Some(datetime!(2024-03-01 10:00:00.123 UTC))
        );
        assert_eq!(parse_timestamp(Some("not a time")), None);
    }

    #[test]
    fn test_report_payload_parsed_or_degraded() {
        let truncated = RawRecord {
            name: "xml_deadlock_report".into(),
            timestamp: Some("2024-03-01T10:00:00Z".into()),
            data: vec![field("xml_report", "<deadlock><victim-list>")],
            actions: vec![],
        };
        let report = normalize_report(&truncated);
        assert!(report.is_degraded());

        let missing = RawRecord {
            name: "blocked_process_report".into(),
            timestamp: None,
            data: vec![],
            actions: vec![],
        };
        assert!(normalize_report(&missing).is_degraded());
    }
}
