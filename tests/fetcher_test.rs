/*!
 * Snapshot Fetcher Tests
 * Batch reads of events and reports through the public API
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use xevent_capture::buffer::{AttributeMatch, ExclusionSet};
use xevent_capture::core::limits::MALFORMED_MARKER;
use xevent_capture::{
    BufferId, EventFilter, EventKind, MemoryBuffer, NoExclusions, ReportRecord, SnapshotFetcher,
    StreamApi, StreamConfig, StreamRegistry,
};

fn deadlock_record(ts: &str, victim: &str, other: &str) -> String {
    format!(
        r#"<event name="xml_deadlock_report" package="sqlserver" timestamp="{ts}">
  <data name="xml_report">
    <type name="xml" package="package0"/>
    <value>
      <deadlock>
        <victim-list><victimProcess id="{victim}"/></victim-list>
        <process-list>
          <process id="{victim}" spid="61" waitresource="KEY: 5:72057594043236352" waittime="4200" lockMode="U" loginname="app" hostname="web01" clientapp="api" currentdbname="sales">
            <inputbuf>
              UPDATE orders SET state = 2 WHERE id = 10
            </inputbuf>
          </process>
          <process id="{other}" spid="62" waitresource="KEY: 5:72057594043236353" waittime="3900" lockMode="X" loginname="batch" hostname="etl01" clientapp="loader" currentdbname="sales">
            <inputbuf>UPDATE invoices SET paid = 1 WHERE order_id = 10</inputbuf>
          </process>
        </process-list>
      </deadlock>
    </value>
  </data>
</event>"#
    )
}

fn truncated_deadlock_record(ts: &str) -> String {
    format!(
        r#"<event name="xml_deadlock_report" timestamp="{ts}"><data name="xml_report"><value><![CDATA[<deadlock><victim-list><victimProcess id="p9"/></victim-list><process-list><process id="p9" spid="7]]></value></data></event>"#
    )
}

/// Nested report document cut short without CDATA protection
fn unwrapped_truncated_deadlock_record(ts: &str) -> String {
    format!(
        r#"<event name="xml_deadlock_report" timestamp="{ts}"><data name="xml_report"><value><deadlock><victim-list><victimProcess id="p9"/></victim-list><process-list><process id="p9" spid="77"><inputbuf>UPDATE orders</value></data></event>"#
    )
}

const BLOCKING_RECORD: &str = r#"<event name="blocked_process_report" timestamp="2024-03-01T10:05:00Z">
  <data name="duration"><value>65000000</value></data>
  <data name="blocked_process">
    <value>
      <blocked-process-report monitorLoop="42">
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
      </blocked-process-report>
    </value>
  </data>
</event>"#;

fn fetcher(buffer: &MemoryBuffer) -> SnapshotFetcher {
    SnapshotFetcher::new(Arc::new(buffer.clone()))
}

#[tokio::test]
async fn test_truncated_deadlock_degrades_without_failing_batch() {
    let buffer = MemoryBuffer::new();
    buffer.push_raw(deadlock_record("2024-03-01T10:00:00Z", "process1", "process2"));
    buffer.push_raw(deadlock_record("2024-03-01T10:00:10Z", "process3", "process4"));
    buffer.push_raw(truncated_deadlock_record("2024-03-01T10:00:20Z"));
    buffer.push_raw(deadlock_record("2024-03-01T10:00:30Z", "process5", "process6"));
    buffer.push_raw(deadlock_record("2024-03-01T10:00:40Z", "process7", "process8"));

    let reports = fetcher(&buffer)
        .fetch_reports(&BufferId::new("system_health"), &[])
        .await
        .unwrap();

    assert_eq!(reports.len(), 5);
    let structured: Vec<_> = reports
        .iter()
        .filter_map(|r| match r {
            ReportRecord::Deadlock(report) => Some(report),
            _ => None,
        })
        .collect();
    assert_eq!(structured.len(), 4);

    let degraded: Vec<_> = reports.iter().filter(|r| r.is_degraded()).collect();
    assert_eq!(degraded.len(), 1);
    match degraded[0] {
        ReportRecord::Degraded { marker, raw, timestamp, .. } => {
            assert_eq!(marker, MALFORMED_MARKER);
            assert!(raw.contains(r#"<process id="p9""#));
            assert!(timestamp.is_some());
        }
        other => panic!("unexpected record {:?}", other),
    }

    let first = structured[0];
    assert_eq!(first.victim_id.as_deref(), Some("process1"));
    let victim = &first.processes[0];
    assert!(victim.is_victim);
    assert_eq!(victim.session_id, Some(61));
    assert_eq!(victim.lock_mode.as_deref(), Some("U"));
    assert_eq!(victim.wait_time_ms, 4200);
    assert_eq!(victim.input_buffer, "UPDATE orders SET state = 2 WHERE id = 10");
    assert!(!first.processes[1].is_victim);
}

#[tokio::test]
async fn test_unwrapped_truncated_deadlock_keeps_later_reports() {
    let buffer = MemoryBuffer::new();
    buffer.push_raw(deadlock_record("2024-03-01T10:00:00Z", "process1", "process2"));
    buffer.push_raw(deadlock_record("2024-03-01T10:00:10Z", "process3", "process4"));
    buffer.push_raw(unwrapped_truncated_deadlock_record("2024-03-01T10:00:20Z"));
    buffer.push_raw(deadlock_record("2024-03-01T10:00:30Z", "process5", "process6"));
    buffer.push_raw(deadlock_record("2024-03-01T10:00:40Z", "process7", "process8"));

    let reports = fetcher(&buffer)
        .fetch_reports(&BufferId::new("system_health"), &[EventKind::XmlDeadlockReport])
        .await
        .unwrap();

    assert_eq!(reports.len(), 5);
    let victims: Vec<_> = reports
        .iter()
        .filter_map(|r| match r {
            ReportRecord::Deadlock(report) => report.victim_id.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(victims, vec!["process1", "process3", "process5", "process7"]);

    match &reports[2] {
        ReportRecord::Degraded { marker, raw, kind, .. } => {
            assert_eq!(marker, MALFORMED_MARKER);
            assert_eq!(kind, &EventKind::XmlDeadlockReport);
            assert!(raw.contains(r#"spid="77""#));
            assert!(!raw.contains("process5"));
        }
        other => panic!("unexpected record {:?}", other),
    }
}

#[tokio::test]
async fn test_blocking_report_sides_parsed_independently() {
    let buffer = MemoryBuffer::new();
    buffer.push_raw(BLOCKING_RECORD);
    buffer.push_raw(deadlock_record("2024-03-01T10:06:00Z", "a", "b"));

    let reports = fetcher(&buffer)
        .fetch_reports(&BufferId::new("system_health"), &[EventKind::BlockedProcessReport])
        .await
        .unwrap();

    assert_eq!(reports.len(), 1);
    let ReportRecord::Blocking(report) = &reports[0] else {
        panic!("expected blocking report, got {:?}", reports[0]);
    };
    assert_eq!(report.blocked.session_id, Some(70));
    assert_eq!(report.blocked.wait_resource.as_deref(), Some("OBJECT: 5:123:0"));
    assert_eq!(report.blocked.wait_time_ms, 65_000);
    assert!(!report.blocked.wait_display.is_empty());
    assert_eq!(report.blocking.session_id, Some(55));
    assert_eq!(report.blocking.status.as_deref(), Some("sleeping"));
    assert_eq!(report.blocking.input_buffer, "BEGIN TRAN; UPDATE orders SET state = 3");
}

#[tokio::test]
async fn test_standard_fetch_excludes_report_records() {
    let buffer = MemoryBuffer::new();
    buffer.push_raw(BLOCKING_RECORD);
    buffer.push_raw(
        r#"<event name="object_altered" timestamp="2024-03-01T10:07:00Z"><data name="object_name"><value>orders</value></data><action name="database_name"><value>sales</value></action></event>"#,
    );
    buffer.push_raw(
        r#"<event name="login" timestamp="2024-03-01T10:07:01Z"><action name="username"><value>report</value></action><action name="client_app_name"><value>Power BI</value></action></event>"#,
    );

    let snapshot = fetcher(&buffer)
        .fetch(
            &BufferId::new("audit"),
            None,
            &EventFilter::new(),
            &ExclusionSet::empty(),
        )
        .await
        .unwrap();

    assert_eq!(snapshot.events.len(), 2);
    assert_eq!(snapshot.events[0].kind, EventKind::ObjectAltered);
    assert_eq!(snapshot.events[0].text, "object_altered: orders");
    assert_eq!(snapshot.events[1].origin.application.as_deref(), Some("Power BI"));
    assert_eq!(snapshot.header.event_count, Some(3));

    let logins = fetcher(&buffer)
        .fetch(
            &BufferId::new("audit"),
            None,
            &EventFilter::new().application(AttributeMatch::contains("power")),
            &ExclusionSet::empty(),
        )
        .await
        .unwrap();
    assert_eq!(logins.events.len(), 1);
    assert_eq!(logins.events[0].kind, EventKind::Login);
}

#[tokio::test]
async fn test_api_reports_summary() {
    let buffer = MemoryBuffer::new();
    buffer.push_raw(deadlock_record("2024-03-01T10:00:00Z", "p1", "p2"));
    buffer.push_raw(truncated_deadlock_record("2024-03-01T10:00:20Z"));

    let api = StreamApi::new(Arc::new(StreamRegistry::new(
        Arc::new(buffer.clone()),
        Arc::new(NoExclusions),
        StreamConfig::default().with_regex_budget(Duration::from_millis(500)),
    )));

    let response = api.fetch_reports("system_health", &[]).await;
    assert!(response.success);
    assert_eq!(response.message, "2 reports (1 degraded)");
}
