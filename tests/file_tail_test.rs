/*!
 * File Tail Tests
 * Streams over ring buffer dumps rewritten on disk
 */

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use xevent_capture::{EventFilter, FileBuffer, NoExclusions, StreamConfig, StreamRegistry};

fn dump(events: &[(&str, u32, &str)]) -> String {
    let mut xml = format!(
        r#"<RingBufferTarget truncated="0" eventCount="{}" droppedCount="0">"#,
        events.len()
    );
    for (ts, session, text) in events {
        xml.push_str(&format!(
            r#"<event name="sql_statement_completed" timestamp="{ts}"><data name="duration"><value>250</value></data><data name="statement"><value>{text}</value></data><action name="session_id"><value>{session}</value></action></event>"#
        ));
    }
    xml.push_str("</RingBufferTarget>");
    xml
}

/// Readers must never observe a half-written dump
fn write_dump(path: &Path, content: String) {
    let staging = path.with_extension("tmp");
    std::fs::write(&staging, content).unwrap();
    std::fs::rename(&staging, path).unwrap();
}

#[tokio::test]
async fn test_tail_picks_up_rewritten_dump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ring.xml");
    write_dump(
        &path,
        dump(&[
            ("2024-03-01T10:00:00Z", 51, "SELECT 1"),
            ("2024-03-01T10:00:01Z", 52, "SELECT 2"),
        ]),
    );

    let config = StreamConfig::responsive()
        .with_intervals(Duration::from_millis(20), Duration::from_millis(100));
    let registry = StreamRegistry::new(
        Arc::new(FileBuffer::new(&path)),
        Arc::new(NoExclusions),
        config,
    );
    let id = registry.start("ring", EventFilter::new()).unwrap();
    let rx = registry.read(&id).unwrap();

    let mut texts = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
            .await
            .unwrap()
            .unwrap();
        texts.push(event.text);
    }
    assert_eq!(texts, vec!["SELECT 1", "SELECT 2"]);

    // Server-side ring wrapped: oldest record gone, one new record appended
    write_dump(
        &path,
        dump(&[
            ("2024-03-01T10:00:01Z", 52, "SELECT 2"),
            ("2024-03-01T10:00:02Z", 53, "SELECT 3 -- newest"),
        ]),
    );

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.text, "SELECT 3 -- newest");
    assert_eq!(event.origin.session_id, Some(53));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_missing_dump_keeps_stream_alive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("later.xml");

    let config = StreamConfig::responsive()
        .with_intervals(Duration::from_millis(20), Duration::from_millis(50));
    let registry = StreamRegistry::new(
        Arc::new(FileBuffer::new(&path)),
        Arc::new(NoExclusions),
        config,
    );
    let id = registry.start("later", EventFilter::new()).unwrap();
    let rx = registry.read(&id).unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(registry.status(&id).unwrap().errors >= 1);

    write_dump(&path, dump(&[("2024-03-01T10:00:00Z", 9, "SELECT 9")]));
    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.text, "SELECT 9");

    registry.shutdown().await;
}
