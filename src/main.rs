/*!
 * xevent-tail - Main Entry Point
 *
 * Tails a ring buffer XML dump on disk and prints each new event as one JSON
 * line on stdout. Poll settings come from the XEVENT_* environment variables.
 *
 * Usage: xevent-tail <dump.xml | dump-directory> [buffer-name]
 */

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use xevent_capture::{
    init_tracing, BufferId, EventFilter, FileBuffer, NoExclusions, StreamConfig, StreamRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: xevent-tail <dump.xml | dump-directory> [buffer-name]");
    };
    let buffer = BufferId::new(args.next().unwrap_or_else(|| "ring_buffer".to_string()));

    let config = StreamConfig::from_env().context("invalid XEVENT_* configuration")?;
    info!(
        path = %path,
        buffer = %buffer,
        min_interval_ms = config.min_interval.as_millis() as u64,
        max_interval_ms = config.max_interval.as_millis() as u64,
        "xevent-tail starting"
    );

    let registry = StreamRegistry::new(
        Arc::new(FileBuffer::new(&path)),
        Arc::new(NoExclusions),
        config,
    );
    let stream_id = registry
        .start(buffer, EventFilter::new())
        .context("failed to start stream")?;
    let reader = registry
        .read(&stream_id)
        .context("stream disappeared right after start")?;

    loop {
        tokio::select! {
            received = reader.recv_async() => match received {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                },
                Err(_) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Shutdown requested");
                break;
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}
