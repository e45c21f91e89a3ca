//! Freshet aggregation engine service (NDJSON transport).
//!
//! Reads one CDC change record per line on stdin and writes one change-row
//! per line on stdout. The production bus and store transports plug in
//! through the [`freshet_flow::source::EventSource`] and
//! [`freshet_flow::sink::SinkUpserter`] seams; this binary is the local and
//! replay runner.

use tokio::io::BufReader;
use tokio::sync::watch;

use freshet_core::observability::{init_logging, log_format_from_env};
use freshet_core::EngineConfig;
use freshet_flow::engine::Engine;
use freshet_flow::error::Result;
use freshet_flow::sink::JsonLinesSink;
use freshet_flow::source::JsonLinesSource;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(log_format_from_env());

    let config = EngineConfig::from_env()?;
    tracing::info!(
        topic = %config.bus.topic,
        allowed_lateness_secs = config.allowed_lateness.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        state_ttl_secs = config.state_ttl.as_secs(),
        "starting freshet engine (ndjson stdin -> ndjson stdout)"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    let source = JsonLinesSource::new(BufReader::new(tokio::io::stdin()));
    let sink = JsonLinesSink::stdout();
    let report = Engine::new(config, source, sink)
        .with_shutdown(stop_rx)
        .run()
        .await?;

    tracing::info!(
        events_admitted = report.events_admitted,
        malformed = report.malformed_events,
        late_dropped = report.late_events_dropped,
        rows_emitted = report.rows_emitted,
        sink_applied = report.sink_writes_applied,
        sink_dropped = report.sink_writes_dropped,
        "engine stopped"
    );
    Ok(())
}
