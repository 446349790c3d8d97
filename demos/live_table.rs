use std::{env, fs, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures::{FutureExt, future::BoxFuture};
use serde_json::{Value, json};
use telemetry_table::prelude::*;
use time::macros::format_description;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const CONDUCTOR: &str = r#"{
    "time_system": { "key": "utc", "name": "UTC", "time_format": "utc", "is_utc_based": true },
    "bounds": { "start": 0.0, "end": 1.0 },
    "clock": { "key": "local", "offsets": { "start": -10000, "end": 2000 } }
}"#;

const SAMPLE_PERIOD_MS: i64 = 500;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing()?;

    let cfg = TimeConductorConfig::from_json(CONDUCTOR)?;
    let ctx = TimeContext::from_config(&cfg)?;
    ctx.tick(now_ms())?;

    let provider: Arc<dyn TelemetryProvider<Value>> = Arc::new(SimulatedSpacecraft);
    let entities = vec![EntityKey::from("sat.battery"), EntityKey::from("sat.thermal")];

    let (feed, events) = TelemetryTableFeed::spawn(
        entities.clone(),
        Arc::clone(&provider),
        ctx.clone(),
        TableConfig::default(),
    )?;

    let latest = LatestValueSubscription::spawn(
        entities[0].clone(),
        Arc::clone(&provider),
        ctx.clone(),
        |d: Value| println!("latest {}: {}", d["utc"], d["value"]),
    )?;

    let renderer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RowEvent::Added { rows, index } => {
                    println!("+{} row(s) at {index:?}", rows.len())
                }
                RowEvent::Removed { rows } => println!("-{} row(s)", rows.len()),
                RowEvent::Sorted => println!("re-sorted"),
            }
        }
    });

    let mut clock = tokio::time::interval(Duration::from_millis(250));
    for _ in 0..20 {
        clock.tick().await;
        ctx.tick(now_ms())?;
    }

    latest.join().await?;
    let table = feed.stop().await?;
    renderer.abort();

    println!("\n--- Table at shutdown ---");
    println!("window:  {}", table.last_bounds());
    println!("visible: {}", table.len());
    println!("future:  {}", table.future_len());

    drop(_guard);
    Ok(())
}

fn now_ms() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

// ================================================================================================
// Simulated Provider
// ================================================================================================

/// Produces one sample every [`SAMPLE_PERIOD_MS`] per entity, with a value
/// derived from the timestamp.
struct SimulatedSpacecraft;

fn sample(entity: &EntityKey, t: i64) -> Value {
    let phase = (t as f64 / 5_000.0) + entity.as_str().len() as f64;
    json!({ "utc": t, "value": (phase.sin() * 100.0).round() / 10.0 })
}

impl TelemetryProvider<Value> for SimulatedSpacecraft {
    fn metadata(&self, _entity: &EntityKey) -> TelemetryResult<TelemetryMetadata> {
        Ok(TelemetryMetadata::new(vec![
            ValueMetadata::domain("utc", "utc", 1),
            ValueMetadata::range("value", 1),
        ]))
    }

    fn format_map(&self, metadata: &TelemetryMetadata) -> FormatMap<Value> {
        JsonFormatter::format_map(metadata)
    }

    fn request(
        &self,
        entity: &EntityKey,
        options: RequestOptions,
    ) -> BoxFuture<'static, TelemetryResult<Vec<Value>>> {
        let entity = entity.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let end = options.end.unwrap_or_else(now_ms).min(now_ms()) as i64;
            let start = options.start.map_or(end, |s| s as i64);
            let last = end - end.rem_euclid(SAMPLE_PERIOD_MS);
            let data = if options.is_latest() {
                vec![sample(&entity, last)]
            } else {
                let first = start + (SAMPLE_PERIOD_MS - start.rem_euclid(SAMPLE_PERIOD_MS)) % SAMPLE_PERIOD_MS;
                (first..=last)
                    .step_by(SAMPLE_PERIOD_MS as usize)
                    .map(|t| sample(&entity, t))
                    .collect()
            };
            Ok(data)
        }
        .boxed()
    }

    fn subscribe(&self, entity: &EntityKey) -> TelemetryResult<Subscription<Value>> {
        let (tx, rx) = async_channel::unbounded();
        let feed_entity = entity.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(SAMPLE_PERIOD_MS as u64));
            loop {
                ticker.tick().await;
                let t = now_ms() as i64;
                if tx.send(sample(&feed_entity, t - t.rem_euclid(SAMPLE_PERIOD_MS))).await.is_err() {
                    break;
                }
            }
        });
        Ok(Subscription::new(entity.clone(), rx))
    }
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing() -> Result<Option<WorkerGuard>> {
    let app_name = "telemetry-table";

    let in_container =
        env::var("CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if in_container {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init();

        info!("Logging to stdout (container mode)");
        return Ok(None);
    }

    let log_dir = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/state")))
        .context("Failed to find a state or home directory")?
        .join(app_name)
        .join("logs");
    fs::create_dir_all(&log_dir)?;

    let timestamp = time::OffsetDateTime::now_utc()
        .format(&format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .context("Failed to format timestamp")?;
    let file_name = format!("{app_name}-{timestamp}.log");

    let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
        .with_current_span(true)
        .with_thread_ids(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(log_file = %log_dir.join(file_name).display(), "Logging to file (local mode)");
    Ok(Some(guard))
}
