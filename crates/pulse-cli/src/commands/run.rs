//! The `run` subcommand: stream synthetic data and report on it.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};

use pulse_core::filter::{FilterCriteria, single_category_filter};
use pulse_engine::{DebounceCoordinator, StreamingService};

use crate::cli::RunArgs;
use crate::config::Config;

/// Streams for `--duration-secs`, printing a throughput line per second
/// and a final summary.
pub fn run<W: Write>(writer: &mut W, args: &RunArgs, config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(stream(writer, args, config))
}

async fn stream<W: Write>(writer: &mut W, args: &RunArgs, config: &Config) -> Result<()> {
    let mut streaming = config.streaming();
    if let Some(scenario) = args.scenario {
        streaming.scenario = scenario;
    }

    let service = StreamingService::new(streaming).context("invalid streaming configuration")?;
    let coordinator = DebounceCoordinator::new(config.debounce_window());

    // The buffer is the store of record; each tick re-snapshots it into the
    // coordinator so capacity trims and clears are reflected in results.
    let feed = service.clone();
    let sink = coordinator.clone();
    let _data_sub = service.on_data(move |_batch| sink.reset_data(feed.buffered_data()));

    let reporter = service.clone();
    let _results_sub = coordinator.on_results(move |outcome| {
        reporter.report_filter_time(outcome.elapsed.as_secs_f64() * 1000.0);
        tracing::debug!(
            matched = outcome.filtered_data_count,
            total = outcome.total_data_count,
            elapsed = ?outcome.elapsed,
            "filter recompute finished"
        );
    });

    if let Some(category) = &args.filter_category {
        coordinator.set_criteria(FilterCriteria {
            conditions: vec![single_category_filter("category", category.as_str(), None)],
            grouping: Vec::new(),
        });
    }

    service
        .connect()
        .await
        .context("failed to connect data stream")?;
    tracing::info!(scenario = %service.config().scenario, "streaming started");

    if args.spike {
        service.simulate_data_spike(Duration::from_secs(2), 3);
    }

    for second in 1..=args.duration_secs {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let metrics = service.metrics();
        let state = coordinator.state();
        writeln!(
            writer,
            "t+{second:>3}s  rate {:>8.1} pts/s  buffered {:>6}  matched {:>6}  filter {:>6.2} ms",
            metrics.data_points_per_second,
            state.total_data_count,
            state.filtered_data_count,
            metrics.filter_time,
        )?;
    }

    service.disconnect();
    // Let an in-flight recompute settle before reading final state.
    tokio::time::sleep(config.debounce_window() + Duration::from_millis(50)).await;

    write_summary(writer, &service, &coordinator)?;

    coordinator.shutdown();
    service.shutdown();
    Ok(())
}

fn write_summary<W: Write>(
    writer: &mut W,
    service: &StreamingService,
    coordinator: &DebounceCoordinator,
) -> Result<()> {
    let metrics = service.metrics();
    let state = coordinator.state();
    let stats = coordinator.filter_stats();

    writeln!(writer)?;
    writeln!(writer, "status           {}", service.status())?;
    writeln!(
        writer,
        "ingest rate      {:.1} pts/s",
        metrics.data_points_per_second
    )?;
    writeln!(
        writer,
        "buffer           {} points (~{:.1} KiB)",
        state.total_data_count,
        metrics.memory_usage / 1024.0
    )?;
    writeln!(
        writer,
        "matched          {} / {}",
        state.filtered_data_count, state.total_data_count
    )?;
    writeln!(writer, "filter time      {:.2} ms", metrics.filter_time)?;
    writeln!(
        writer,
        "index            {} entries over [{}]",
        stats.index_size,
        stats.indexed_fields.join(", ")
    )?;
    writeln!(writer, "cached results   {}", stats.cache_size)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pulse_core::point::DataPoint;
    use pulse_core::types::PointId;

    use super::*;

    fn point(id: &str, category: &str, value: f64) -> DataPoint {
        DataPoint {
            id: PointId::new(id).unwrap(),
            timestamp: Utc::now(),
            value,
            category: category.to_string(),
            source: "server-1".to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn summary_reports_filter_counts() {
        let service = StreamingService::new(pulse_core::StreamingConfig::default()).unwrap();
        let coordinator = DebounceCoordinator::new(Duration::from_millis(10));

        coordinator.set_criteria(FilterCriteria {
            conditions: vec![single_category_filter("category", "cpu", None)],
            grouping: Vec::new(),
        });
        coordinator.reset_data(vec![
            point("pt-1", "cpu", 42.0),
            point("pt-2", "memory", 61.0),
            point("pt-3", "cpu", 88.0),
        ]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut output = Vec::new();
        write_summary(&mut output, &service, &coordinator).unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("matched          2 / 3"), "{text}");
        assert!(text.contains("status           disconnected"), "{text}");

        coordinator.shutdown();
        service.shutdown();
    }

    #[test]
    fn run_smoke_zero_duration() {
        let config = Config {
            debounce_ms: 10,
            ..Config::default()
        };
        let args = RunArgs {
            duration_secs: 0,
            scenario: None,
            spike: false,
            filter_category: Some("cpu".to_string()),
        };

        let mut output = Vec::new();
        run(&mut output, &args, &config).unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.contains("status           disconnected"), "{text}");
        assert!(text.contains("cached results"), "{text}");
    }
}
