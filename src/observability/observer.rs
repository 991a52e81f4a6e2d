use tracing::{debug, error, info, warn};

use crate::app::ports::{PipelineEvent, PipelineObserver};
use crate::observability::metrics;
use crate::pipeline::dataset::Stage;
use crate::pipeline::processing::quality_gate::Verdict;

/// Default sink: logs every event through `tracing` and records metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::RunStarted { ctx } => {
                info!("🚀 Starting pipeline run {} at {}", ctx.run_id, ctx.run_timestamp);
            }
            PipelineEvent::StageStarted { stage, dataset } => {
                info!("▶️ {} stage started for {}", stage, dataset);
            }
            PipelineEvent::StageFinished {
                stage,
                dataset,
                rows,
                elapsed,
            } => {
                info!(
                    "✅ {} stage finished for {}: {} rows in {:.2}s",
                    stage,
                    dataset,
                    rows,
                    elapsed.as_secs_f64()
                );
                metrics::stages::duration(stage.as_str(), elapsed.as_secs_f64());
                if *stage == Stage::Raw {
                    metrics::source::rows_fetched(dataset, *rows);
                }
            }
            PipelineEvent::Quality { report } => {
                match report.overall {
                    Verdict::Pass => info!("🔍 {}", report.summary()),
                    Verdict::Warn => warn!("⚠️ {}", report.summary()),
                    Verdict::Fail => error!("❌ {}", report.summary()),
                }
                for check in &report.checks {
                    if check.verdict != Verdict::Pass {
                        debug!(
                            "  {} {} on {}: {}",
                            check.verdict,
                            check.kind,
                            check.field.as_deref().unwrap_or("dataset"),
                            check.detail
                        );
                    }
                    metrics::quality::check(&report.dataset, &check.verdict.to_string());
                }
                for (field, ratio) in &report.null_ratios {
                    metrics::quality::null_ratio(&report.dataset, field, *ratio);
                }
            }
            PipelineEvent::Cleaned { stats } => {
                info!(
                    "🧹 Cleaning kept {} of {} raw rows",
                    stats.output_rows, stats.input_rows
                );
                for (reason, count) in &stats.exclusions {
                    info!("  excluded {} row(s): {}", count, reason);
                    metrics::stages::rows_excluded(&reason.to_string(), *count);
                }
                for (field, count) in &stats.coercion_failures {
                    metrics::stages::coercion_failures(field, *count);
                }
            }
            PipelineEvent::Published {
                stage,
                dataset,
                location,
            } => {
                info!(
                    "💾 {} {} published to {} (fingerprint {})",
                    stage.layer_name(),
                    dataset.name,
                    location,
                    dataset.fingerprint()
                );
                metrics::stages::rows_published(stage.layer_name(), &dataset.name, dataset.row_count());
            }
            PipelineEvent::Transition { transition } => {
                debug!("State {} -> {}", transition.from, transition.to);
                metrics::run::transition(transition.to.as_str());
            }
            PipelineEvent::ViewFailed { failure } => {
                warn!("⚠️ View {} not produced: {}", failure.view, failure.reason);
                metrics::aggregation::view_failure(failure.view.name());
            }
            PipelineEvent::RunFinished { ctx, elapsed } => {
                match ctx.failure() {
                    Some(failure) => {
                        error!("❌ Run {} failed: {}", ctx.run_id, failure);
                        match failure.kind {
                            "SourceUnavailable" => metrics::source::error(),
                            "QualityGateFailure" => metrics::quality::gate_failure(failure.stage.as_str()),
                            _ => {}
                        }
                    }
                    None => info!(
                        "🎉 Run {} finished in state {} after {:.2}s",
                        ctx.run_id,
                        ctx.state(),
                        elapsed.as_secs_f64()
                    ),
                }
                metrics::run::finished(ctx.state().as_str(), elapsed.as_secs_f64());
            }
        }
    }
}
