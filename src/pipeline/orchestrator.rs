use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDateTime};
use tracing::{error, info, warn};

use crate::app::ports::{PipelineEvent, PipelineObserver, PublishPort, SourcePort, SourceQuery};
use crate::constants::{EMPLOYEE_DATASET, SILVER_EMPLOYEE_DATASET};
use crate::error::{PipelineError, Result};
use crate::observability::TracingObserver;
use crate::pipeline::dataset::{Dataset, Stage};
use crate::pipeline::processing::{aggregate, clean, raw, CleaningRules};
use crate::pipeline::run_context::{PipelineState, RunContext};

/// Which part of the pipeline an invocation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelector {
    /// Extract, clean and aggregate
    All,
    /// Source → raw layer
    Extract,
    /// Raw layer → silver layer
    Transform,
    /// Silver layer → gold views
    Load,
}

impl StageSelector {
    /// State a run starts from; single-stage runs pick up from a published layer
    fn entry_state(&self) -> PipelineState {
        match self {
            StageSelector::All | StageSelector::Extract => PipelineState::Init,
            StageSelector::Transform => PipelineState::RawPublished,
            StageSelector::Load => PipelineState::SilverPublished,
        }
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Drives Raw → Cleaning → Aggregation, owning the run context and deciding
/// whether to proceed or abort after each stage
pub struct PipelineOrchestrator {
    source: Arc<dyn SourcePort>,
    publisher: Arc<dyn PublishPort>,
    observer: Arc<dyn PipelineObserver>,
    rules: CleaningRules,
}

impl PipelineOrchestrator {
    pub fn new(source: Arc<dyn SourcePort>, publisher: Arc<dyn PublishPort>) -> Self {
        Self {
            source,
            publisher,
            observer: Arc::new(TracingObserver),
            rules: CleaningRules::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_rules(mut self, rules: CleaningRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &CleaningRules {
        &self.rules
    }

    /// Full run stamped with the current local time
    pub async fn run(&self) -> RunContext {
        self.run_stage_at(StageSelector::All, now()).await
    }

    pub async fn run_at(&self, run_timestamp: NaiveDateTime) -> RunContext {
        self.run_stage_at(StageSelector::All, run_timestamp).await
    }

    pub async fn run_stage(&self, selector: StageSelector) -> RunContext {
        self.run_stage_at(selector, now()).await
    }

    /// Run the selected stages. Never returns an error: failures are recorded
    /// in the returned context, which ends in `Failed` or at the last state reached.
    pub async fn run_stage_at(&self, selector: StageSelector, run_timestamp: NaiveDateTime) -> RunContext {
        let started = Instant::now();
        let mut ctx = RunContext::new(run_timestamp);
        self.observer.on_event(&PipelineEvent::RunStarted { ctx: &ctx });

        let entry = selector.entry_state();
        if entry != PipelineState::Init {
            ctx.resume_at(entry, now());
            self.emit_last_transition(&ctx);
        }

        if let Err(err) = self.drive(selector, &mut ctx).await {
            error!("❌ Pipeline aborted in state {}: {}", ctx.state(), err);
            if ctx.fail(&err, now()) {
                self.emit_last_transition(&ctx);
            }
        }

        self.observer.on_event(&PipelineEvent::RunFinished {
            ctx: &ctx,
            elapsed: started.elapsed(),
        });
        ctx
    }

    async fn drive(&self, selector: StageSelector, ctx: &mut RunContext) -> Result<()> {
        match selector {
            StageSelector::All => {
                let raw = self.extract(ctx).await?;
                let silver = self.clean(&raw, ctx).await?;
                self.aggregate(&silver, ctx).await
            }
            StageSelector::Extract => self.extract(ctx).await.map(|_| ()),
            StageSelector::Transform => {
                let raw = self.publisher.load(Stage::Raw, EMPLOYEE_DATASET).await?;
                info!("📂 Loaded {} raw rows from the bronze layer", raw.row_count());
                self.clean(&raw, ctx).await.map(|_| ())
            }
            StageSelector::Load => {
                let silver = self.publisher.load(Stage::Silver, SILVER_EMPLOYEE_DATASET).await?;
                info!("📂 Loaded {} silver rows from the silver layer", silver.row_count());
                self.aggregate(&silver, ctx).await
            }
        }
    }

    fn advance(&self, ctx: &mut RunContext, next: PipelineState) {
        if ctx.transition(next, now()) {
            self.emit_last_transition(ctx);
        }
    }

    fn emit_last_transition(&self, ctx: &RunContext) {
        if let Some(transition) = ctx.transitions().last() {
            self.observer.on_event(&PipelineEvent::Transition { transition });
        }
    }

    async fn publish(&self, dataset: &Dataset, layer: Stage, ctx: &mut RunContext) -> Result<()> {
        let location = self.publisher.publish(dataset, layer, &dataset.name).await?;
        ctx.record_rows(layer, &dataset.name, dataset.row_count());
        self.observer.on_event(&PipelineEvent::Published {
            stage: layer,
            dataset,
            location: &location,
        });
        Ok(())
    }

    /// Pull every source dataset into the raw layer; returns the employee dataset
    async fn extract(&self, ctx: &mut RunContext) -> Result<Dataset> {
        self.advance(ctx, PipelineState::Extracting);

        let mut employees = None;
        for query in SourceQuery::ALL {
            let name = query.dataset_name();
            let started = Instant::now();
            self.observer.on_event(&PipelineEvent::StageStarted {
                stage: Stage::Raw,
                dataset: name,
            });

            let rows = self.source.fetch(query).await?;
            let output = raw::ingest(name, rows, ctx);
            if output.dataset.is_empty() {
                warn!("⚠️ {}", PipelineError::EmptyInput(name.to_string()));
                ctx.flag_empty_input(name);
            }
            self.observer.on_event(&PipelineEvent::Quality {
                report: &output.report,
            });
            self.publish(&output.dataset, Stage::Raw, ctx).await?;

            self.observer.on_event(&PipelineEvent::StageFinished {
                stage: Stage::Raw,
                dataset: name,
                rows: output.dataset.row_count(),
                elapsed: started.elapsed(),
            });
            if query == SourceQuery::Employees {
                employees = Some(output.dataset);
            }
        }

        self.advance(ctx, PipelineState::RawPublished);
        Ok(employees.unwrap_or_else(|| {
            Dataset::new(EMPLOYEE_DATASET, Stage::Raw, ctx.run_timestamp, Vec::new())
        }))
    }

    /// Clean the raw employee dataset and publish it only if the gate passes
    async fn clean(&self, raw: &Dataset, ctx: &mut RunContext) -> Result<Dataset> {
        self.advance(ctx, PipelineState::Cleaning);
        let started = Instant::now();
        self.observer.on_event(&PipelineEvent::StageStarted {
            stage: Stage::Silver,
            dataset: SILVER_EMPLOYEE_DATASET,
        });

        if raw.is_empty() {
            warn!("⚠️ {}", PipelineError::EmptyInput(raw.name.clone()));
            ctx.flag_empty_input(&raw.name);
        }
        let output = clean::transform(raw, ctx, &self.rules)?;
        ctx.record_exclusions(&output.stats.exclusions);
        self.observer.on_event(&PipelineEvent::Quality {
            report: &output.report,
        });
        self.observer.on_event(&PipelineEvent::Cleaned {
            stats: &output.stats,
        });

        clean::enforce_gate(&output.report)?;
        self.publish(&output.dataset, Stage::Silver, ctx).await?;

        self.observer.on_event(&PipelineEvent::StageFinished {
            stage: Stage::Silver,
            dataset: SILVER_EMPLOYEE_DATASET,
            rows: output.dataset.row_count(),
            elapsed: started.elapsed(),
        });
        self.advance(ctx, PipelineState::SilverPublished);
        Ok(output.dataset)
    }

    /// Compute and publish the gold views. A view that cannot be computed is
    /// recorded and skipped; the run still completes.
    async fn aggregate(&self, silver: &Dataset, ctx: &mut RunContext) -> Result<()> {
        self.advance(ctx, PipelineState::Aggregating);
        let started = Instant::now();
        self.observer.on_event(&PipelineEvent::StageStarted {
            stage: Stage::Gold,
            dataset: &silver.name,
        });

        let output = aggregate::aggregate(silver);
        for failure in &output.failures {
            ctx.record_view_failure(failure.view.name(), &failure.reason);
            warn!("{}", failure.to_error());
            self.observer.on_event(&PipelineEvent::ViewFailed { failure });
        }

        let mut rows = 0;
        for view in &output.views {
            self.publish(&view.dataset, Stage::Gold, ctx).await?;
            rows += view.dataset.row_count();
        }

        self.observer.on_event(&PipelineEvent::StageFinished {
            stage: Stage::Gold,
            dataset: &silver.name,
            rows,
            elapsed: started.elapsed(),
        });
        self.advance(ctx, PipelineState::Done);
        Ok(())
    }
}
