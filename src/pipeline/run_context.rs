use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::dataset::Stage;
use crate::pipeline::processing::quality_gate::{CheckKind, Verdict};

/// Orchestrator state machine. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Init,
    Extracting,
    RawPublished,
    Cleaning,
    SilverPublished,
    Aggregating,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Init => "INIT",
            PipelineState::Extracting => "EXTRACTING",
            PipelineState::RawPublished => "RAW_PUBLISHED",
            PipelineState::Cleaning => "CLEANING",
            PipelineState::SilverPublished => "SILVER_PUBLISHED",
            PipelineState::Aggregating => "AGGREGATING",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// The successor on the happy path
    pub fn next(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Init => Some(PipelineState::Extracting),
            PipelineState::Extracting => Some(PipelineState::RawPublished),
            PipelineState::RawPublished => Some(PipelineState::Cleaning),
            PipelineState::Cleaning => Some(PipelineState::SilverPublished),
            PipelineState::SilverPublished => Some(PipelineState::Aggregating),
            PipelineState::Aggregating => Some(PipelineState::Done),
            PipelineState::Done | PipelineState::Failed => None,
        }
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == PipelineState::Failed || self.next() == Some(next)
    }

    /// Stage whose work is in flight while in this state
    pub fn active_stage(&self) -> Stage {
        match self {
            PipelineState::Init | PipelineState::Extracting => Stage::Raw,
            PipelineState::RawPublished | PipelineState::Cleaning => Stage::Silver,
            _ => Stage::Gold,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: NaiveDateTime,
}

/// Why cleaning dropped a raw record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingIdentityKey,
    DuplicateSuperseded,
    HireDateAfterRun,
    Inactive,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExclusionReason::MissingIdentityKey => "missing_identity_key",
            ExclusionReason::DuplicateSuperseded => "duplicate_superseded",
            ExclusionReason::HireDateAfterRun => "hire_date_after_run",
            ExclusionReason::Inactive => "inactive",
        };
        write!(f, "{}", s)
    }
}

/// First irrecoverable error of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReason {
    /// State the run was in when it failed
    pub state: PipelineState,
    pub stage: Stage,
    pub kind: &'static str,
    pub check: Option<CheckKind>,
    pub field: Option<String>,
    pub verdict: Option<Verdict>,
    pub message: String,
}

impl FailureReason {
    pub fn from_error(state: PipelineState, error: &PipelineError) -> Self {
        let mut reason = Self {
            state,
            stage: state.active_stage(),
            kind: "Io",
            check: None,
            field: None,
            verdict: None,
            message: error.to_string(),
        };
        match error {
            PipelineError::SourceUnavailable(_) => {
                reason.kind = "SourceUnavailable";
                reason.stage = Stage::Raw;
            }
            PipelineError::SchemaViolation { field, .. } => {
                reason.kind = "SchemaViolation";
                reason.field = Some(field.clone());
            }
            PipelineError::QualityGateFailure { check, field, verdict, .. } => {
                reason.kind = "QualityGateFailure";
                reason.check = Some(*check);
                reason.field = field.clone();
                reason.verdict = Some(*verdict);
            }
            PipelineError::NotPublished { .. } => reason.kind = "NotPublished",
            PipelineError::Config(_) => reason.kind = "Config",
            PipelineError::PartialAggregateFailure { .. } => reason.kind = "PartialAggregateFailure",
            PipelineError::EmptyInput(_) => reason.kind = "EmptyInput",
            PipelineError::CorruptArtifact { .. } => reason.kind = "CorruptArtifact",
            PipelineError::Io(_)
            | PipelineError::Json(_)
            | PipelineError::Toml(_)
            | PipelineError::Sqlite(_) => {}
        }
        reason
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {} stage", self.kind, self.stage)?;
        if let Some(check) = self.check {
            write!(f, ", check '{}'", check)?;
        }
        if let Some(field) = &self.field {
            write!(f, ", field '{}'", field)?;
        }
        if let Some(verdict) = self.verdict {
            write!(f, " ({})", verdict)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewFailureRecord {
    pub view: String,
    pub reason: String,
}

/// Per-invocation state. Created at pipeline start, mutated only by the
/// orchestrator, handed to stages by shared reference.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub run_timestamp: NaiveDateTime,
    state: PipelineState,
    transitions: Vec<StateTransition>,
    /// Keyed by `{layer}/{dataset}`, in publication order
    row_counts: IndexMap<String, usize>,
    exclusions: BTreeMap<ExclusionReason, usize>,
    empty_inputs: Vec<String>,
    view_failures: Vec<ViewFailureRecord>,
    failure: Option<FailureReason>,
}

impl RunContext {
    pub fn new(run_timestamp: NaiveDateTime) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_timestamp,
            state: PipelineState::Init,
            transitions: Vec::new(),
            row_counts: IndexMap::new(),
            exclusions: BTreeMap::new(),
            empty_inputs: Vec::new(),
            view_failures: Vec::new(),
            failure: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.state == PipelineState::Failed
    }

    pub fn is_done(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn row_counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.row_counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn row_count(&self, stage: Stage, dataset: &str) -> Option<usize> {
        self.row_counts.get(&row_key(stage, dataset)).copied()
    }

    pub fn exclusions(&self) -> &BTreeMap<ExclusionReason, usize> {
        &self.exclusions
    }

    pub fn exclusion_count(&self) -> usize {
        self.exclusions.values().sum()
    }

    pub fn empty_inputs(&self) -> &[String] {
        &self.empty_inputs
    }

    pub fn has_empty_input(&self) -> bool {
        !self.empty_inputs.is_empty()
    }

    pub fn view_failures(&self) -> &[ViewFailureRecord] {
        &self.view_failures
    }

    /// Moves along the state machine. Returns false (and leaves the state
    /// untouched) for a move the machine does not allow.
    pub(crate) fn transition(&mut self, next: PipelineState, at: NaiveDateTime) -> bool {
        if !self.state.can_transition_to(next) {
            warn!("Ignoring invalid transition {} -> {}", self.state, next);
            return false;
        }
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            at,
        });
        self.state = next;
        true
    }

    /// Single-stage entry points start part way along the machine
    pub(crate) fn resume_at(&mut self, state: PipelineState, at: NaiveDateTime) {
        if self.state != PipelineState::Init || state.is_terminal() {
            return;
        }
        self.transitions.push(StateTransition {
            from: self.state,
            to: state,
            at,
        });
        self.state = state;
    }

    /// Records the first failure and moves to `Failed`. Later failures are ignored.
    pub(crate) fn fail(&mut self, error: &PipelineError, at: NaiveDateTime) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if self.failure.is_none() {
            self.failure = Some(FailureReason::from_error(self.state, error));
        }
        self.transition(PipelineState::Failed, at)
    }

    pub(crate) fn record_rows(&mut self, stage: Stage, dataset: &str, rows: usize) {
        self.row_counts.insert(row_key(stage, dataset), rows);
    }

    pub(crate) fn record_exclusions(&mut self, exclusions: &BTreeMap<ExclusionReason, usize>) {
        for (reason, count) in exclusions {
            *self.exclusions.entry(*reason).or_insert(0) += count;
        }
    }

    pub(crate) fn flag_empty_input(&mut self, dataset: &str) {
        if !self.empty_inputs.iter().any(|d| d == dataset) {
            self.empty_inputs.push(dataset.to_string());
        }
    }

    pub(crate) fn record_view_failure(&mut self, view: &str, reason: &str) {
        self.view_failures.push(ViewFailureRecord {
            view: view.to_string(),
            reason: reason.to_string(),
        });
    }
}

fn row_key(stage: Stage, dataset: &str) -> String {
    format!("{}/{}", stage.layer_name(), dataset)
}

/// Final run summary: terminal state, rows per completed stage and, on
/// failure, the check and field responsible
impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} finished in state {}", self.run_id, self.state)?;
        for (dataset, rows) in &self.row_counts {
            writeln!(f, "  {}: {} rows", dataset, rows)?;
        }
        if !self.exclusions.is_empty() {
            writeln!(f, "  excluded during cleaning: {}", self.exclusion_count())?;
            for (reason, count) in &self.exclusions {
                writeln!(f, "    {}: {}", reason, count)?;
            }
        }
        for dataset in &self.empty_inputs {
            writeln!(f, "  empty input: {}", dataset)?;
        }
        for failure in &self.view_failures {
            writeln!(f, "  view not produced: {} ({})", failure.view, failure.reason)?;
        }
        if let Some(failure) = &self.failure {
            writeln!(f, "  failure: {}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_happy_path_walks_every_state() {
        let mut ctx = RunContext::new(ts());
        let mut state = ctx.state();
        while let Some(next) = state.next() {
            assert!(ctx.transition(next, ts()));
            state = next;
        }
        assert!(ctx.is_done());
        assert_eq!(ctx.transitions().len(), 6);
    }

    #[test]
    fn test_failed_is_absorbing() {
        let mut ctx = RunContext::new(ts());
        ctx.transition(PipelineState::Extracting, ts());
        assert!(ctx.fail(&PipelineError::SourceUnavailable("down".into()), ts()));

        assert!(!ctx.transition(PipelineState::RawPublished, ts()));
        assert!(!ctx.fail(&PipelineError::Config("later".into()), ts()));
        assert_eq!(ctx.state(), PipelineState::Failed);
        assert_eq!(ctx.failure().unwrap().kind, "SourceUnavailable");
    }

    #[test]
    fn test_cannot_skip_states() {
        let mut ctx = RunContext::new(ts());
        assert!(!ctx.transition(PipelineState::Cleaning, ts()));
        assert_eq!(ctx.state(), PipelineState::Init);
    }

    #[test]
    fn test_exclusions_accumulate() {
        let mut ctx = RunContext::new(ts());
        let mut batch = BTreeMap::new();
        batch.insert(ExclusionReason::MissingIdentityKey, 2);
        ctx.record_exclusions(&batch);
        ctx.record_exclusions(&batch);
        assert_eq!(ctx.exclusion_count(), 4);
    }
}
