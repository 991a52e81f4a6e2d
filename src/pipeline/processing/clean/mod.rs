pub mod coercion;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::constants::{
    fields, CRITICAL_CONTACT_FIELDS, DERIVED_COLUMNS, EXTRACTION_TIMESTAMP,
    SILVER_EMPLOYEE_DATASET, TRANSFORMATION_TIMESTAMP,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::dataset::{Dataset, Record, Stage, Value};
use crate::pipeline::processing::quality_gate::{
    validate, CheckKind, QualityReport, Ruleset, Verdict,
};
use crate::pipeline::run_context::{ExclusionReason, RunContext};

pub use coercion::{Coercion, CoercionError, CoercionTable};

const TITLE_PLACEHOLDER: &str = "Not Specified";
const FULL_SCORE: i64 = 100;
const SCORE_PENALTY: i64 = 10;

/// Parameters of the cleaning stage
#[derive(Debug, Clone)]
pub struct CleaningRules {
    pub identity_key: String,
    /// Field deciding which version of a duplicated record wins
    pub last_modified_field: String,
    pub active_only: bool,
    pub coercions: CoercionTable,
    pub ruleset: Ruleset,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            identity_key: fields::EMPLOYEE_KEY.to_string(),
            last_modified_field: fields::START_DATE.to_string(),
            active_only: false,
            coercions: CoercionTable::employee(),
            ruleset: Ruleset::strict_silver(),
        }
    }
}

/// What cleaning did to the raw rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningStats {
    pub input_rows: usize,
    pub output_rows: usize,
    pub exclusions: BTreeMap<ExclusionReason, usize>,
    /// Values set to missing because they failed coercion, per field
    pub coercion_failures: BTreeMap<String, usize>,
}

impl CleaningStats {
    pub fn excluded(&self) -> usize {
        self.exclusions.values().sum()
    }

    fn exclude(&mut self, reason: ExclusionReason) {
        *self.exclusions.entry(reason).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub dataset: Dataset,
    pub report: QualityReport,
    pub stats: CleaningStats,
}

/// Clean `raw` and gate the result. A failing report is returned as
/// `QualityGateFailure`; the caller must not publish in that case.
pub fn clean(raw: &Dataset, ctx: &RunContext, rules: &CleaningRules) -> Result<CleanOutput> {
    let output = transform(raw, ctx, rules)?;
    enforce_gate(&output.report)?;
    Ok(output)
}

/// Apply the cleaning rules and validate, without deciding on publication.
///
/// Deterministic: the same raw dataset and run timestamp always produce the
/// same records in the same order.
pub fn transform(raw: &Dataset, ctx: &RunContext, rules: &CleaningRules) -> Result<CleanOutput> {
    if !raw.is_empty() && !raw.has_column(&rules.identity_key) {
        return Err(PipelineError::SchemaViolation {
            stage: Stage::Silver.to_string(),
            field: rules.identity_key.clone(),
        });
    }

    let mut stats = CleaningStats {
        input_rows: raw.row_count(),
        ..Default::default()
    };

    let run_date = ctx.run_timestamp.date();

    // Keyed by the normalized identity value; insertion order is first appearance.
    // Versions failing an integrity rule never compete for survival.
    let mut survivors: IndexMap<String, Record> = IndexMap::new();
    for record in raw.records() {
        let record = coerce_record(record, &rules.coercions, &mut stats);
        let key = record.get(&rules.identity_key);
        if key.is_missing() {
            stats.exclude(ExclusionReason::MissingIdentityKey);
            continue;
        }
        if record
            .get(fields::HIRE_DATE)
            .as_date()
            .is_some_and(|hired| hired > run_date)
        {
            stats.exclude(ExclusionReason::HireDateAfterRun);
            continue;
        }
        let key = key.to_string();
        match survivors.get_mut(&key) {
            Some(current) => {
                let incoming = record.get(&rules.last_modified_field);
                if current
                    .get(&rules.last_modified_field)
                    .recency_cmp(incoming)
                    .is_lt()
                {
                    *current = record;
                }
                stats.exclude(ExclusionReason::DuplicateSuperseded);
            }
            None => {
                survivors.insert(key, record);
            }
        }
    }

    let mut records = Vec::with_capacity(survivors.len());
    for (_, record) in survivors {
        if rules.active_only && record.get(fields::CURRENT_FLAG).as_bool() != Some(true) {
            stats.exclude(ExclusionReason::Inactive);
            continue;
        }
        records.push(derive_fields(record, ctx));
    }
    stats.output_rows = records.len();

    let mut schema: Vec<String> = raw
        .schema()
        .iter()
        .filter(|c| c.as_str() != EXTRACTION_TIMESTAMP)
        .cloned()
        .collect();
    for column in DERIVED_COLUMNS {
        if !schema.iter().any(|c| c == column) {
            schema.push(column.to_string());
        }
    }

    let dataset = Dataset::with_schema(
        SILVER_EMPLOYEE_DATASET,
        Stage::Silver,
        ctx.run_timestamp,
        schema,
        records,
    );
    let report = validate(&dataset, &rules.ruleset);

    debug!(
        "Cleaned {} raw rows into {} silver rows ({} excluded)",
        stats.input_rows,
        stats.output_rows,
        stats.excluded()
    );
    for (field, failures) in &stats.coercion_failures {
        info!("🧹 {} value(s) of {} could not be coerced and were set to missing", failures, field);
    }

    Ok(CleanOutput {
        dataset,
        report,
        stats,
    })
}

/// Turn a failing report into an error. Warnings are logged and let through.
pub fn enforce_gate(report: &QualityReport) -> Result<()> {
    match report.overall {
        Verdict::Fail => {
            let (check, field) = report
                .first_worst()
                .map(|c| (c.kind, c.field.clone()))
                .unwrap_or((CheckKind::RowCount, None));
            Err(PipelineError::QualityGateFailure {
                stage: report.stage.to_string(),
                check,
                field,
                verdict: Verdict::Fail,
            })
        }
        Verdict::Warn => {
            for check in report.with_verdict(Verdict::Warn) {
                warn!(
                    "⚠️ Quality warning on {}: {} {}",
                    report.dataset,
                    check.kind,
                    check.detail
                );
            }
            Ok(())
        }
        Verdict::Pass => Ok(()),
    }
}

fn coerce_record(record: &Record, table: &CoercionTable, stats: &mut CleaningStats) -> Record {
    record
        .iter()
        .filter(|(name, _)| *name != EXTRACTION_TIMESTAMP)
        .map(|(name, value)| {
            let value = match table.get(name) {
                Some(coercion) => coercion.apply(value).unwrap_or_else(|err| {
                    debug!("{}: {}", name, err);
                    *stats.coercion_failures.entry(name.to_string()).or_insert(0) += 1;
                    Value::Missing
                }),
                None => value.clone(),
            };
            (name.to_string(), value)
        })
        .collect()
}

fn derive_fields(mut record: Record, ctx: &RunContext) -> Record {
    let run_date = ctx.run_timestamp.date();

    if record.get(fields::MIDDLE_NAME).is_missing() {
        record.set(fields::MIDDLE_NAME, "");
    }
    if record.get(fields::TITLE).is_missing() {
        record.set(fields::TITLE, TITLE_PLACEHOLDER);
    }

    let full_name = format!(
        "{} {}",
        record.get(fields::FIRST_NAME).as_text().unwrap_or_default(),
        record.get(fields::LAST_NAME).as_text().unwrap_or_default()
    )
    .trim()
    .to_string();
    record.set(fields::FULL_NAME, full_name);

    let age = record
        .get(fields::BIRTH_DATE)
        .as_date()
        .and_then(|born| whole_years_between(born, run_date));
    record.set(fields::AGE, age);

    let years = record
        .get(fields::HIRE_DATE)
        .as_date()
        .and_then(|hired| whole_years_between(hired, run_date));
    record.set(fields::YEARS_OF_SERVICE, years);

    let missing_contacts = CRITICAL_CONTACT_FIELDS
        .iter()
        .filter(|f| record.get(f).is_missing())
        .count() as i64;
    record.set(fields::DATA_QUALITY_SCORE, FULL_SCORE - SCORE_PENALTY * missing_contacts);

    record.set(TRANSFORMATION_TIMESTAMP, ctx.run_timestamp);
    record
}

/// Completed years from `from` to `to`, one less if the anniversary has not
/// yet come round. `None` when `from` lies after `to`.
pub fn whole_years_between(from: NaiveDate, to: NaiveDate) -> Option<i64> {
    if from > to {
        return None;
    }
    let mut years = (to.year() - from.year()) as i64;
    if (to.month(), to.day()) < (from.month(), from.day()) {
        years -= 1;
    }
    Some(years)
}
