use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::constants::{fields, UNKNOWN_GROUP};
use crate::error::PipelineError;
use crate::pipeline::dataset::{Dataset, Record, Stage, Value};

/// The gold views derived from the cleaned employee dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    DepartmentSummary,
    GenderDiversity,
    TenureAnalysis,
    HiringTrends,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [
        ViewKind::DepartmentSummary,
        ViewKind::GenderDiversity,
        ViewKind::TenureAnalysis,
        ViewKind::HiringTrends,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::DepartmentSummary => "department_summary",
            ViewKind::GenderDiversity => "gender_diversity",
            ViewKind::TenureAnalysis => "tenure_analysis",
            ViewKind::HiringTrends => "hiring_trends",
        }
    }

    /// Silver columns a view cannot be computed without
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            ViewKind::DepartmentSummary => &[
                fields::DEPARTMENT_NAME,
                fields::BASE_RATE,
                fields::YEARS_OF_SERVICE,
                fields::AGE,
            ],
            ViewKind::GenderDiversity => &[fields::DEPARTMENT_NAME, fields::GENDER],
            ViewKind::TenureAnalysis => &[fields::YEARS_OF_SERVICE],
            ViewKind::HiringTrends => &[fields::HIRE_DATE],
        }
    }

    fn compute(&self, silver: &Dataset) -> Vec<Record> {
        match self {
            ViewKind::DepartmentSummary => department_summary(silver),
            ViewKind::GenderDiversity => gender_diversity(silver),
            ViewKind::TenureAnalysis => tenure_analysis(silver),
            ViewKind::HiringTrends => hiring_trends(silver),
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct AggregateView {
    pub kind: ViewKind,
    pub dataset: Dataset,
}

/// A view that could not be produced; the others are unaffected
#[derive(Debug, Clone, PartialEq)]
pub struct ViewFailure {
    pub view: ViewKind,
    pub reason: String,
}

impl ViewFailure {
    pub fn to_error(&self) -> PipelineError {
        PipelineError::PartialAggregateFailure {
            view: self.view.name().to_string(),
            reason: self.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregateOutput {
    pub views: Vec<AggregateView>,
    pub failures: Vec<ViewFailure>,
}

impl AggregateOutput {
    pub fn view(&self, kind: ViewKind) -> Option<&AggregateView> {
        self.views.iter().find(|v| v.kind == kind)
    }
}

/// Compute every view from the silver dataset. Views are independent: one
/// whose inputs are absent is reported as a failure and skipped.
pub fn aggregate(silver: &Dataset) -> AggregateOutput {
    let mut output = AggregateOutput::default();

    for kind in ViewKind::ALL {
        let absent: Vec<&str> = kind
            .required_fields()
            .iter()
            .copied()
            .filter(|f| !silver.has_column(f))
            .collect();
        if !absent.is_empty() {
            let reason = format!("required field(s) absent: {}", absent.join(", "));
            warn!("⚠️ Skipping view {}: {}", kind, reason);
            output.failures.push(ViewFailure { view: kind, reason });
            continue;
        }

        let rows = kind.compute(silver);
        debug!("View {} produced {} rows", kind, rows.len());
        output.views.push(AggregateView {
            kind,
            dataset: Dataset::new(kind.name(), Stage::Gold, silver.published_at, rows),
        });
    }

    output
}

fn group_label(value: &Value) -> String {
    if value.is_missing() {
        UNKNOWN_GROUP.to_string()
    } else {
        value.to_string()
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Mean of the present numeric values, or `None` when there are none
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn department_summary(silver: &Dataset) -> Vec<Record> {
    #[derive(Default)]
    struct Acc {
        total: i64,
        rates: Vec<f64>,
        years: Vec<f64>,
        ages: Vec<f64>,
    }

    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for record in silver.records() {
        let acc = groups
            .entry(group_label(record.get(fields::DEPARTMENT_NAME)))
            .or_default();
        acc.total += 1;
        acc.rates.extend(record.get(fields::BASE_RATE).as_f64());
        acc.years.extend(record.get(fields::YEARS_OF_SERVICE).as_f64());
        acc.ages.extend(record.get(fields::AGE).as_f64());
    }

    groups
        .into_iter()
        .map(|(department, acc)| {
            let min_rate = acc.rates.iter().copied().reduce(f64::min);
            let max_rate = acc.rates.iter().copied().reduce(f64::max);
            Record::new()
                .with(fields::DEPARTMENT_NAME, department)
                .with("total_employees", acc.total)
                .with("avg_base_rate", mean(&acc.rates).map(|m| round_to(m, 2)))
                .with("avg_years_of_service", mean(&acc.years).map(|m| round_to(m, 1)))
                .with("avg_age", mean(&acc.ages).map(|m| round_to(m, 1)))
                .with("min_base_rate", min_rate)
                .with("max_base_rate", max_rate)
        })
        .collect()
}

fn gender_diversity(silver: &Dataset) -> Vec<Record> {
    let mut department_totals: BTreeMap<String, i64> = BTreeMap::new();
    let mut counts: BTreeMap<(String, String), i64> = BTreeMap::new();
    for record in silver.records() {
        let department = group_label(record.get(fields::DEPARTMENT_NAME));
        let gender = group_label(record.get(fields::GENDER));
        *department_totals.entry(department.clone()).or_insert(0) += 1;
        *counts.entry((department, gender)).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|((department, gender), count)| {
            let total = department_totals.get(&department).copied().unwrap_or(count);
            let percentage = round_to(count as f64 * 100.0 / total as f64, 2);
            Record::new()
                .with(fields::DEPARTMENT_NAME, department)
                .with(fields::GENDER, gender)
                .with("employee_count", count)
                .with("percentage", percentage)
        })
        .collect()
}

/// Tenure buckets in output order; upper bounds are inclusive
const TENURE_BUCKETS: [(&str, i64); 4] = [
    ("0-2 years", 2),
    ("3-5 years", 5),
    ("6-10 years", 10),
    ("10+ years", i64::MAX),
];

fn tenure_bucket(years: i64) -> &'static str {
    TENURE_BUCKETS
        .iter()
        .find(|(_, upper)| years <= *upper)
        .map(|(label, _)| *label)
        .unwrap_or(TENURE_BUCKETS[3].0)
}

fn tenure_analysis(silver: &Dataset) -> Vec<Record> {
    let mut counts: BTreeMap<&'static str, i64> = BTreeMap::new();
    let mut unknown = 0i64;
    for value in silver.column(fields::YEARS_OF_SERVICE) {
        match value.as_i64() {
            Some(years) => *counts.entry(tenure_bucket(years)).or_insert(0) += 1,
            None => unknown += 1,
        }
    }

    let mut rows: Vec<Record> = TENURE_BUCKETS
        .iter()
        .map(|(label, _)| {
            Record::new()
                .with("tenure_bucket", *label)
                .with("employee_count", counts.get(label).copied().unwrap_or(0))
        })
        .collect();
    if unknown > 0 {
        rows.push(
            Record::new()
                .with("tenure_bucket", UNKNOWN_GROUP)
                .with("employee_count", unknown),
        );
    }
    rows
}

fn hiring_trends(silver: &Dataset) -> Vec<Record> {
    use chrono::Datelike;

    let mut by_year: BTreeMap<i32, i64> = BTreeMap::new();
    let mut unknown = 0i64;
    for value in silver.column(fields::HIRE_DATE) {
        match value.as_date() {
            Some(date) => *by_year.entry(date.year()).or_insert(0) += 1,
            None => unknown += 1,
        }
    }

    let mut rows: Vec<Record> = by_year
        .into_iter()
        .rev()
        .map(|(year, hires)| {
            Record::new()
                .with("hire_year", year as i64)
                .with("new_hires", hires)
        })
        .collect();
    if unknown > 0 {
        rows.push(
            Record::new()
                .with("hire_year", UNKNOWN_GROUP)
                .with("new_hires", unknown),
        );
    }
    rows
}
