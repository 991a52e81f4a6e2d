use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pipeline::dataset::{Dataset, SemanticType, Stage};

/// Outcome of a single check, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Pass => "pass",
            Verdict::Warn => "warn",
            Verdict::Fail => "fail",
        };
        write!(f, "{}", s)
    }
}

/// The independent checks the validator knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Presence,
    RowCount,
    NullRatio,
    DuplicateKey,
    TypeConformance,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckKind::Presence => "presence",
            CheckKind::RowCount => "row_count",
            CheckKind::NullRatio => "null_ratio",
            CheckKind::DuplicateKey => "duplicate_key",
            CheckKind::TypeConformance => "type_conformance",
        };
        write!(f, "{}", s)
    }
}

/// Result of one check against one dataset (and optionally one field)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub verdict: Verdict,
    pub field: Option<String>,
    pub detail: String,
}

/// Structured outcome of validating a dataset. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub dataset: String,
    pub stage: Stage,
    pub ruleset: String,
    pub row_count: usize,
    pub column_count: usize,
    /// Null ratio of every column in the schema
    pub null_ratios: BTreeMap<String, f64>,
    pub duplicate_key_count: usize,
    pub checks: Vec<CheckResult>,
    pub overall: Verdict,
}

impl QualityReport {
    pub fn is_fail(&self) -> bool {
        self.overall == Verdict::Fail
    }

    /// The first check carrying the worst verdict, i.e. the reason for `overall`
    pub fn first_worst(&self) -> Option<&CheckResult> {
        if self.overall == Verdict::Pass {
            return None;
        }
        self.checks.iter().find(|c| c.verdict == self.overall)
    }

    pub fn with_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(move |c| c.verdict == verdict)
    }

    pub fn summary(&self) -> String {
        let warns = self.with_verdict(Verdict::Warn).count();
        let fails = self.with_verdict(Verdict::Fail).count();
        format!(
            "[{}/{}] {} rows, {} columns, {} duplicate keys: {} ({} warn, {} fail)",
            self.stage, self.dataset, self.row_count, self.column_count,
            self.duplicate_key_count, self.overall, warns, fails
        )
    }
}

/// Enumerated checks with parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ruleset {
    pub name: String,
    pub required_columns: BTreeSet<String>,
    /// Per-field maximum acceptable null ratio in [0, 1]
    pub null_thresholds: BTreeMap<String, f64>,
    /// Threshold applied to every schema column without its own entry
    pub default_null_threshold: Option<f64>,
    /// One field, or several forming a composite key
    pub duplicate_key: Vec<String>,
    pub min_rows: usize,
    pub expected_types: BTreeMap<String, SemanticType>,
}

impl Ruleset {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Reporting-only rules for raw data: a non-empty dataset is all we ask for
    pub fn lenient() -> Self {
        Self::new("lenient").with_min_rows(1)
    }

    /// Gate applied to the cleaned employee dataset before it may be published
    pub fn strict_silver() -> Self {
        use crate::constants::{fields, DERIVED_COLUMNS, EMPLOYEE_COLUMNS};

        let mut rules = Self::new("strict_silver")
            .require(EMPLOYEE_COLUMNS.iter().copied())
            .require(DERIVED_COLUMNS.iter().copied())
            .with_duplicate_key([fields::EMPLOYEE_KEY])
            .with_min_rows(1)
            .with_null_threshold(fields::EMPLOYEE_KEY, 0.0);
        for field in [
            fields::FIRST_NAME,
            fields::LAST_NAME,
            fields::FULL_NAME,
            fields::HIRE_DATE,
            fields::YEARS_OF_SERVICE,
            fields::DEPARTMENT_NAME,
        ] {
            rules = rules.with_null_threshold(field, 0.05);
        }
        for field in [fields::BASE_RATE, fields::BIRTH_DATE, fields::AGE, fields::GENDER] {
            rules = rules.with_null_threshold(field, 0.10);
        }
        for (field, ty) in [
            (fields::EMPLOYEE_KEY, SemanticType::Integer),
            (fields::HIRE_DATE, SemanticType::Date),
            (fields::BIRTH_DATE, SemanticType::Date),
            (fields::BASE_RATE, SemanticType::Decimal),
            (fields::AGE, SemanticType::Integer),
            (fields::YEARS_OF_SERVICE, SemanticType::Integer),
            (fields::DATA_QUALITY_SCORE, SemanticType::Integer),
            (fields::SALARIED_FLAG, SemanticType::Boolean),
            (fields::CURRENT_FLAG, SemanticType::Boolean),
        ] {
            rules = rules.expect_type(field, ty);
        }
        rules
    }

    pub fn require<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn with_null_threshold(mut self, field: &str, threshold: f64) -> Self {
        self.null_thresholds
            .insert(field.to_string(), threshold.clamp(0.0, 1.0));
        self
    }

    pub fn with_default_null_threshold(mut self, threshold: f64) -> Self {
        self.default_null_threshold = Some(threshold.clamp(0.0, 1.0));
        self
    }

    pub fn with_duplicate_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.duplicate_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_rows(mut self, min_rows: usize) -> Self {
        self.min_rows = min_rows;
        self
    }

    pub fn expect_type(mut self, field: &str, ty: SemanticType) -> Self {
        self.expected_types.insert(field.to_string(), ty);
        self
    }

    /// Fields subject to the null-ratio check, schema order first
    fn null_checked_fields(&self, dataset: &Dataset) -> Vec<(String, f64)> {
        let mut fields: Vec<(String, f64)> = Vec::new();
        for column in dataset.schema() {
            let threshold = self
                .null_thresholds
                .get(column)
                .copied()
                .or(self.default_null_threshold);
            if let Some(t) = threshold {
                fields.push((column.clone(), t));
            }
        }
        for (field, t) in &self.null_thresholds {
            if !dataset.has_column(field) {
                fields.push((field.clone(), *t));
            }
        }
        fields
    }
}

/// Run every check in `ruleset` against `dataset`. No check short-circuits another.
pub fn validate(dataset: &Dataset, ruleset: &Ruleset) -> QualityReport {
    let mut checks = Vec::new();

    checks.extend(check_presence(dataset, ruleset));
    checks.push(check_row_count(dataset, ruleset));

    let null_ratios: BTreeMap<String, f64> = dataset
        .schema()
        .iter()
        .map(|c| (c.clone(), null_ratio(dataset, c)))
        .collect();
    for (field, threshold) in ruleset.null_checked_fields(dataset) {
        let ratio = null_ratios.get(&field).copied().unwrap_or(1.0);
        checks.push(check_null_ratio(&field, ratio, threshold));
    }

    let duplicate_key_count = if ruleset.duplicate_key.is_empty() {
        0
    } else {
        let (count, check) = check_duplicate_key(dataset, &ruleset.duplicate_key);
        checks.push(check);
        count
    };

    for (field, ty) in &ruleset.expected_types {
        if dataset.has_column(field) {
            checks.push(check_type_conformance(dataset, field, *ty));
        }
    }

    let overall = checks
        .iter()
        .map(|c| c.verdict)
        .max()
        .unwrap_or(Verdict::Pass);

    QualityReport {
        dataset: dataset.name.clone(),
        stage: dataset.stage,
        ruleset: ruleset.name.clone(),
        row_count: dataset.row_count(),
        column_count: dataset.schema().len(),
        null_ratios,
        duplicate_key_count,
        checks,
        overall,
    }
}

/// Missing-or-blank count over row count; 0.0 for an empty dataset
pub fn null_ratio(dataset: &Dataset, field: &str) -> f64 {
    if dataset.is_empty() {
        return 0.0;
    }
    if !dataset.has_column(field) {
        return 1.0;
    }
    let nulls = dataset.column(field).filter(|v| v.is_missing()).count();
    nulls as f64 / dataset.row_count() as f64
}

fn check_presence(dataset: &Dataset, ruleset: &Ruleset) -> Vec<CheckResult> {
    ruleset
        .required_columns
        .iter()
        .map(|column| {
            if dataset.has_column(column) {
                CheckResult {
                    kind: CheckKind::Presence,
                    verdict: Verdict::Pass,
                    field: Some(column.clone()),
                    detail: "present".to_string(),
                }
            } else {
                CheckResult {
                    kind: CheckKind::Presence,
                    verdict: Verdict::Fail,
                    field: Some(column.clone()),
                    detail: format!("required column '{}' is absent", column),
                }
            }
        })
        .collect()
}

fn check_row_count(dataset: &Dataset, ruleset: &Ruleset) -> CheckResult {
    let rows = dataset.row_count();
    let verdict = if rows >= ruleset.min_rows {
        Verdict::Pass
    } else {
        Verdict::Fail
    };
    CheckResult {
        kind: CheckKind::RowCount,
        verdict,
        field: None,
        detail: format!("{} rows (minimum {})", rows, ruleset.min_rows),
    }
}

fn check_null_ratio(field: &str, ratio: f64, threshold: f64) -> CheckResult {
    let verdict = if ratio <= threshold {
        Verdict::Pass
    } else if ratio < 2.0 * threshold {
        Verdict::Warn
    } else {
        Verdict::Fail
    };
    CheckResult {
        kind: CheckKind::NullRatio,
        verdict,
        field: Some(field.to_string()),
        detail: format!(
            "{:.2}% null (threshold {:.2}%)",
            ratio * 100.0,
            threshold * 100.0
        ),
    }
}

fn check_duplicate_key(dataset: &Dataset, key: &[String]) -> (usize, CheckResult) {
    let field_label = key.join("+");
    if let Some(absent) = key.iter().find(|k| !dataset.has_column(k)) {
        let check = CheckResult {
            kind: CheckKind::DuplicateKey,
            verdict: Verdict::Warn,
            field: Some(field_label),
            detail: format!("key column '{}' is absent; uniqueness not checked", absent),
        };
        return (0, check);
    }

    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut duplicates = 0;
    for record in dataset.records() {
        let values: Vec<&crate::pipeline::dataset::Value> = key.iter().map(|k| record.get(k)).collect();
        if values.iter().any(|v| v.is_missing()) {
            continue;
        }
        let composite = values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        if !seen.insert(composite) {
            duplicates += 1;
        }
    }

    let verdict = if duplicates > 0 { Verdict::Warn } else { Verdict::Pass };
    let check = CheckResult {
        kind: CheckKind::DuplicateKey,
        verdict,
        field: Some(field_label),
        detail: format!("{} duplicate key occurrences", duplicates),
    };
    (duplicates, check)
}

fn check_type_conformance(dataset: &Dataset, field: &str, ty: SemanticType) -> CheckResult {
    let offending = dataset.column(field).filter(|v| !v.conforms_to(ty)).count();
    CheckResult {
        kind: CheckKind::TypeConformance,
        verdict: if offending > 0 { Verdict::Warn } else { Verdict::Pass },
        field: Some(field.to_string()),
        detail: format!("{} values are not {}", offending, ty),
    }
}
