use tracing::debug;

use crate::constants::EXTRACTION_TIMESTAMP;
use crate::pipeline::dataset::{Dataset, Record, Stage, Value};
use crate::pipeline::processing::quality_gate::{validate, QualityReport, Ruleset};
use crate::pipeline::run_context::RunContext;

/// Raw dataset plus the advisory report computed over it
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub dataset: Dataset,
    pub report: QualityReport,
}

/// Tag extracted records with the run timestamp and wrap them as a raw dataset.
///
/// Records are otherwise carried verbatim, defects included, so later stages
/// can diagnose source problems. The lenient report is advisory only: a
/// failing verdict never stops publication, and an empty input still yields
/// an (empty) dataset.
pub fn ingest(dataset_name: &str, source_records: Vec<Record>, ctx: &RunContext) -> RawOutput {
    let stamp = Value::Timestamp(ctx.run_timestamp);
    let records: Vec<Record> = source_records
        .into_iter()
        .map(|mut record| {
            record.set(EXTRACTION_TIMESTAMP, stamp.clone());
            record
        })
        .collect();

    let dataset = if records.is_empty() {
        Dataset::with_schema(
            dataset_name,
            Stage::Raw,
            ctx.run_timestamp,
            vec![EXTRACTION_TIMESTAMP.to_string()],
            records,
        )
    } else {
        Dataset::new(dataset_name, Stage::Raw, ctx.run_timestamp, records)
    };

    let report = validate(&dataset, &Ruleset::lenient());
    debug!("Raw dataset '{}' ingested with {} rows", dataset_name, dataset.row_count());

    RawOutput { dataset, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::quality_gate::Verdict;
    use chrono::NaiveDate;

    fn ctx() -> RunContext {
        RunContext::new(
            NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_ingest_stamps_every_record_and_keeps_values() {
        let ctx = ctx();
        let source = vec![
            Record::new().with("EmployeeKey", 1i64).with("Gender", "M"),
            Record::new().with("EmployeeKey", Value::Missing).with("Gender", "?"),
        ];
        let out = ingest("dimemployee", source, &ctx);

        assert_eq!(out.dataset.stage, Stage::Raw);
        assert_eq!(out.dataset.row_count(), 2);
        for record in out.dataset.records() {
            assert_eq!(record.get(EXTRACTION_TIMESTAMP), &Value::Timestamp(ctx.run_timestamp));
        }
        // defects are preserved verbatim
        assert_eq!(out.dataset.records()[1].get("Gender"), &Value::text("?"));
        assert_eq!(out.dataset.records()[1].get("EmployeeKey"), &Value::Missing);
    }

    #[test]
    fn test_empty_input_still_publishes() {
        let out = ingest("dimemployee", Vec::new(), &ctx());

        assert!(out.dataset.is_empty());
        assert_eq!(out.report.overall, Verdict::Fail);
    }
}
