use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use tempfile::tempdir;

use employee_etl::app::ports::{PipelineEvent, PipelineObserver, PublishPort, SourceQuery};
use employee_etl::constants::{fields, EMPLOYEE_DATASET, SILVER_EMPLOYEE_DATASET};
use employee_etl::infra::{FilePublishAdapter, InMemoryPublisher, InMemorySource};
use employee_etl::pipeline::processing::quality_gate::CheckKind;
use employee_etl::pipeline::run_context::{ExclusionReason, PipelineState};
use employee_etl::pipeline::{Dataset, PipelineOrchestrator, Record, Stage, StageSelector, Value};

const DEPARTMENTS: [&str; 5] = ["Engineering", "Finance", "Marketing", "Production", "Sales"];

fn run_ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 30)
        .unwrap()
        .and_hms_opt(2, 0, 0)
        .unwrap()
}

/// A clean employee row carrying every source column
fn employee(key: i64) -> Record {
    let hire_year = 2005 + (key % 10) as i32;
    Record::new()
        .with(fields::EMPLOYEE_KEY, key)
        .with(fields::PARENT_EMPLOYEE_KEY, if key > 1 { Value::Integer(1) } else { Value::Missing })
        .with(fields::NATIONAL_ID, format!("{:09}", 100_000 + key))
        .with(fields::PARENT_NATIONAL_ID, Value::Missing)
        .with(fields::SALES_TERRITORY_KEY, 11i64)
        .with(fields::FIRST_NAME, format!("First{}", key))
        .with(fields::LAST_NAME, format!("Last{}", key))
        .with(fields::MIDDLE_NAME, Value::Missing)
        .with(fields::NAME_STYLE, 0i64)
        .with(fields::TITLE, "Production Technician - WC60")
        .with(fields::HIRE_DATE, format!("{}-03-15", hire_year))
        .with(fields::BIRTH_DATE, format!("{}-08-01", 1970 + (key % 20)))
        .with(fields::LOGIN_ID, format!("adventure-works\\user{}", key))
        .with(fields::EMAIL_ADDRESS, format!("User{}@Adventure-Works.com", key))
        .with(fields::PHONE, "555-0100")
        .with(fields::MARITAL_STATUS, if key % 2 == 0 { "M" } else { "S" })
        .with(fields::EMERGENCY_CONTACT_NAME, "Someone")
        .with(fields::EMERGENCY_CONTACT_PHONE, "555-0199")
        .with(fields::SALARIED_FLAG, (key % 4 == 0) as i64)
        .with(fields::GENDER, if key % 3 == 0 { "F" } else { "M" })
        .with(fields::PAY_FREQUENCY, 2i64)
        .with(fields::BASE_RATE, format!("{}.50", 10 + key % 30))
        .with(fields::VACATION_HOURS, 40i64)
        .with(fields::SICK_LEAVE_HOURS, 20i64)
        .with(fields::CURRENT_FLAG, 1i64)
        .with(fields::SALES_PERSON_FLAG, 0i64)
        .with(fields::DEPARTMENT_NAME, DEPARTMENTS[(key % 5) as usize])
        .with(fields::START_DATE, format!("{}-03-15", hire_year))
        .with(fields::END_DATE, Value::Missing)
        .with(fields::STATUS, "Current")
}

fn departments() -> Vec<Record> {
    ["Corporate", "Executive General and Administration", "Manufacturing"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Record::new()
                .with(fields::DEPARTMENT_GROUP_KEY, i as i64 + 1)
                .with(
                    fields::PARENT_DEPARTMENT_GROUP_KEY,
                    if i == 0 { Value::Missing } else { Value::Integer(1) },
                )
                .with(fields::DEPARTMENT_GROUP_NAME, *name)
        })
        .collect()
}

fn source_with(employees: Vec<Record>) -> Arc<InMemorySource> {
    Arc::new(
        InMemorySource::new()
            .with_rows(SourceQuery::Employees, employees)
            .with_rows(SourceQuery::Departments, departments()),
    )
}

/// 288 valid employees plus two rows without an identity key
fn roster_with_two_missing_keys() -> Vec<Record> {
    let mut rows: Vec<Record> = (1..=288).map(employee).collect();
    rows.insert(3, employee(9001).with(fields::EMPLOYEE_KEY, Value::Missing));
    rows.insert(17, employee(9002).with(fields::EMPLOYEE_KEY, Value::Missing));
    rows
}

#[derive(Default)]
struct RecordingObserver {
    states: Mutex<Vec<PipelineState>>,
    published: Mutex<Vec<String>>,
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::Transition { transition } => {
                self.states.lock().unwrap().push(transition.to);
            }
            PipelineEvent::Published { dataset, .. } => {
                self.published.lock().unwrap().push(dataset.name.clone());
            }
            _ => {}
        }
    }
}

fn column_i64(dataset: &Dataset, field: &str) -> Vec<i64> {
    dataset.column(field).filter_map(|v| v.as_i64()).collect()
}

#[tokio::test]
async fn test_full_run_over_employee_roster() -> Result<()> {
    let publisher = Arc::new(InMemoryPublisher::new());
    let observer = Arc::new(RecordingObserver::default());
    let orchestrator = PipelineOrchestrator::new(source_with(roster_with_two_missing_keys()), publisher.clone())
        .with_observer(observer.clone());

    let ctx = orchestrator.run_at(run_ts()).await;

    assert!(ctx.is_done(), "run ended in {}: {:?}", ctx.state(), ctx.failure());
    assert_eq!(ctx.row_count(Stage::Raw, EMPLOYEE_DATASET), Some(290));
    assert_eq!(ctx.row_count(Stage::Silver, SILVER_EMPLOYEE_DATASET), Some(288));
    assert_eq!(ctx.exclusions()[&ExclusionReason::MissingIdentityKey], 2);

    let silver = publisher.get(Stage::Silver, SILVER_EMPLOYEE_DATASET).unwrap();
    let distinct: BTreeSet<String> = silver
        .column(fields::DEPARTMENT_NAME)
        .map(|v| v.to_string())
        .collect();

    let summary = publisher.get(Stage::Gold, "department_summary").unwrap();
    assert_eq!(summary.row_count(), distinct.len());
    assert_eq!(column_i64(&summary, "total_employees").iter().sum::<i64>(), 288);

    let diversity = publisher.get(Stage::Gold, "gender_diversity").unwrap();
    assert_eq!(column_i64(&diversity, "employee_count").iter().sum::<i64>(), 288);

    let tenure = publisher.get(Stage::Gold, "tenure_analysis").unwrap();
    assert_eq!(column_i64(&tenure, "employee_count").iter().sum::<i64>(), 288);

    let trends = publisher.get(Stage::Gold, "hiring_trends").unwrap();
    assert_eq!(column_i64(&trends, "new_hires").iter().sum::<i64>(), 288);

    let states = observer.states.lock().unwrap().clone();
    assert_eq!(
        states,
        vec![
            PipelineState::Extracting,
            PipelineState::RawPublished,
            PipelineState::Cleaning,
            PipelineState::SilverPublished,
            PipelineState::Aggregating,
            PipelineState::Done,
        ]
    );
    // two raw tables, one silver dataset, four gold views
    assert_eq!(observer.published.lock().unwrap().len(), 7);
    Ok(())
}

#[tokio::test]
async fn test_rerun_with_same_inputs_is_identical() -> Result<()> {
    let first = Arc::new(InMemoryPublisher::new());
    let second = Arc::new(InMemoryPublisher::new());

    let a = PipelineOrchestrator::new(source_with(roster_with_two_missing_keys()), first.clone())
        .run_at(run_ts())
        .await;
    let b = PipelineOrchestrator::new(source_with(roster_with_two_missing_keys()), second.clone())
        .run_at(run_ts())
        .await;
    assert!(a.is_done() && b.is_done());

    for (layer, name) in first.publications() {
        let left = first.get(layer, &name).unwrap();
        let right = second.get(layer, &name).unwrap();
        assert_eq!(left.fingerprint(), right.fingerprint(), "{}/{} differs", layer, name);
    }
    Ok(())
}

#[tokio::test]
async fn test_rows_are_conserved_through_cleaning() -> Result<()> {
    let mut rows = roster_with_two_missing_keys();
    rows.push(employee(42).with(fields::START_DATE, "2020-01-01"));
    rows.push(employee(9100).with(fields::HIRE_DATE, "2031-01-01"));
    let publisher = Arc::new(InMemoryPublisher::new());

    let ctx = PipelineOrchestrator::new(source_with(rows), publisher.clone())
        .run_at(run_ts())
        .await;

    assert!(ctx.is_done());
    let raw = ctx.row_count(Stage::Raw, EMPLOYEE_DATASET).unwrap();
    let silver = ctx.row_count(Stage::Silver, SILVER_EMPLOYEE_DATASET).unwrap();
    assert_eq!(raw, 292);
    assert_eq!(silver + ctx.exclusion_count(), raw);
    assert_eq!(ctx.exclusions()[&ExclusionReason::DuplicateSuperseded], 1);
    assert_eq!(ctx.exclusions()[&ExclusionReason::HireDateAfterRun], 1);
    Ok(())
}

#[tokio::test]
async fn test_null_heavy_department_blocks_silver_publication() -> Result<()> {
    // 10% missing against a 5% threshold
    let rows: Vec<Record> = (1..=100)
        .map(|k| {
            let r = employee(k);
            if k % 10 == 0 {
                r.with(fields::DEPARTMENT_NAME, Value::Missing)
            } else {
                r
            }
        })
        .collect();
    let publisher = Arc::new(InMemoryPublisher::new());

    let ctx = PipelineOrchestrator::new(source_with(rows), publisher.clone())
        .run_at(run_ts())
        .await;

    assert_eq!(ctx.state(), PipelineState::Failed);
    let failure = ctx.failure().unwrap();
    assert_eq!(failure.state, PipelineState::Cleaning);
    assert_eq!(failure.check, Some(CheckKind::NullRatio));
    assert_eq!(failure.field.as_deref(), Some(fields::DEPARTMENT_NAME));

    assert_eq!(publisher.published_in(Stage::Raw), 2);
    assert_eq!(publisher.published_in(Stage::Silver), 0);
    assert_eq!(publisher.published_in(Stage::Gold), 0);
    Ok(())
}

#[tokio::test]
async fn test_warn_level_nulls_still_publish_every_layer() -> Result<()> {
    // 7% missing: above the 5% threshold but short of failing
    let rows: Vec<Record> = (1..=100)
        .map(|k| {
            let r = employee(k);
            if k <= 7 {
                r.with(fields::DEPARTMENT_NAME, Value::Missing)
            } else {
                r
            }
        })
        .collect();
    let publisher = Arc::new(InMemoryPublisher::new());

    let ctx = PipelineOrchestrator::new(source_with(rows), publisher.clone())
        .run_at(run_ts())
        .await;

    assert!(ctx.is_done(), "run ended in {}: {:?}", ctx.state(), ctx.failure());
    assert_eq!(publisher.published_in(Stage::Silver), 1);
    assert_eq!(publisher.published_in(Stage::Gold), 4);

    let summary = publisher.get(Stage::Gold, "department_summary").unwrap();
    let unknown = summary
        .records()
        .iter()
        .find(|r| r.get(fields::DEPARTMENT_NAME) == &Value::text("Unknown"))
        .unwrap();
    assert_eq!(unknown.get("total_employees"), &Value::Integer(7));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_versions_collapse_to_latest() -> Result<()> {
    let mut rows: Vec<Record> = (1..=20).map(employee).collect();
    rows.push(
        employee(5)
            .with(fields::START_DATE, "2019-01-01")
            .with(fields::DEPARTMENT_NAME, "Research"),
    );
    rows.push(
        employee(5)
            .with(fields::START_DATE, "2015-01-01")
            .with(fields::DEPARTMENT_NAME, "Quality Assurance"),
    );
    let publisher = Arc::new(InMemoryPublisher::new());

    let ctx = PipelineOrchestrator::new(source_with(rows), publisher.clone())
        .run_at(run_ts())
        .await;
    assert!(ctx.is_done());

    let silver = publisher.get(Stage::Silver, SILVER_EMPLOYEE_DATASET).unwrap();
    let versions: Vec<&Record> = silver
        .records()
        .iter()
        .filter(|r| r.get(fields::EMPLOYEE_KEY) == &Value::Integer(5))
        .collect();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].get(fields::DEPARTMENT_NAME), &Value::text("Research"));
    assert_eq!(silver.row_count(), 20);
    Ok(())
}

#[tokio::test]
async fn test_load_without_hire_date_skips_one_view() -> Result<()> {
    let publisher = Arc::new(InMemoryPublisher::new());
    let staged = PipelineOrchestrator::new(source_with((1..=30).map(employee).collect()), publisher.clone())
        .run_at(run_ts())
        .await;
    assert!(staged.is_done());

    let silver = publisher.get(Stage::Silver, SILVER_EMPLOYEE_DATASET).unwrap();
    let schema: Vec<String> = silver
        .schema()
        .iter()
        .filter(|c| c.as_str() != fields::HIRE_DATE)
        .cloned()
        .collect();
    let records = silver
        .records()
        .iter()
        .cloned()
        .map(|mut r| {
            r.remove(fields::HIRE_DATE);
            r
        })
        .collect();
    let trimmed = Dataset::with_schema(SILVER_EMPLOYEE_DATASET, Stage::Silver, run_ts(), schema, records);
    publisher.publish(&trimmed, Stage::Silver, SILVER_EMPLOYEE_DATASET).await?;
    let gold_before = publisher.published_in(Stage::Gold);

    let ctx = PipelineOrchestrator::new(Arc::new(InMemorySource::unavailable()), publisher.clone())
        .run_stage_at(StageSelector::Load, run_ts())
        .await;

    assert!(ctx.is_done());
    assert_eq!(publisher.published_in(Stage::Gold) - gold_before, 3);
    assert_eq!(ctx.view_failures().len(), 1);
    assert_eq!(ctx.view_failures()[0].view, "hiring_trends");
    Ok(())
}

#[tokio::test]
async fn test_unavailable_source_fails_before_publishing() -> Result<()> {
    let publisher = Arc::new(InMemoryPublisher::new());
    let ctx = PipelineOrchestrator::new(Arc::new(InMemorySource::unavailable()), publisher.clone())
        .run_at(run_ts())
        .await;

    assert!(ctx.is_failed());
    let failure = ctx.failure().unwrap();
    assert_eq!(failure.kind, "SourceUnavailable");
    assert_eq!(failure.stage, Stage::Raw);
    assert!(publisher.publications().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_empty_source_publishes_raw_then_fails_gate() -> Result<()> {
    let publisher = Arc::new(InMemoryPublisher::new());
    let ctx = PipelineOrchestrator::new(source_with(Vec::new()), publisher.clone())
        .run_at(run_ts())
        .await;

    assert!(ctx.is_failed());
    assert!(ctx.empty_inputs().iter().any(|d| d == EMPLOYEE_DATASET));
    assert_eq!(ctx.failure().unwrap().kind, "QualityGateFailure");
    assert_eq!(publisher.get(Stage::Raw, EMPLOYEE_DATASET).unwrap().row_count(), 0);
    assert_eq!(publisher.published_in(Stage::Silver), 0);
    Ok(())
}

#[tokio::test]
async fn test_stages_run_separately_against_files() -> Result<()> {
    let dir = tempdir()?;
    let files = Arc::new(FilePublishAdapter::new(dir.path()));
    let source = source_with((1..=40).map(employee).collect());

    let extract = PipelineOrchestrator::new(source.clone(), files.clone())
        .run_stage_at(StageSelector::Extract, run_ts())
        .await;
    assert_eq!(extract.state(), PipelineState::RawPublished);
    assert!(files.latest_path(Stage::Raw, EMPLOYEE_DATASET).exists());

    let transform = PipelineOrchestrator::new(source.clone(), files.clone())
        .run_stage_at(StageSelector::Transform, run_ts())
        .await;
    assert_eq!(transform.state(), PipelineState::SilverPublished);
    assert_eq!(transform.row_count(Stage::Silver, SILVER_EMPLOYEE_DATASET), Some(40));

    let load = PipelineOrchestrator::new(source, files.clone())
        .run_stage_at(StageSelector::Load, run_ts())
        .await;
    assert!(load.is_done());
    for view in ["department_summary", "gender_diversity", "tenure_analysis", "hiring_trends"] {
        assert!(files.latest_path(Stage::Gold, view).exists(), "{} missing", view);
    }

    let silver = files.load(Stage::Silver, SILVER_EMPLOYEE_DATASET).await?;
    assert_eq!(silver.row_count(), 40);
    assert_eq!(silver.records()[0].get(fields::GENDER), &Value::text("Male"));
    Ok(())
}

#[tokio::test]
async fn test_transform_refuses_truncated_raw_layer() -> Result<()> {
    let dir = tempdir()?;
    let files = Arc::new(FilePublishAdapter::new(dir.path()));
    let source = source_with((1..=10).map(employee).collect());

    let extract = PipelineOrchestrator::new(source.clone(), files.clone())
        .run_stage_at(StageSelector::Extract, run_ts())
        .await;
    assert_eq!(extract.state(), PipelineState::RawPublished);

    let path = files.latest_path(Stage::Raw, EMPLOYEE_DATASET);
    let body = std::fs::read_to_string(&path)?;
    let kept: Vec<&str> = body.lines().take(9).collect();
    std::fs::write(&path, kept.join("\n"))?;

    let ctx = PipelineOrchestrator::new(source, files)
        .run_stage_at(StageSelector::Transform, run_ts())
        .await;
    assert!(ctx.is_failed());
    assert_eq!(ctx.failure().unwrap().kind, "CorruptArtifact");
    assert_eq!(ctx.row_count(Stage::Silver, SILVER_EMPLOYEE_DATASET), None);
    Ok(())
}

#[tokio::test]
async fn test_transform_without_raw_layer_fails() -> Result<()> {
    let dir = tempdir()?;
    let files = Arc::new(FilePublishAdapter::new(dir.path()));

    let ctx = PipelineOrchestrator::new(Arc::new(InMemorySource::new()), files)
        .run_stage_at(StageSelector::Transform, run_ts())
        .await;

    assert!(ctx.is_failed());
    assert_eq!(ctx.failure().unwrap().kind, "NotPublished");
    Ok(())
}
