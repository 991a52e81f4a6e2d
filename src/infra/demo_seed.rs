use std::path::Path;

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rusqlite::{params, Connection};
use tracing::info;

use crate::error::Result;

const FIRST_NAMES: &[&str] = &[
    "Guy", "Kevin", "Roberto", "Rob", "Thierry", "David", "JoLynn", "Ruth", "Gail", "Barry",
    "Jossef", "Terri", "Sidney", "Taylor", "Jeffrey", "Jo", "Doris", "Diane", "Bonnie", "Ken",
];
const LAST_NAMES: &[&str] = &[
    "Gilbert", "Brown", "Tamburello", "Walters", "D'Hers", "Bradley", "Dobney", "Ellerbrock",
    "Erickson", "Johnson", "Goldberg", "Duffy", "Higa", "Maxwell", "Ford", "Brown", "Hartwig",
    "Margheim", "Kearney", "Sanchez",
];
const DEPARTMENTS: &[&str] = &[
    "Production",
    "Sales",
    "Marketing",
    "Engineering",
    "Finance",
    "Human Resources",
    "Information Services",
    "Purchasing",
    "Shipping and Receiving",
    "Quality Assurance",
];
const TITLES: &[&str] = &[
    "Production Technician - WC60",
    "Marketing Assistant",
    "Engineering Manager",
    "Senior Tool Designer",
    "Design Engineer",
    "Buyer",
    "Accountant",
];
const DEPARTMENT_GROUPS: &[(i64, Option<i64>, &str)] = &[
    (1, None, "Corporate"),
    (2, Some(1), "Executive General and Administration"),
    (3, Some(1), "Inventory Management"),
    (4, Some(1), "Manufacturing"),
    (5, Some(1), "Quality Assurance"),
    (6, Some(1), "Research and Development"),
    (7, Some(1), "Sales and Marketing"),
];

/// Rows written by [`seed_demo_database`], defects included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub employee_rows: usize,
    pub missing_keys: usize,
    pub superseded_versions: usize,
    pub department_groups: usize,
}

const SCHEMA: &str = r#"
DROP TABLE IF EXISTS DimEmployee;
DROP TABLE IF EXISTS DimDepartmentGroup;
CREATE TABLE DimEmployee (
    EmployeeKey INTEGER,
    ParentEmployeeKey INTEGER,
    EmployeeNationalIDAlternateKey TEXT,
    ParentEmployeeNationalIDAlternateKey TEXT,
    SalesTerritoryKey INTEGER,
    FirstName TEXT,
    LastName TEXT,
    MiddleName TEXT,
    NameStyle INTEGER,
    Title TEXT,
    HireDate TEXT,
    BirthDate TEXT,
    LoginID TEXT,
    EmailAddress TEXT,
    Phone TEXT,
    MaritalStatus TEXT,
    EmergencyContactName TEXT,
    EmergencyContactPhone TEXT,
    SalariedFlag INTEGER,
    Gender TEXT,
    PayFrequency INTEGER,
    BaseRate REAL,
    VacationHours INTEGER,
    SickLeaveHours INTEGER,
    CurrentFlag INTEGER,
    SalesPersonFlag INTEGER,
    DepartmentName TEXT,
    StartDate TEXT,
    EndDate TEXT,
    Status TEXT
);
CREATE TABLE DimDepartmentGroup (
    DepartmentGroupKey INTEGER PRIMARY KEY,
    ParentDepartmentGroupKey INTEGER,
    DepartmentGroupName TEXT
);
"#;

fn random_date(rng: &mut StdRng, from: NaiveDate, to: NaiveDate) -> NaiveDate {
    let span = (to - from).num_days().max(1);
    from + Duration::days(rng.gen_range(0..span))
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// Write a synthetic source database at `path`, replacing the source tables
/// if they exist. Deterministic for a given `seed`.
///
/// The data carries the defects cleaning has to cope with: two rows without
/// an identity key, older versions of some employees, sparse contact fields
/// and single-letter gender and marital status codes.
pub fn seed_demo_database(path: &Path, employees: usize, seed: u64) -> Result<SeedSummary> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let tx = conn.transaction()?;
    let mut summary = SeedSummary {
        employee_rows: 0,
        missing_keys: 0,
        superseded_versions: 0,
        department_groups: DEPARTMENT_GROUPS.len(),
    };

    for (key, parent, name) in DEPARTMENT_GROUPS {
        tx.execute(
            "INSERT INTO DimDepartmentGroup VALUES (?1, ?2, ?3)",
            params![key, parent, name],
        )?;
    }

    {
        let mut insert = tx.prepare(
            "INSERT INTO DimEmployee VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
             ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30)",
        )?;

        for i in 0..employees {
            let key = i as i64 + 1;
            let first = *FIRST_NAMES.choose(&mut rng).unwrap_or(&"Guy");
            let last = *LAST_NAMES.choose(&mut rng).unwrap_or(&"Gilbert");
            let department = *DEPARTMENTS.choose(&mut rng).unwrap_or(&"Production");
            let title = if rng.gen_bool(0.1) {
                None
            } else {
                TITLES.choose(&mut rng).copied()
            };
            let hire = random_date(&mut rng, ymd(1998, 1, 1), ymd(2023, 12, 31));
            let birth = random_date(&mut rng, ymd(1955, 1, 1), ymd(1999, 12, 31));
            let login = format!("adventure-works\\{}{}", first.to_lowercase(), key);
            let email = (!rng.gen_bool(0.03))
                .then(|| format!("{}{}@adventure-works.com", first.to_lowercase(), key));
            let phone = (!rng.gen_bool(0.02)).then(|| {
                format!("{}-555-{:04}", rng.gen_range(200..999), rng.gen_range(0..10000))
            });
            let gender = if rng.gen_bool(0.5) { "M" } else { "F" };
            let marital = if rng.gen_bool(0.5) { "M" } else { "S" };
            let salaried = rng.gen_bool(0.3) as i64;
            let base_rate = (rng.gen_range(9.0..125.5f64) * 100.0).round() / 100.0;
            let current = (!rng.gen_bool(0.05)) as i64;
            let status = (current == 1).then_some("Current");

            // Two rows without an identity key
            let stored_key = if i == 3 || i == 17 {
                summary.missing_keys += 1;
                None
            } else {
                Some(key)
            };

            let versions = if stored_key.is_some() && i % 60 == 59 { 2 } else { 1 };
            for version in 0..versions {
                // The older version is written first and superseded by the later start date
                let start = if versions == 2 && version == 0 {
                    hire
                } else {
                    hire + Duration::days(365)
                };
                let row_department = if versions == 2 && version == 0 {
                    "Production"
                } else {
                    department
                };
                insert.execute(params![
                    stored_key,
                    rng.gen_range(1..20i64),
                    format!("{:09}", rng.gen_range(10_000_000..999_999_999i64)),
                    Option::<String>::None,
                    rng.gen_range(1..12i64),
                    first,
                    last,
                    Option::<String>::None,
                    0i64,
                    title,
                    hire.format("%Y-%m-%d").to_string(),
                    birth.format("%Y-%m-%d").to_string(),
                    login,
                    email,
                    phone,
                    marital,
                    format!("{} {}", LAST_NAMES.choose(&mut rng).unwrap_or(&"Higa"), first),
                    format!("{}-555-{:04}", rng.gen_range(200..999), rng.gen_range(0..10000)),
                    salaried,
                    gender,
                    if salaried == 1 { 2i64 } else { 1i64 },
                    base_rate,
                    rng.gen_range(0..100i64),
                    rng.gen_range(20..70i64),
                    current,
                    0i64,
                    row_department,
                    start.format("%Y-%m-%d").to_string(),
                    Option::<String>::None,
                    status,
                ])?;
                summary.employee_rows += 1;
            }
            if versions == 2 {
                summary.superseded_versions += 1;
            }
        }
    }
    tx.commit()?;

    info!(
        "🌱 Seeded {} with {} employee rows ({} without key, {} superseded versions)",
        path.display(),
        summary.employee_rows,
        summary.missing_keys,
        summary.superseded_versions
    );
    Ok(summary)
}
