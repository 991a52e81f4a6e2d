use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::fields;
use crate::pipeline::dataset::{parse_date, SemanticType, Value};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

const GENDER_CODES: &[(&str, &str)] = &[("M", "Male"), ("F", "Female")];
const MARITAL_STATUS_CODES: &[(&str, &str)] = &[("M", "Married"), ("S", "Single")];

/// Target of a typed conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coercion {
    Integer,
    Decimal,
    Date,
    Boolean,
    /// Trimmed text; blank becomes missing
    Text,
    /// Lower-cased, shape-checked address
    Email,
    /// Code → label lookup; labels themselves are accepted too
    Categorical(&'static [(&'static str, &'static str)]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoercionError {
    pub target: SemanticType,
    pub found: String,
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot coerce '{}' to {}", self.found, self.target)
    }
}

impl std::error::Error for CoercionError {}

impl Coercion {
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Coercion::Integer => SemanticType::Integer,
            Coercion::Decimal => SemanticType::Decimal,
            Coercion::Date => SemanticType::Date,
            Coercion::Boolean => SemanticType::Boolean,
            Coercion::Text | Coercion::Email | Coercion::Categorical(_) => SemanticType::Text,
        }
    }

    /// Convert `value`. Missing or blank input is not an error: it stays missing.
    pub fn apply(&self, value: &Value) -> Result<Value, CoercionError> {
        if value.is_missing() {
            return Ok(Value::Missing);
        }
        let converted = match self {
            Coercion::Integer => value.as_i64().map(Value::Integer),
            Coercion::Decimal => value.as_f64().map(Value::Decimal),
            Coercion::Date => match value {
                Value::Date(d) => Some(Value::Date(*d)),
                Value::Timestamp(ts) => Some(Value::Date(ts.date())),
                Value::Text(s) => parse_date(s).map(Value::Date),
                _ => None,
            },
            Coercion::Boolean => coerce_bool(value).map(Value::Boolean),
            Coercion::Text => Some(match value {
                Value::Text(s) => Value::Text(s.trim().to_string()),
                other => Value::Text(other.to_string()),
            }),
            Coercion::Email => value
                .as_text()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| EMAIL_RE.is_match(s))
                .map(Value::Text),
            Coercion::Categorical(codes) => value.as_text().and_then(|s| {
                let s = s.trim();
                codes
                    .iter()
                    .find(|(code, label)| code.eq_ignore_ascii_case(s) || label.eq_ignore_ascii_case(s))
                    .map(|(_, label)| Value::text(*label))
            }),
        };
        converted.ok_or_else(|| CoercionError {
            target: self.semantic_type(),
            found: value.to_string(),
        })
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Integer(0) => Some(false),
        Value::Integer(1) => Some(true),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Field name → semantic type plus conversion. Fields not listed pass through.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionTable {
    entries: Vec<(&'static str, Coercion)>,
}

impl CoercionTable {
    pub fn new(entries: Vec<(&'static str, Coercion)>) -> Self {
        Self { entries }
    }

    /// Coercions for the employee source table
    pub fn employee() -> Self {
        use Coercion::*;
        Self::new(vec![
            (fields::EMPLOYEE_KEY, Integer),
            (fields::PARENT_EMPLOYEE_KEY, Integer),
            (fields::NATIONAL_ID, Text),
            (fields::PARENT_NATIONAL_ID, Text),
            (fields::SALES_TERRITORY_KEY, Integer),
            (fields::FIRST_NAME, Text),
            (fields::LAST_NAME, Text),
            (fields::MIDDLE_NAME, Text),
            (fields::NAME_STYLE, Boolean),
            (fields::TITLE, Text),
            (fields::HIRE_DATE, Date),
            (fields::BIRTH_DATE, Date),
            (fields::LOGIN_ID, Text),
            (fields::EMAIL_ADDRESS, Email),
            (fields::PHONE, Text),
            (fields::MARITAL_STATUS, Categorical(MARITAL_STATUS_CODES)),
            (fields::EMERGENCY_CONTACT_NAME, Text),
            (fields::EMERGENCY_CONTACT_PHONE, Text),
            (fields::SALARIED_FLAG, Boolean),
            (fields::GENDER, Categorical(GENDER_CODES)),
            (fields::PAY_FREQUENCY, Integer),
            (fields::BASE_RATE, Decimal),
            (fields::VACATION_HOURS, Integer),
            (fields::SICK_LEAVE_HOURS, Integer),
            (fields::CURRENT_FLAG, Boolean),
            (fields::SALES_PERSON_FLAG, Boolean),
            (fields::DEPARTMENT_NAME, Text),
            (fields::START_DATE, Date),
            (fields::END_DATE, Date),
            (fields::STATUS, Text),
        ])
    }

    pub fn get(&self, field: &str) -> Option<&Coercion> {
        self.entries
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Coercion)> {
        self.entries.iter().map(|(name, c)| (*name, c))
    }
}

impl Default for CoercionTable {
    fn default() -> Self {
        Self::employee()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_dates_from_text_and_timestamps() {
        let expected = Value::Date(NaiveDate::from_ymd_opt(2009, 1, 31).unwrap());
        assert_eq!(Coercion::Date.apply(&Value::text("2009-01-31")).unwrap(), expected);
        assert_eq!(Coercion::Date.apply(&Value::text("2009-01-31 00:00:00.000")).unwrap(), expected);
        assert!(Coercion::Date.apply(&Value::text("last tuesday")).is_err());
    }

    #[test]
    fn test_blank_is_missing_not_error() {
        assert_eq!(Coercion::Integer.apply(&Value::text("  ")).unwrap(), Value::Missing);
        assert_eq!(Coercion::Text.apply(&Value::Missing).unwrap(), Value::Missing);
    }

    #[test]
    fn test_categorical_maps_codes_and_rejects_unknown() {
        let gender = Coercion::Categorical(GENDER_CODES);
        assert_eq!(gender.apply(&Value::text("f")).unwrap(), Value::text("Female"));
        assert_eq!(gender.apply(&Value::text("Male")).unwrap(), Value::text("Male"));
        assert!(gender.apply(&Value::text("X")).is_err());
    }

    #[test]
    fn test_email_is_normalized() {
        assert_eq!(
            Coercion::Email.apply(&Value::text(" Guy1@Adventure-Works.com ")).unwrap(),
            Value::text("guy1@adventure-works.com")
        );
        assert!(Coercion::Email.apply(&Value::text("not-an-email")).is_err());
    }

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(Coercion::Decimal.apply(&Value::text("12.45")).unwrap(), Value::Decimal(12.45));
        assert_eq!(Coercion::Integer.apply(&Value::Decimal(21.0)).unwrap(), Value::Integer(21));
        assert!(Coercion::Integer.apply(&Value::Decimal(21.5)).is_err());
        assert!(Coercion::Integer.apply(&Value::Decimal(1e30)).is_err());
        assert!(Coercion::Integer.apply(&Value::Decimal(-9.3e18)).is_err());
        assert_eq!(Coercion::Boolean.apply(&Value::Integer(1)).unwrap(), Value::Boolean(true));
    }
}
