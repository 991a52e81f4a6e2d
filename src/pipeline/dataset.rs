use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A single typed field value. `Missing` is the explicit marker for absent
/// or uncoercible data; it is never dropped from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Integer(i64),
    Decimal(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// Semantic type a field is expected to carry after cleaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Decimal,
    Text,
    Boolean,
    Date,
    Timestamp,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Integer => "integer",
            SemanticType::Decimal => "decimal",
            SemanticType::Text => "text",
            SemanticType::Boolean => "boolean",
            SemanticType::Date => "date",
            SemanticType::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

static MISSING: Value = Value::Missing;

/// 2^63 as an f64
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

impl Value {
    /// Missing values and blank text both count as "null" for quality purposes
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Decimal(d) => d.is_nan(),
            _ => false,
        }
    }

    pub fn text<S: Into<String>>(s: S) -> Self {
        Value::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            // i64 spans [-2^63, 2^63); larger magnitudes would saturate
            Value::Decimal(d) if d.fract() == 0.0 && d.abs() < I64_BOUND => Some(*d as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Decimal(d) if d.is_finite() => Some(*d),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|d| d.is_finite()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Dates are read leniently: persisted layers carry them as ISO text
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Timestamp(ts) => Some(ts.date()),
            Value::Text(s) => parse_date(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            Value::Text(s) => parse_timestamp(s).or_else(|| parse_date(s).map(|d| d.and_time(NaiveTime::MIN))),
            _ => None,
        }
    }

    pub fn conforms_to(&self, ty: SemanticType) -> bool {
        match (self, ty) {
            (Value::Missing, _) => true,
            (Value::Integer(_), SemanticType::Integer) => true,
            (Value::Integer(_), SemanticType::Decimal) => true,
            (Value::Decimal(_), SemanticType::Decimal) => true,
            (Value::Text(_), SemanticType::Text) => true,
            (Value::Boolean(_), SemanticType::Boolean) => true,
            (Value::Date(_), SemanticType::Date) => true,
            (Value::Timestamp(_), SemanticType::Timestamp) => true,
            _ => false,
        }
    }

    /// Ordering used to pick the most recent of several versions of a record.
    /// Missing always sorts lowest.
    pub fn recency_cmp(&self, other: &Value) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        if let (Some(a), Some(b)) = (self.as_timestamp(), other.as_timestamp()) {
            return a.cmp(&b);
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        }
        self.to_string().cmp(&other.to_string())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Missing => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            Value::Timestamp(ts) => serde_json::Value::String(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Missing,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Decimal).unwrap_or(Value::Missing),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "null"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// One entity: an ordered mapping from field name to value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, handy for constructing records in place
    pub fn with<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.set(name, value);
        self
    }

    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Absent fields read as `Missing`
    pub fn get(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&MISSING)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    pub fn from_json_object(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        map.iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()
    }

    /// Re-lays the record out in `schema` order; absent fields become `Missing`
    fn conform(mut self, schema: &[String]) -> Self {
        let fields = schema
            .iter()
            .map(|name| {
                let value = self.fields.shift_remove(name).unwrap_or(Value::Missing);
                (name.clone(), value)
            })
            .collect();
        Self { fields }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// The layer a dataset was published by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Raw,
    Silver,
    Gold,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Silver => "silver",
            Stage::Gold => "gold",
        }
    }

    /// Storage layer name used by the persistence collaborator
    pub fn layer_name(&self) -> &'static str {
        match self {
            Stage::Raw => "bronze",
            Stage::Silver => "silver",
            Stage::Gold => "gold",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unit of publication between stages: an ordered, schema-uniform sequence of records
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub stage: Stage,
    pub published_at: NaiveDateTime,
    schema: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Builds a dataset whose schema is the union of record fields in first-seen order
    pub fn new(name: &str, stage: Stage, published_at: NaiveDateTime, records: Vec<Record>) -> Self {
        let mut schema: Vec<String> = Vec::new();
        for record in &records {
            for field in record.field_names() {
                if !schema.iter().any(|s| s == field) {
                    schema.push(field.to_string());
                }
            }
        }
        Self::with_schema(name, stage, published_at, schema, records)
    }

    /// Builds a dataset with an explicit column order. Fields a record carries
    /// that the schema lacks are appended to the schema.
    pub fn with_schema(
        name: &str,
        stage: Stage,
        published_at: NaiveDateTime,
        mut schema: Vec<String>,
        records: Vec<Record>,
    ) -> Self {
        for record in &records {
            for field in record.field_names() {
                if !schema.iter().any(|s| s == field) {
                    schema.push(field.to_string());
                }
            }
        }
        let records = records.into_iter().map(|r| r.conform(&schema)).collect();
        Self {
            name: name.to_string(),
            stage,
            published_at,
            schema,
            records,
        }
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema.iter().any(|s| s == name)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.records.iter().map(move |r| r.get(name))
    }

    /// SHA-256 over schema and rows. The publication timestamp is excluded so
    /// two runs over identical inputs produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(self.stage.as_str().as_bytes());
        for column in &self.schema {
            hasher.update(column.as_bytes());
            hasher.update([0u8]);
        }
        for record in &self.records {
            hasher.update(record.to_json().to_string().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    pub fn meta(&self) -> DatasetMeta {
        DatasetMeta {
            name: self.name.clone(),
            stage: self.stage,
            published_at: self.published_at,
            schema: self.schema.clone(),
            row_count: self.row_count(),
            fingerprint: self.fingerprint(),
        }
    }
}

/// Sidecar description of a persisted dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub name: String,
    pub stage: Stage,
    pub published_at: NaiveDateTime,
    pub schema: Vec<String>,
    pub row_count: usize,
    pub fingerprint: String,
}
