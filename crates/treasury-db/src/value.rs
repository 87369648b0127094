use serde::Serialize;
use serde_json::Value;
use std::{cmp::Ordering, fmt};

/// Storage class of a column, as far as in-process evaluation cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Int,
    Text,
    Bool,
    Timestamp,
    Enum,
    List,
    Json,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int)
    }

    pub fn is_orderable(self) -> bool {
        !matches!(self, Self::List | Self::Json)
    }

    pub fn is_groupable(self) -> bool {
        !matches!(self, Self::Json)
    }
}

/// The column enumeration of one entity.
pub trait FieldSpec: Copy + Eq + Ord + fmt::Debug + Send + Sync + 'static {
    const MODEL: &'static str;
    const ALL: &'static [Self];

    fn name(self) -> &'static str;
    fn kind(self) -> FieldKind;
}

/// A loaded row whose columns can be read by field.
pub trait Record {
    type Field: FieldSpec;

    fn value(&self, field: Self::Field) -> ScalarValue;
}

/// A single column value lifted out of its Rust type, used for distinct,
/// grouping, aggregates and projections.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(jiff::Timestamp),
    List(Vec<String>),
    Json(Value),
}

impl ScalarValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
            Self::Timestamp(_) => 4,
            Self::List(_) => 5,
            Self::Json(_) => 6,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Reads a JSON operand, using `like` to recognise timestamps written as
    /// RFC 3339 strings.
    pub fn from_json(value: &Value, like: &ScalarValue) -> Self {
        match (value, like) {
            (Value::Null, _) => Self::Null,
            (Value::String(s), Self::Timestamp(_)) => s
                .parse::<jiff::Timestamp>()
                .map(Self::Timestamp)
                .unwrap_or_else(|_| Self::Text(s.clone())),
            (Value::String(s), _) => Self::Text(s.clone()),
            (Value::Bool(b), _) => Self::Bool(*b),
            (Value::Number(n), _) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            (Value::Array(items), _) if items.iter().all(Value::is_string) => Self::List(
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect(),
            ),
            (other, _) => Self::Json(other.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(v) => Value::Bool(*v),
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => Value::from(*v),
            Self::Text(v) => Value::String(v.clone()),
            Self::Timestamp(v) => Value::String(v.to_string()),
            Self::List(v) => Value::from(v.clone()),
            Self::Json(v) => v.clone(),
        }
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use ScalarValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Text(a), Text(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (List(a), List(b)) => a.cmp(b),
            (Json(a), Json(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<jiff::Timestamp> for ScalarValue {
    fn from(value: jiff::Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<String>> for ScalarValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Value> for ScalarValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Selection helper: renders only `fields` of `row` as a JSON object keyed by
/// the wire names of the fields.
pub fn project<R: Record>(row: &R, fields: &[R::Field]) -> serde_json::Map<String, Value> {
    fields
        .iter()
        .map(|field| (field.name().to_owned(), row.value(*field).to_json()))
        .collect()
}
