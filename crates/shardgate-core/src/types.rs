use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DataValue {
    Null,
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Canonical text form used by length-encoded string encodings.
    /// Returns `None` for `Null`.
    pub fn to_text_bytes(&self) -> Option<Vec<u8>> {
        match self {
            DataValue::Null => None,
            DataValue::Bytes(v) => Some(v.clone()),
            DataValue::String(v) => Some(v.as_bytes().to_vec()),
            other => Some(other.to_string().into_bytes()),
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => f.write_str("NULL"),
            DataValue::Int64(v) => write!(f, "{v}"),
            DataValue::UInt64(v) => write!(f, "{v}"),
            DataValue::Float64(v) => write!(f, "{v}"),
            DataValue::Bool(v) => write!(f, "{}", u8::from(*v)),
            DataValue::String(v) => f.write_str(v),
            DataValue::Bytes(v) => f.write_str(&String::from_utf8_lossy(v)),
        }
    }
}

/// Ordered, nullable parameter values bound to one execution.
pub type ParameterSet = Vec<DataValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRow {
    pub values: Vec<DataValue>,
}

/// One target of a routed statement: the data source to run on, the
/// rewritten SQL and the parameters bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteUnit {
    pub data_source: String,
    pub sql: String,
    pub parameters: ParameterSet,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteResult {
    pub units: Vec<RouteUnit>,
}

impl RouteResult {
    pub fn single(unit: RouteUnit) -> Self {
        Self { units: vec![unit] }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }
}
