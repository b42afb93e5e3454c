use std::hash::Hash;
use std::hash::Hasher;
use thiserror::Error;

pub mod column;
pub mod columnar_processor;

/// Error type used across the column store
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Int parse error: {0}")]
    IntParse(#[from] std::num::ParseIntError),

    #[error("Float parse error: {0}")]
    FloatParse(#[from] std::num::ParseFloatError),

    #[error("Schema/parse error: {0}")]
    Parse(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Mmap not loaded")]
    MmapNotLoaded,
}

#[derive(Debug)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub errors: Vec<ParseError>,
}

/// A single rejected field or line. `row` is the 1-based line number in the file.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub error: Option<String>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}", self.row)?;
        if !self.column.is_empty() {
            write!(f, ", column `{}`", self.column)?;
        }
        write!(f, ": {}", self.value)?;
        if let Some(err) = &self.error {
            write!(f, " ({})", err)?;
        }
        Ok(())
    }
}

/// A single cell value, owned. Also used as a group-by key component.
#[derive(Debug, Clone)]
pub enum Value {
    /// Integer column
    Int(i64),
    /// Float column
    Float(f64),
    /// String column
    Str(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(_) => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Str(v) => v.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order: numbers before strings, numbers compared by value.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Str(_), _) => Ordering::Greater,
            (_, Value::Str(_)) => Ordering::Less,
            (a, b) => {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.total_cmp(&b)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// Aggregate operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    /// Sum of numeric values, missing ones skipped
    Sum,
    /// Count of all rows
    Count,
}

/// Result of an aggregation
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    Int(i64),
    Float(f64),
}

impl AggregateResult {
    pub fn as_f64(&self) -> f64 {
        match self {
            AggregateResult::Int(v) => *v as f64,
            AggregateResult::Float(v) => *v,
        }
    }
}

impl From<AggregateResult> for Value {
    fn from(res: AggregateResult) -> Self {
        match res {
            AggregateResult::Int(v) => Value::Int(v),
            AggregateResult::Float(v) => Value::Float(v),
        }
    }
}

/// Group-by output: one entry per distinct key, in first-seen order.
pub type GroupedRows = Vec<(Vec<Value>, AggregateResult)>;
