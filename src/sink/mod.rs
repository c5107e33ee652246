//! Downstream persistence contract for finished brews and manual records.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

pub mod influx;
pub mod memory;

pub const DEFAULT_DATABASE: &str = "brews";
pub const SUMMARY_MEASUREMENT: &str = "summary";
pub const BREW_MEASUREMENT: &str = "brew";
pub const ACTIONS_MEASUREMENT: &str = "actions";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

pub type Tags = BTreeMap<String, String>;
pub type Fields = BTreeMap<String, FieldValue>;

/// A timestamped, tagged record.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub timestamp: SystemTime,
    pub tags: Tags,
    pub fields: Fields,
}

/// Database and measurement a batch of points belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Measurement {
    pub database: String,
    pub name: String,
}

impl Measurement {
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.name)
    }
}

/// A single `name = value` tag pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    #[error("sink rejected batch: {0}")]
    Rejected(String),
    #[error("no stored series matches {0}")]
    NotFound(String),
    #[error("operation not supported by this sink: {0}")]
    Unsupported(&'static str),
    #[error("failed to encode batch: {0}")]
    Encode(String),
}

pub trait Sink: Send + Sync {
    /// Persist a batch of points under `measurement`.
    fn emit_data_points(
        &self,
        measurement: &Measurement,
        points: &[DataPoint],
    ) -> Result<(), SinkError>;

    /// Retag every stored point matching `selector`, setting `replacement`
    /// and merging `extra_fields` into each point.
    fn modify_measurement(
        &self,
        measurement: &Measurement,
        selector: &Tag,
        replacement: &Tag,
        extra_fields: &Fields,
    ) -> Result<(), SinkError>;
}
