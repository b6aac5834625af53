//! Error taxonomy for the data model.
//!
//! Every variant is a rejection of invalid input or a schema violation. Value
//! collisions during consolidation are not errors; they are counted in a
//! [`MergeReport`](crate::dataset::MergeReport) and logged instead.

use crate::model::{ProcessKey, TypeId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("data type id must not be empty")]
    EmptyId,

    #[error("name must not be empty")]
    EmptyName,

    #[error("hostname must not be empty")]
    EmptyHostname,

    #[error("data type '{0}' must define at least one field")]
    NoFields(String),

    #[error("data type '{id}' defines field '{field}' more than once")]
    DuplicateField { id: String, field: String },

    #[error("process id {0} is invalid, expected a pid >= 0 or -1 for an aggregate")]
    InvalidPid(i32),

    #[error("end time {end} is before start time {start}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("shifting time {time} by {delta} ms is out of range")]
    TimeOverflow { time: i64, delta: i64 },

    #[error("data type '{0}' is already defined in this data set")]
    DuplicateType(TypeId),

    #[error("record at {time} already holds data for type '{id}'")]
    DuplicateData { id: TypeId, time: i64 },

    #[error("a record for time {0} already exists")]
    DuplicateRecord(i64),

    #[error("data type '{0}' is not present")]
    UnknownType(TypeId),

    #[error("data type '{id}' has no field '{field}'")]
    UnknownField { id: TypeId, field: String },

    #[error("data type '{id}' needs {expected} values but {actual} were given")]
    ShortValues {
        id: TypeId,
        expected: usize,
        actual: usize,
    },

    #[error("process {0} is not registered")]
    UnknownProcess(ProcessKey),

    #[error("process {0} is already registered")]
    DuplicateProcess(ProcessKey),

    #[error("{0} data sets do not track processes")]
    ProcessesUnsupported(&'static str),
}
