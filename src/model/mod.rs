//! Core data model: schemas, processes, records and supporting types.
//!
//! This module provides:
//! - `datatype`: `DataType` and its `TypeId` (basic, sub type, process)
//! - `process`: process identity with pid reuse and aggregates
//! - `record`: `DataRecord` and copy-on-write `Values`
//! - `pool`: shared zero-filled arrays
//! - `interval`: inclusive time ranges

pub mod datatype;
pub mod interval;
pub mod pool;
pub mod process;
pub mod record;

pub use datatype::{DataType, TypeId};
pub use interval::{format_time, Interval};
pub use pool::ArrayPool;
pub use process::{Process, ProcessKey, AGGREGATE_PID};
pub use record::{DataRecord, Values};
