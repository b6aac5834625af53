//! Performance Data Consolidator Library
//!
//! This library provides the time-series data model for system performance
//! monitoring data (NMON, iostat, GC logs, ESXTop, Perfmon) and the engine that
//! consolidates parsed files into one coherent series per host.
//!
//! # Features
//!
//! - **Typed Schemas**: `DataType` with basic, sub type and process ids
//! - **Time-Ordered Storage**: `DataSet` with inclusive range queries
//! - **Consolidation**: `SystemDataSet` merges files with differing field sets
//!   and unifies process identities across files
//! - **Derived Data**: transforms and post processors for parsed files
//!
//! # Usage
//!
//! ```rust
//! use perfdata_consolidator::{DataSet, DataType, SystemDataSet, TypeId};
//!
//! let mut first = DataSet::nmon("h1").unwrap();
//! let cpu = first.add_type(DataType::new("CPU", "CPU", ["User%", "Sys%"]).unwrap()).unwrap();
//! first.add_values(0, "T0001", cpu.id(), vec![10.0, 20.0]).unwrap();
//!
//! let mut second = DataSet::nmon("h1").unwrap();
//! let cpu = second
//!     .add_type(DataType::new("CPU", "CPU", ["User%", "Sys%", "Wait%"]).unwrap())
//!     .unwrap();
//! second.add_values(60_000, "T0002", cpu.id(), vec![5.0, 15.0, 3.0]).unwrap();
//!
//! let mut host = SystemDataSet::new("h1").unwrap();
//! host.add_data("first.nmon", &first).unwrap();
//! host.add_data("second.nmon", &second).unwrap();
//!
//! let combined = host.get_type(&TypeId::basic("CPU")).unwrap();
//! assert_eq!(combined.fields(), &["Sys%", "User%", "Wait%"]);
//! assert!(host.record(0).unwrap().get_data(combined, "Wait%").unwrap().is_nan());
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod registry;
pub mod transform;

// Re-export main types for convenience
pub use config::{Config, MergeConfig, PostProcessingConfig};
pub use dataset::{aggregate_processes, DataSet, DataSetId, DataSetKind, MergeReport, Metadata, SystemDataSet};
pub use error::DataError;
pub use model::{ArrayPool, DataRecord, DataType, Interval, Process, ProcessKey, TypeId, Values};
pub use registry::{DataSetListener, HostRegistry};
pub use transform::{DataPostProcessor, DataTransform, ScaleTransform, TransformChain};
