//! Value transforms and derived data applied to parsed files.
//!
//! This module provides:
//! - `DataTransform`: rewrites the values of matching types, e.g. unit scaling
//! - `TransformChain`: ordered transforms applied per value array
//! - `DataPostProcessor`: derives new types from a complete parsed file
//! - `scale`: `ScaleTransform`
//! - `post`: `CpuBusyPostProcessor`, `TotalsPostProcessor`,
//!   `ProcessAggregatePostProcessor`
//!
//! Both run before a file reaches its `SystemDataSet`.

pub mod post;
pub mod scale;

use tracing::debug;

use crate::config::PostProcessingConfig;
use crate::dataset::DataSet;
use crate::error::DataError;
use crate::model::{DataRecord, DataType, TypeId, Values};

pub use post::{CpuBusyPostProcessor, ProcessAggregatePostProcessor, TotalsPostProcessor};
pub use scale::ScaleTransform;

/// A per-type rewrite of value arrays.
pub trait DataTransform: Send + Sync {
    fn is_valid_for(&self, id: &TypeId) -> bool;

    /// Rewrites `values` in place. `values` holds at least one value per field
    /// of `ty`.
    fn transform(&self, ty: &DataType, values: &mut [f64]);
}

/// Derives data from a complete parsed file.
pub trait DataPostProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the number of types added or extended.
    fn post_process(&self, data: &mut DataSet) -> Result<usize, DataError>;
}

#[derive(Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn DataTransform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: impl DataTransform + 'static) -> &mut Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Applies every transform valid for `ty`, in order. Returns whether any
    /// applied.
    pub fn apply(&self, ty: &DataType, values: &mut [f64]) -> bool {
        let mut applied = false;
        for transform in self.transforms.iter().filter(|t| t.is_valid_for(ty.id())) {
            transform.transform(ty, values);
            applied = true;
        }
        applied
    }

    /// Applies the chain to every record of `data`, returning the number of
    /// value arrays rewritten.
    pub fn apply_to(&self, data: &mut DataSet) -> usize {
        let types: Vec<_> = data
            .types()
            .filter(|t| self.transforms.iter().any(|x| x.is_valid_for(t.id())))
            .cloned()
            .collect();
        if types.is_empty() {
            return 0;
        }

        let mut rewritten = 0;
        for record in data.records_mut() {
            for ty in &types {
                let Some(values) = record.data(ty.id()) else {
                    continue;
                };
                let mut values = values.to_vec();
                if self.apply(ty, &mut values) {
                    record.replace_data(ty.id().clone(), Values::from(values));
                    rewritten += 1;
                }
            }
        }
        debug!("Transformed {} value arrays of {}", rewritten, data.hostname());
        rewritten
    }
}

/// Builds the post processors enabled in `config`.
pub fn post_processors_from_config(config: &PostProcessingConfig) -> Vec<Box<dyn DataPostProcessor>> {
    let mut processors: Vec<Box<dyn DataPostProcessor>> = Vec::new();
    if config.cpu_busy {
        processors.push(Box::new(CpuBusyPostProcessor));
    }
    if !config.totals.is_empty() {
        processors.push(Box::new(TotalsPostProcessor::new(config.totals.iter().cloned())));
    }
    if config.aggregate_processes {
        processors.push(Box::new(ProcessAggregatePostProcessor));
    }
    processors
}

/// Runs `processors` in order over `data`.
pub fn run_post_processors(
    processors: &[Box<dyn DataPostProcessor>],
    data: &mut DataSet,
) -> Result<usize, DataError> {
    let mut total = 0;
    for processor in processors {
        let changed = processor.post_process(data)?;
        debug!("{} changed {} types of {}", processor.name(), changed, data.hostname());
        total += changed;
    }
    Ok(total)
}

/// Sums the arrays of `sources` in `record`, field by field, ignoring NaN.
///
/// Each source maps the output fields to its own indexes. Returns `None` when
/// no source has data in the record; a field without any value stays NaN.
pub(crate) fn sum_sources(
    record: &DataRecord,
    sources: &[(TypeId, Vec<Option<usize>>)],
    width: usize,
) -> Option<Vec<f64>> {
    let mut sums = vec![f64::NAN; width];
    let mut seen = false;
    for (id, indexes) in sources {
        let Some(values) = record.data(id) else {
            continue;
        };
        seen = true;
        for (sum, index) in sums.iter_mut().zip(indexes) {
            match index.map(|i| values[i]) {
                Some(v) if !v.is_nan() => *sum = if sum.is_nan() { v } else { *sum + v },
                _ => {}
            }
        }
    }
    seen.then_some(sums)
}
