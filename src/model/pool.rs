//! Shared zero-filled value arrays.
//!
//! Process data in particular is mostly zero. Bulk-loaded arrays that are all
//! zero are replaced by one shared array per length. Shared arrays are
//! immutable: [`Values`](crate::model::Values) copies before any write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

static GLOBAL: Lazy<ArrayPool> = Lazy::new(ArrayPool::new);

pub struct ArrayPool {
    arrays: DashMap<usize, Arc<[f64]>>,
    enabled: AtomicBool,
}

impl ArrayPool {
    pub fn new() -> Self {
        Self {
            arrays: DashMap::new(),
            enabled: AtomicBool::new(true),
        }
    }

    /// The process-wide pool used by record construction.
    pub fn global() -> &'static ArrayPool {
        &GLOBAL
    }

    /// Returns the shared zero array of `len` values.
    pub fn zeros(&self, len: usize) -> Arc<[f64]> {
        self.arrays
            .entry(len)
            .or_insert_with(|| Arc::from(vec![0.0; len]))
            .clone()
    }

    /// Converts `values` into a shareable array, substituting the pooled zero
    /// array when every value is zero and pooling is enabled.
    pub fn intern(&self, values: Vec<f64>) -> Arc<[f64]> {
        if self.is_enabled() && !values.is_empty() && values.iter().all(|v| *v == 0.0) {
            self.zeros(values.len())
        } else {
            Arc::from(values)
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Number of distinct array lengths cached.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn clear(&self) {
        self.arrays.clear();
    }
}

impl Default for ArrayPool {
    fn default() -> Self {
        Self::new()
    }
}
