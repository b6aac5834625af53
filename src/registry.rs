//! The application-level merge point: one `SystemDataSet` per host.
//!
//! Parsed files are fed in one at a time through [`HostRegistry::add_file`].
//! The registry is single-writer; only listener registration is shared and
//! guarded, since listeners are added and removed from other threads.

use std::collections::btree_map::{BTreeMap, Entry};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::config::MergeConfig;
use crate::dataset::{DataSet, MergeReport, SystemDataSet};
use crate::error::DataError;

/// Receives registry changes. All methods default to doing nothing.
pub trait DataSetListener: Send + Sync {
    /// Data was merged into `hostname`, which may have just been created.
    fn data_added(&self, _hostname: &str, _report: &MergeReport) {}

    fn data_removed(&self, _hostname: &str) {}

    fn data_cleared(&self) {}
}

#[derive(Default)]
pub struct HostRegistry {
    hosts: BTreeMap<String, SystemDataSet>,
    options: MergeConfig,
    listeners: Mutex<Vec<Arc<dyn DataSetListener>>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(options: MergeConfig) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn DataSetListener>) {
        if let Ok(mut guard) = self.listeners.lock() {
            guard.push(listener);
        }
    }

    /// Removes `listener`, compared by pointer. Returns whether it was found.
    pub fn remove_listener(&self, listener: &Arc<dyn DataSetListener>) -> bool {
        if let Ok(mut guard) = self.listeners.lock() {
            let before = guard.len();
            guard.retain(|l| !Arc::ptr_eq(l, listener));
            guard.len() != before
        } else {
            false
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|g| g.len()).unwrap_or(0)
    }

    /// Merges a parsed file into the host named by `data`, creating the host
    /// on first sight.
    pub fn add_file(&mut self, path: impl Into<String>, data: &DataSet) -> Result<MergeReport, DataError> {
        let hostname = data.hostname().to_string();
        let system = match self.hosts.entry(hostname.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(SystemDataSet::with_config(hostname.clone(), self.options.clone())?)
            }
        };
        let report = system.add_data(path, data)?;
        self.notify(|l| l.data_added(&hostname, &report));
        Ok(report)
    }

    pub fn get(&self, hostname: &str) -> Option<&SystemDataSet> {
        self.hosts.get(hostname)
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.hosts.contains_key(hostname)
    }

    /// Hosts ordered by hostname.
    pub fn hosts(&self) -> impl Iterator<Item = &SystemDataSet> {
        self.hosts.values()
    }

    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn remove(&mut self, hostname: &str) -> Option<SystemDataSet> {
        let removed = self.hosts.remove(hostname)?;
        info!("Removed host {}", hostname);
        self.notify(|l| l.data_removed(hostname));
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.hosts.clear();
        info!("Removed all hosts");
        self.notify(|l| l.data_cleared());
    }

    /// Moves all data of `from` to the host `to`, combining it with any data
    /// `to` already holds. Returns `None` when `from` is unknown.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<Option<MergeReport>, DataError> {
        if from == to {
            return Ok(self.hosts.contains_key(from).then(MergeReport::default));
        }
        let Some(source) = self.hosts.remove(from) else {
            return Ok(None);
        };

        let merged = match self.hosts.get_mut(to) {
            Some(target) => target.add_system(&source),
            None => SystemDataSet::with_config(to, self.options.clone()).and_then(|mut target| {
                let report = target.add_system(&source)?;
                self.hosts.insert(to.to_string(), target);
                Ok(report)
            }),
        };
        let report = match merged {
            Ok(report) => report,
            Err(e) => {
                self.hosts.insert(from.to_string(), source);
                return Err(e);
            }
        };
        debug!("Renamed host {} to {}", from, to);

        self.notify(|l| l.data_removed(from));
        self.notify(|l| l.data_added(to, &report));
        Ok(Some(report))
    }

    fn notify(&self, event: impl Fn(&dyn DataSetListener)) {
        let listeners = match self.listeners.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        for listener in &listeners {
            event(listener.as_ref());
        }
    }
}
