//! Per-host consolidation of parsed data sets.
//!
//! A [`SystemDataSet`] absorbs every file parsed for one host. Merging never
//! drops recorded data:
//! - types new to the host are copied verbatim
//! - types whose field sets match are copied, keeping existing values on
//!   collision
//! - types whose field sets differ are rebuilt over the sorted union of
//!   fields, again keeping existing values on collision
//! - processes matching an existing (name, pid) are unified under the
//!   earliest start time
//!
//! Collisions are not errors. They are counted in the [`MergeReport`] and
//! logged, throttled by [`MergeConfig::max_collision_warnings`].

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::MergeConfig;
use crate::dataset::{DataSet, DataSetKind, Metadata};
use crate::error::DataError;
use crate::model::{format_time, DataType, Process, ProcessKey, TypeId, Values};

/// Outcome of one merge call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub records_created: usize,
    pub types_added: usize,
    pub types_reconciled: usize,
    pub processes_added: usize,
    pub processes_unified: usize,
    pub collisions: usize,
}

impl MergeReport {
    /// Adds the counts of `other` to this report.
    pub fn absorb(&mut self, other: &MergeReport) {
        self.records_created += other.records_created;
        self.types_added += other.types_added;
        self.types_reconciled += other.types_reconciled;
        self.processes_added += other.processes_added;
        self.processes_unified += other.processes_unified;
        self.collisions += other.collisions;
    }

    pub fn is_empty(&self) -> bool {
        *self == MergeReport::default()
    }
}

/// The consolidated view of one monitored host.
///
/// Provenance is keyed by the start time of each absorbed file. The hostname
/// is fixed at construction.
#[derive(Debug)]
pub struct SystemDataSet {
    data: DataSet,
    source_files: BTreeMap<i64, String>,
    metadata: BTreeMap<i64, Metadata>,
    system_info: BTreeMap<i64, Metadata>,
    options: MergeConfig,
}

impl SystemDataSet {
    pub fn new(hostname: impl Into<String>) -> Result<Self, DataError> {
        Self::with_config(hostname, MergeConfig::default())
    }

    pub fn with_config(hostname: impl Into<String>, options: MergeConfig) -> Result<Self, DataError> {
        let data = DataSet::new(DataSetKind::System, hostname)?;
        info!("Created system data set for host {}", data.hostname());
        Ok(Self {
            data,
            source_files: BTreeMap::new(),
            metadata: BTreeMap::new(),
            system_info: BTreeMap::new(),
            options,
        })
    }

    /// The consolidated data.
    pub fn data(&self) -> &DataSet {
        &self.data
    }

    pub fn options(&self) -> &MergeConfig {
        &self.options
    }

    // ---------------------------------------------------------------------
    // Consolidation
    // ---------------------------------------------------------------------

    /// Absorbs one parsed file.
    ///
    /// The file is recorded as a source only once its data merged. An empty
    /// data set registers nothing. A data set from a different host
    /// is merged anyway, with a warning.
    pub fn add_data(&mut self, source_file: impl Into<String>, data: &DataSet) -> Result<MergeReport, DataError> {
        let source_file = source_file.into();
        let Some(start) = data.start_time() else {
            warn!("Ignoring {}: it contains no records", source_file);
            return Ok(MergeReport::default());
        };

        if data.hostname() != self.hostname() {
            warn!(
                "Merging {} with hostname {} into host {}",
                source_file,
                data.hostname(),
                self.hostname()
            );
        }

        let report = self.merge(data)?;

        if let Some(previous) = self.source_files.insert(start, source_file.clone()) {
            warn!(
                "{} starts at {}, the same time as {}; replacing its provenance",
                source_file,
                format_time(start),
                previous
            );
        }
        self.metadata.insert(start, data.metadata().clone());
        self.system_info.insert(start, data.system_info().clone());
        info!(
            "Consolidated {} into {}: {} records, {} new types, {} reconciled types, {} collisions",
            source_file,
            self.hostname(),
            report.records_created,
            report.types_added,
            report.types_reconciled,
            report.collisions
        );
        Ok(report)
    }

    /// Absorbs another consolidated host, e.g. when two hosts are combined.
    ///
    /// Provenance entries of `other` whose start time is already known here
    /// are dropped with a warning.
    pub fn add_system(&mut self, other: &SystemDataSet) -> Result<MergeReport, DataError> {
        let report = self.merge(&other.data)?;

        for (start, file) in &other.source_files {
            if let Some(existing) = self.source_files.get(start) {
                warn!(
                    "Keeping {} over {} for start time {}",
                    existing,
                    file,
                    format_time(*start)
                );
                continue;
            }
            self.source_files.insert(*start, file.clone());
            if let Some(metadata) = other.metadata.get(start) {
                self.metadata.insert(*start, metadata.clone());
            }
            if let Some(info) = other.system_info.get(start) {
                self.system_info.insert(*start, info.clone());
            }
        }

        info!(
            "Combined host {} into {}: {} records, {} collisions",
            other.hostname(),
            self.hostname(),
            report.records_created,
            report.collisions
        );
        Ok(report)
    }

    fn merge(&mut self, incoming: &DataSet) -> Result<MergeReport, DataError> {
        if incoming.is_empty() {
            return Ok(MergeReport::default());
        }
        let mut merger = Merger {
            target: &mut self.data,
            options: &self.options,
            report: MergeReport::default(),
            combined_times: None,
        };
        merger.run(incoming)?;
        Ok(merger.finish())
    }

    // ---------------------------------------------------------------------
    // Provenance
    // ---------------------------------------------------------------------

    /// Source files ordered by start time.
    pub fn source_files(&self) -> impl Iterator<Item = (i64, &str)> {
        self.source_files.iter().map(|(t, f)| (*t, f.as_str()))
    }

    pub fn source_file_count(&self) -> usize {
        self.source_files.len()
    }

    pub fn source_file_at(&self, start: i64) -> Option<&str> {
        self.source_files.get(&start).map(String::as_str)
    }

    pub fn contains_source_file(&self, path: &str) -> bool {
        self.source_files.values().any(|f| f == path)
    }

    pub fn source_start_times(&self) -> impl Iterator<Item = i64> + '_ {
        self.source_files.keys().copied()
    }

    pub fn metadata_for(&self, start: i64) -> Option<&Metadata> {
        self.metadata.get(&start)
    }

    pub fn system_info_for(&self, start: i64) -> Option<&Metadata> {
        self.system_info.get(&start)
    }
}

impl Deref for SystemDataSet {
    type Target = DataSet;

    fn deref(&self) -> &DataSet {
        &self.data
    }
}

/// State of a single merge call.
struct Merger<'a> {
    target: &'a mut DataSet,
    options: &'a MergeConfig,
    report: MergeReport,
    /// Union of target and incoming times, built on first reconciliation.
    combined_times: Option<Vec<i64>>,
}

impl Merger<'_> {
    fn run(&mut self, incoming: &DataSet) -> Result<(), DataError> {
        let process_keys = self.merge_processes(incoming)?;

        for ty in incoming.types() {
            let target_id = match ty.id() {
                TypeId::Process(key) => TypeId::Process(
                    process_keys
                        .get(key)
                        .cloned()
                        .ok_or_else(|| DataError::UnknownProcess(key.clone()))?,
                ),
                id => id.clone(),
            };

            match self.target.get_type(&target_id).cloned() {
                None => {
                    let added = if target_id == *ty.id() {
                        self.target.add_type(Arc::clone(ty))?
                    } else {
                        let name = match &target_id {
                            TypeId::Process(key) => self
                                .target
                                .process(key)
                                .map(|p| p.type_name())
                                .unwrap_or_else(|| ty.name().to_string()),
                            _ => ty.name().to_string(),
                        };
                        self.target.add_type(ty.rekeyed(target_id, name)?)?
                    };
                    debug!("Adding type {} to {}", added.id(), self.target.hostname());
                    self.report.types_added += 1;
                    self.copy_values(incoming, ty.id(), &added)?;
                }
                Some(existing) if existing.fields() == ty.fields() => {
                    debug!("Copying type {} with unchanged fields", existing.id());
                    self.copy_values(incoming, ty.id(), &existing)?;
                }
                Some(existing) => {
                    debug!(
                        "Reconciling fields of {}: {:?} and {:?}",
                        existing.id(),
                        existing.fields(),
                        ty.fields()
                    );
                    self.reconcile(incoming, ty, &existing)?;
                }
            }
        }
        Ok(())
    }

    /// Decides, without touching the target, which existing process each
    /// incoming process unifies with. `None` means it is registered as new.
    ///
    /// Each existing process is claimed at most once, so two incoming
    /// processes never collapse into one. Fails when the outcome would give
    /// two processes the same key, or when a process type has no process.
    fn plan_processes<'p>(&self, incoming: &'p DataSet) -> Result<Vec<(&'p Process, Option<ProcessKey>)>, DataError> {
        let mut keys: HashSet<ProcessKey> = self.target.processes().map(Process::key).collect();
        let mut claimed: HashSet<ProcessKey> = HashSet::new();
        let mut plan = Vec::with_capacity(incoming.process_count());

        for process in incoming.processes() {
            let existing = if self.options.unify_process_start_times {
                self.target.processes().find(|p| {
                    p.name() == process.name() && p.pid() == process.pid() && !claimed.contains(&p.key())
                })
            } else {
                self.target
                    .process(&process.key())
                    .filter(|p| p.name() == process.name() && !claimed.contains(&p.key()))
            };

            let resulting = match existing {
                Some(p) => {
                    keys.remove(&p.key());
                    claimed.insert(p.key());
                    p.with_start_time(p.start_time().min(process.start_time())).key()
                }
                None => process.key(),
            };
            if !keys.insert(resulting.clone()) {
                return Err(DataError::DuplicateProcess(resulting));
            }
            plan.push((process, existing.map(Process::key)));
        }

        for id in incoming.type_ids() {
            if let Some(key) = id.process_key() {
                if incoming.process(key).is_none() {
                    return Err(DataError::UnknownProcess(key.clone()));
                }
            }
        }
        Ok(plan)
    }

    /// Registers or unifies every incoming process and returns where each
    /// incoming key lives in the target.
    fn merge_processes(&mut self, incoming: &DataSet) -> Result<HashMap<ProcessKey, ProcessKey>, DataError> {
        let plan = self.plan_processes(incoming)?;
        let mut keys = HashMap::with_capacity(plan.len());

        for (process, existing) in plan {
            let target_key = match existing {
                Some(key) => {
                    let start = self
                        .target
                        .process(&key)
                        .map_or(process.start_time(), |p| p.start_time().min(process.start_time()));
                    let key = self.target.change_start_time(&key, start)?;
                    let (end, command_line) = match self.target.process(&key) {
                        Some(p) => (
                            p.end_time().max(process.end_time()),
                            p.command_line().is_empty().then(|| process.command_line()),
                        ),
                        None => return Err(DataError::UnknownProcess(key)),
                    };
                    self.target.update_process(&key, command_line, Some(end))?;
                    trace!("Unified process {} into {}", process.key(), key);
                    self.report.processes_unified += 1;
                    key
                }
                None => {
                    let key = self.target.add_process(process.clone())?;
                    self.report.processes_added += 1;
                    key
                }
            };
            keys.insert(process.key(), target_key);
        }
        Ok(keys)
    }

    /// Copies every incoming array of `source_id` under `target`, keeping
    /// data already present.
    fn copy_values(&mut self, incoming: &DataSet, source_id: &TypeId, target: &DataType) -> Result<(), DataError> {
        for record in incoming.records() {
            let Some(values) = record.data(source_id) else {
                continue;
            };
            let time = record.time();
            match self.target.record(time) {
                Some(existing) if existing.has_data(target.id()) => {
                    self.collision(target, time);
                    continue;
                }
                Some(_) => {}
                None => self.report.records_created += 1,
            }
            self.target
                .get_or_create_record(time, record.timestamp())
                .add_data(target, values.clone())?;
        }
        Ok(())
    }

    /// Replaces `existing` with a type over the sorted union of both field
    /// lists and rebuilds its data at every time either side has data.
    fn reconcile(&mut self, incoming: &DataSet, source: &DataType, existing: &Arc<DataType>) -> Result<(), DataError> {
        let mut fields: Vec<String> = existing
            .fields()
            .iter()
            .chain(source.fields())
            .cloned()
            .collect();
        fields.sort();
        fields.dedup();
        let combined = Arc::new(existing.with_fields(fields)?);

        let mapping: Vec<(Option<usize>, Option<usize>)> = combined
            .fields()
            .iter()
            .map(|f| (existing.index_of(f), source.index_of(f)))
            .collect();

        let times = match self.combined_times.take() {
            Some(times) => times,
            None => {
                let mut times: Vec<i64> = self.target.times().chain(incoming.times()).collect();
                times.sort_unstable();
                times.dedup();
                times
            }
        };

        for &time in &times {
            let old = self
                .target
                .record(time)
                .and_then(|r| r.data(existing.id()))
                .cloned();
            let new_record = incoming.record(time);
            let new = new_record.and_then(|r| r.data(source.id()));
            if old.is_none() && new.is_none() {
                continue;
            }

            let mut collided = false;
            let values: Vec<f64> = mapping
                .iter()
                .map(|(ei, ni)| {
                    let kept = old.as_ref().zip(*ei).map(|(o, i)| o[i]);
                    let offered = new.zip(*ni).map(|(n, i)| n[i]);
                    match (kept, offered) {
                        (Some(k), Some(_)) => {
                            collided = true;
                            k
                        }
                        (Some(k), None) => k,
                        (None, Some(o)) => o,
                        (None, None) => f64::NAN,
                    }
                })
                .collect();
            if collided {
                self.collision(&combined, time);
            }

            let timestamp = new_record.map_or("", |r| r.timestamp());
            if !self.target.contains_record(time) {
                self.report.records_created += 1;
            }
            self.target
                .get_or_create_record(time, timestamp)
                .replace_data(combined.id().clone(), Values::from(values));
        }

        self.combined_times = Some(times);
        self.target.replace_type(combined);
        self.report.types_reconciled += 1;
        Ok(())
    }

    fn collision(&mut self, ty: &DataType, time: i64) {
        self.report.collisions += 1;
        if self.report.collisions <= self.options.max_collision_warnings {
            warn!(
                "Both sources hold {} at {}; keeping the existing values",
                ty.id(),
                format_time(time)
            );
        }
    }

    fn finish(self) -> MergeReport {
        let max = self.options.max_collision_warnings;
        if self.report.collisions > max {
            warn!(
                "{} more collisions in {} were not logged",
                self.report.collisions - max,
                self.target.hostname()
            );
        }
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(hostname: &str, id: &str, fields: &[&str], rows: &[(i64, Vec<f64>)]) -> DataSet {
        let mut data = DataSet::nmon(hostname).unwrap();
        let t = data
            .add_type(DataType::new(id, id, fields.iter().copied()).unwrap())
            .unwrap();
        for (time, values) in rows {
            data.add_values(*time, "", t.id(), values.clone()).unwrap();
        }
        data
    }

    #[test]
    fn test_empty_data_set_registers_nothing() {
        let mut system = SystemDataSet::new("h1").unwrap();
        let empty = DataSet::nmon("h1").unwrap();
        let report = system.add_data("empty.nmon", &empty).unwrap();
        assert!(report.is_empty());
        assert_eq!(system.source_file_count(), 0);
        assert!(!system.contains_source_file("empty.nmon"));
    }

    #[test]
    fn test_identical_schema_overlap_keeps_existing() {
        let mut system = SystemDataSet::new("h1").unwrap();
        let a = file("h1", "MEM", &["free"], &[(0, vec![1.0]), (1000, vec![2.0])]);
        let b = file("h1", "MEM", &["free"], &[(1000, vec![9.0]), (2000, vec![3.0])]);
        system.add_data("a", &a).unwrap();
        let report = system.add_data("b", &b).unwrap();

        assert_eq!(report.collisions, 1);
        assert_eq!(report.records_created, 1);
        assert_eq!(report.types_reconciled, 0);
        let t = system.get_type(&TypeId::basic("MEM")).unwrap().clone();
        assert_eq!(system.record(1000).unwrap().get_data(&t, "free").unwrap(), 2.0);
        assert_eq!(system.record(2000).unwrap().get_data(&t, "free").unwrap(), 3.0);
    }

    #[test]
    fn test_field_order_difference_is_reconciled() {
        let mut system = SystemDataSet::new("h1").unwrap();
        let a = file("h1", "CPU", &["User%", "Sys%"], &[(0, vec![1.0, 2.0])]);
        let b = file("h1", "CPU", &["Sys%", "User%"], &[(1000, vec![4.0, 3.0])]);
        system.add_data("a", &a).unwrap();
        let report = system.add_data("b", &b).unwrap();

        assert_eq!(report.types_reconciled, 1);
        let t = system.get_type(&TypeId::basic("CPU")).unwrap().clone();
        assert_eq!(t.fields(), &["Sys%", "User%"]);
        assert_eq!(system.record(0).unwrap().data(t.id()).unwrap().as_slice(), &[2.0, 1.0]);
        assert_eq!(system.record(1000).unwrap().data(t.id()).unwrap().as_slice(), &[4.0, 3.0]);
    }

    #[test]
    fn test_collision_warnings_are_counted_past_limit() {
        let options = MergeConfig {
            max_collision_warnings: 1,
            ..MergeConfig::default()
        };
        let mut system = SystemDataSet::with_config("h1", options).unwrap();
        let rows: Vec<(i64, Vec<f64>)> = (0..5).map(|i| (i * 1000, vec![i as f64])).collect();
        system.add_data("a", &file("h1", "MEM", &["free"], &rows)).unwrap();
        let report = system
            .add_data("b", &file("h1", "MEM", &["free"], &rows))
            .unwrap();
        assert_eq!(report.collisions, 5);
        assert_eq!(report.records_created, 0);
    }

    #[test]
    fn test_replaced_source_file_key() {
        let mut system = SystemDataSet::new("h1").unwrap();
        let mut a = file("h1", "MEM", &["free"], &[(0, vec![1.0])]);
        a.set_metadata("AIX", "7.2");
        system.add_data("a.nmon", &a).unwrap();
        system
            .add_data("b.nmon", &file("h1", "MEM", &["free"], &[(0, vec![2.0])]))
            .unwrap();
        assert_eq!(system.source_file_count(), 1);
        assert_eq!(system.source_file_at(0), Some("b.nmon"));
        assert!(system.metadata_for(0).unwrap().is_empty());
    }

    #[test]
    fn test_hostname_mismatch_still_merges() {
        let mut system = SystemDataSet::new("h1").unwrap();
        let report = system
            .add_data("other", &file("h2", "MEM", &["free"], &[(0, vec![1.0])]))
            .unwrap();
        assert_eq!(report.records_created, 1);
        assert_eq!(system.hostname(), "h1");
    }

    #[test]
    fn test_process_with_different_fields_is_reconciled() {
        let mut system = SystemDataSet::new("h1").unwrap();
        for (start, fields, values) in [
            (0_i64, vec!["%CPU"], vec![1.0]),
            (5000, vec!["%CPU", "RSS"], vec![2.0, 300.0]),
        ] {
            let mut data = DataSet::nmon("h1").unwrap();
            let p = Process::new(42, "db", start).unwrap();
            data.add_process(p.clone()).unwrap();
            let t = data
                .add_type(DataType::for_process(&p, fields).unwrap())
                .unwrap();
            data.add_values(start, "", t.id(), values).unwrap();
            system.add_data(format!("f{start}"), &data).unwrap();
        }

        assert_eq!(system.process_count(), 1);
        let p = system.find_process("db", 42).unwrap();
        assert_eq!(p.start_time(), 0);
        assert_eq!(p.end_time(), 5000);
        let t = system.process_type(&p.key()).unwrap().clone();
        assert_eq!(t.fields(), &["%CPU", "RSS"]);
        assert!(system.record(0).unwrap().get_data(&t, "RSS").unwrap().is_nan());
        assert_eq!(system.record(5000).unwrap().get_data(&t, "RSS").unwrap(), 300.0);
    }

    #[test]
    fn test_separate_processes_without_unification() {
        let options = MergeConfig {
            unify_process_start_times: false,
            ..MergeConfig::default()
        };
        let mut system = SystemDataSet::with_config("h1", options).unwrap();
        for start in [1000_i64, 500] {
            let mut data = DataSet::nmon("h1").unwrap();
            let p = Process::new(100, "java", start).unwrap();
            data.add_process(p.clone()).unwrap();
            let t = data.add_type(DataType::for_process(&p, ["%CPU"]).unwrap()).unwrap();
            data.add_values(start, "", t.id(), vec![1.0]).unwrap();
            system.add_data(format!("f{start}"), &data).unwrap();
        }
        assert_eq!(system.process_count(), 2);
        assert_eq!(system.processes_named("java").count(), 2);
    }

    #[test]
    fn test_add_system_keeps_existing_provenance() {
        let mut a = SystemDataSet::new("h1").unwrap();
        a.add_data("a1", &file("h1", "MEM", &["free"], &[(0, vec![1.0])]))
            .unwrap();
        let mut b = SystemDataSet::new("h2").unwrap();
        b.add_data("b1", &file("h2", "MEM", &["free"], &[(0, vec![5.0])]))
            .unwrap();
        b.add_data("b2", &file("h2", "MEM", &["free"], &[(60_000, vec![6.0])]))
            .unwrap();

        let report = a.add_system(&b).unwrap();
        assert_eq!(report.collisions, 1);
        assert_eq!(report.records_created, 1);
        assert_eq!(a.source_file_at(0), Some("a1"));
        assert_eq!(a.source_file_at(60_000), Some("b2"));
        assert!(!a.contains_source_file("b1"));
        assert_eq!(a.record_count(), 2);
    }

    #[test]
    fn test_report_absorb() {
        let mut total = MergeReport::default();
        let one = MergeReport {
            records_created: 2,
            collisions: 1,
            ..MergeReport::default()
        };
        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.records_created, 4);
        assert_eq!(total.collisions, 2);
        assert!(!total.is_empty());
    }
}
