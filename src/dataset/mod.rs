//! Data sets: time-ordered records plus the types they reference.
//!
//! A [`DataSet`] holds one parsed file (or, wrapped in a [`SystemDataSet`],
//! one consolidated host). Records are keyed by epoch-millisecond time and
//! types by [`TypeId`]; both maps are sorted. Process-capable kinds also keep
//! a registry of [`Process`] instances whose types are keyed by process.
//!
//! Identity is a synthetic [`DataSetId`] assigned at construction, so a data
//! set keeps its identity while merges change its time range.

pub mod aggregate;
pub mod system;

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap as HashMap;
use tracing::trace;

use crate::error::DataError;
use crate::model::interval::shift_time;
use crate::model::{DataRecord, DataType, Interval, Process, ProcessKey, TypeId, Values};

pub use aggregate::aggregate_processes;
pub use system::{MergeReport, SystemDataSet};

/// Per-file string metadata (NMON AAA section, Perfmon headers, ...).
pub type Metadata = BTreeMap<String, String>;

/// Types of a data set, sorted by id.
pub type TypeMap = BTreeMap<TypeId, Arc<DataType>>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataSetId(u64);

impl DataSetId {
    fn next() -> Self {
        DataSetId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DataSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source format of a data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSetKind {
    /// iostat, GC logs, ESXTop, JSON and other formats without processes.
    Basic,
    Nmon,
    Perfmon,
    /// A consolidated host.
    System,
}

impl DataSetKind {
    pub fn supports_processes(self) -> bool {
        match self {
            DataSetKind::Basic => false,
            DataSetKind::Nmon | DataSetKind::Perfmon | DataSetKind::System => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataSetKind::Basic => "basic",
            DataSetKind::Nmon => "nmon",
            DataSetKind::Perfmon => "perfmon",
            DataSetKind::System => "system",
        }
    }
}

impl fmt::Display for DataSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct DataSet {
    id: DataSetId,
    kind: DataSetKind,
    hostname: String,
    types: TypeMap,
    records: BTreeMap<i64, DataRecord>,
    processes: BTreeMap<ProcessKey, Process>,
    metadata: Metadata,
    system_info: Metadata,
}

impl DataSet {
    pub fn new(kind: DataSetKind, hostname: impl Into<String>) -> Result<Self, DataError> {
        let hostname = hostname.into();
        if hostname.is_empty() {
            return Err(DataError::EmptyHostname);
        }
        Ok(Self {
            id: DataSetId::next(),
            kind,
            hostname,
            types: BTreeMap::new(),
            records: BTreeMap::new(),
            processes: BTreeMap::new(),
            metadata: Metadata::new(),
            system_info: Metadata::new(),
        })
    }

    pub fn basic(hostname: impl Into<String>) -> Result<Self, DataError> {
        Self::new(DataSetKind::Basic, hostname)
    }

    pub fn nmon(hostname: impl Into<String>) -> Result<Self, DataError> {
        Self::new(DataSetKind::Nmon, hostname)
    }

    pub fn perfmon(hostname: impl Into<String>) -> Result<Self, DataError> {
        Self::new(DataSetKind::Perfmon, hostname)
    }

    pub fn id(&self) -> DataSetId {
        self.id
    }

    pub fn kind(&self) -> DataSetKind {
        self.kind
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    // ---------------------------------------------------------------------
    // Metadata
    // ---------------------------------------------------------------------

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn system_info(&self) -> &Metadata {
        &self.system_info
    }

    pub fn set_system_info(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.system_info.insert(key.into(), value.into());
    }

    // ---------------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------------

    /// Registers a type. Redefining an id is a schema violation, and process
    /// types need their process registered first.
    pub fn add_type(&mut self, ty: impl Into<Arc<DataType>>) -> Result<Arc<DataType>, DataError> {
        let ty = ty.into();
        if self.types.contains_key(ty.id()) {
            return Err(DataError::DuplicateType(ty.id().clone()));
        }
        if let TypeId::Process(key) = ty.id() {
            if !self.processes.contains_key(key) {
                return Err(DataError::UnknownProcess(key.clone()));
            }
        }
        self.types.insert(ty.id().clone(), Arc::clone(&ty));
        Ok(ty)
    }

    pub fn get_type(&self, id: &TypeId) -> Option<&Arc<DataType>> {
        self.types.get(id)
    }

    pub fn contains_type(&self, id: &TypeId) -> bool {
        self.types.contains_key(id)
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<DataType>> {
        self.types.values()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &TypeId> {
        self.types.keys()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Removes a type and detaches its data from every record.
    pub fn remove_type(&mut self, id: &TypeId) -> Option<Arc<DataType>> {
        let removed = self.types.remove(id)?;
        for record in self.records.values_mut() {
            record.remove_data(id);
        }
        Some(removed)
    }

    /// Swaps in `ty` for the type with the same id. Record data is untouched.
    pub(crate) fn replace_type(&mut self, ty: Arc<DataType>) -> Option<Arc<DataType>> {
        self.types.insert(ty.id().clone(), ty)
    }

    // ---------------------------------------------------------------------
    // Records
    // ---------------------------------------------------------------------

    /// Adds a record. Its time must be new and every type it holds must be
    /// registered.
    pub fn add_record(&mut self, record: DataRecord) -> Result<(), DataError> {
        if self.records.contains_key(&record.time()) {
            return Err(DataError::DuplicateRecord(record.time()));
        }
        if let Some(id) = record.type_ids().find(|id| !self.types.contains_key(id)) {
            return Err(DataError::UnknownType(id.clone()));
        }
        self.records.insert(record.time(), record);
        Ok(())
    }

    /// Attaches a full value array for `id` at `time`, creating the record
    /// when needed.
    pub fn add_values(
        &mut self,
        time: i64,
        timestamp: &str,
        id: &TypeId,
        values: impl Into<Values>,
    ) -> Result<(), DataError> {
        let ty = self
            .types
            .get(id)
            .cloned()
            .ok_or_else(|| DataError::UnknownType(id.clone()))?;
        self.get_or_create_record(time, timestamp)
            .add_data(&ty, values)
    }

    /// Writes a single field for `id` at `time`, creating the record when
    /// needed.
    pub fn set_value(
        &mut self,
        time: i64,
        timestamp: &str,
        id: &TypeId,
        field: &str,
        value: f64,
    ) -> Result<(), DataError> {
        let ty = self
            .types
            .get(id)
            .cloned()
            .ok_or_else(|| DataError::UnknownType(id.clone()))?;
        self.get_or_create_record(time, timestamp)
            .set_value(&ty, field, value)
    }

    pub fn record(&self, time: i64) -> Option<&DataRecord> {
        self.records.get(&time)
    }

    pub fn contains_record(&self, time: i64) -> bool {
        self.records.contains_key(&time)
    }

    pub fn records(&self) -> btree_map::Values<'_, i64, DataRecord> {
        self.records.values()
    }

    /// Records within `interval`, inclusive at both ends.
    pub fn records_in(&self, interval: &Interval) -> btree_map::Range<'_, i64, DataRecord> {
        self.records.range(interval.start()..=interval.end())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn record_count_in(&self, interval: &Interval) -> usize {
        self.records_in(interval).count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn times(&self) -> impl DoubleEndedIterator<Item = i64> + '_ {
        self.records.keys().copied()
    }

    /// Time of the first record, `None` when there are no records.
    pub fn start_time(&self) -> Option<i64> {
        self.records.keys().next().copied()
    }

    /// Time of the last record, `None` when there are no records.
    pub fn end_time(&self) -> Option<i64> {
        self.records.keys().next_back().copied()
    }

    pub fn time_range(&self) -> Option<Interval> {
        let (start, end) = (self.start_time()?, self.end_time()?);
        Interval::new(start, end).ok()
    }

    pub(crate) fn get_or_create_record(&mut self, time: i64, timestamp: &str) -> &mut DataRecord {
        self.records
            .entry(time)
            .or_insert_with(|| DataRecord::new(time, timestamp))
    }

    /// Mutable access to one record. Types attached through it must already
    /// be registered with [`DataSet::add_type`].
    pub fn record_mut(&mut self, time: i64) -> Option<&mut DataRecord> {
        self.records.get_mut(&time)
    }

    pub(crate) fn records_mut(&mut self) -> btree_map::ValuesMut<'_, i64, DataRecord> {
        self.records.values_mut()
    }

    /// Shifts every record, and every process's start and end time, by
    /// `delta` milliseconds. Used to correct files without embedded dates.
    ///
    /// Nothing changes when any shifted time would leave the `i64` range.
    pub fn adjust_times(&mut self, delta: i64) -> Result<(), DataError> {
        if delta == 0 {
            return Ok(());
        }
        if let (Some(start), Some(end)) = (self.start_time(), self.end_time()) {
            shift_time(start, delta)?;
            shift_time(end, delta)?;
        }
        let shifted: Vec<Process> = self
            .processes
            .values()
            .map(|p| p.shifted(delta))
            .collect::<Result<_, _>>()?;

        let records = std::mem::take(&mut self.records);
        let mut adjusted = BTreeMap::new();
        for mut record in records.into_values() {
            record.adjust_time(delta)?;
            adjusted.insert(record.time(), record);
        }
        self.records = adjusted;

        // Re-key in two phases: a shifted key may equal another process's
        // key from before the shift.
        let mut renamed: HashMap<TypeId, TypeId> = HashMap::new();
        let mut moved_types = Vec::new();
        let originals = std::mem::take(&mut self.processes).into_values();
        for (process, shifted) in originals.zip(shifted) {
            if shifted.key() != process.key() {
                if let Some(old_type) = self.types.remove(&process.type_id()) {
                    moved_types.push(Arc::new(
                        old_type.rekeyed(shifted.type_id(), shifted.type_name())?,
                    ));
                    renamed.insert(process.type_id(), shifted.type_id());
                }
            }
            self.processes.insert(shifted.key(), shifted);
        }
        for ty in moved_types {
            self.types.insert(ty.id().clone(), ty);
        }
        if !renamed.is_empty() {
            for record in self.records.values_mut() {
                let moved: Vec<(TypeId, Values)> = renamed
                    .iter()
                    .filter_map(|(old, new)| record.remove_data(old).map(|v| (new.clone(), v)))
                    .collect();
                for (id, values) in moved {
                    record.replace_data(id, values);
                }
            }
        }
        trace!("Adjusted {} records of {} by {} ms", self.records.len(), self.id, delta);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Processes
    // ---------------------------------------------------------------------

    pub fn add_process(&mut self, process: Process) -> Result<ProcessKey, DataError> {
        if !self.kind.supports_processes() {
            return Err(DataError::ProcessesUnsupported(self.kind.as_str()));
        }
        let key = process.key();
        if self.processes.contains_key(&key) {
            return Err(DataError::DuplicateProcess(key));
        }
        self.processes.insert(key.clone(), process);
        Ok(key)
    }

    pub fn process(&self, key: &ProcessKey) -> Option<&Process> {
        self.processes.get(key)
    }

    /// Mutable access for command line and end time updates. Identity fields
    /// have no setters.
    pub fn process_mut(&mut self, key: &ProcessKey) -> Option<&mut Process> {
        self.processes.get_mut(key)
    }

    /// Updates the mutable parts of a registered process.
    pub fn update_process(
        &mut self,
        key: &ProcessKey,
        command_line: Option<&str>,
        end_time: Option<i64>,
    ) -> Result<(), DataError> {
        let process = self
            .processes
            .get_mut(key)
            .ok_or_else(|| DataError::UnknownProcess(key.clone()))?;
        if let Some(end_time) = end_time {
            process.set_end_time(end_time)?;
        }
        if let Some(command_line) = command_line {
            process.set_command_line(command_line);
        }
        Ok(())
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    pub fn processes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Process> + 'a {
        self.processes.values().filter(move |p| p.name() == name)
    }

    /// The process with this name and pid, ignoring start time.
    pub fn find_process(&self, name: &str, pid: i32) -> Option<&Process> {
        self.processes
            .values()
            .find(|p| p.pid() == pid && p.name() == name)
    }

    pub fn process_type(&self, key: &ProcessKey) -> Option<&Arc<DataType>> {
        self.types.get(&TypeId::Process(key.clone()))
    }

    /// Gives a registered process a new start time.
    ///
    /// Returns the key unchanged when the start time already matches.
    /// Otherwise the process is replaced by one with the new identity, its
    /// type is re-keyed, and every record's data moves to the new type.
    pub fn change_start_time(
        &mut self,
        key: &ProcessKey,
        start_time: i64,
    ) -> Result<ProcessKey, DataError> {
        let process = self
            .processes
            .get(key)
            .ok_or_else(|| DataError::UnknownProcess(key.clone()))?;
        if process.start_time() == start_time {
            return Ok(key.clone());
        }

        let updated = process.with_start_time(start_time);
        let new_key = updated.key();
        if new_key != *key && self.processes.contains_key(&new_key) {
            return Err(DataError::DuplicateProcess(new_key));
        }
        self.processes.remove(key);
        self.install_process(key, updated)
    }

    /// Registers `process`, which replaces the process formerly keyed by
    /// `old_key`, moving type and record data when the key changed.
    fn install_process(&mut self, old_key: &ProcessKey, process: Process) -> Result<ProcessKey, DataError> {
        let new_key = process.key();
        if new_key != *old_key {
            let old_id = TypeId::Process(old_key.clone());
            if let Some(old_type) = self.types.remove(&old_id) {
                let new_type = Arc::new(old_type.rekeyed(process.type_id(), process.type_name())?);
                for record in self.records.values_mut() {
                    if let Some(values) = record.remove_data(&old_id) {
                        record.replace_data(new_type.id().clone(), values);
                    }
                }
                self.types.insert(new_type.id().clone(), new_type);
            }
        }
        self.processes.insert(new_key.clone(), process);
        Ok(new_key)
    }
}

impl PartialEq for DataSet {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DataSet {}

impl Hash for DataSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for DataSet {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DataSet {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}
