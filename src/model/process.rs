//! Process identity for per-process monitoring data.
//!
//! A `Process` is either a single OS process instance or an aggregate of all
//! processes sharing a name (pid `-1`). Instances are identified by pid and
//! start time because pids are reused, both within one file and across files.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::DataError;
use crate::model::interval::shift_time;
use crate::model::TypeId;

/// Pid marking an aggregate of every process with the same name.
pub const AGGREGATE_PID: i32 = -1;

/// Identity of a process. Equality of [`Process`] values is equality of keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessKey {
    /// All processes named `.0`.
    Aggregate(String),
    /// One process instance.
    Instance { pid: i32, start_time: i64 },
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKey::Aggregate(name) => write!(f, "{name} (all)"),
            ProcessKey::Instance { pid, start_time } => write!(f, "{pid}@{start_time}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Process {
    pid: i32,
    name: String,
    command_line: String,
    start_time: i64,
    end_time: i64,
}

impl Process {
    /// Creates a process instance. The end time starts out equal to the start time.
    pub fn new(pid: i32, name: impl Into<String>, start_time: i64) -> Result<Self, DataError> {
        if pid < AGGREGATE_PID {
            return Err(DataError::InvalidPid(pid));
        }
        let name = name.into();
        if name.is_empty() {
            return Err(DataError::EmptyName);
        }
        Ok(Self {
            pid,
            name,
            command_line: String::new(),
            start_time,
            end_time: start_time,
        })
    }

    /// Creates the aggregate process for `name`.
    pub fn aggregate(name: impl Into<String>, start_time: i64) -> Result<Self, DataError> {
        Self::new(AGGREGATE_PID, name, start_time)
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn is_aggregate(&self) -> bool {
        self.pid == AGGREGATE_PID
    }

    pub fn key(&self) -> ProcessKey {
        if self.is_aggregate() {
            ProcessKey::Aggregate(self.name.clone())
        } else {
            ProcessKey::Instance {
                pid: self.pid,
                start_time: self.start_time,
            }
        }
    }

    /// Id of the data type holding this process's values.
    pub fn type_id(&self) -> TypeId {
        TypeId::Process(self.key())
    }

    /// Display name of the data type holding this process's values.
    pub fn type_name(&self) -> String {
        if self.is_aggregate() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.pid)
        }
    }

    pub fn set_command_line(&mut self, command_line: impl Into<String>) {
        self.command_line = command_line.into();
    }

    pub fn set_end_time(&mut self, end_time: i64) -> Result<(), DataError> {
        if end_time < self.start_time {
            return Err(DataError::InvalidTimeRange {
                start: self.start_time,
                end: end_time,
            });
        }
        self.end_time = end_time;
        Ok(())
    }

    /// Copy of this process starting at `start_time`; the end time is pulled
    /// forward when it would otherwise precede the new start.
    pub(crate) fn with_start_time(&self, start_time: i64) -> Process {
        Process {
            pid: self.pid,
            name: self.name.clone(),
            command_line: self.command_line.clone(),
            start_time,
            end_time: self.end_time.max(start_time),
        }
    }

    pub(crate) fn shifted(&self, delta: i64) -> Result<Process, DataError> {
        Ok(Process {
            pid: self.pid,
            name: self.name.clone(),
            command_line: self.command_line.clone(),
            start_time: shift_time(self.start_time, delta)?,
            end_time: shift_time(self.end_time, delta)?,
        })
    }
}

impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Process {}

impl Hash for Process {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_instances_compare_by_pid_and_start_time() {
        let a = Process::new(100, "java", 1000).unwrap();
        let b = Process::new(100, "javaw", 1000).unwrap();
        let c = Process::new(100, "java", 2000).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Process> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_aggregates_compare_by_name() {
        let a = Process::aggregate("java", 1000).unwrap();
        let b = Process::aggregate("java", 5000).unwrap();
        let c = Process::aggregate("sshd", 1000).unwrap();

        assert!(a.is_aggregate());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.key(), ProcessKey::Aggregate("java".into()));
    }

    #[test]
    fn test_end_time_before_start_rejected() {
        let mut p = Process::new(1, "init", 1000).unwrap();
        assert_eq!(
            p.set_end_time(999),
            Err(DataError::InvalidTimeRange {
                start: 1000,
                end: 999
            })
        );
        assert!(p.set_end_time(1000).is_ok());
        assert!(p.set_end_time(5000).is_ok());
        assert_eq!(p.end_time(), 5000);
    }

    #[test]
    fn test_construction_rejects_invalid_input() {
        assert_eq!(Process::new(1, "", 0), Err(DataError::EmptyName));
        assert_eq!(Process::new(-2, "x", 0), Err(DataError::InvalidPid(-2)));
    }

    #[test]
    fn test_type_name() {
        let p = Process::new(42, "sshd", 0).unwrap();
        assert_eq!(p.type_name(), "sshd (42)");
        assert_eq!(Process::aggregate("sshd", 0).unwrap().type_name(), "sshd");
    }

    #[test]
    fn test_with_start_time_keeps_end_after_start() {
        let mut p = Process::new(7, "bash", 1000).unwrap();
        p.set_end_time(2000).unwrap();
        p.set_command_line("bash -l");

        let earlier = p.with_start_time(500);
        assert_eq!(earlier.start_time(), 500);
        assert_eq!(earlier.end_time(), 2000);
        assert_eq!(earlier.command_line(), "bash -l");

        let later = p.with_start_time(3000);
        assert_eq!(later.end_time(), 3000);
    }

    #[test]
    fn test_shifted_rejects_out_of_range_times() {
        let mut p = Process::new(7, "bash", 1000).unwrap();
        p.set_end_time(i64::MAX).unwrap();
        assert_eq!(
            p.shifted(1),
            Err(DataError::TimeOverflow {
                time: i64::MAX,
                delta: 1
            })
        );
        let moved = p.shifted(-1000).unwrap();
        assert_eq!(moved.start_time(), 0);
        assert_eq!(moved.end_time(), i64::MAX - 1000);
    }
}
