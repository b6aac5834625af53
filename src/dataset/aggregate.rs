//! Per-name process aggregates.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::dataset::DataSet;
use crate::error::DataError;
use crate::model::{DataType, Process, TypeId, AGGREGATE_PID};
use crate::transform::sum_sources;

/// Creates an aggregate process (pid `-1`) for every process name with more
/// than one instance, returning the number of aggregates created.
///
/// The aggregate spans the earliest start to the latest end of its instances.
/// Its type carries the sorted union of the instances' fields, and each value
/// is the sum of the instances' values at that record, ignoring NaN. Names
/// that already have an aggregate are skipped.
pub fn aggregate_processes(data: &mut DataSet) -> Result<usize, DataError> {
    let mut by_name: BTreeMap<String, Vec<Process>> = BTreeMap::new();
    for process in data.processes().filter(|p| !p.is_aggregate()) {
        by_name
            .entry(process.name().to_string())
            .or_default()
            .push(process.clone());
    }

    let mut created = 0;
    for (name, instances) in by_name {
        if instances.len() < 2 || data.find_process(&name, AGGREGATE_PID).is_some() {
            continue;
        }
        let types: Vec<Arc<DataType>> = instances
            .iter()
            .filter_map(|p| data.process_type(&p.key()).cloned())
            .collect();
        if types.is_empty() {
            continue;
        }

        let start = instances.iter().map(Process::start_time).min().unwrap_or_default();
        let end = instances.iter().map(Process::end_time).max().unwrap_or(start);
        let mut aggregate = Process::aggregate(name.as_str(), start)?;
        aggregate.set_end_time(end)?;

        let mut fields: Vec<String> = types.iter().flat_map(|t| t.fields().iter().cloned()).collect();
        fields.sort();
        fields.dedup();
        let ty = DataType::for_process(&aggregate, fields)?;

        data.add_process(aggregate)?;
        let ty = data.add_type(ty)?;

        let sources: Vec<(TypeId, Vec<Option<usize>>)> = types
            .iter()
            .map(|t| {
                let indexes = ty.fields().iter().map(|f| t.index_of(f)).collect();
                (t.id().clone(), indexes)
            })
            .collect();
        for record in data.records_mut() {
            if let Some(sums) = sum_sources(record, &sources, ty.field_count()) {
                record.add_data(&ty, sums)?;
            }
        }

        debug!("Aggregated {} instances of {}", instances.len(), name);
        created += 1;
    }
    Ok(created)
}
