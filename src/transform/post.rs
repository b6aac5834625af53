//! Post processors deriving new data from parsed files.

use std::sync::Arc;

use crate::dataset::{aggregate_processes, DataSet};
use crate::error::DataError;
use crate::model::{DataType, TypeId, Values};
use crate::transform::{sum_sources, DataPostProcessor};

const USER: &str = "User%";
const SYS: &str = "Sys%";
const BUSY: &str = "Busy%";
const TOTAL: &str = "Total";

/// Adds `Busy%` = `User%` + `Sys%` to every CPU type that has both fields.
///
/// CPU types are those whose primary id starts with `CPU` (`CPU_ALL`,
/// `CPU01`, `CPU (0)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBusyPostProcessor;

impl DataPostProcessor for CpuBusyPostProcessor {
    fn name(&self) -> &str {
        "cpu_busy"
    }

    fn post_process(&self, data: &mut DataSet) -> Result<usize, DataError> {
        let targets: Vec<Arc<DataType>> = data
            .types()
            .filter(|t| t.id().primary().is_some_and(|p| p.starts_with("CPU")))
            .filter(|t| t.has_field(USER) && t.has_field(SYS) && !t.has_field(BUSY))
            .cloned()
            .collect();

        for ty in &targets {
            let mut fields = ty.fields().to_vec();
            fields.push(BUSY.to_string());
            let extended = Arc::new(ty.with_fields(fields)?);
            let (user, sys) = (ty.field_index(USER)?, ty.field_index(SYS)?);
            let width = ty.field_count();

            for record in data.records_mut() {
                let Some(values) = record.data(ty.id()) else {
                    continue;
                };
                let mut widened = values[..width].to_vec();
                widened.push(values[user] + values[sys]);
                record.replace_data(ty.id().clone(), Values::from(widened));
            }
            data.replace_type(extended);
        }
        Ok(targets.len())
    }
}

/// Adds a `PRIMARY (Total)` sub type summing every sub type of each
/// configured primary id, e.g. all network interfaces or all disks.
///
/// The total carries the fields of the first sub type followed by any field
/// only later sub types have. NaN values are ignored.
#[derive(Debug, Clone, Default)]
pub struct TotalsPostProcessor {
    primaries: Vec<String>,
}

impl TotalsPostProcessor {
    pub fn new(primaries: impl IntoIterator<Item = String>) -> Self {
        Self {
            primaries: primaries.into_iter().collect(),
        }
    }
}

impl DataPostProcessor for TotalsPostProcessor {
    fn name(&self) -> &str {
        "totals"
    }

    fn post_process(&self, data: &mut DataSet) -> Result<usize, DataError> {
        let mut added = 0;
        for primary in &self.primaries {
            let total_id = TypeId::sub(primary.as_str(), TOTAL);
            if data.contains_type(&total_id) {
                continue;
            }
            let parts: Vec<Arc<DataType>> = data
                .types()
                .filter(|t| matches!(t.id(), TypeId::Sub { primary: p, .. } if p == primary))
                .cloned()
                .collect();
            if parts.is_empty() {
                continue;
            }

            let mut fields: Vec<String> = Vec::new();
            for field in parts.iter().flat_map(|t| t.fields()) {
                if !fields.contains(field) {
                    fields.push(field.clone());
                }
            }
            let total = data.add_type(DataType::sub(
                primary.as_str(),
                TOTAL,
                format!("{primary} {TOTAL}"),
                fields,
            )?)?;

            let sources: Vec<(TypeId, Vec<Option<usize>>)> = parts
                .iter()
                .map(|t| {
                    let indexes = total.fields().iter().map(|f| t.index_of(f)).collect();
                    (t.id().clone(), indexes)
                })
                .collect();
            for record in data.records_mut() {
                if let Some(sums) = sum_sources(record, &sources, total.field_count()) {
                    record.add_data(&total, sums)?;
                }
            }
            added += 1;
        }
        Ok(added)
    }
}

/// Runs [`aggregate_processes`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessAggregatePostProcessor;

impl DataPostProcessor for ProcessAggregatePostProcessor {
    fn name(&self) -> &str {
        "aggregate_processes"
    }

    fn post_process(&self, data: &mut DataSet) -> Result<usize, DataError> {
        if !data.kind().supports_processes() {
            return Ok(0);
        }
        aggregate_processes(data)
    }
}
