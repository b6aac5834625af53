//! Records: every value observed at one timestamp.

use std::cmp::Ordering;
use std::ops::Deref;
use std::sync::Arc;

use ahash::AHashMap as HashMap;

use crate::error::DataError;
use crate::model::interval::{format_time, shift_time};
use crate::model::{ArrayPool, DataType, TypeId};

/// An immutable array of values for one type in one record.
///
/// The backing array may be shared with other records (see [`ArrayPool`]);
/// writes through [`DataRecord::set_value`] copy it first.
#[derive(Debug, Clone, PartialEq)]
pub struct Values(Arc<[f64]>);

impl Values {
    /// A fresh array of `len` NaNs.
    pub fn nan(len: usize) -> Self {
        Values(Arc::from(vec![f64::NAN; len]))
    }

    /// The pooled array of `len` zeros.
    pub fn zeros(len: usize) -> Self {
        Values(ArrayPool::global().zeros(len))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }

    fn make_mut(&mut self) -> &mut [f64] {
        if Arc::get_mut(&mut self.0).is_none() {
            self.0 = Arc::from(&self.0[..]);
        }
        Arc::get_mut(&mut self.0).expect("freshly copied values are unique")
    }
}

impl Deref for Values {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for Values {
    fn from(values: Vec<f64>) -> Self {
        Values(ArrayPool::global().intern(values))
    }
}

impl From<&[f64]> for Values {
    fn from(values: &[f64]) -> Self {
        Values::from(values.to_vec())
    }
}

/// All data for every type observed at one timestamp.
///
/// Records order by epoch-millisecond time only.
#[derive(Debug, Clone)]
pub struct DataRecord {
    time: i64,
    timestamp: String,
    data: HashMap<TypeId, Values>,
}

impl DataRecord {
    /// `timestamp` is the time as written in the source file.
    pub fn new(time: i64, timestamp: impl Into<String>) -> Self {
        Self {
            time,
            timestamp: timestamp.into(),
            data: HashMap::new(),
        }
    }

    /// A record whose source timestamp is the RFC 3339 rendering of `time`.
    pub fn at(time: i64) -> Self {
        Self::new(time, format_time(time))
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Attaches a full value array. Fails when the type is already attached or
    /// when fewer values than fields are given; extra values are kept.
    pub fn add_data(&mut self, ty: &DataType, values: impl Into<Values>) -> Result<(), DataError> {
        if self.data.contains_key(ty.id()) {
            return Err(DataError::DuplicateData {
                id: ty.id().clone(),
                time: self.time,
            });
        }
        let values = values.into();
        if values.len() < ty.field_count() {
            return Err(DataError::ShortValues {
                id: ty.id().clone(),
                expected: ty.field_count(),
                actual: values.len(),
            });
        }
        self.data.insert(ty.id().clone(), values);
        Ok(())
    }

    /// Writes one field, allocating a NaN-filled array on first use of `ty`.
    pub fn set_value(&mut self, ty: &DataType, field: &str, value: f64) -> Result<(), DataError> {
        let index = ty.field_index(field)?;
        let values = self
            .data
            .entry(ty.id().clone())
            .or_insert_with(|| Values::nan(ty.field_count()));
        values.make_mut()[index] = value;
        Ok(())
    }

    pub fn remove_data(&mut self, id: &TypeId) -> Option<Values> {
        self.data.remove(id)
    }

    pub fn has_data(&self, id: &TypeId) -> bool {
        self.data.contains_key(id)
    }

    pub fn data(&self, id: &TypeId) -> Option<&Values> {
        self.data.get(id)
    }

    /// Value of `field`. Fails when the type is not attached to this record.
    pub fn get_data(&self, ty: &DataType, field: &str) -> Result<f64, DataError> {
        let values = self
            .data
            .get(ty.id())
            .ok_or_else(|| DataError::UnknownType(ty.id().clone()))?;
        let index = ty.field_index(field)?;
        Ok(values[index])
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &TypeId> {
        self.data.keys()
    }

    pub fn type_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Moves the record by `delta` milliseconds.
    pub fn adjust_time(&mut self, delta: i64) -> Result<(), DataError> {
        self.time = shift_time(self.time, delta)?;
        Ok(())
    }

    /// Attaches `values` under `id`, replacing any previous attachment.
    pub(crate) fn replace_data(&mut self, id: TypeId, values: Values) -> Option<Values> {
        self.data.insert(id, values)
    }
}

impl PartialEq for DataRecord {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
    }
}

impl Eq for DataRecord {}

impl PartialOrd for DataRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DataRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu() -> DataType {
        DataType::new("CPU_ALL", "CPU Total", ["User%", "Sys%"]).unwrap()
    }

    #[test]
    fn test_add_data_twice_fails() {
        let t = cpu();
        let mut r = DataRecord::at(0);
        r.add_data(&t, vec![1.0, 2.0]).unwrap();
        assert!(r.has_data(t.id()));
        assert_eq!(
            r.add_data(&t, vec![3.0, 4.0]),
            Err(DataError::DuplicateData {
                id: t.id().clone(),
                time: 0
            })
        );
        assert_eq!(r.get_data(&t, "User%").unwrap(), 1.0);
    }

    #[test]
    fn test_short_values_rejected_long_values_kept() {
        let t = cpu();
        let mut r = DataRecord::at(0);
        assert!(matches!(
            r.add_data(&t, vec![1.0]),
            Err(DataError::ShortValues {
                expected: 2,
                actual: 1,
                ..
            })
        ));
        r.add_data(&t, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(r.data(t.id()).unwrap().len(), 3);
    }

    #[test]
    fn test_set_value_fills_nan() {
        let t = cpu();
        let mut r = DataRecord::new(1000, "T0001");
        r.set_value(&t, "Sys%", 5.0).unwrap();
        assert_eq!(r.get_data(&t, "Sys%").unwrap(), 5.0);
        assert!(r.get_data(&t, "User%").unwrap().is_nan());
        assert_eq!(r.timestamp(), "T0001");
        assert!(r.set_value(&t, "Idle%", 1.0).is_err());
    }

    #[test]
    fn test_get_data_for_missing_type_fails() {
        let r = DataRecord::at(0);
        assert_eq!(
            r.get_data(&cpu(), "User%"),
            Err(DataError::UnknownType(TypeId::basic("CPU_ALL")))
        );
    }

    #[test]
    fn test_shared_zero_array_is_copied_on_write() {
        let t = cpu();
        let mut a = DataRecord::at(0);
        let mut b = DataRecord::at(1);
        a.add_data(&t, vec![0.0, 0.0]).unwrap();
        b.add_data(&t, vec![0.0, 0.0]).unwrap();
        assert!(a.data(t.id()).unwrap().is_shared());

        a.set_value(&t, "User%", 7.0).unwrap();
        assert_eq!(a.get_data(&t, "User%").unwrap(), 7.0);
        assert_eq!(b.get_data(&t, "User%").unwrap(), 0.0);
        assert_eq!(Values::zeros(2).as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_remove_data() {
        let t = cpu();
        let mut r = DataRecord::at(0);
        r.add_data(&t, vec![1.0, 2.0]).unwrap();
        assert!(r.remove_data(t.id()).is_some());
        assert!(r.is_empty());
        assert!(r.add_data(&t, vec![1.0, 2.0]).is_ok());
    }

    #[test]
    fn test_ordering_uses_time_only() {
        let mut a = DataRecord::new(1000, "first");
        let b = DataRecord::new(1000, "second");
        let c = DataRecord::at(2000);
        assert_eq!(a, b);
        assert!(a < c);
        a.adjust_time(5000).unwrap();
        assert_eq!(a.time(), 6000);
        assert!(a > c);
    }

    #[test]
    fn test_adjust_time_out_of_range() {
        let mut record = DataRecord::at(i64::MAX - 10);
        assert_eq!(
            record.adjust_time(11),
            Err(DataError::TimeOverflow {
                time: i64::MAX - 10,
                delta: 11
            })
        );
        assert_eq!(record.time(), i64::MAX - 10);
    }
}
