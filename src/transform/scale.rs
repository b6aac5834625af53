//! Unit scaling.

use crate::model::{DataType, TypeId};
use crate::transform::DataTransform;

/// Multiplies every field of types with a given primary id by a factor,
/// e.g. `1.0 / 1024.0` to turn KB into MB.
#[derive(Debug, Clone)]
pub struct ScaleTransform {
    primary: String,
    factor: f64,
}

impl ScaleTransform {
    pub fn new(primary: impl Into<String>, factor: f64) -> Self {
        Self {
            primary: primary.into(),
            factor,
        }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl DataTransform for ScaleTransform {
    fn is_valid_for(&self, id: &TypeId) -> bool {
        id.primary() == Some(self.primary.as_str())
    }

    fn transform(&self, ty: &DataType, values: &mut [f64]) {
        for v in values.iter_mut().take(ty.field_count()) {
            *v *= self.factor;
        }
    }
}
