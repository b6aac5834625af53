//! Schema descriptors for monitoring data.
//!
//! A [`DataType`] names one row category of monitoring data (`CPU_ALL`,
//! `NET (eth0)`, a single process) and its ordered field list. Identity is the
//! [`TypeId`] alone, so a type can be swapped for a wider one with the same id
//! while records keep pointing at it.

use std::fmt;
use std::hash::{Hash, Hasher};

use ahash::AHashMap as HashMap;
use once_cell::sync::OnceCell;

use crate::error::DataError;
use crate::model::{Process, ProcessKey};

/// Identity of a data type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeId {
    /// Plain id such as `CPU_ALL` or `MEM`.
    Basic(String),
    /// A primary id qualified by a secondary one, e.g. per disk or per JVM.
    Sub { primary: String, sub: String },
    /// Data for one process (or one process aggregate).
    Process(ProcessKey),
}

impl TypeId {
    pub fn basic(id: impl Into<String>) -> Self {
        TypeId::Basic(id.into())
    }

    pub fn sub(primary: impl Into<String>, sub: impl Into<String>) -> Self {
        TypeId::Sub {
            primary: primary.into(),
            sub: sub.into(),
        }
    }

    /// The primary id. Process types have none.
    pub fn primary(&self) -> Option<&str> {
        match self {
            TypeId::Basic(id) => Some(id),
            TypeId::Sub { primary, .. } => Some(primary),
            TypeId::Process(_) => None,
        }
    }

    pub fn sub_id(&self) -> Option<&str> {
        match self {
            TypeId::Sub { sub, .. } => Some(sub),
            _ => None,
        }
    }

    pub fn process_key(&self) -> Option<&ProcessKey> {
        match self {
            TypeId::Process(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_process(&self) -> bool {
        matches!(self, TypeId::Process(_))
    }

    fn validate(&self) -> Result<(), DataError> {
        match self {
            TypeId::Basic(id) if id.is_empty() => Err(DataError::EmptyId),
            TypeId::Sub { primary, sub } if primary.is_empty() || sub.is_empty() => {
                Err(DataError::EmptyId)
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeId::Basic(id) => f.write_str(id),
            TypeId::Sub { primary, sub } => write!(f, "{primary} ({sub})"),
            TypeId::Process(key) => write!(f, "PROCESS {key}"),
        }
    }
}

impl From<&str> for TypeId {
    fn from(id: &str) -> Self {
        TypeId::Basic(id.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct DataType {
    id: TypeId,
    name: String,
    fields: Vec<String>,
    field_index: HashMap<String, usize>,
    keys: OnceCell<Vec<String>>,
}

impl DataType {
    /// Creates a type with an arbitrary id. Fails on an empty id, name or
    /// field list, and on repeated field names.
    pub fn with_id(
        id: TypeId,
        name: impl Into<String>,
        fields: Vec<String>,
    ) -> Result<Self, DataError> {
        id.validate()?;
        let name = name.into();
        if name.is_empty() {
            return Err(DataError::EmptyName);
        }
        if fields.is_empty() {
            return Err(DataError::NoFields(id.to_string()));
        }

        let mut field_index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field_index.insert(field.clone(), i).is_some() {
                return Err(DataError::DuplicateField {
                    id: id.to_string(),
                    field: field.clone(),
                });
            }
        }

        Ok(Self {
            id,
            name,
            fields,
            field_index,
            keys: OnceCell::new(),
        })
    }

    pub fn new<S: Into<String>>(
        id: impl Into<String>,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = S>,
    ) -> Result<Self, DataError> {
        Self::with_id(
            TypeId::Basic(id.into()),
            name,
            fields.into_iter().map(Into::into).collect(),
        )
    }

    /// Creates a sub type `primary (sub)`.
    pub fn sub<S: Into<String>>(
        primary: impl Into<String>,
        sub: impl Into<String>,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = S>,
    ) -> Result<Self, DataError> {
        Self::with_id(
            TypeId::sub(primary, sub),
            name,
            fields.into_iter().map(Into::into).collect(),
        )
    }

    /// Creates the type for `process`; id and name derive from the process.
    pub fn for_process<S: Into<String>>(
        process: &Process,
        fields: impl IntoIterator<Item = S>,
    ) -> Result<Self, DataError> {
        Self::with_id(
            process.type_id(),
            process.type_name(),
            fields.into_iter().map(Into::into).collect(),
        )
    }

    pub fn id(&self) -> &TypeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.field_index.contains_key(field)
    }

    /// Index of `field`. An unknown field is a schema mismatch.
    pub fn field_index(&self, field: &str) -> Result<usize, DataError> {
        self.field_index
            .get(field)
            .copied()
            .ok_or_else(|| DataError::UnknownField {
                id: self.id.clone(),
                field: field.to_string(),
            })
    }

    pub(crate) fn index_of(&self, field: &str) -> Option<usize> {
        self.field_index.get(field).copied()
    }

    /// Opaque, globally unique key `id:field` for cross-referencing a single
    /// series. Keys are built once per type on first use.
    pub fn key(&self, field: &str) -> Result<&str, DataError> {
        let index = self.field_index(field)?;
        let keys = self.keys.get_or_init(|| {
            self.fields
                .iter()
                .map(|f| format!("{}:{}", self.id, f))
                .collect()
        });
        Ok(&keys[index])
    }

    /// Same id and name with a different field list.
    pub fn with_fields(&self, fields: Vec<String>) -> Result<DataType, DataError> {
        Self::with_id(self.id.clone(), self.name.clone(), fields)
    }

    /// Same fields under a new id and name.
    pub(crate) fn rekeyed(&self, id: TypeId, name: String) -> Result<DataType, DataError> {
        Self::with_id(id, name, self.fields.clone())
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DataType {}

impl Hash for DataType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
