// Structured records and masking
//
// A structured record is a shape attached to a field store. The store is
// shared: cloning a record, or masking it as a different shape, produces a
// view over the same storage. Field values are never copied unless the
// caller explicitly asks for a detached snapshot.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tether_error::{TypesError, TypesResult};

use crate::shape::RecordShape;
use crate::value::{shared_list, shared_map, SharedMap, Value};

/// Host objects whose accessible properties can be treated as record
/// fields. Implementations use interior mutability if they support
/// writes; the default is read-only.
pub trait ObjectFields: fmt::Debug + Send + Sync {
    /// Names of the accessible fields.
    fn field_names(&self) -> Vec<String>;

    /// Read a field by name.
    fn get(&self, name: &str) -> Option<Value>;

    /// Write a field by name.
    fn set(&self, name: &str, _value: Value) -> TypesResult<()> {
        Err(TypesError::ImmutableObject(name.to_string()))
    }
}

/// Backing storage of a structured record. Cloning shares the storage.
#[derive(Debug, Clone)]
pub enum FieldStore {
    /// Name-to-value mapping (the common case, also the pipeline's type)
    Map(SharedMap),
    /// Introspected view over a host object
    Object(Arc<dyn ObjectFields>),
}

impl FieldStore {
    fn get(&self, name: &str) -> TypesResult<Option<Value>> {
        match self {
            FieldStore::Map(map) => {
                let entries = map
                    .read()
                    .map_err(|_| TypesError::SyncError("Failed to lock record store".to_string()))?;
                Ok(entries.get(name).cloned())
            }
            FieldStore::Object(object) => Ok(object.get(name)),
        }
    }

    fn set(&self, name: &str, value: Value) -> TypesResult<()> {
        match self {
            FieldStore::Map(map) => {
                let mut entries = map
                    .write()
                    .map_err(|_| TypesError::SyncError("Failed to lock record store".to_string()))?;
                entries.insert(name.to_string(), value);
                Ok(())
            }
            FieldStore::Object(object) => object.set(name, value),
        }
    }

    fn ptr_eq(&self, other: &FieldStore) -> bool {
        match (self, other) {
            (FieldStore::Map(a), FieldStore::Map(b)) => Arc::ptr_eq(a, b),
            (FieldStore::Object(a), FieldStore::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A value conforming to a record shape, with gettable/settable named
/// fields.
#[derive(Debug, Clone)]
pub struct StructuredRecord {
    shape: Arc<RecordShape>,
    store: FieldStore,
}

impl StructuredRecord {
    /// Create an empty record of the given shape.
    pub fn new(shape: Arc<RecordShape>) -> Self {
        StructuredRecord {
            shape,
            store: FieldStore::Map(shared_map()),
        }
    }

    /// View an existing mapping as a record of the given shape. The
    /// mapping is not copied; writes through the record land in the map.
    pub fn over_map(shape: Arc<RecordShape>, map: SharedMap) -> Self {
        StructuredRecord {
            shape,
            store: FieldStore::Map(map),
        }
    }

    /// View a host object's introspectable fields as a record of the
    /// given shape.
    pub fn over_object(shape: Arc<RecordShape>, object: Arc<dyn ObjectFields>) -> Self {
        StructuredRecord {
            shape,
            store: FieldStore::Object(object),
        }
    }

    pub fn shape(&self) -> &Arc<RecordShape> {
        &self.shape
    }

    /// Whether this record and another share the same backing storage.
    pub fn shares_store_with(&self, other: &StructuredRecord) -> bool {
        self.store.ptr_eq(&other.store)
    }

    /// Whether this record can be used directly as the target shape,
    /// either exactly or via the upcast relation.
    pub fn conforms_to(&self, target: &Arc<RecordShape>) -> bool {
        RecordShape::upcast_reachable(&self.shape, target)
    }

    /// Reinterpret this record as a different shape without copying any
    /// field data. Reads of fields the store does not hold fail lazily,
    /// on access.
    pub fn mask_as(&self, target: Arc<RecordShape>) -> StructuredRecord {
        StructuredRecord {
            shape: target,
            store: self.store.clone(),
        }
    }

    /// Read a declared field. A required field absent from the store is
    /// an error; an optional absent field reads as `Null`.
    pub fn get(&self, name: &str) -> TypesResult<Value> {
        let field = self
            .shape
            .field(name)
            .ok_or_else(|| TypesError::UndeclaredField(name.to_string()))?;
        match self.store.get(name)? {
            Some(value) => Ok(value),
            None if field.required => Err(TypesError::MissingField(format!(
                "{}.{}",
                self.shape.name(),
                name
            ))),
            None => Ok(Value::Null),
        }
    }

    /// Read a declared field straight from the store, without the
    /// required-field validation of `get`. An absent value is `None`,
    /// required or not.
    pub fn peek(&self, name: &str) -> TypesResult<Option<Value>> {
        if self.shape.field(name).is_none() {
            return Err(TypesError::UndeclaredField(name.to_string()));
        }
        self.store.get(name)
    }

    /// Write a declared field.
    pub fn set(&self, name: &str, value: Value) -> TypesResult<()> {
        if self.shape.field(name).is_none() {
            return Err(TypesError::UndeclaredField(name.to_string()));
        }
        self.store.set(name, value)
    }

    /// Write element `index` of a list field, creating or extending the
    /// shared list container as needed. The first write to an absent
    /// field creates the container, whether or not the field is
    /// required.
    pub fn set_element(&self, name: &str, index: usize, value: Value) -> TypesResult<()> {
        let list = match self.peek(name)? {
            Some(Value::List(list)) => list,
            None | Some(Value::Null) => {
                let list = shared_list(Vec::new());
                self.set(name, Value::List(list.clone()))?;
                list
            }
            Some(other) => {
                return Err(TypesError::AdaptationError(format!(
                    "Cannot index into {} field: {}",
                    other.type_name(),
                    name
                )))
            }
        };
        let mut elements = list
            .write()
            .map_err(|_| TypesError::SyncError("Failed to lock list field".to_string()))?;
        if elements.len() <= index {
            elements.resize(index + 1, Value::Null);
        }
        elements[index] = value;
        Ok(())
    }

    /// Present values of the declared fields, in shape order. Absent
    /// fields are skipped.
    pub fn field_values(&self) -> TypesResult<Vec<(String, Value)>> {
        let mut values = Vec::new();
        for field in self.shape.all_fields() {
            if let Some(value) = self.store.get(&field.name)? {
                values.push((field.name.clone(), value));
            }
        }
        Ok(values)
    }

    /// Materialize a deep snapshot of this record, detached from the
    /// shared storage. Streams and host objects are carried over as-is.
    pub fn detach(&self) -> TypesResult<StructuredRecord> {
        let snapshot = StructuredRecord::new(self.shape.clone());
        for (name, value) in self.field_values()? {
            snapshot.store.set(&name, deep_copy(&value)?)?;
        }
        Ok(snapshot)
    }
}

fn deep_copy(value: &Value) -> TypesResult<Value> {
    match value {
        Value::List(list) => {
            let elements = list
                .read()
                .map_err(|_| TypesError::SyncError("Failed to lock list".to_string()))?;
            let copied = elements.iter().map(deep_copy).collect::<TypesResult<Vec<_>>>()?;
            Ok(Value::List(shared_list(copied)))
        }
        Value::Map(map) => {
            let entries = map
                .read()
                .map_err(|_| TypesError::SyncError("Failed to lock map".to_string()))?;
            let mut copied = HashMap::with_capacity(entries.len());
            for (key, item) in entries.iter() {
                copied.insert(key.clone(), deep_copy(item)?);
            }
            Ok(Value::Map(Arc::new(std::sync::RwLock::new(copied))))
        }
        Value::Record(record) => Ok(Value::Record(record.detach()?)),
        other => Ok(other.clone()),
    }
}
