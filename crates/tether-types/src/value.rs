// Dynamic script values
//
// The scripting runtime operates on untyped, named variables. Everything
// that crosses the bridge is represented as a `Value`. Container variants
// share their storage through `Arc`, so cloning a value never copies
// field or element data; that sharing is what makes masking zero-copy.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tether_error::{TypesError, TypesResult};

use crate::record::{ObjectFields, StructuredRecord};

/// Shared name-to-value storage, the pipeline's representation.
pub type SharedMap = Arc<RwLock<HashMap<String, Value>>>;

/// Shared ordered element storage for list containers.
pub type ListValue = Arc<RwLock<Vec<Value>>>;

/// Create a fresh empty shared map.
pub fn shared_map() -> SharedMap {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Create a shared list over the given elements.
pub fn shared_list(items: Vec<Value>) -> ListValue {
    Arc::new(RwLock::new(items))
}

/// A lazily-produced sequence of values.
///
/// The producer runs at most once: draining takes it out of the slot, so a
/// second drain observes an empty sequence. Sequences must be drained
/// before they cross an execution boundary where the producer is no longer
/// reachable.
#[derive(Clone)]
pub struct ValueStream {
    producer: Arc<Mutex<Option<Box<dyn Iterator<Item = Value> + Send>>>>,
}

impl ValueStream {
    /// Wrap an iterator as a lazy value stream.
    pub fn new<I>(producer: I) -> Self
    where
        I: Iterator<Item = Value> + Send + 'static,
    {
        ValueStream {
            producer: Arc::new(Mutex::new(Some(Box::new(producer)))),
        }
    }

    /// Run the producer to completion, yielding every element.
    ///
    /// Draining consumes the producer; subsequent drains yield nothing.
    pub fn drain(&self) -> TypesResult<Vec<Value>> {
        let mut slot = self
            .producer
            .lock()
            .map_err(|_| TypesError::SyncError("Failed to lock stream producer".to_string()))?;
        match slot.take() {
            Some(iterator) => Ok(iterator.collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Whether the producer has already been consumed.
    pub fn is_drained(&self) -> TypesResult<bool> {
        let slot = self
            .producer
            .lock()
            .map_err(|_| TypesError::SyncError("Failed to lock stream producer".to_string()))?;
        Ok(slot.is_none())
    }
}

impl fmt::Debug for ValueStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ValueStream")
    }
}

/// A dynamically-typed script value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / unset
    Null,
    /// Boolean scalar
    Bool(bool),
    /// Integer scalar
    Integer(i64),
    /// Floating point scalar
    Float(f64),
    /// String scalar
    String(String),
    /// Shared ordered collection
    List(ListValue),
    /// Plain name-to-value mapping without a declared shape
    Map(SharedMap),
    /// A value conforming to a record shape
    Record(StructuredRecord),
    /// A lazily-produced sequence
    Stream(ValueStream),
    /// A host object exposing introspectable fields
    Object(Arc<dyn ObjectFields>),
}

impl Value {
    /// Whether this value is the absent marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A short name for the value's runtime representation, used in
    /// error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
            Value::Stream(_) => "stream",
            Value::Object(_) => "object",
        }
    }

    /// Read the elements of a list value.
    pub fn list_elements(&self) -> TypesResult<Option<Vec<Value>>> {
        match self {
            Value::List(list) => {
                let elements = list
                    .read()
                    .map_err(|_| TypesError::SyncError("Failed to lock list".to_string()))?;
                Ok(Some(elements.clone()))
            }
            _ => Ok(None),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                match (a.read(), b.read()) {
                    (Ok(left), Ok(right)) => *left == *right,
                    _ => false,
                }
            }
            (Value::Map(a), Value::Map(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                match (a.read(), b.read()) {
                    (Ok(left), Ok(right)) => *left == *right,
                    _ => false,
                }
            }
            // Records, streams and host objects compare by storage identity.
            (Value::Record(a), Value::Record(b)) => a.shares_store_with(b),
            (Value::Stream(a), Value::Stream(b)) => Arc::ptr_eq(&a.producer, &b.producer),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(shared_list(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(flag) => Value::Bool(flag),
            serde_json::Value::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    Value::Integer(integer)
                } else {
                    Value::Float(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(text) => Value::String(text),
            serde_json::Value::Array(items) => {
                Value::List(shared_list(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(entries) => {
                let map: HashMap<String, Value> = entries
                    .into_iter()
                    .map(|(key, item)| (key, Value::from(item)))
                    .collect();
                Value::Map(Arc::new(RwLock::new(map)))
            }
        }
    }
}
