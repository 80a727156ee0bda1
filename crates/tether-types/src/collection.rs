// Collection bridge
//
// Abstracts over "list-like" values: native lists, lazy streams and
// single scalars treated as one-element sequences. Container creation and
// index writes go through a pluggable handler chosen by the target
// field's declared collection strategy.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tether_error::{TypesError, TypesResult};

use crate::shape::FieldDescriptor;
use crate::value::{shared_list, Value};

/// Strategy name of the default ordered list handler.
pub const DEFAULT_STRATEGY: &str = "list";

/// A pluggable container representation strategy.
pub trait CollectionHandler: Send + Sync {
    /// Create a container sized for `len` elements.
    fn create(&self, len: usize) -> Value;

    /// Write element `index`, growing the container if needed.
    fn set_at(&self, container: &Value, index: usize, item: Value) -> TypesResult<()>;

    /// Read every element of the container.
    fn elements(&self, container: &Value) -> TypesResult<Vec<Value>>;
}

/// Default strategy: a shared ordered list.
#[derive(Debug, Default)]
pub struct ListHandler;

impl CollectionHandler for ListHandler {
    fn create(&self, len: usize) -> Value {
        Value::List(shared_list(vec![Value::Null; len]))
    }

    fn set_at(&self, container: &Value, index: usize, item: Value) -> TypesResult<()> {
        let Value::List(list) = container else {
            return Err(TypesError::NoHandlerError(container.type_name().to_string()));
        };
        let mut elements = list
            .write()
            .map_err(|_| TypesError::SyncError("Failed to lock list container".to_string()))?;
        if elements.len() <= index {
            elements.resize(index + 1, Value::Null);
        }
        elements[index] = item;
        Ok(())
    }

    fn elements(&self, container: &Value) -> TypesResult<Vec<Value>> {
        match container.list_elements()? {
            Some(elements) => Ok(elements),
            None => Err(TypesError::NoHandlerError(container.type_name().to_string())),
        }
    }
}

/// Registry of collection handlers, keyed by strategy name.
pub struct CollectionBridge {
    handlers: RwLock<HashMap<String, Arc<dyn CollectionHandler>>>,
}

impl CollectionBridge {
    /// Create a bridge with the default list strategy registered.
    pub fn new() -> Self {
        let bridge = CollectionBridge {
            handlers: RwLock::new(HashMap::new()),
        };
        bridge.register(DEFAULT_STRATEGY, Arc::new(ListHandler));
        bridge
    }

    /// Register a handler under a strategy name.
    pub fn register(&self, strategy: impl Into<String>, handler: Arc<dyn CollectionHandler>) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(strategy.into(), handler);
        }
    }

    /// Look up a handler by strategy name. An unregistered strategy is a
    /// fatal `NoHandlerError`, not retried.
    pub fn handler(&self, strategy: &str) -> TypesResult<Arc<dyn CollectionHandler>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| TypesError::SyncError("Failed to lock handler registry".to_string()))?;
        handlers
            .get(strategy)
            .cloned()
            .ok_or_else(|| TypesError::NoHandlerError(strategy.to_string()))
    }

    /// Resolve the handler for a field's declared collection strategy,
    /// defaulting to the ordered list.
    pub fn handler_for(&self, field: &FieldDescriptor) -> TypesResult<Arc<dyn CollectionHandler>> {
        self.handler(field.collection.as_deref().unwrap_or(DEFAULT_STRATEGY))
    }

    /// View a value as a sequence: lists yield their elements, lazy
    /// streams are drained, and anything else becomes a one-element
    /// sequence.
    pub fn as_sequence(&self, value: &Value) -> TypesResult<Vec<Value>> {
        match value {
            Value::List(_) => Ok(value.list_elements()?.unwrap_or_default()),
            Value::Stream(stream) => stream.drain(),
            other => Ok(vec![other.clone()]),
        }
    }
}

impl Default for CollectionBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CollectionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategies: Vec<String> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("CollectionBridge")
            .field("strategies", &strategies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueStream;

    #[test]
    fn test_scalar_is_a_singleton_sequence() {
        let bridge = CollectionBridge::new();
        let sequence = bridge.as_sequence(&Value::Integer(42)).unwrap();
        assert_eq!(sequence, vec![Value::Integer(42)]);
    }

    #[test]
    fn test_list_roundtrip_preserves_order() {
        let bridge = CollectionBridge::new();
        let handler = bridge.handler(DEFAULT_STRATEGY).unwrap();

        let container = handler.create(3);
        for (index, item) in ["x", "y", "z"].iter().enumerate() {
            handler.set_at(&container, index, Value::from(*item)).unwrap();
        }

        let elements = bridge.as_sequence(&container).unwrap();
        assert_eq!(
            elements,
            vec![Value::from("x"), Value::from("y"), Value::from("z")]
        );
    }

    #[test]
    fn test_stream_is_materialized() {
        let bridge = CollectionBridge::new();
        let stream = Value::Stream(ValueStream::new((0..4).map(Value::Integer)));
        let sequence = bridge.as_sequence(&stream).unwrap();
        assert_eq!(sequence.len(), 4);
    }

    #[test]
    fn test_unknown_strategy_is_fatal() {
        let bridge = CollectionBridge::new();
        assert!(matches!(
            bridge.handler("ring-buffer"),
            Err(TypesError::NoHandlerError(_))
        ));
    }
}
