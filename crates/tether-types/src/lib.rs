// Tether value model and structural type bridge
//
// This crate provides the dynamic value representation shared with the
// scripting runtime, the record shapes describing structured service
// interfaces, and the zero-copy masking machinery that converts between
// the two. Nothing in here executes services; it only describes and
// reshapes values.

pub mod adapter;
pub mod collection;
pub mod record;
pub mod shape;
pub mod value;

pub use adapter::adapt;
pub use collection::{CollectionBridge, CollectionHandler, ListHandler, DEFAULT_STRATEGY};
pub use record::{FieldStore, ObjectFields, StructuredRecord};
pub use shape::{FieldDescriptor, FieldType, RecordShape, ScalarType};
pub use value::{shared_list, shared_map, ListValue, SharedMap, Value, ValueStream};
