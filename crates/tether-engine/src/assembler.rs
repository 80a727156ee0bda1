// Result assembler
//
// Maps pipeline variables back into a declared output record. Lazily
// produced sequences bound to declared output fields are materialized
// first: the result crosses an execution boundary where the producer's
// lazy-evaluation machinery is no longer reachable by the consumer.

use std::sync::Arc;

use tether_error::{EngineResult, TypesError};
use tether_types::{adapt, shared_list, CollectionBridge, FieldType, RecordShape, SharedMap, StructuredRecord, Value};

/// Assembles declared output records from a script pipeline.
pub struct ResultAssembler {
    bridge: Arc<CollectionBridge>,
}

impl ResultAssembler {
    pub fn new(bridge: Arc<CollectionBridge>) -> Self {
        ResultAssembler { bridge }
    }

    /// Replace lazy stream values of declared output fields with
    /// concrete lists. Pipeline variables outside the output shape are
    /// left untouched; internal series may be deliberately unbounded.
    pub fn materialize_outputs(
        &self,
        pipeline: &SharedMap,
        shape: &Arc<RecordShape>,
    ) -> EngineResult<()> {
        for field in shape.all_fields() {
            let existing = {
                let entries = pipeline.read().map_err(|_| {
                    TypesError::SyncError("Failed to lock pipeline".to_string())
                })?;
                entries.get(&field.name).cloned()
            };
            if let Some(Value::Stream(stream)) = existing {
                let items = stream.drain()?;
                let mut entries = pipeline.write().map_err(|_| {
                    TypesError::SyncError("Failed to lock pipeline".to_string())
                })?;
                entries.insert(field.name.clone(), Value::List(shared_list(items)));
            }
        }
        Ok(())
    }

    /// Build the output record by reading each declared field's pipeline
    /// variable, adapting structured values to the declared shapes.
    pub fn assemble(
        &self,
        pipeline: &SharedMap,
        shape: &Arc<RecordShape>,
    ) -> EngineResult<StructuredRecord> {
        let output = StructuredRecord::new(shape.clone());
        for field in shape.all_fields() {
            let value = {
                let entries = pipeline.read().map_err(|_| {
                    TypesError::SyncError("Failed to lock pipeline".to_string())
                })?;
                entries.get(&field.name).cloned()
            };
            let Some(value) = value else {
                continue;
            };
            if value.is_null() {
                output.set(&field.name, Value::Null)?;
                continue;
            }
            match &field.field_type {
                FieldType::Record(element_shape) if field.is_list => {
                    let sequence = self.bridge.as_sequence(&value)?;
                    for (index, item) in sequence.into_iter().enumerate() {
                        // null elements pass through, no adaptation attempted
                        let mapped = if item.is_null() {
                            item
                        } else {
                            Value::Record(adapt(&item, element_shape)?)
                        };
                        output.set_element(&field.name, index, mapped)?;
                    }
                }
                FieldType::Record(target) => {
                    output.set(&field.name, Value::Record(adapt(&value, target)?))?;
                }
                _ => output.set(&field.name, value)?,
            }
        }
        Ok(output)
    }
}
