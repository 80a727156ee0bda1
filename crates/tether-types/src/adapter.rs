// Structural adapter
//
// Produces a value of a target record shape from an arbitrary value,
// preferring the zero-copy paths: an already-conforming record passes
// through untouched, everything else that exposes fields is masked.

use std::sync::Arc;

use tether_error::{TypesError, TypesResult};

use crate::record::StructuredRecord;
use crate::shape::RecordShape;
use crate::value::{SharedMap, Value};

/// Adapt a value to the target shape.
///
/// - A record whose shape is exactly the target or upcast-reachable to
///   it is returned as-is, sharing storage.
/// - Any other record is masked.
/// - A plain mapping becomes a record view over that mapping.
/// - A host object becomes an introspected-field view.
/// - Scalars, lists and streams expose no fields and fail immediately.
///
/// Masking never copies field data; missing-field failures are deferred
/// to the first read of the missing field.
pub fn adapt(value: &Value, target: &Arc<RecordShape>) -> TypesResult<StructuredRecord> {
    match value {
        Value::Record(record) => {
            if record.conforms_to(target) {
                Ok(record.clone())
            } else {
                Ok(record.mask_as(target.clone()))
            }
        }
        Value::Map(map) => Ok(StructuredRecord::over_map(target.clone(), map.clone())),
        Value::Object(object) => Ok(StructuredRecord::over_object(target.clone(), object.clone())),
        other => Err(TypesError::AdaptationError(format!(
            "{} exposes no fields to mask as {}",
            other.type_name(),
            target.name()
        ))),
    }
}

/// Adapt an execution context's pipeline to the target shape. The caller
/// extracts the pipeline; no runtime type inspection happens here.
pub fn adapt_pipeline(pipeline: &SharedMap, target: &Arc<RecordShape>) -> StructuredRecord {
    StructuredRecord::over_map(target.clone(), pipeline.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{FieldDescriptor, FieldType, ScalarType};
    use crate::value::shared_map;

    fn wide_shape() -> Arc<RecordShape> {
        Arc::new(
            RecordShape::new("wide")
                .with_field(FieldDescriptor::new("a", FieldType::Scalar(ScalarType::Integer)))
                .with_field(FieldDescriptor::new("b", FieldType::Scalar(ScalarType::Integer))),
        )
    }

    fn narrow_shape() -> Arc<RecordShape> {
        Arc::new(
            RecordShape::new("narrow")
                .with_field(FieldDescriptor::new("a", FieldType::Scalar(ScalarType::Integer))),
        )
    }

    #[test]
    fn test_conforming_record_passes_through_zero_copy() {
        let shape = wide_shape();
        let record = StructuredRecord::new(shape.clone());
        record.set("a", Value::Integer(1)).unwrap();

        let adapted = adapt(&Value::Record(record.clone()), &shape).unwrap();
        assert!(adapted.shares_store_with(&record));

        // mutation through the adapted view is observable on the original
        adapted.set("a", Value::Integer(2)).unwrap();
        assert_eq!(record.get("a").unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_upcast_reachable_record_is_not_masked() {
        let base = narrow_shape();
        let derived = Arc::new(RecordShape::new("derived").extending(base.clone()));
        let record = StructuredRecord::new(derived);
        record.set("a", Value::Integer(9)).unwrap();

        let adapted = adapt(&Value::Record(record.clone()), &base).unwrap();
        assert!(adapted.shares_store_with(&record));
        // the shape is left as the derived one, exactly as received
        assert_eq!(adapted.shape().name(), "derived");
    }

    #[test]
    fn test_unrelated_record_is_masked() {
        let record = StructuredRecord::new(wide_shape());
        record.set("a", Value::Integer(3)).unwrap();
        record.set("b", Value::Integer(4)).unwrap();

        let masked = adapt(&Value::Record(record.clone()), &narrow_shape()).unwrap();
        assert_eq!(masked.shape().name(), "narrow");
        assert!(masked.shares_store_with(&record));
        assert_eq!(masked.get("a").unwrap(), Value::Integer(3));
        // the mask hides fields the target shape does not declare
        assert!(masked.get("b").is_err());
    }

    #[test]
    fn test_map_becomes_a_view_not_a_copy() {
        let map = shared_map();
        map.write()
            .unwrap()
            .insert("a".to_string(), Value::Integer(5));

        let adapted = adapt(&Value::Map(map.clone()), &narrow_shape()).unwrap();
        assert_eq!(adapted.get("a").unwrap(), Value::Integer(5));

        adapted.set("a", Value::Integer(6)).unwrap();
        assert_eq!(map.read().unwrap().get("a"), Some(&Value::Integer(6)));
    }

    #[test]
    fn test_scalar_fails_immediately() {
        assert!(matches!(
            adapt(&Value::Integer(1), &narrow_shape()),
            Err(TypesError::AdaptationError(_))
        ));
    }
}
