// Argument binder
//
// Consumes positionally-evaluated argument values and a target input
// shape. Binding is strictly positional and left-to-right; missing
// trailing arguments leave their fields unset so service-side defaults
// apply. When the final field is list-typed and varargs are enabled, it
// absorbs every remaining positional argument as one flattened sequence.

use std::sync::Arc;

use tether_error::EngineResult;
use tether_types::{adapt, CollectionBridge, FieldDescriptor, FieldType, RecordShape, StructuredRecord, Value};

/// Builds a conforming input record from evaluated call arguments.
pub struct ArgumentBinder {
    bridge: Arc<CollectionBridge>,
    allow_varargs: bool,
}

impl ArgumentBinder {
    pub fn new(bridge: Arc<CollectionBridge>) -> Self {
        ArgumentBinder {
            bridge,
            allow_varargs: true,
        }
    }

    pub fn with_varargs(mut self, allow_varargs: bool) -> Self {
        self.allow_varargs = allow_varargs;
        self
    }

    /// Bind `args` onto a fresh record of the input shape. A `Null`
    /// argument consumes its position but leaves the field unset.
    pub fn bind(&self, args: &[Value], shape: &Arc<RecordShape>) -> EngineResult<StructuredRecord> {
        let input = StructuredRecord::new(shape.clone());
        let fields = shape.all_fields();
        let mut counter = 0;

        for (index, field) in fields.iter().enumerate() {
            if counter >= args.len() {
                break;
            }
            let is_varargs =
                self.allow_varargs && index == fields.len() - 1 && field.is_list;
            let repeats = if is_varargs { args.len() - counter } else { 1 };

            // running element offset into the flattened varargs sequence
            let mut offset = 0;
            for _ in 0..repeats {
                let value = &args[counter];
                if !value.is_null() {
                    if field.is_list {
                        offset = self.append_sequence(&input, field, value, offset)?;
                    } else {
                        input.set(&field.name, self.bind_single(field, value)?)?;
                    }
                }
                counter += 1;
            }
        }
        Ok(input)
    }

    /// Flatten one argument into the field's container, starting at
    /// `offset`. Returns the offset after the appended elements.
    fn append_sequence(
        &self,
        input: &StructuredRecord,
        field: &FieldDescriptor,
        value: &Value,
        offset: usize,
    ) -> EngineResult<usize> {
        let sequence = self.bridge.as_sequence(value)?;
        let handler = self.bridge.handler_for(field)?;

        // peek, not get: a required field that is still absent must not
        // fail its own first write
        let container = match input.peek(&field.name)? {
            None | Some(Value::Null) => {
                let container = handler.create(sequence.len());
                input.set(&field.name, container.clone())?;
                container
            }
            Some(existing) => existing,
        };

        let mut position = offset;
        for item in sequence {
            let adapted = self.bind_element(field, item)?;
            handler.set_at(&container, position, adapted)?;
            position += 1;
        }
        Ok(position)
    }

    /// Adapt one element of a list argument. `Null` elements pass
    /// through without adaptation.
    fn bind_element(&self, field: &FieldDescriptor, item: Value) -> EngineResult<Value> {
        if item.is_null() {
            return Ok(item);
        }
        match &field.field_type {
            FieldType::Record(element_shape) => match &item {
                Value::Record(record) if record.conforms_to(element_shape) => Ok(item),
                _ => Ok(Value::Record(adapt(&item, element_shape)?)),
            },
            _ => Ok(item),
        }
    }

    /// Adapt a scalar-cardinality argument to its field.
    fn bind_single(&self, field: &FieldDescriptor, value: &Value) -> EngineResult<Value> {
        match &field.field_type {
            FieldType::Record(target) => match value {
                Value::Record(record) if record.conforms_to(target) => Ok(value.clone()),
                _ => Ok(Value::Record(adapt(value, target)?)),
            },
            _ => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::{shared_list, shared_map, FieldDescriptor, ScalarType, ValueStream};

    fn binder() -> ArgumentBinder {
        ArgumentBinder::new(Arc::new(CollectionBridge::new()))
    }

    fn scalar_field(name: &str) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldType::Scalar(ScalarType::Integer))
    }

    #[test]
    fn test_positional_binding_leaves_trailing_fields_unset() {
        let shape = Arc::new(
            RecordShape::new("input")
                .with_field(scalar_field("a"))
                .with_field(scalar_field("b"))
                .with_field(scalar_field("c")),
        );

        let input = binder()
            .bind(&[Value::Integer(1), Value::Integer(2)], &shape)
            .unwrap();

        assert_eq!(input.get("a").unwrap(), Value::Integer(1));
        assert_eq!(input.get("b").unwrap(), Value::Integer(2));
        assert_eq!(input.get("c").unwrap(), Value::Null);
    }

    #[test]
    fn test_null_argument_consumes_position_without_binding() {
        let shape = Arc::new(
            RecordShape::new("input")
                .with_field(scalar_field("a"))
                .with_field(scalar_field("b")),
        );

        let input = binder()
            .bind(&[Value::Null, Value::Integer(2)], &shape)
            .unwrap();

        assert_eq!(input.get("a").unwrap(), Value::Null);
        assert_eq!(input.get("b").unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_varargs_flattens_mixed_arguments_in_order() {
        let shape = Arc::new(
            RecordShape::new("input").with_field(scalar_field("values").as_list()),
        );

        // a list, a scalar and a stream collapse into one flat sequence
        let args = vec![
            Value::List(shared_list(vec![Value::Integer(1), Value::Integer(2)])),
            Value::Integer(3),
            Value::Stream(ValueStream::new((4..6).map(Value::Integer))),
        ];
        let input = binder().bind(&args, &shape).unwrap();

        let bound = input.get("values").unwrap().list_elements().unwrap().unwrap();
        assert_eq!(
            bound,
            vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(4),
                Value::Integer(5),
            ]
        );
    }

    #[test]
    fn test_varargs_disabled_binds_only_the_first_argument() {
        let shape = Arc::new(
            RecordShape::new("input").with_field(scalar_field("values").as_list()),
        );

        let args = vec![Value::Integer(1), Value::Integer(2)];
        let input = binder().with_varargs(false).bind(&args, &shape).unwrap();

        let bound = input.get("values").unwrap().list_elements().unwrap().unwrap();
        assert_eq!(bound, vec![Value::Integer(1)]);
    }

    #[test]
    fn test_required_list_field_binds() {
        let shape = Arc::new(
            RecordShape::new("input").with_field(scalar_field("parts").as_list().required()),
        );

        let args = vec![Value::List(shared_list(vec![
            Value::Integer(1),
            Value::Integer(2),
        ]))];
        let input = binder().bind(&args, &shape).unwrap();

        let parts = input.get("parts").unwrap().list_elements().unwrap().unwrap();
        assert_eq!(parts, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_record_field_adapts_maps() {
        let person = Arc::new(RecordShape::new("person").with_field(FieldDescriptor::new(
            "name",
            FieldType::Scalar(ScalarType::String),
        )));
        let shape = Arc::new(RecordShape::new("input").with_field(FieldDescriptor::new(
            "who",
            FieldType::Record(person),
        )));

        let map = shared_map();
        map.write()
            .unwrap()
            .insert("name".to_string(), Value::from("zoe"));

        let input = binder().bind(&[Value::Map(map)], &shape).unwrap();
        let Value::Record(who) = input.get("who").unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(who.get("name").unwrap(), Value::from("zoe"));
    }

    #[test]
    fn test_varargs_elements_are_adapted_independently() {
        let person = Arc::new(RecordShape::new("person").with_field(FieldDescriptor::new(
            "name",
            FieldType::Scalar(ScalarType::String),
        )));
        let shape = Arc::new(RecordShape::new("input").with_field(
            FieldDescriptor::new("people", FieldType::Record(person.clone())).as_list(),
        ));

        // mix a pre-shaped record with a plain map
        let shaped = StructuredRecord::new(person.clone());
        shaped.set("name", Value::from("ann")).unwrap();
        let map = shared_map();
        map.write()
            .unwrap()
            .insert("name".to_string(), Value::from("ben"));

        let args = vec![Value::Record(shaped.clone()), Value::Map(map)];
        let input = binder().bind(&args, &shape).unwrap();

        let people = input.get("people").unwrap().list_elements().unwrap().unwrap();
        assert_eq!(people.len(), 2);
        let Value::Record(first) = &people[0] else {
            panic!("expected a record");
        };
        // the conforming record passed through without masking
        assert!(first.shares_store_with(&shaped));
    }

    #[test]
    fn test_null_list_elements_pass_through() {
        let person = Arc::new(RecordShape::new("person"));
        let shape = Arc::new(RecordShape::new("input").with_field(
            FieldDescriptor::new("people", FieldType::Record(person)).as_list(),
        ));

        let args = vec![Value::List(shared_list(vec![Value::Null]))];
        let input = binder().bind(&args, &shape).unwrap();

        let people = input.get("people").unwrap().list_elements().unwrap().unwrap();
        assert_eq!(people, vec![Value::Null]);
    }
}
