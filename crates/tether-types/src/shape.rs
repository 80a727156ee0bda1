// Record shapes
//
// A record shape is a named, ordered set of field descriptions. Shapes can
// extend one another; a value whose shape is upcast-reachable to a target
// shape can be used directly as the target without masking.

use std::sync::Arc;

/// Scalar type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Bool,
    Integer,
    Float,
    String,
}

impl ScalarType {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::String => "string",
        }
    }
}

/// Declared type of a field.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// Accepts anything, values pass through unadapted
    Any,
    /// A scalar value
    Scalar(ScalarType),
    /// A structured record of the given shape (the element shape for
    /// list-cardinality fields)
    Record(Arc<RecordShape>),
}

impl FieldType {
    /// Identifier of the declared type, if it has one.
    pub fn type_id(&self) -> Option<String> {
        match self {
            FieldType::Any => None,
            FieldType::Scalar(scalar) => Some(scalar.name().to_string()),
            FieldType::Record(shape) => Some(shape.name().to_string()),
        }
    }
}

/// Description of a single field in a record shape.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Declared type
    pub field_type: FieldType,
    /// Whether the field holds a sequence of values
    pub is_list: bool,
    /// Whether a read through a mask must fail when the field is absent
    pub required: bool,
    /// Collection handler strategy for list fields; `None` means the
    /// default ordered list
    pub collection: Option<String>,
}

impl FieldDescriptor {
    /// Create a new optional scalar-cardinality field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDescriptor {
            name: name.into(),
            field_type,
            is_list: false,
            required: false,
            collection: None,
        }
    }

    /// Mark the field as list-cardinality.
    pub fn as_list(mut self) -> Self {
        self.is_list = true;
        self
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Select a collection handler strategy for this field.
    pub fn with_collection(mut self, strategy: impl Into<String>) -> Self {
        self.collection = Some(strategy.into());
        self
    }
}

/// A named, ordered set of field descriptions.
#[derive(Debug, Clone)]
pub struct RecordShape {
    name: String,
    fields: Vec<FieldDescriptor>,
    extends: Option<Arc<RecordShape>>,
}

impl RecordShape {
    /// Create a new empty shape.
    pub fn new(name: impl Into<String>) -> Self {
        RecordShape {
            name: name.into(),
            fields: Vec::new(),
            extends: None,
        }
    }

    /// Append a field description.
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare this shape as extending a parent shape.
    pub fn extending(mut self, parent: Arc<RecordShape>) -> Self {
        self.extends = Some(parent);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<RecordShape>> {
        self.extends.as_ref()
    }

    /// Fields declared directly on this shape.
    pub fn own_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// All fields in declaration order, inherited ones first.
    pub fn all_fields(&self) -> Vec<&FieldDescriptor> {
        let mut fields = match &self.extends {
            Some(parent) => parent.all_fields(),
            None => Vec::new(),
        };
        fields.extend(self.fields.iter());
        fields
    }

    /// Look up a field by name, searching the upcast chain.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .or_else(|| self.extends.as_ref().and_then(|parent| parent.field(name)))
    }

    /// Whether `from` can be used directly as `to` via the upcast
    /// relation. Shapes are compared by identity.
    pub fn upcast_reachable(from: &Arc<RecordShape>, to: &Arc<RecordShape>) -> bool {
        let mut current = Some(from.clone());
        while let Some(shape) = current {
            if Arc::ptr_eq(&shape, to) {
                return true;
            }
            current = shape.extends.clone();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup_follows_upcast_chain() {
        let base = Arc::new(
            RecordShape::new("base")
                .with_field(FieldDescriptor::new("id", FieldType::Scalar(ScalarType::String))),
        );
        let derived = Arc::new(
            RecordShape::new("derived")
                .extending(base.clone())
                .with_field(FieldDescriptor::new("label", FieldType::Scalar(ScalarType::String))),
        );

        assert!(derived.field("id").is_some());
        assert!(derived.field("label").is_some());
        assert!(base.field("label").is_none());

        let names: Vec<_> = derived.all_fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "label"]);
    }

    #[test]
    fn test_upcast_reachability() {
        let base = Arc::new(RecordShape::new("base"));
        let derived = Arc::new(RecordShape::new("derived").extending(base.clone()));
        let sibling = Arc::new(RecordShape::new("sibling").extending(base.clone()));

        assert!(RecordShape::upcast_reachable(&derived, &base));
        assert!(RecordShape::upcast_reachable(&derived, &derived));
        assert!(!RecordShape::upcast_reachable(&base, &derived));
        assert!(!RecordShape::upcast_reachable(&derived, &sibling));
    }
}
