//! Property descriptors: typed, composable field definitions.
//!
//! Every property of a schema is a [`Property`] carrying a name, a required
//! flag, an optional default and a [`PropertyKind`]. The kind is a closed sum
//! type so the validator and the JSON-Schema exporter can match exhaustively.

use crate::{error::Result, schema::Schema, Error, PropertyPath, TypeName};
use serde_json::{json, Map, Value};

/// The kind of a property, together with its constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// Text scalar with optional length bounds.
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    /// Numeric scalar with optional value bounds.
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    /// Whole-number subset of Number.
    Integer {
        minimum: Option<i64>,
        maximum: Option<i64>,
    },
    Boolean,
    /// Nested composite backed by a private subschema.
    Dict(Schema),
    /// Homogeneous list of one inner property.
    List(Box<Property>),
    /// Arbitrary nested JSON, accepted as-is.
    Json,
    /// Non-materializing relationship descriptor. Carries no instance data;
    /// reading it yields a query token.
    Link {
        target: TypeName,
        reverse: Option<String>,
        indexes: Vec<PropertyPath>,
    },
    /// Materializing reference to one document, stored as a bare id.
    EmbeddedLink { target: TypeName },
}

/// A typed property descriptor. The name is assigned at construction and
/// never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    required: bool,
    default: Option<Value>,
    kind: PropertyKind,
}

impl Property {
    fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: None,
            kind,
        }
    }

    /// A string property.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyKind::String {
                min_length: None,
                max_length: None,
            },
        )
    }

    /// A floating-point number property.
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyKind::Number {
                minimum: None,
                maximum: None,
            },
        )
    }

    /// An integer property.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyKind::Integer {
                minimum: None,
                maximum: None,
            },
        )
    }

    /// A boolean property.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Boolean)
    }

    /// A nested composite property backed by the given subschema.
    pub fn dict(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, PropertyKind::Dict(schema))
    }

    /// A homogeneous list property wrapping a single item property.
    pub fn list(name: impl Into<String>, item: Property) -> Self {
        Self::new(name, PropertyKind::List(Box::new(item)))
    }

    /// An untyped JSON property, accepted without validation.
    pub fn raw_json(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Json)
    }

    /// A relationship to another document class.
    pub fn link(name: impl Into<String>, target: impl Into<TypeName>) -> Self {
        Self::new(
            name,
            PropertyKind::Link {
                target: target.into(),
                reverse: None,
                indexes: Vec::new(),
            },
        )
    }

    /// A materializing reference to one document of another class.
    pub fn embedded_link(name: impl Into<String>, target: impl Into<TypeName>) -> Self {
        Self::new(name, PropertyKind::EmbeddedLink { target: target.into() })
    }

    /// Mark this property as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value applied when the property is unset.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Set the minimum length constraint (string properties).
    pub fn with_min_length(mut self, n: usize) -> Self {
        if let PropertyKind::String { min_length, .. } = &mut self.kind {
            *min_length = Some(n);
        } else {
            debug_assert!(false, "min_length on non-string property");
        }
        self
    }

    /// Set the maximum length constraint (string properties).
    pub fn with_max_length(mut self, n: usize) -> Self {
        if let PropertyKind::String { max_length, .. } = &mut self.kind {
            *max_length = Some(n);
        } else {
            debug_assert!(false, "max_length on non-string property");
        }
        self
    }

    /// Set the minimum value constraint (number and integer properties).
    pub fn with_minimum(mut self, n: f64) -> Self {
        match &mut self.kind {
            PropertyKind::Number { minimum, .. } => *minimum = Some(n),
            PropertyKind::Integer { minimum, .. } => *minimum = Some(n as i64),
            _ => debug_assert!(false, "minimum on non-numeric property"),
        }
        self
    }

    /// Set the maximum value constraint (number and integer properties).
    pub fn with_maximum(mut self, n: f64) -> Self {
        match &mut self.kind {
            PropertyKind::Number { maximum, .. } => *maximum = Some(n),
            PropertyKind::Integer { maximum, .. } => *maximum = Some(n as i64),
            _ => debug_assert!(false, "maximum on non-numeric property"),
        }
        self
    }

    /// Declare the reverse relation name (link properties). The mirrored
    /// property is generated on the target class at registry build time.
    pub fn with_reverse(mut self, name: impl Into<String>) -> Self {
        if let PropertyKind::Link { reverse, .. } = &mut self.kind {
            *reverse = Some(name.into());
        } else {
            debug_assert!(false, "reverse on non-link property");
        }
        self
    }

    /// Declare denormalized index paths snapshotted from the linked document
    /// at link-creation time (link properties).
    pub fn with_link_indexes<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let PropertyKind::Link { indexes, .. } = &mut self.kind {
            *indexes = paths.into_iter().map(Into::into).collect();
        } else {
            debug_assert!(false, "link indexes on non-link property");
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn is_link(&self) -> bool {
        matches!(self.kind, PropertyKind::Link { .. })
    }

    /// Validate a value against this property and return the canonical
    /// stored form. Composite kinds recurse; nothing is stored on failure.
    pub fn canonicalize(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match &self.kind {
            PropertyKind::String {
                min_length,
                max_length,
            } => {
                let s = value.as_str().ok_or_else(|| self.type_mismatch("string", value))?;
                let length = s.chars().count();
                if min_length.is_some_and(|min| length < min)
                    || max_length.is_some_and(|max| length > max)
                {
                    return Err(Error::LengthOutOfRange {
                        property: self.name.clone(),
                        length,
                    });
                }
                Ok(value.clone())
            }
            PropertyKind::Number { minimum, maximum } => {
                let n = value.as_f64().ok_or_else(|| self.type_mismatch("number", value))?;
                if minimum.is_some_and(|min| n < min) || maximum.is_some_and(|max| n > max) {
                    return Err(Error::ValueOutOfRange {
                        property: self.name.clone(),
                    });
                }
                Ok(value.clone())
            }
            PropertyKind::Integer { minimum, maximum } => {
                let n = value.as_i64().ok_or_else(|| self.type_mismatch("integer", value))?;
                if minimum.is_some_and(|min| n < min) || maximum.is_some_and(|max| n > max) {
                    return Err(Error::ValueOutOfRange {
                        property: self.name.clone(),
                    });
                }
                Ok(value.clone())
            }
            PropertyKind::Boolean => {
                if value.is_boolean() {
                    Ok(value.clone())
                } else {
                    Err(self.type_mismatch("boolean", value))
                }
            }
            PropertyKind::Dict(schema) => {
                let values = schema.instance_from_dict(value)?;
                Ok(Value::Object(values))
            }
            PropertyKind::List(item) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| self.type_mismatch("array", value))?;
                // Validate every item before accepting any: batch mutation
                // is atomic.
                let mut canonical = Vec::with_capacity(items.len());
                for entry in items {
                    canonical.push(item.canonicalize(entry)?);
                }
                Ok(Value::Array(canonical))
            }
            PropertyKind::Json => Ok(value.clone()),
            PropertyKind::Link { .. } => Err(self.type_mismatch("null", value)),
            PropertyKind::EmbeddedLink { .. } => {
                if value.is_string() {
                    Ok(value.clone())
                } else {
                    Err(self.type_mismatch("string (document id)", value))
                }
            }
        }
    }

    fn type_mismatch(&self, expected: &str, got: &Value) -> Error {
        Error::TypeMismatch {
            property: self.name.clone(),
            expected: expected.to_string(),
            got: json_type_name(got).to_string(),
        }
    }

    /// JSON-Schema-compatible descriptor for this property (draft-03 style,
    /// matching the wire form consumed by the design documents).
    pub fn schema_descriptor(&self) -> Value {
        let mut descriptor = Map::new();
        if self.required {
            descriptor.insert("required".into(), json!(true));
        }
        match &self.kind {
            PropertyKind::String {
                min_length,
                max_length,
            } => {
                descriptor.insert("type".into(), json!("string"));
                if let Some(default) = &self.default {
                    descriptor.insert("default".into(), default.clone());
                }
                if let Some(min) = min_length {
                    descriptor.insert("minLength".into(), json!(min));
                }
                if let Some(max) = max_length {
                    descriptor.insert("maxLength".into(), json!(max));
                }
            }
            PropertyKind::Number { minimum, maximum } => {
                descriptor.insert("type".into(), json!("number"));
                if let Some(default) = &self.default {
                    descriptor.insert("default".into(), default.clone());
                }
                if let Some(min) = minimum {
                    descriptor.insert("minimum".into(), json!(min));
                }
                if let Some(max) = maximum {
                    descriptor.insert("maximum".into(), json!(max));
                }
            }
            PropertyKind::Integer { minimum, maximum } => {
                descriptor.insert("type".into(), json!("integer"));
                if let Some(default) = &self.default {
                    descriptor.insert("default".into(), default.clone());
                }
                if let Some(min) = minimum {
                    descriptor.insert("minimum".into(), json!(min));
                }
                if let Some(max) = maximum {
                    descriptor.insert("maximum".into(), json!(max));
                }
            }
            PropertyKind::Boolean => {
                descriptor.insert("type".into(), json!("boolean"));
            }
            PropertyKind::Dict(schema) => {
                if let Value::Object(nested) = schema.to_schema_json() {
                    for (key, value) in nested {
                        descriptor.insert(key, value);
                    }
                }
            }
            PropertyKind::List(item) => {
                descriptor.insert("items".into(), item.schema_descriptor());
            }
            PropertyKind::Json => {
                descriptor.insert("type".into(), json!("object"));
            }
            PropertyKind::Link { target, .. } => {
                descriptor.insert("href".into(), json!(format!("/{}", self.name)));
                descriptor.insert("rel".into(), json!(self.name));
                descriptor.insert("$targetSchema".into(), json!(format!("{target}#")));
            }
            PropertyKind::EmbeddedLink { target } => {
                descriptor.insert(
                    "type".into(),
                    json!([{ "$ref": format!("{target}#") }, "string"]),
                );
            }
        }
        Value::Object(descriptor)
    }
}

/// Human-readable name of a JSON value's type, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_validation() {
        let prop = Property::string("name").with_min_length(3).with_max_length(5);

        assert!(prop.canonicalize(&json!("abcd")).is_ok());
        assert!(matches!(
            prop.canonicalize(&json!("ab")),
            Err(Error::LengthOutOfRange { length: 2, .. })
        ));
        assert!(matches!(
            prop.canonicalize(&json!("abcdef")),
            Err(Error::LengthOutOfRange { length: 6, .. })
        ));
        assert!(matches!(
            prop.canonicalize(&json!(42)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn number_validation() {
        let prop = Property::number("score").with_minimum(5.0).with_maximum(10.0);

        assert!(prop.canonicalize(&json!(7.5)).is_ok());
        assert!(matches!(
            prop.canonicalize(&json!(4)),
            Err(Error::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            prop.canonicalize(&json!(11)),
            Err(Error::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            prop.canonicalize(&json!("seven")),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn integer_rejects_fractions() {
        let prop = Property::integer("count");

        assert!(prop.canonicalize(&json!(4)).is_ok());
        assert!(matches!(
            prop.canonicalize(&json!(4.4)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn boolean_validation() {
        let prop = Property::boolean("active");

        assert!(prop.canonicalize(&json!(true)).is_ok());
        assert!(matches!(
            prop.canonicalize(&json!(2)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn null_is_accepted_as_unset() {
        // Required-ness is enforced at schema import, not per value.
        let prop = Property::string("name").required();
        assert_eq!(prop.canonicalize(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn list_batch_is_atomic() {
        let prop = Property::list("tags", Property::string("tags"));

        let err = prop.canonicalize(&json!(["ok", 42]));
        assert!(matches!(err, Err(Error::TypeMismatch { .. })));

        let ok = prop.canonicalize(&json!(["a", "b"])).unwrap();
        assert_eq!(ok, json!(["a", "b"]));
    }

    #[test]
    fn embedded_link_stores_bare_id() {
        let prop = Property::embedded_link("best_pet", "pet");

        assert_eq!(prop.canonicalize(&json!("pet-1")).unwrap(), json!("pet-1"));
        assert!(matches!(
            prop.canonicalize(&json!({"wrong_property": 23})),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn link_carries_no_instance_data() {
        let prop = Property::link("related_pets", "pet");

        assert_eq!(prop.canonicalize(&Value::Null).unwrap(), Value::Null);
        assert!(prop.canonicalize(&json!("pet-1")).is_err());
    }

    #[test]
    fn string_descriptor() {
        let prop = Property::string("name")
            .required()
            .with_default(json!("joe bloggs"))
            .with_min_length(2);

        assert_eq!(
            prop.schema_descriptor(),
            json!({
                "required": true,
                "type": "string",
                "default": "joe bloggs",
                "minLength": 2
            })
        );
    }

    #[test]
    fn link_descriptor() {
        let prop = Property::link("related_pets", "pet");
        assert_eq!(
            prop.schema_descriptor(),
            json!({
                "href": "/related_pets",
                "rel": "related_pets",
                "$targetSchema": "pet#"
            })
        );
    }

    #[test]
    fn embedded_link_descriptor() {
        let prop = Property::embedded_link("best_pet", "pet");
        assert_eq!(
            prop.schema_descriptor(),
            json!({"type": [{"$ref": "pet#"}, "string"]})
        );
    }
}
