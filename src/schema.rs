//! Schema: a named, ordered set of properties.
//!
//! Schemas are descriptor tables, built once at registration time and
//! immutable afterwards. They perform strict dict import/export and export
//! themselves as JSON-Schema for the per-class design documents.

use crate::{
    error::Result,
    property::{Property, PropertyKind},
    Error,
};
use serde_json::{json, Map, Value};

/// URI of the JSON-Schema draft carried by root schemas.
pub const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-03/schema#";

/// An ordered, named set of property descriptors.
///
/// Root schemas describe a document class and carry full JSON-Schema
/// metadata; nested subschemas back `Dict` properties and carry only
/// `type` and `properties` on export.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    is_root: bool,
    properties: Vec<Property>,
}

impl Schema {
    /// Build a root schema. Fails on duplicate property names or invalid
    /// declared defaults.
    pub fn root(name: impl Into<String>, properties: Vec<Property>) -> Result<Self> {
        Self::build(name.into(), true, properties)
    }

    /// Build a nested subschema for a `Dict` property.
    pub fn nested(properties: Vec<Property>) -> Result<Self> {
        Self::build(String::new(), false, properties)
    }

    fn build(name: String, is_root: bool, properties: Vec<Property>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for property in &properties {
            if !seen.insert(property.name().to_string()) {
                return Err(Error::DuplicateProperty(property.name().to_string()));
            }
            // Declared defaults must themselves validate.
            if let Some(default) = property.default_value() {
                property.canonicalize(default)?;
            }
        }
        Ok(Self {
            name,
            is_root,
            properties,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// The initial property-value map for a fresh instance: declared
    /// defaults, nested dict defaults, and empty lists.
    pub fn defaults(&self) -> Map<String, Value> {
        let mut values = Map::new();
        for property in &self.properties {
            if let Some(default) = property.default_value() {
                if let Ok(canonical) = property.canonicalize(default) {
                    values.insert(property.name().to_string(), canonical);
                    continue;
                }
            }
            match property.kind() {
                PropertyKind::Dict(nested) => {
                    values.insert(
                        property.name().to_string(),
                        Value::Object(nested.defaults()),
                    );
                }
                PropertyKind::List(_) => {
                    values.insert(property.name().to_string(), json!([]));
                }
                _ => {}
            }
        }
        values
    }

    /// Strict import of a flat map: unknown keys are an error, required
    /// properties must end up set, every value is validated. Returns the
    /// canonical property-value map (defaults applied first).
    pub fn instance_from_dict(&self, value: &Value) -> Result<Map<String, Value>> {
        let input = value.as_object().ok_or_else(|| Error::TypeMismatch {
            property: self.name.clone(),
            expected: "object".to_string(),
            got: crate::property::json_type_name(value).to_string(),
        })?;

        let mut values = self.defaults();
        for (key, entry) in input {
            let property = self
                .property(key)
                .ok_or_else(|| Error::UnknownProperty(key.clone()))?;
            let canonical = property.canonicalize(entry)?;
            if canonical.is_null() {
                values.remove(key);
            } else {
                values.insert(key.clone(), canonical);
            }
        }

        for property in &self.properties {
            if property.is_required() && !values.contains_key(property.name()) {
                return Err(Error::MissingRequiredProperty(property.name().to_string()));
            }
        }

        Ok(values)
    }

    /// Structural inverse of [`Schema::instance_from_dict`]: every declared
    /// property is emitted, unset ones as null, link properties always null.
    pub fn instance_to_dict(&self, values: &Map<String, Value>) -> Value {
        let mut out = Map::new();
        for property in &self.properties {
            let value = match property.kind() {
                PropertyKind::Link { .. } => Value::Null,
                _ => values.get(property.name()).cloned().unwrap_or(Value::Null),
            };
            out.insert(property.name().to_string(), value);
        }
        Value::Object(out)
    }

    /// Export the schema as a JSON-Schema document. Root schemas carry
    /// `$schema` and `id`; link properties are collected into a `links`
    /// array rather than `properties`.
    pub fn to_schema_json(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));

        if self.is_root {
            schema.insert("$schema".into(), json!(JSON_SCHEMA_DRAFT));
            schema.insert("id".into(), json!(self.name.to_lowercase()));
        }

        let mut properties = Map::new();
        let mut links = Vec::new();
        for property in &self.properties {
            if property.is_link() {
                links.push(property.schema_descriptor());
            } else {
                properties.insert(property.name().to_string(), property.schema_descriptor());
            }
        }
        schema.insert("properties".into(), Value::Object(properties));
        if !links.is_empty() {
            schema.insert("links".into(), Value::Array(links));
        }

        Value::Object(schema)
    }
}
