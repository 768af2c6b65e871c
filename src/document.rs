//! Document instances: schema-bound, independently persisted records.
//!
//! A [`Document`] is a property bag validated through its class's schema.
//! Instance storage is explicit (a value map keyed by declared property
//! name); there is no descriptor interception. Documents fetched from the
//! store whose type is unknown, or whose schema version stamp does not match
//! the currently deployed version of their class, come back *unbound*: the
//! raw values are preserved but no validation or typed access applies.

use crate::{
    property::PropertyKind,
    registry::{ClassDef, ClassKind, Registry},
    DocumentId, Error, PropertyPath, Result, SchemaVersion, TypeName,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The value of an embedded link property: either the materialized linked
/// document (inflated) or the bare id.
#[derive(Debug, PartialEq)]
pub enum EmbeddedValue<'a> {
    Inflated(&'a Document),
    Id(&'a str),
}

/// An opaque query token naming one end of a relation: which document, and
/// which declared link property. Produced by [`Document::link`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRef {
    pub from_id: DocumentId,
    pub from_type: TypeName,
    pub name: String,
    pub reverse: Option<String>,
    pub target: TypeName,
    pub indexes: Vec<PropertyPath>,
}

/// A schema-bound (or unbound legacy) document instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    class: Option<Arc<ClassDef>>,
    values: Map<String, Value>,
    marked_for_delete: bool,
    /// Per-instance inflation cache for embedded link properties.
    embedded: HashMap<String, Document>,
}

impl Document {
    /// Create a fresh, unpersisted document: new unique id, type
    /// discriminator set, schema version stamped for document classes.
    pub(crate) fn new(class: Arc<ClassDef>, version: Option<SchemaVersion>) -> Self {
        let mut values = class.schema.defaults();
        let id = match class.fixed_id() {
            Some(fixed) => fixed.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        values.insert("_id".into(), Value::String(id));
        values.insert("type_".into(), Value::String(class.type_name.clone()));
        if let Some(version) = version {
            values.insert("schema_version_".into(), Value::from(version));
        }
        Self {
            class: Some(class),
            values,
            marked_for_delete: false,
            embedded: HashMap::new(),
        }
    }

    /// Rehydrate a persisted document. Falls back to an unbound document
    /// when the type is unknown, the version stamp mismatches, or the data
    /// no longer validates against the class schema.
    pub fn from_persisted(registry: &Registry, data: &Value) -> Document {
        let type_name = data.get("type_").and_then(Value::as_str).unwrap_or_default();
        if let Some(class) = registry.class(type_name) {
            let version_ok = match class.kind {
                ClassKind::Document => {
                    let stamped = data.get("schema_version_").and_then(Value::as_u64);
                    stamped == registry.version_of(type_name).map(u64::from)
                }
                ClassKind::Design { .. } => true,
            };
            if version_ok {
                match class.schema.instance_from_dict(data) {
                    Ok(values) => {
                        return Self {
                            class: Some(class),
                            values,
                            marked_for_delete: false,
                            embedded: HashMap::new(),
                        };
                    }
                    Err(err) => {
                        tracing::warn!(
                            type_name,
                            error = %err,
                            "persisted document no longer matches class shape; treating as unbound"
                        );
                    }
                }
            }
        }
        Self::unbound(data)
    }

    fn unbound(data: &Value) -> Document {
        let values = data.as_object().cloned().unwrap_or_default();
        Self {
            class: None,
            values,
            marked_for_delete: false,
            embedded: HashMap::new(),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.class.is_some()
    }

    pub fn class(&self) -> Option<&Arc<ClassDef>> {
        self.class.as_ref()
    }

    pub fn id(&self) -> &str {
        self.values
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Override the generated id. Only meaningful before the document has
    /// been persisted.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.values.insert("_id".into(), Value::String(id.into()));
    }

    pub fn rev(&self) -> Option<&str> {
        self.values.get("_rev").and_then(Value::as_str)
    }

    pub(crate) fn set_rev(&mut self, rev: impl Into<String>) {
        self.values.insert("_rev".into(), Value::String(rev.into()));
    }

    pub fn type_name(&self) -> &str {
        self.values
            .get("type_")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn schema_version(&self) -> Option<SchemaVersion> {
        self.values
            .get("schema_version_")
            .and_then(Value::as_u64)
            .map(|v| v as SchemaVersion)
    }

    /// Whether the document has been successfully persisted at least once.
    pub fn has_been_added(&self) -> bool {
        self.rev().is_some()
    }

    pub fn is_marked_for_delete(&self) -> bool {
        self.marked_for_delete
    }

    /// Mark this document for deletion; its next marshal is a tombstone.
    pub fn mark_for_delete(&mut self, marked: bool) {
        self.marked_for_delete = marked;
    }

    /// Read a stored property value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Validate and store a property value. On failure the stored state is
    /// unchanged. Setting null unsets the property.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let property = self
            .schema()?
            .property(name)
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))?;
        let canonical = property.canonicalize(&value)?;
        if canonical.is_null() {
            self.values.remove(name);
        } else {
            self.values.insert(name.to_string(), canonical);
        }
        Ok(())
    }

    /// Import a full flat map, as [`crate::Schema::instance_from_dict`].
    pub fn set_from(&mut self, data: &Value) -> Result<()> {
        let values = self.schema()?.instance_from_dict(data)?;
        self.values = values;
        Ok(())
    }

    fn schema(&self) -> Result<&crate::Schema> {
        self.class
            .as_ref()
            .map(|c| &c.schema)
            .ok_or_else(|| Error::UnboundDocument(self.id().to_string()))
    }

    fn list_item_property(&self, name: &str) -> Result<crate::Property> {
        let property = self
            .schema()?
            .property(name)
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))?;
        match property.kind() {
            PropertyKind::List(item) => Ok((**item).clone()),
            _ => Err(Error::TypeMismatch {
                property: name.to_string(),
                expected: "list property".to_string(),
                got: "other property kind".to_string(),
            }),
        }
    }

    fn list_values_mut(&mut self, name: &str) -> &mut Vec<Value> {
        let entry = self
            .values
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        match entry {
            Value::Array(list) => list,
            _ => unreachable!("list slot was just normalized to an array"),
        }
    }

    /// Append one item to a list property after validating it.
    pub fn list_push(&mut self, name: &str, item: Value) -> Result<()> {
        self.list_extend(name, vec![item])
    }

    /// Append a batch of items to a list property. The batch is atomic:
    /// every item is validated before any is stored.
    pub fn list_extend(&mut self, name: &str, items: Vec<Value>) -> Result<()> {
        let item_property = self.list_item_property(name)?;
        let mut canonical = Vec::with_capacity(items.len());
        for item in &items {
            canonical.push(item_property.canonicalize(item)?);
        }
        self.list_values_mut(name).extend(canonical);
        Ok(())
    }

    /// Insert one validated item at the given position.
    pub fn list_insert(&mut self, name: &str, index: usize, item: Value) -> Result<()> {
        let item_property = self.list_item_property(name)?;
        let canonical = item_property.canonicalize(&item)?;
        let list = self.list_values_mut(name);
        if index > list.len() {
            return Err(Error::ValueOutOfRange {
                property: name.to_string(),
            });
        }
        list.insert(index, canonical);
        Ok(())
    }

    /// Replace the item at the given position with a validated one.
    pub fn list_set(&mut self, name: &str, index: usize, item: Value) -> Result<()> {
        let item_property = self.list_item_property(name)?;
        let canonical = item_property.canonicalize(&item)?;
        let list = self.list_values_mut(name);
        match list.get_mut(index) {
            Some(slot) => {
                *slot = canonical;
                Ok(())
            }
            None => Err(Error::ValueOutOfRange {
                property: name.to_string(),
            }),
        }
    }

    /// Read an embedded link: the cached document when inflated, otherwise
    /// the bare id.
    pub fn get_embedded(&self, name: &str) -> Option<EmbeddedValue<'_>> {
        let id = self.get_str(name)?;
        match self.embedded.get(name) {
            Some(cached) if cached.id() == id => Some(EmbeddedValue::Inflated(cached)),
            _ => Some(EmbeddedValue::Id(id)),
        }
    }

    /// Set an embedded link from a full document instance: caches the
    /// document, stores its id, and marks the property inflated.
    pub fn set_embedded(&mut self, name: &str, document: &Document) -> Result<()> {
        let property = self
            .schema()?
            .property(name)
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))?;
        let target = match property.kind() {
            PropertyKind::EmbeddedLink { target } => target.clone(),
            _ => {
                return Err(Error::TypeMismatch {
                    property: name.to_string(),
                    expected: "embedded link property".to_string(),
                    got: "other property kind".to_string(),
                })
            }
        };
        if document.type_name() != target {
            return Err(Error::TypeMismatch {
                property: name.to_string(),
                expected: target,
                got: document.type_name().to_string(),
            });
        }
        self.values
            .insert(name.to_string(), Value::String(document.id().to_string()));
        self.embedded.insert(name.to_string(), document.clone());
        Ok(())
    }

    /// Produce the query token for a declared link property.
    pub fn link(&self, name: &str) -> Result<LinkRef> {
        let property = self
            .schema()?
            .property(name)
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))?;
        match property.kind() {
            PropertyKind::Link {
                target,
                reverse,
                indexes,
            } => Ok(LinkRef {
                from_id: self.id().to_string(),
                from_type: self.type_name().to_string(),
                name: name.to_string(),
                reverse: reverse.clone(),
                target: target.clone(),
                indexes: indexes.clone(),
            }),
            _ => Err(Error::NotALinkProperty(name.to_string())),
        }
    }

    /// Resolve a dotted property path against the stored values.
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.values, path)
    }

    /// The full persistable map: every declared property (nulls for unset),
    /// the deletion tombstone when marked, `_rev` omitted while unset.
    pub fn marshal(&self) -> Value {
        let mut data = match &self.class {
            Some(class) => match class.schema.instance_to_dict(&self.values) {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            None => self.values.clone(),
        };
        if self.rev().is_none() {
            data.remove("_rev");
        }
        if self.marked_for_delete {
            data.insert("_deleted".into(), Value::Bool(true));
        }
        Value::Object(data)
    }
}

/// Walk a dotted property path through nested objects.
pub fn resolve_path<'a>(values: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = values.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}
