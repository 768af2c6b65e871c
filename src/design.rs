//! Design-document construction.
//!
//! Two families of design documents are emitted: one schema design document
//! per document class (serialized JSON-Schema, compiled index view, declared
//! views) and the singleton link-views design document shared by every
//! relation. Map functions are opaque strings executed by the store's query
//! engine; this module only generates them.

use crate::{
    registry::{ClassDef, LINK_DESIGN_ID, LINK_TYPE, SCHEMA_DESIGN_TYPE},
    SchemaVersion,
};
use serde_json::{json, Map, Value};
use std::fmt::Write;

/// Deterministic id of a class's schema design document.
pub fn schema_design_id(type_name: &str) -> String {
    format!("_design/_schema_{type_name}")
}

/// Name of the compiled index view present on every schema design document.
pub const INDEXES_VIEW: &str = "indexes_";

/// View names maintained on the singleton link design document.
pub const LINKS_BY_ID: &str = "by_id";
pub const LINKS_BY_NAME: &str = "by_name";
pub const LINKS_BY_NAME_DOCS: &str = "links_by_name";
pub const LINKS_BY_INDEXES: &str = "links_by_indexes";

/// Build the persistable schema design document for a document class at the
/// given schema version. `_rev` is never included; the caller attaches it
/// when updating.
pub fn build_schema_design_doc(class: &ClassDef, version: SchemaVersion) -> Value {
    let schema_string = serde_json::to_string(&class.schema.to_schema_json())
        .unwrap_or_default();

    let mut views = Map::new();
    views.insert(
        INDEXES_VIEW.into(),
        json!({ "map": compile_indexes_map(class) }),
    );
    for view in &class.views {
        let mut entry = Map::new();
        entry.insert("map".into(), json!(view.map));
        if let Some(reduce) = &view.reduce {
            entry.insert("reduce".into(), json!(reduce));
        }
        views.insert(view.name.clone(), Value::Object(entry));
    }

    // Index definitions also travel in data form so tooling can evaluate
    // index membership without parsing the compiled map function.
    let mut indexes = Map::new();
    for index in &class.indexes {
        indexes.insert(index.name.clone(), json!(index.paths));
    }

    json!({
        "_id": schema_design_id(&class.type_name),
        "type_": SCHEMA_DESIGN_TYPE,
        "language": "javascript",
        "schema_": schema_string,
        "version_": version,
        "views": views,
        "indexes": indexes,
    })
}

/// Compile a class's declared indexes into one shared map function. Every
/// emitted key is prefixed with the index's own name so multiple indexes
/// coexist in a single view.
pub fn compile_indexes_map(class: &ClassDef) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "function(doc) {{ if (doc.type_ == \"{}\") {{",
        class.type_name
    );
    for index in &class.indexes {
        let mut key = format!("[\"{}\"", index.name);
        for path in &index.paths {
            let _ = write!(key, ", doc.{path}");
        }
        key.push(']');
        let _ = write!(body, " emit({key}, null);");
    }
    body.push_str(" } }");
    body
}

/// Build the persistable design document for a user-declared design class
/// (fixed id, declared views only).
pub fn build_design_doc(class: &ClassDef) -> Value {
    let mut views = Map::new();
    for view in &class.views {
        let mut entry = Map::new();
        entry.insert("map".into(), json!(view.map));
        if let Some(reduce) = &view.reduce {
            entry.insert("reduce".into(), json!(reduce));
        }
        views.insert(view.name.clone(), Value::Object(entry));
    }

    json!({
        "_id": class.fixed_id().unwrap_or_default(),
        "type_": class.type_name,
        "language": "javascript",
        "views": views,
    })
}

/// Build the singleton link-views design document. Each map function emits
/// twice per stored edge, once for the forward relation and once for the
/// reverse, so one link document serves both traversal directions.
pub fn build_link_design_doc() -> Value {
    let guard = format!("if (doc.type_ == \"{LINK_TYPE}\")");

    let by_id = format!(
        "function(doc) {{ {guard} {{ emit(doc.from_id, null); emit(doc.to_id, null); }} }}"
    );
    let by_name = format!(
        "function(doc) {{ {guard} {{ \
         emit([doc.from_id, doc.name, doc.to_id], null); \
         emit([doc.to_id, doc.reverse_name, doc.from_id], null); }} }}"
    );
    let links_by_name = format!(
        "function(doc) {{ {guard} {{ \
         emit([doc.from_id, doc.name], {{\"_id\": doc.to_id}}); \
         emit([doc.to_id, doc.reverse_name], {{\"_id\": doc.from_id}}); }} }}"
    );
    let links_by_indexes = format!(
        "function(doc) {{ {guard} {{ \
         for (var p in doc.indexes) {{ \
         emit([doc.from_id, doc.name, p, doc.indexes[p]], {{\"_id\": doc.to_id}}); }} \
         for (var q in doc.reverse_indexes) {{ \
         emit([doc.to_id, doc.reverse_name, q, doc.reverse_indexes[q]], {{\"_id\": doc.from_id}}); }} }} }}"
    );

    json!({
        "_id": LINK_DESIGN_ID,
        "type_": crate::registry::LINK_DESIGN_TYPE,
        "language": "javascript",
        "views": {
            LINKS_BY_ID: { "map": by_id },
            LINKS_BY_NAME: { "map": by_name },
            LINKS_BY_NAME_DOCS: { "map": links_by_name },
            LINKS_BY_INDEXES: { "map": links_by_indexes },
        },
    })
}
