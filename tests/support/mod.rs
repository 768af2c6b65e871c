//! In-memory stand-in for the document store, speaking the same wire
//! protocol the mapper expects: revision-checked puts, `_bulk_docs`,
//! `_all_docs`, and native evaluation of the link views and compiled index
//! views. Index views are evaluated from the `indexes` data field persisted
//! on each schema design document.

#![allow(dead_code)]

use parking_lot::Mutex;
use recliner::{Query, Response, Result, Transport};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct MockStore {
    docs: Mutex<HashMap<String, Value>>,
}

pub fn store() -> Arc<MockStore> {
    Arc::new(MockStore::default())
}

impl MockStore {
    /// Number of stored documents, deleted ones excluded.
    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn raw(&self, id: &str) -> Option<Value> {
        self.docs.lock().get(id).cloned()
    }

    fn next_rev(current: Option<&str>) -> String {
        let n = current
            .and_then(|rev| rev.split('-').next())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);
        format!("{}-mock", n + 1)
    }

    /// Revision-checked write of one document; shared by PUT and
    /// `_bulk_docs`.
    fn write_doc(docs: &mut HashMap<String, Value>, id: &str, body: &Value) -> Option<String> {
        let stored_rev = docs
            .get(id)
            .and_then(|doc| doc.get("_rev"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let given_rev = body.get("_rev").and_then(Value::as_str).map(str::to_string);
        if stored_rev != given_rev {
            return None;
        }

        let rev = Self::next_rev(stored_rev.as_deref());
        if body.get("_deleted") == Some(&Value::Bool(true)) {
            docs.remove(id);
            return Some(rev);
        }
        let mut doc = body.clone();
        doc["_rev"] = json!(rev);
        docs.insert(id.to_string(), doc);
        Some(rev)
    }

    fn eval_view(
        &self,
        design_id: &str,
        view_name: &str,
        params: &Query,
        keys: Option<Vec<Value>>,
    ) -> Response {
        let docs = self.docs.lock();
        let rows = if design_id == "_design/_linkdocument" {
            link_rows(&docs, view_name)
        } else if let Some(type_name) = design_id.strip_prefix("_design/_schema_") {
            if view_name == "indexes_" {
                match docs.get(design_id) {
                    Some(design) => index_rows(&docs, type_name, design),
                    None => return not_found(),
                }
            } else {
                match docs.get(design_id) {
                    Some(design) => declared_view_rows(&docs, design, view_name),
                    None => return not_found(),
                }
            }
        } else {
            match docs.get(design_id) {
                Some(design) => declared_view_rows(&docs, design, view_name),
                None => return not_found(),
            }
        };

        let mut rows = rows;
        rows.sort_by(|a, b| cmp_json(&a.0, &b.0).then_with(|| a.2.cmp(&b.2)));

        if let Some(key) = param_json(params, "key") {
            rows.retain(|(k, _, _)| *k == key);
        }
        if let Some(keys) = keys {
            rows.retain(|(k, _, _)| keys.contains(k));
        }
        if let Some(start) = param_json(params, "startkey") {
            rows.retain(|(k, _, _)| cmp_json(k, &start) != Ordering::Less);
        }
        if let Some(end) = param_json(params, "endkey") {
            rows.retain(|(k, _, _)| cmp_json(k, &end) != Ordering::Greater);
        }
        if param(params, "descending") == Some("true") {
            rows.reverse();
        }
        let skip = param(params, "skip")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let limit = param(params, "limit")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let rows: Vec<_> = rows.into_iter().skip(skip).take(limit).collect();

        let include_docs = param(params, "include_docs") == Some("true");
        let total = rows.len();
        let rows: Vec<Value> = rows
            .into_iter()
            .map(|(key, value, id)| {
                let mut row = json!({ "id": id, "key": key, "value": value });
                if include_docs {
                    let doc_id = row["value"]
                        .get("_id")
                        .and_then(Value::as_str)
                        .unwrap_or(&id)
                        .to_string();
                    if let Some(doc) = docs.get(&doc_id) {
                        row["doc"] = doc.clone();
                    }
                }
                row
            })
            .collect();

        Response::new(
            200,
            json!({ "total_rows": total, "offset": 0, "rows": rows }),
        )
    }
}

type Row = (Value, Value, String);

fn str_of(doc: &Value, field: &str) -> String {
    doc.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Native evaluation of the four link views: every stored edge emits once
/// per direction.
fn link_rows(docs: &HashMap<String, Value>, view_name: &str) -> Vec<Row> {
    let mut rows = Vec::new();
    for (id, doc) in docs {
        if doc.get("type_").and_then(Value::as_str) != Some("linkdocument") {
            continue;
        }
        let from = str_of(doc, "from_id");
        let to = str_of(doc, "to_id");
        let name = str_of(doc, "name");
        let reverse = str_of(doc, "reverse_name");
        match view_name {
            "by_id" => {
                rows.push((json!(from), Value::Null, id.clone()));
                rows.push((json!(to), Value::Null, id.clone()));
            }
            "by_name" => {
                rows.push((json!([from, name, to]), Value::Null, id.clone()));
                rows.push((json!([to, reverse, from]), Value::Null, id.clone()));
            }
            "links_by_name" => {
                rows.push((json!([from, name]), json!({ "_id": to }), id.clone()));
                rows.push((json!([to, reverse]), json!({ "_id": from }), id.clone()));
            }
            "links_by_indexes" => {
                if let Some(indexes) = doc.get("indexes").and_then(Value::as_object) {
                    for (path, value) in indexes {
                        rows.push((
                            json!([from, name, path, value]),
                            json!({ "_id": to }),
                            id.clone(),
                        ));
                    }
                }
                if let Some(indexes) = doc.get("reverse_indexes").and_then(Value::as_object) {
                    for (path, value) in indexes {
                        rows.push((
                            json!([to, reverse, path, value]),
                            json!({ "_id": from }),
                            id.clone(),
                        ));
                    }
                }
            }
            _ => {}
        }
    }
    rows
}

/// Evaluate the compiled index view of one class from the design document's
/// `indexes` data field. Documents missing any indexed path emit nothing
/// for that index.
fn index_rows(docs: &HashMap<String, Value>, type_name: &str, design: &Value) -> Vec<Row> {
    let Some(indexes) = design.get("indexes").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut rows = Vec::new();
    for (id, doc) in docs {
        if doc.get("type_").and_then(Value::as_str) != Some(type_name) {
            continue;
        }
        for (index_name, paths) in indexes {
            let paths: Vec<&str> = paths
                .as_array()
                .map(|p| p.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let mut key = vec![json!(index_name)];
            let mut complete = true;
            for path in paths {
                match resolve(doc, path) {
                    Some(value) => key.push(value.clone()),
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                rows.push((Value::Array(key), Value::Null, id.clone()));
            }
        }
    }
    rows
}

/// Evaluate a declared view by recognizing the simple type-guarded identity
/// map shape. Anything more elaborate would need a JavaScript engine and
/// emits nothing here.
fn declared_view_rows(docs: &HashMap<String, Value>, design: &Value, view_name: &str) -> Vec<Row> {
    let Some(map) = design
        .get("views")
        .and_then(|v| v.get(view_name))
        .and_then(|v| v.get("map"))
        .and_then(Value::as_str)
    else {
        return Vec::new();
    };
    let Some(type_name) = map
        .split("doc.type_ == \"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
    else {
        return Vec::new();
    };
    if !map.contains("emit(doc._id, null)") {
        return Vec::new();
    }
    docs.iter()
        .filter(|(_, doc)| doc.get("type_").and_then(Value::as_str) == Some(type_name))
        .map(|(id, _)| (json!(id), Value::Null, id.clone()))
        .collect()
}

fn resolve<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn param<'a>(params: &'a Query, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

fn param_json(params: &Query, name: &str) -> Option<Value> {
    param(params, name).and_then(|v| serde_json::from_str(v).ok())
}

/// View-engine collation over JSON keys.
fn cmp_json(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let ord = cmp_json(xi, yi);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

fn not_found() -> Response {
    Response::new(404, json!({ "error": "not_found", "reason": "missing" }))
}

fn conflict() -> Response {
    Response::new(
        409,
        json!({ "error": "conflict", "reason": "Document update conflict." }),
    )
}

fn parse_view_path(path: &str) -> Option<(&str, &str)> {
    let (design, view) = path.split_once("/_view/")?;
    design.starts_with("_design/").then_some((design, view))
}

impl Transport for MockStore {
    fn get(&self, path: &str, query: &Query) -> Result<Response> {
        if let Some((design, view)) = parse_view_path(path) {
            return Ok(self.eval_view(design, view, query, None));
        }
        match self.docs.lock().get(path) {
            Some(doc) => Ok(Response::new(200, doc.clone())),
            None => Ok(not_found()),
        }
    }

    fn put(&self, path: &str, _query: &Query, body: &Value) -> Result<Response> {
        let mut docs = self.docs.lock();
        match MockStore::write_doc(&mut docs, path, body) {
            Some(rev) => Ok(Response::new(
                201,
                json!({ "ok": true, "id": path, "rev": rev }),
            )),
            None => Ok(conflict()),
        }
    }

    fn post(&self, path: &str, query: &Query, body: &Value) -> Result<Response> {
        if let Some((design, view)) = parse_view_path(path) {
            let keys = body
                .get("keys")
                .and_then(Value::as_array)
                .cloned();
            return Ok(self.eval_view(design, view, query, keys));
        }
        match path {
            "_bulk_docs" => {
                let mut docs = self.docs.lock();
                let empty = Vec::new();
                let entries = body.get("docs").and_then(Value::as_array).unwrap_or(&empty);
                let results: Vec<Value> = entries
                    .iter()
                    .map(|entry| {
                        let id = str_of(entry, "_id");
                        match MockStore::write_doc(&mut docs, &id, entry) {
                            Some(rev) => json!({ "ok": true, "id": id, "rev": rev }),
                            None => json!({
                                "id": id,
                                "error": "conflict",
                                "reason": "Document update conflict."
                            }),
                        }
                    })
                    .collect();
                Ok(Response::new(201, Value::Array(results)))
            }
            "_all_docs" => {
                let docs = self.docs.lock();
                let include_docs = param(query, "include_docs") == Some("true");
                let empty = Vec::new();
                let keys = body.get("keys").and_then(Value::as_array).unwrap_or(&empty);
                let rows: Vec<Value> = keys
                    .iter()
                    .map(|key| {
                        let id = key.as_str().unwrap_or_default();
                        match docs.get(id) {
                            Some(doc) => {
                                let mut row = json!({
                                    "id": id,
                                    "key": key,
                                    "value": { "rev": doc.get("_rev") }
                                });
                                if include_docs {
                                    row["doc"] = doc.clone();
                                }
                                row
                            }
                            None => json!({ "key": key, "error": "not_found" }),
                        }
                    })
                    .collect();
                Ok(Response::new(
                    200,
                    json!({ "total_rows": rows.len(), "offset": 0, "rows": rows }),
                ))
            }
            _ => Ok(not_found()),
        }
    }

    fn delete(&self, path: &str, query: &Query) -> Result<Response> {
        let mut docs = self.docs.lock();
        let stored_rev = docs
            .get(path)
            .and_then(|doc| doc.get("_rev"))
            .and_then(Value::as_str)
            .map(str::to_string);
        match stored_rev {
            None => Ok(not_found()),
            Some(rev) => {
                if param(query, "rev") != Some(rev.as_str()) {
                    return Ok(conflict());
                }
                docs.remove(path);
                Ok(Response::new(
                    200,
                    json!({ "ok": true, "id": path, "rev": MockStore::next_rev(Some(&rev)) }),
                ))
            }
        }
    }
}
