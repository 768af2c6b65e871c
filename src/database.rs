//! Database operations: CRUD, bulk writes, links and view reads.
//!
//! A [`Database`] pairs the class [`Registry`] with a [`Transport`] bound to
//! one database URL. Single-document writes go through `PUT`/`DELETE`, bulk
//! writes through `_bulk_docs` with per-document outcomes, and relationship
//! maintenance runs under per-document-id locks so the read-check-write
//! sequences (duplicate suppression, index snapshots, cascade deletes) are
//! serialized within the process.

use crate::{
    design::{
        schema_design_id, INDEXES_VIEW, LINKS_BY_ID, LINKS_BY_INDEXES, LINKS_BY_NAME,
        LINKS_BY_NAME_DOCS,
    },
    document::{Document, LinkRef},
    error::{Error, Result},
    lock::LockManager,
    property::PropertyKind,
    registry::{Registry, LINK_DESIGN_ID, LINK_TYPE},
    transport::{Query, Response, Transport},
    view::{ViewQuery, ViewResult},
    DocumentId, PropertyPath,
};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One failed entry of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    pub id: DocumentId,
    pub reason: String,
}

/// Per-document outcome of a bulk write. Successful documents have their
/// new revision assigned in place; failed ones are reported here unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResult {
    pub ok: Vec<DocumentId>,
    pub failed: Vec<BulkFailure>,
}

impl BulkResult {
    pub fn is_all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A typed handle on one database.
pub struct Database {
    pub(crate) registry: Arc<Registry>,
    pub(crate) transport: Arc<dyn Transport>,
    locks: LockManager,
}

impl Database {
    pub fn new(registry: Arc<Registry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            locks: LockManager::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Classify a protocol-level failure response against a document id.
    pub(crate) fn check(id: &str, response: Response) -> Result<Response> {
        if response.is_conflict() {
            return Err(Error::Conflict(id.to_string()));
        }
        if response.is_not_found() {
            return Err(Error::NotFound(id.to_string()));
        }
        if !response.is_success() {
            return Err(Error::Store {
                status: response.status,
                body: response.body.to_string(),
            });
        }
        Ok(response)
    }

    // ---- single-document operations ----

    /// Persist a new document. Its generated id is the storage key; the
    /// assigned revision is written back into the instance.
    pub fn add(&self, document: &mut Document) -> Result<()> {
        self.put_document(document)?;
        debug!(id = document.id(), type_name = document.type_name(), "added document");
        Ok(())
    }

    /// Fetch and rehydrate a document by id.
    pub fn get(&self, id: &str) -> Result<Document> {
        match self.get_raw(id)? {
            Some(data) => Ok(Document::from_persisted(&self.registry, &data)),
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    /// Fetch the raw stored form of a document, `None` when absent.
    pub fn get_raw(&self, id: &str) -> Result<Option<Value>> {
        let response = self.transport.get(id, &Query::new())?;
        if response.is_not_found() {
            return Ok(None);
        }
        let response = Self::check(id, response)?;
        Ok(Some(response.body))
    }

    /// Fetch several documents in one round trip. Missing ids are skipped.
    pub fn get_multiple<I, S>(&self, ids: I) -> Result<Vec<Document>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<Value> = ids.into_iter().map(|id| Value::String(id.into())).collect();
        let response = self.transport.post(
            "_all_docs",
            &vec![("include_docs".to_string(), "true".to_string())],
            &json!({ "keys": keys }),
        )?;
        let response = Self::check("_all_docs", response)?;
        let result = decode_view(response.body)?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.doc.as_ref())
            .map(|doc| Document::from_persisted(&self.registry, doc))
            .collect())
    }

    /// Persist changes to an existing document. When link documents
    /// snapshot indexed values from this class, the affected edges are
    /// refreshed under the document's lock.
    pub fn update(&self, document: &mut Document) -> Result<()> {
        if self.registry.has_indexed_links(document.type_name()) {
            let _guard = self.locks.lock([document.id()]);
            self.put_document(document)?;
            self.refresh_link_indexes(document)?;
        } else {
            self.put_document(document)?;
        }
        debug!(id = document.id(), "updated document");
        Ok(())
    }

    /// Delete a document. When its class participates in any relation the
    /// stale edges are cascaded away first, under the document's lock.
    pub fn delete(&self, document: &mut Document) -> Result<()> {
        let id = document.id().to_string();
        let rev = document
            .rev()
            .ok_or_else(|| Error::NotFound(id.clone()))?
            .to_string();

        if self.registry.has_links(document.type_name()) {
            let _guard = self.locks.lock([id.as_str()]);
            self.delete_all_links_of(&id)?;
            let response = self
                .transport
                .delete(&id, &vec![("rev".to_string(), rev)])?;
            Self::check(&id, response)?;
        } else {
            let response = self
                .transport
                .delete(&id, &vec![("rev".to_string(), rev)])?;
            Self::check(&id, response)?;
        }
        document.mark_for_delete(true);
        debug!(id = id.as_str(), "deleted document");
        Ok(())
    }

    fn put_document(&self, document: &mut Document) -> Result<()> {
        let id = document.id().to_string();
        let body = document.marshal();
        let response = self.transport.put(&id, &Query::new(), &body)?;
        let response = Self::check(&id, response)?;
        if let Some(rev) = response.body.get("rev").and_then(Value::as_str) {
            document.set_rev(rev);
        }
        Ok(())
    }

    // ---- bulk operations ----

    /// Persist a batch of new documents through `_bulk_docs`.
    pub fn add_multiple(&self, documents: &mut [Document]) -> Result<BulkResult> {
        let payload = documents.iter().map(Document::marshal).collect();
        let outcomes = self.bulk_write(payload)?;
        Ok(apply_bulk_outcomes(documents, &outcomes))
    }

    /// Update a batch of documents. Documents of classes without link-index
    /// snapshots go through one `_bulk_docs` call; the rest are written
    /// individually under their locks so the edge refresh stays consistent.
    pub fn update_multiple(&self, documents: &mut [Document]) -> Result<BulkResult> {
        let (indexed, plain): (Vec<usize>, Vec<usize>) = (0..documents.len())
            .partition(|&i| self.registry.has_indexed_links(documents[i].type_name()));

        let mut result = BulkResult::default();

        if !plain.is_empty() {
            let payload = plain.iter().map(|&i| documents[i].marshal()).collect();
            let outcomes = self.bulk_write(payload)?;
            for &i in &plain {
                record_outcome(&mut documents[i], &outcomes, &mut result);
            }
        }

        for i in indexed {
            let document = &mut documents[i];
            let id = document.id().to_string();
            match self.update(document) {
                Ok(()) => result.ok.push(id),
                Err(Error::Conflict(_)) => result.failed.push(BulkFailure {
                    id,
                    reason: "conflict".to_string(),
                }),
                Err(err) => return Err(err),
            }
        }
        Ok(result)
    }

    /// Delete a batch of documents. Link-free classes go through one
    /// `_bulk_docs` tombstone write; classes that participate in relations
    /// are handled one element at a time, so a refused delete keeps both
    /// the document and its edges.
    pub fn delete_multiple(&self, documents: &mut [Document]) -> Result<BulkResult> {
        let (linked, plain): (Vec<usize>, Vec<usize>) = (0..documents.len())
            .partition(|&i| self.registry.has_links(documents[i].type_name()));

        let mut result = BulkResult::default();

        if !plain.is_empty() {
            for &i in &plain {
                documents[i].mark_for_delete(true);
            }
            let payload = plain.iter().map(|&i| documents[i].marshal()).collect();
            let outcomes = self.bulk_write(payload)?;
            for &i in &plain {
                let document = &mut documents[i];
                let id = document.id().to_string();
                match outcomes.get(&id) {
                    Some(Ok(_)) => result.ok.push(id),
                    Some(Err(reason)) => {
                        document.mark_for_delete(false);
                        result.failed.push(BulkFailure {
                            id,
                            reason: reason.clone(),
                        });
                    }
                    None => {
                        document.mark_for_delete(false);
                        result.failed.push(BulkFailure {
                            id,
                            reason: "missing from bulk response".to_string(),
                        });
                    }
                }
            }
        }

        for i in linked {
            let document = &mut documents[i];
            let id = document.id().to_string();
            let _guard = self.locks.lock([id.as_str()]);

            // The cascade must not run for an element whose delete is
            // going to be refused: check the stored revision first.
            let stored_rev = self.get_raw(&id)?.and_then(|doc| {
                doc.get("_rev").and_then(Value::as_str).map(str::to_string)
            });
            let Some(rev) = stored_rev else {
                result.failed.push(BulkFailure {
                    id,
                    reason: "conflict".to_string(),
                });
                continue;
            };
            if Some(rev.as_str()) != document.rev() {
                result.failed.push(BulkFailure {
                    id,
                    reason: "conflict".to_string(),
                });
                continue;
            }

            self.delete_all_links_of(&id)?;
            let response = self
                .transport
                .delete(&id, &vec![("rev".to_string(), rev)])?;
            match Self::check(&id, response) {
                Ok(_) => {
                    document.mark_for_delete(true);
                    result.ok.push(id);
                }
                Err(Error::Conflict(_)) => result.failed.push(BulkFailure {
                    id,
                    reason: "conflict".to_string(),
                }),
                Err(err) => return Err(err),
            }
        }
        Ok(result)
    }

    fn bulk_write(&self, docs: Vec<Value>) -> Result<HashMap<String, std::result::Result<String, String>>> {
        let response = self
            .transport
            .post("_bulk_docs", &Query::new(), &json!({ "docs": docs }))?;
        if !response.is_success() {
            return Err(Error::Store {
                status: response.status,
                body: response.body.to_string(),
            });
        }
        let rows = response.body.as_array().cloned().unwrap_or_default();
        let mut outcomes = HashMap::new();
        for row in rows {
            let id = row.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            match row.get("rev").and_then(Value::as_str) {
                Some(rev) => {
                    outcomes.insert(id, Ok(rev.to_string()));
                }
                None => {
                    let reason = row
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    outcomes.insert(id, Err(reason));
                }
            }
        }
        Ok(outcomes)
    }

    // ---- link operations ----

    /// Create one edge; shorthand for [`Database::add_links`].
    pub fn add_link(&self, from: &mut Document, name: &str, to: &mut Document) -> Result<()> {
        self.add_links(from, name, std::slice::from_mut(to))
    }

    /// Create edges from `from` to each target under the declared link
    /// property. Unpersisted endpoints are added first. Existing edges and
    /// duplicate targets are silently skipped, so the call is idempotent.
    pub fn add_links(
        &self,
        from: &mut Document,
        name: &str,
        targets: &mut [Document],
    ) -> Result<()> {
        let link = from.link(name)?;
        for target in targets.iter() {
            if target.type_name() != link.target {
                return Err(Error::TypeMismatch {
                    property: name.to_string(),
                    expected: link.target.clone(),
                    got: target.type_name().to_string(),
                });
            }
        }

        if !from.has_been_added() {
            self.add(from)?;
        }
        for target in targets.iter_mut() {
            if !target.has_been_added() {
                self.add(target)?;
            }
        }

        let mut ids: Vec<String> = vec![from.id().to_string()];
        ids.extend(targets.iter().map(|t| t.id().to_string()));
        let _guard = self.locks.lock(ids.iter().cloned());

        // Endpoints may have been deleted since the caller fetched them;
        // re-check under the lock so no edge outlives its documents.
        for id in &ids {
            if self.get_raw(id)?.is_none() {
                return Err(Error::NotFound(id.clone()));
            }
        }

        // One multi-key read answers "which of these edges already exist".
        let triples: Vec<Value> = targets
            .iter()
            .map(|t| json!([link.from_id, link.name, t.id()]))
            .collect();
        let existing = self.query_view(
            LINK_DESIGN_ID,
            LINKS_BY_NAME,
            &ViewQuery::new().keys(triples),
        )?;
        let existing_targets: HashSet<String> = existing
            .rows
            .iter()
            .filter_map(|row| row.key.get(2).and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        let reverse_paths = link
            .reverse
            .as_deref()
            .and_then(|reverse| self.link_index_paths(&link.target, reverse))
            .unwrap_or_default();

        let mut edges = Vec::new();
        let mut seen = existing_targets;
        for target in targets.iter() {
            if !seen.insert(target.id().to_string()) {
                debug!(
                    from = link.from_id.as_str(),
                    name,
                    to = target.id(),
                    "edge already present; skipping"
                );
                continue;
            }
            edges.push(self.build_edge(&link, target, &reverse_paths, from)?);
        }
        if edges.is_empty() {
            return Ok(());
        }

        let payload = edges.iter().map(Document::marshal).collect();
        let outcomes = self.bulk_write(payload)?;
        for (id, outcome) in &outcomes {
            if let Err(reason) = outcome {
                return Err(Error::Store {
                    status: 409,
                    body: format!("link {id}: {reason}"),
                });
            }
        }
        debug!(
            from = link.from_id.as_str(),
            name,
            count = edges.len(),
            "added links"
        );
        Ok(())
    }

    fn build_edge(
        &self,
        link: &LinkRef,
        target: &Document,
        reverse_paths: &[PropertyPath],
        from: &Document,
    ) -> Result<Document> {
        let mut edge = self.registry.create(LINK_TYPE)?;
        edge.set("name", json!(link.name))?;
        if let Some(reverse) = &link.reverse {
            edge.set("reverse_name", json!(reverse))?;
        }
        edge.set("from_id", json!(link.from_id))?;
        edge.set("from_type", json!(link.from_type))?;
        edge.set("to_id", json!(target.id()))?;
        edge.set("to_type", json!(target.type_name()))?;
        edge.set(
            "indexes",
            Value::Object(snapshot_indexes(target, &link.indexes)),
        )?;
        edge.set(
            "reverse_indexes",
            Value::Object(snapshot_indexes(from, reverse_paths)),
        )?;
        Ok(edge)
    }

    /// Fetch the documents linked under the relation named by the token.
    /// Traversal options (`limit`, `skip`, `descending`, pagination docid
    /// cursors) can be passed in; the view key is always the relation's.
    pub fn get_links(&self, link: &LinkRef, query: Option<ViewQuery>) -> Result<Vec<Document>> {
        let query = query
            .unwrap_or_default()
            .key(json!([link.from_id, link.name]))
            .include_docs();
        let result = self.query_view(LINK_DESIGN_ID, LINKS_BY_NAME_DOCS, &query)?;
        Ok(self.rehydrate_rows(result))
    }

    /// Fetch linked documents whose snapshotted index value matches.
    pub fn get_links_by_index(
        &self,
        link: &LinkRef,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Document>> {
        let result = self.query_view(
            LINK_DESIGN_ID,
            LINKS_BY_INDEXES,
            &ViewQuery::new()
                .key(json!([link.from_id, link.name, path, value.into()]))
                .include_docs(),
        )?;
        Ok(self.rehydrate_rows(result))
    }

    /// Delete the edges from `from` to exactly the given targets. Absent
    /// edges are ignored.
    pub fn delete_links(
        &self,
        from: &Document,
        name: &str,
        targets: &[Document],
    ) -> Result<()> {
        let link = from.link(name)?;

        let mut ids: Vec<String> = vec![from.id().to_string()];
        ids.extend(targets.iter().map(|t| t.id().to_string()));
        let _guard = self.locks.lock(ids);

        let triples: Vec<Value> = targets
            .iter()
            .map(|t| json!([link.from_id, link.name, t.id()]))
            .collect();
        let result = self.query_view(
            LINK_DESIGN_ID,
            LINKS_BY_NAME,
            &ViewQuery::new().keys(triples).include_docs(),
        )?;

        let tombstones = tombstones_for(&result);
        if tombstones.is_empty() {
            return Ok(());
        }
        let count = tombstones.len();
        let outcomes = self.bulk_write(tombstones)?;
        for (id, outcome) in &outcomes {
            if let Err(reason) = outcome {
                warn!(link = id.as_str(), reason = reason.as_str(), "stale link tombstone rejected");
            }
        }
        debug!(from = link.from_id.as_str(), name, count, "deleted links");
        Ok(())
    }

    /// Delete every edge touching the document, in either direction.
    pub fn delete_all_links(&self, document: &Document) -> Result<()> {
        let _guard = self.locks.lock([document.id()]);
        self.delete_all_links_of(document.id())
    }

    /// Caller holds the document's lock.
    fn delete_all_links_of(&self, id: &str) -> Result<()> {
        let result = self.query_view(
            LINK_DESIGN_ID,
            LINKS_BY_ID,
            &ViewQuery::new().key(json!(id)).include_docs(),
        )?;

        let tombstones = tombstones_for(&result);
        if tombstones.is_empty() {
            return Ok(());
        }
        let count = tombstones.len();
        let outcomes = self.bulk_write(tombstones)?;
        for (link_id, outcome) in &outcomes {
            if let Err(reason) = outcome {
                warn!(link = link_id.as_str(), reason = reason.as_str(), "stale link tombstone rejected");
            }
        }
        debug!(id, count, "cascaded link deletion");
        Ok(())
    }

    /// Re-snapshot the denormalized index values on every edge touching the
    /// document. Caller holds the document's lock.
    fn refresh_link_indexes(&self, document: &Document) -> Result<()> {
        let id = document.id();
        let result = self.query_view(
            LINK_DESIGN_ID,
            LINKS_BY_ID,
            &ViewQuery::new().key(json!(id)).include_docs(),
        )?;

        let mut seen = HashSet::new();
        let mut changed = Vec::new();
        for row in &result.rows {
            let Some(edge) = &row.doc else { continue };
            let edge_id = edge.get("_id").and_then(Value::as_str).unwrap_or_default();
            if !seen.insert(edge_id.to_string()) {
                continue;
            }

            let mut updated = edge.clone();
            let mut dirty = false;

            // Forward snapshot comes from the target side of the edge.
            if edge.get("to_id").and_then(Value::as_str) == Some(id) {
                let from_type = edge.get("from_type").and_then(Value::as_str).unwrap_or_default();
                let name = edge.get("name").and_then(Value::as_str).unwrap_or_default();
                match self.link_index_paths(from_type, name) {
                    Some(paths) => {
                        let fresh = Value::Object(snapshot_indexes(document, &paths));
                        if edge.get("indexes") != Some(&fresh) {
                            updated["indexes"] = fresh;
                            dirty = true;
                        }
                    }
                    None => warn!(edge = edge_id, from_type, name, "link property no longer declared; leaving snapshot"),
                }
            }
            // Reverse snapshot comes from the source side.
            if edge.get("from_id").and_then(Value::as_str) == Some(id) {
                let to_type = edge.get("to_type").and_then(Value::as_str).unwrap_or_default();
                let reverse = edge
                    .get("reverse_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !reverse.is_empty() {
                    match self.link_index_paths(to_type, reverse) {
                        Some(paths) => {
                            let fresh = Value::Object(snapshot_indexes(document, &paths));
                            if edge.get("reverse_indexes") != Some(&fresh) {
                                updated["reverse_indexes"] = fresh;
                                dirty = true;
                            }
                        }
                        None => warn!(edge = edge_id, to_type, reverse, "reverse link property no longer declared; leaving snapshot"),
                    }
                }
            }

            if dirty {
                changed.push(updated);
            }
        }

        if changed.is_empty() {
            return Ok(());
        }
        let count = changed.len();
        let outcomes = self.bulk_write(changed)?;
        for (edge_id, outcome) in &outcomes {
            if let Err(reason) = outcome {
                warn!(edge = edge_id.as_str(), reason = reason.as_str(), "link index refresh rejected");
            }
        }
        debug!(id, count, "refreshed link index snapshots");
        Ok(())
    }

    /// Declared snapshot paths of a link property, if it still exists.
    fn link_index_paths(&self, type_name: &str, property: &str) -> Option<Vec<PropertyPath>> {
        let class = self.registry.class(type_name)?;
        match class.schema.property(property)?.kind() {
            PropertyKind::Link { indexes, .. } => Some(indexes.clone()),
            _ => None,
        }
    }

    // ---- view reads ----

    /// Fetch documents of a class whose declared index matches the given
    /// component values exactly.
    pub fn get_by_index<I>(&self, type_name: &str, index_name: &str, values: I) -> Result<Vec<Document>>
    where
        I: IntoIterator<Item = Value>,
    {
        let index = self.registry.index(type_name, index_name)?;
        let mut key = vec![Value::String(index.index.name.clone())];
        key.extend(values);
        let result = self.query_view(
            &schema_design_id(type_name),
            INDEXES_VIEW,
            &ViewQuery::new().key(Value::Array(key)).include_docs(),
        )?;
        Ok(self.rehydrate_rows(result))
    }

    /// Fetch documents of a class whose declared index falls inside the
    /// given component range.
    pub fn get_by_index_range<I, J>(
        &self,
        type_name: &str,
        index_name: &str,
        start: I,
        end: J,
    ) -> Result<Vec<Document>>
    where
        I: IntoIterator<Item = Value>,
        J: IntoIterator<Item = Value>,
    {
        let index = self.registry.index(type_name, index_name)?;
        let mut startkey = vec![Value::String(index.index.name.clone())];
        startkey.extend(start);
        let mut endkey = vec![Value::String(index.index.name.clone())];
        endkey.extend(end);
        let result = self.query_view(
            &schema_design_id(type_name),
            INDEXES_VIEW,
            &ViewQuery::new()
                .startkey(Value::Array(startkey))
                .endkey(Value::Array(endkey))
                .include_docs(),
        )?;
        Ok(self.rehydrate_rows(result))
    }

    /// Fetch documents through a declared view of the class. The design
    /// document is the class's own for design classes, otherwise the
    /// class's schema design document.
    pub fn get_by_view(
        &self,
        type_name: &str,
        view_name: &str,
        query: ViewQuery,
    ) -> Result<Vec<Document>> {
        let view = self.registry.view(type_name, view_name)?;
        let design_id = match view.class.fixed_id() {
            Some(fixed) => fixed.to_string(),
            None => schema_design_id(type_name),
        };
        let result = self.query_view(&design_id, view_name, &query.include_docs())?;
        Ok(self.rehydrate_rows(result))
    }

    /// Raw view read against any design document. Multi-key reads are
    /// posted; everything else travels in the query string.
    pub fn query_view(
        &self,
        design_id: &str,
        view_name: &str,
        query: &ViewQuery,
    ) -> Result<ViewResult> {
        let path = format!("{design_id}/_view/{view_name}");
        let params = query.to_query_params();
        let response = match query.keys_body() {
            Some(body) => self.transport.post(&path, &params, &body)?,
            None => self.transport.get(&path, &params)?,
        };
        let response = Self::check(&path, response)?;
        decode_view(response.body)
    }

    fn rehydrate_rows(&self, result: ViewResult) -> Vec<Document> {
        result
            .rows
            .iter()
            .filter_map(|row| row.doc.as_ref())
            .map(|doc| Document::from_persisted(&self.registry, doc))
            .collect()
    }
}

fn decode_view(body: Value) -> Result<ViewResult> {
    serde_json::from_value(body)
        .map_err(|err| Error::Transport(format!("malformed view response: {err}")))
}

/// Snapshot the values behind the given dotted paths. Unresolvable paths
/// are omitted from the snapshot.
fn snapshot_indexes(document: &Document, paths: &[PropertyPath]) -> Map<String, Value> {
    let mut snapshot = Map::new();
    for path in paths {
        match document.resolve_path(path) {
            Some(value) => {
                snapshot.insert(path.clone(), value.clone());
            }
            None => warn!(
                id = document.id(),
                path = path.as_str(),
                "indexed path unresolved; omitted from link snapshot"
            ),
        }
    }
    snapshot
}

/// Tombstones for the distinct documents included in a view result.
fn tombstones_for(result: &ViewResult) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut tombstones = Vec::new();
    for row in &result.rows {
        let Some(doc) = &row.doc else { continue };
        let (Some(id), Some(rev)) = (
            doc.get("_id").and_then(Value::as_str),
            doc.get("_rev").and_then(Value::as_str),
        ) else {
            continue;
        };
        if seen.insert(id.to_string()) {
            tombstones.push(json!({ "_id": id, "_rev": rev, "_deleted": true }));
        }
    }
    tombstones
}

fn record_outcome(
    document: &mut Document,
    outcomes: &HashMap<String, std::result::Result<String, String>>,
    result: &mut BulkResult,
) {
    let id = document.id().to_string();
    match outcomes.get(&id) {
        Some(Ok(rev)) => {
            document.set_rev(rev.clone());
            result.ok.push(id);
        }
        Some(Err(reason)) => result.failed.push(BulkFailure {
            id,
            reason: reason.clone(),
        }),
        None => result.failed.push(BulkFailure {
            id,
            reason: "missing from bulk response".to_string(),
        }),
    }
}

/// Assign revisions from bulk outcomes and partition ids into ok/failed.
fn apply_bulk_outcomes(
    documents: &mut [Document],
    outcomes: &HashMap<String, std::result::Result<String, String>>,
) -> BulkResult {
    let mut result = BulkResult::default();
    for document in documents.iter_mut() {
        record_outcome(document, outcomes, &mut result);
    }
    result
}
