//! View query construction and result decoding.
//!
//! [`ViewQuery`] collects the options the store's view engine understands and
//! renders them to wire form: JSON-typed options (`key`, `startkey`,
//! `endkey`) are JSON-encoded into the query string, scalars go in verbatim,
//! and `keys` travels in a POST body because multi-key reads are posted.
//! Results decode into [`ViewResult`] rows with optional included documents.

use crate::transport::Query;
use serde::Deserialize;
use serde_json::{json, Value};

/// Options for a single view read.
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    key: Option<Value>,
    keys: Option<Vec<Value>>,
    startkey: Option<Value>,
    endkey: Option<Value>,
    startkey_docid: Option<String>,
    endkey_docid: Option<String>,
    limit: Option<u64>,
    skip: Option<u64>,
    descending: bool,
    group: bool,
    group_level: Option<u32>,
    include_docs: bool,
}

impl ViewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn keys(mut self, keys: impl IntoIterator<Item = Value>) -> Self {
        self.keys = Some(keys.into_iter().collect());
        self
    }

    pub fn startkey(mut self, key: impl Into<Value>) -> Self {
        self.startkey = Some(key.into());
        self
    }

    pub fn endkey(mut self, key: impl Into<Value>) -> Self {
        self.endkey = Some(key.into());
        self
    }

    pub fn startkey_docid(mut self, id: impl Into<String>) -> Self {
        self.startkey_docid = Some(id.into());
        self
    }

    pub fn endkey_docid(mut self, id: impl Into<String>) -> Self {
        self.endkey_docid = Some(id.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn group(mut self) -> Self {
        self.group = true;
        self
    }

    pub fn group_level(mut self, level: u32) -> Self {
        self.group_level = Some(level);
        self
    }

    pub fn include_docs(mut self) -> Self {
        self.include_docs = true;
        self
    }

    /// Whether this read targets the reduce side of the view. Reduce reads
    /// never carry `include_docs`.
    pub fn is_reduce(&self) -> bool {
        self.group || self.group_level.is_some()
    }

    pub(crate) fn has_keys(&self) -> bool {
        self.keys.is_some()
    }

    /// Render the query-string parameters. JSON-typed options are encoded as
    /// JSON text; `keys` is excluded, it belongs in the request body.
    pub(crate) fn to_query_params(&self) -> Query {
        let mut params = Query::new();
        let mut push_json = |name: &str, value: &Option<Value>| {
            if let Some(value) = value {
                params.push((name.into(), value.to_string()));
            }
        };
        push_json("key", &self.key);
        push_json("startkey", &self.startkey);
        push_json("endkey", &self.endkey);

        if let Some(id) = &self.startkey_docid {
            params.push(("startkey_docid".into(), id.clone()));
        }
        if let Some(id) = &self.endkey_docid {
            params.push(("endkey_docid".into(), id.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("skip".into(), skip.to_string()));
        }
        if self.descending {
            params.push(("descending".into(), "true".into()));
        }
        if self.group {
            params.push(("group".into(), "true".into()));
        }
        if let Some(level) = self.group_level {
            params.push(("group_level".into(), level.to_string()));
        }
        if self.include_docs && !self.is_reduce() {
            params.push(("include_docs".into(), "true".into()));
        }
        params
    }

    /// The POST body for a multi-key read, if one is required.
    pub(crate) fn keys_body(&self) -> Option<Value> {
        self.keys.as_ref().map(|keys| json!({ "keys": keys }))
    }
}

/// One emitted row, optionally carrying the included document.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewRow {
    #[serde(default)]
    pub id: Option<String>,
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// A decoded view response.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewResult {
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<ViewRow>,
}
