//! The transport collaborator contract.
//!
//! The mapper never speaks HTTP itself; it issues JSON requests against a
//! [`Transport`] bound to one database URL. Paths are relative to that
//! database root (a bare document id, `_bulk_docs`, `_all_docs`, or
//! `_design/<id>/_view/<name>`). Implementations live outside this crate;
//! tests supply an in-memory one.

use crate::error::Result;
use serde_json::Value;

/// A status-plus-JSON response from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }
}

/// Query-string parameters, already rendered to their wire form.
pub type Query = Vec<(String, String)>;

/// Blocking JSON transport to a single database.
///
/// Implementations return `Err` only for I/O level failures; protocol-level
/// failures (404, 409, …) come back as a [`Response`] and are classified by
/// the caller.
pub trait Transport: Send + Sync {
    fn get(&self, path: &str, query: &Query) -> Result<Response>;
    fn put(&self, path: &str, query: &Query, body: &Value) -> Result<Response>;
    fn post(&self, path: &str, query: &Query, body: &Value) -> Result<Response>;
    fn delete(&self, path: &str, query: &Query) -> Result<Response>;
}
