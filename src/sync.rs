//! Schema-version synchronization.
//!
//! [`Database::sync`] pushes one schema design document per document class
//! into the store and the design documents of the design classes, then
//! records the deployed schema versions in the registry. The stored version
//! is bumped only when the serialized schema string actually changed; other
//! differences (a new view, changed index definitions) update the design
//! document in place without invalidating deployed data. Re-running against
//! an unchanged registry writes nothing.

use crate::{
    database::Database,
    design::{build_design_doc, build_link_design_doc, build_schema_design_doc, schema_design_id},
    error::Result,
    registry::{ClassDef, ClassKind, LINK_DESIGN_TYPE, LINK_TYPE},
    transport::Query,
    SchemaVersion,
};
use serde_json::Value;
use tracing::{debug, info};

impl Database {
    /// Bring the store's design documents and schema versions in line with
    /// the registry. Idempotent; safe to run at every startup.
    pub fn sync(&self) -> Result<()> {
        for class in self.registry.classes() {
            match &class.kind {
                ClassKind::Document => {
                    if class.type_name != LINK_TYPE {
                        self.sync_schema_class(class)?;
                    }
                }
                ClassKind::Design { fixed_id: Some(id) } => {
                    let computed = if class.type_name == LINK_DESIGN_TYPE {
                        build_link_design_doc()
                    } else {
                        build_design_doc(class)
                    };
                    self.sync_design_doc(id, computed)?;
                }
                ClassKind::Design { fixed_id: None } => {}
            }
        }
        Ok(())
    }

    fn sync_schema_class(&self, class: &ClassDef) -> Result<()> {
        let design_id = schema_design_id(&class.type_name);
        let Some(persisted) = self.get_raw(&design_id)? else {
            let version = class.start_version;
            let doc = build_schema_design_doc(class, version);
            self.put_raw(&design_id, &doc)?;
            self.registry.set_version(&class.type_name, version);
            info!(class = class.type_name.as_str(), version, "created schema design document");
            return Ok(());
        };

        let stored_version = persisted
            .get("version_")
            .and_then(Value::as_u64)
            .unwrap_or(0) as SchemaVersion;
        let stored_schema = persisted
            .get("schema_")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let fresh = build_schema_design_doc(class, stored_version);
        let schema_changed = fresh.get("schema_").and_then(Value::as_str) != Some(stored_schema);

        if schema_changed {
            // Deployed documents stamped with the old version become
            // unbound; only a real shape change pays that cost.
            let version = stored_version + 1;
            let mut doc = build_schema_design_doc(class, version);
            attach_rev(&mut doc, &persisted);
            self.put_raw(&design_id, &doc)?;
            self.registry.set_version(&class.type_name, version);
            info!(class = class.type_name.as_str(), version, "schema changed; bumped version");
        } else if differs_ignoring_rev(&fresh, &persisted) {
            let mut doc = fresh;
            attach_rev(&mut doc, &persisted);
            self.put_raw(&design_id, &doc)?;
            self.registry.set_version(&class.type_name, stored_version);
            debug!(class = class.type_name.as_str(), "updated schema design document in place");
        } else {
            self.registry.set_version(&class.type_name, stored_version);
            debug!(class = class.type_name.as_str(), "schema design document up to date");
        }
        Ok(())
    }

    fn sync_design_doc(&self, design_id: &str, computed: Value) -> Result<()> {
        match self.get_raw(design_id)? {
            None => {
                self.put_raw(design_id, &computed)?;
                info!(design_id, "created design document");
            }
            Some(persisted) => {
                if differs_ignoring_rev(&computed, &persisted) {
                    let mut doc = computed;
                    attach_rev(&mut doc, &persisted);
                    self.put_raw(design_id, &doc)?;
                    debug!(design_id, "updated design document");
                }
            }
        }
        Ok(())
    }

    fn put_raw(&self, id: &str, body: &Value) -> Result<()> {
        let response = self.transport.put(id, &Query::new(), body)?;
        Database::check(id, response)?;
        Ok(())
    }
}

fn attach_rev(doc: &mut Value, persisted: &Value) {
    if let (Value::Object(map), Some(rev)) = (doc, persisted.get("_rev")) {
        map.insert("_rev".to_string(), rev.clone());
    }
}

/// Structural comparison with the stored revision masked out.
fn differs_ignoring_rev(computed: &Value, persisted: &Value) -> bool {
    let mut stripped = persisted.clone();
    if let Value::Object(map) = &mut stripped {
        map.remove("_rev");
    }
    *computed != stripped
}
