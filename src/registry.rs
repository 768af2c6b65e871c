//! Class registry: the explicitly-constructed table of document and design
//! classes.
//!
//! The registry is built once at startup from a static list of class
//! specifications. Building wires reverse link properties onto their target
//! classes (exactly once per distinct pair), injects the base document
//! properties, and precomputes the per-class link flags used by the database
//! operations. After build the registry is immutable apart from the
//! schema-version map, which only the sync protocol writes.

use crate::{
    document::Document,
    error::Result,
    property::{Property, PropertyKind},
    schema::Schema,
    Error, SchemaVersion, TypeName,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Type name of the internal relationship document class.
pub const LINK_TYPE: &str = "linkdocument";
/// Type name of the per-class schema design documents.
pub const SCHEMA_DESIGN_TYPE: &str = "schemadesigndocument";
/// Type name of the singleton design document carrying the link views.
pub const LINK_DESIGN_TYPE: &str = "linkdesigndocument";
/// Fixed id of the singleton link-views design document.
pub const LINK_DESIGN_ID: &str = "_design/_linkdocument";

/// Whether a class is an independently persisted document or a design
/// document holding view definitions.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassKind {
    Document,
    Design { fixed_id: Option<String> },
}

/// A named map/reduce function pair, stored as opaque strings for the
/// store's query engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDef {
    pub name: String,
    pub map: String,
    pub reduce: Option<String>,
}

impl ViewDef {
    pub fn map(name: impl Into<String>, map: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: map.into(),
            reduce: None,
        }
    }

    pub fn with_reduce(mut self, reduce: impl Into<String>) -> Self {
        self.reduce = Some(reduce.into());
        self
    }
}

/// A declared class-level index: an ordered tuple of dotted property paths,
/// compiled into the shared `indexes_` view of the class's design document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub paths: Vec<String>,
}

impl IndexDef {
    pub fn new<I, S>(name: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

/// A class specification, consumed by [`RegistryBuilder::register`].
#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    kind: ClassKind,
    properties: Vec<Property>,
    views: Vec<ViewDef>,
    indexes: Vec<IndexDef>,
    start_version: SchemaVersion,
}

impl ClassSpec {
    /// A schema-bound, independently persisted document class.
    pub fn document(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Document,
            properties: Vec::new(),
            views: Vec::new(),
            indexes: Vec::new(),
            start_version: 0,
        }
    }

    /// A design document class with a fixed id (singleton).
    pub fn design(name: impl Into<String>, fixed_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Design {
                fixed_id: Some(fixed_id.into()),
            },
            properties: Vec::new(),
            views: Vec::new(),
            indexes: Vec::new(),
            start_version: 0,
        }
    }

    fn internal(name: &str, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: Vec::new(),
            views: Vec::new(),
            indexes: Vec::new(),
            start_version: 0,
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_view(mut self, view: ViewDef) -> Self {
        self.views.push(view);
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Declared starting schema version for first deployment.
    pub fn with_start_version(mut self, version: SchemaVersion) -> Self {
        self.start_version = version;
        self
    }

    fn type_name(&self) -> TypeName {
        self.name.to_lowercase()
    }
}

/// An immutable, fully-built class definition.
#[derive(Debug, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub type_name: TypeName,
    pub kind: ClassKind,
    pub schema: Schema,
    pub views: Vec<ViewDef>,
    pub indexes: Vec<IndexDef>,
    pub start_version: SchemaVersion,
}

impl ClassDef {
    pub fn is_document(&self) -> bool {
        self.kind == ClassKind::Document
    }

    pub fn fixed_id(&self) -> Option<&str> {
        match &self.kind {
            ClassKind::Design { fixed_id } => fixed_id.as_deref(),
            ClassKind::Document => None,
        }
    }

    /// Find a declared view by name.
    pub fn view(&self, name: &str) -> Option<&ViewDef> {
        self.views.iter().find(|v| v.name == name)
    }

    /// Find a declared index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// A resolved `(class, index)` pair used by `get_by_index`.
#[derive(Debug, Clone)]
pub struct IndexRef {
    pub class: Arc<ClassDef>,
    pub index: IndexDef,
}

/// A resolved `(class, view)` pair used by `get_by_view`.
#[derive(Debug, Clone)]
pub struct ViewRef {
    pub class: Arc<ClassDef>,
    pub view: ViewDef,
}

/// Builds a [`Registry`] from registered class specifications.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    specs: Vec<ClassSpec>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, spec: ClassSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> Result<Registry> {
        let mut specs = self.specs;
        specs.push(link_document_spec());
        specs.push(ClassSpec::internal(
            "LinkDesignDocument",
            ClassKind::Design {
                fixed_id: Some(LINK_DESIGN_ID.to_string()),
            },
        ));
        specs.push(
            ClassSpec::internal("SchemaDesignDocument", ClassKind::Design { fixed_id: None })
                .with_property(Property::string("schema_"))
                .with_property(Property::integer("version_"))
                .with_property(Property::raw_json("indexes")),
        );

        let mut index_of = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            if index_of.insert(spec.type_name(), i).is_some() {
                return Err(Error::DuplicateClass(spec.name.clone()));
            }
        }

        Self::wire_reverse_links(&mut specs, &index_of)?;
        Self::check_link_targets(&specs, &index_of)?;

        let mut classes = HashMap::new();
        let mut versions = HashMap::new();
        let mut has_links = HashSet::new();
        let mut has_indexed_links = HashSet::new();

        for spec in &specs {
            for property in &spec.properties {
                if let PropertyKind::Link { target, indexes, .. } = property.kind() {
                    has_links.insert(spec.type_name());
                    has_links.insert(target.clone());
                    if !indexes.is_empty() {
                        // Index values are snapshotted from the linked
                        // document, so the target is the class whose
                        // updates must refresh them.
                        has_indexed_links.insert(target.clone());
                    }
                }
            }
        }

        for spec in specs {
            let type_name = spec.type_name();
            let mut properties = base_properties(&spec.kind);
            properties.extend(spec.properties);
            let schema = Schema::root(type_name.clone(), properties)?;

            if spec.kind == ClassKind::Document {
                versions.insert(type_name.clone(), spec.start_version);
            }

            classes.insert(
                type_name.clone(),
                Arc::new(ClassDef {
                    name: spec.name,
                    type_name,
                    kind: spec.kind,
                    schema,
                    views: spec.views,
                    indexes: spec.indexes,
                    start_version: spec.start_version,
                }),
            );
        }

        Ok(Registry {
            classes,
            versions: RwLock::new(versions),
            has_links,
            has_indexed_links,
        })
    }

    /// For every link property declaring a reverse name, generate the
    /// mirrored link property on the target class unless one already
    /// exists. Generated properties point back at the source, so the pass
    /// wires each distinct pair exactly once.
    fn wire_reverse_links(
        specs: &mut [ClassSpec],
        index_of: &HashMap<TypeName, usize>,
    ) -> Result<()> {
        for i in 0..specs.len() {
            let source_type = specs[i].type_name();
            let links: Vec<(String, TypeName, String)> = specs[i]
                .properties
                .iter()
                .filter_map(|p| match p.kind() {
                    PropertyKind::Link {
                        target,
                        reverse: Some(reverse),
                        ..
                    } => Some((p.name().to_string(), target.clone(), reverse.clone())),
                    _ => None,
                })
                .collect();

            for (property_name, target, reverse) in links {
                let j = *index_of
                    .get(&target)
                    .ok_or_else(|| Error::UnknownClass(target.clone()))?;
                if specs[j].kind != ClassKind::Document {
                    return Err(Error::NotADocumentClass(target.clone()));
                }
                match specs[j].properties.iter().find(|p| p.name() == reverse) {
                    // A manually declared mirror is accepted only when it
                    // really is the other half of this pair.
                    Some(existing) => match existing.kind() {
                        PropertyKind::Link {
                            target: back_target,
                            reverse: back_reverse,
                            ..
                        } if *back_target == source_type
                            && back_reverse.as_deref() == Some(property_name.as_str()) => {}
                        _ => return Err(Error::DuplicateProperty(reverse.clone())),
                    },
                    None => {
                        let mirrored = Property::link(reverse.clone(), source_type.clone())
                            .with_reverse(property_name);
                        specs[j].properties.push(mirrored);
                    }
                }
            }
        }
        Ok(())
    }

    fn check_link_targets(
        specs: &[ClassSpec],
        index_of: &HashMap<TypeName, usize>,
    ) -> Result<()> {
        for spec in specs {
            for property in &spec.properties {
                let target = match property.kind() {
                    PropertyKind::Link { target, .. } => target,
                    PropertyKind::EmbeddedLink { target } => target,
                    _ => continue,
                };
                let j = index_of
                    .get(target)
                    .ok_or_else(|| Error::UnknownClass(target.clone()))?;
                if specs[*j].kind != ClassKind::Document {
                    return Err(Error::NotADocumentClass(target.clone()));
                }
            }
        }
        Ok(())
    }
}

/// The runtime type registry: type-name to class map for polymorphic
/// rehydration, plus the per-class deployed schema version map.
#[derive(Debug)]
pub struct Registry {
    classes: HashMap<TypeName, Arc<ClassDef>>,
    versions: RwLock<HashMap<TypeName, SchemaVersion>>,
    has_links: HashSet<TypeName>,
    has_indexed_links: HashSet<TypeName>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Look up a class by its type name.
    pub fn class(&self, type_name: &str) -> Option<Arc<ClassDef>> {
        self.classes.get(type_name).cloned()
    }

    /// All registered classes.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassDef>> {
        self.classes.values()
    }

    /// The currently deployed schema version of a document class.
    pub fn version_of(&self, type_name: &str) -> Option<SchemaVersion> {
        self.versions.read().get(type_name).copied()
    }

    /// Record the deployed schema version of a class. Called by the sync
    /// protocol only.
    pub(crate) fn set_version(&self, type_name: &str, version: SchemaVersion) {
        self.versions.write().insert(type_name.to_string(), version);
    }

    /// Whether documents of this class can participate in any link relation
    /// (as either endpoint). Gates cascade link deletion.
    pub fn has_links(&self, type_name: &str) -> bool {
        self.has_links.contains(type_name)
    }

    /// Whether link documents snapshot indexed values from this class.
    /// Gates the O(edges) link-index refresh on update.
    pub fn has_indexed_links(&self, type_name: &str) -> bool {
        self.has_indexed_links.contains(type_name)
    }

    /// Create a fresh, unpersisted document of the given class.
    pub fn create(&self, type_name: &str) -> Result<Document> {
        let class = self
            .class(type_name)
            .ok_or_else(|| Error::UnknownClass(type_name.to_string()))?;
        let version = match class.kind {
            ClassKind::Document => self.version_of(type_name),
            ClassKind::Design { .. } => None,
        };
        Ok(Document::new(class, version))
    }

    /// Resolve a declared index for `get_by_index`.
    pub fn index(&self, type_name: &str, index_name: &str) -> Result<IndexRef> {
        let class = self
            .class(type_name)
            .ok_or_else(|| Error::UnknownClass(type_name.to_string()))?;
        let index = class
            .index(index_name)
            .ok_or_else(|| Error::UnknownProperty(index_name.to_string()))?
            .clone();
        Ok(IndexRef { class, index })
    }

    /// Resolve a declared view for `get_by_view`.
    pub fn view(&self, type_name: &str, view_name: &str) -> Result<ViewRef> {
        let class = self
            .class(type_name)
            .ok_or_else(|| Error::UnknownClass(type_name.to_string()))?;
        let view = class
            .view(view_name)
            .ok_or_else(|| Error::UnknownProperty(view_name.to_string()))?
            .clone();
        Ok(ViewRef { class, view })
    }
}

fn link_document_spec() -> ClassSpec {
    ClassSpec::document("LinkDocument")
        .with_property(Property::string("name"))
        .with_property(Property::string("reverse_name"))
        .with_property(Property::string("from_id"))
        .with_property(Property::string("from_type"))
        .with_property(Property::string("to_id"))
        .with_property(Property::string("to_type"))
        .with_property(Property::raw_json("indexes"))
        .with_property(Property::raw_json("reverse_indexes"))
}

/// The base properties shared by every persisted class, ahead of the
/// user-declared ones.
fn base_properties(kind: &ClassKind) -> Vec<Property> {
    let mut properties = vec![
        Property::string("_id").required(),
        Property::string("_rev"),
        Property::string("type_").required(),
    ];
    match kind {
        ClassKind::Document => {
            properties.push(Property::integer("schema_version_"));
        }
        ClassKind::Design { .. } => {
            properties.push(Property::raw_json("views"));
            properties.push(
                Property::string("language").with_default(serde_json::json!("javascript")),
            );
        }
    }
    properties
}
