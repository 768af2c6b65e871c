mod support;

use recliner::{
    ClassSpec, Database, Error, IndexDef, Property, Registry, Schema, ViewDef, ViewQuery,
};
use serde_json::json;
use std::sync::Arc;

fn database() -> Database {
    let registry = Registry::builder()
        .register(
            ClassSpec::document("Person")
                .with_property(Property::string("name").with_default(json!("joe bloggs")))
                .with_property(Property::dict(
                    "address",
                    Schema::nested(vec![Property::string("city")]).unwrap(),
                ))
                .with_index(IndexDef::new("get_by_name", ["name"]))
                .with_view(ViewDef::map(
                    "all",
                    "function(doc) { if (doc.type_ == \"person\") { emit(doc._id, null); } }",
                )),
        )
        .register(ClassSpec::document("Pet").with_property(Property::string("name")))
        .build()
        .unwrap();
    Database::new(Arc::new(registry), support::store())
}

#[test]
fn add_then_get_roundtrip() {
    let db = database();
    let mut person = db.registry().create("person").unwrap();
    person.set("name", json!("will")).unwrap();

    db.add(&mut person).unwrap();
    assert_eq!(person.rev(), Some("1-mock"));
    assert!(person.has_been_added());

    let fetched = db.get(person.id()).unwrap();
    assert!(fetched.is_bound());
    assert_eq!(fetched.get_str("name"), Some("will"));
    assert_eq!(fetched.rev(), person.rev());
}

#[test]
fn get_missing_document() {
    let db = database();
    assert!(matches!(db.get("nope"), Err(Error::NotFound(id)) if id == "nope"));
    assert_eq!(db.get_raw("nope").unwrap(), None);
}

#[test]
fn update_bumps_revision_and_stale_writes_conflict() {
    let db = database();
    let mut person = db.registry().create("person").unwrap();
    db.add(&mut person).unwrap();

    let mut stale = person.clone();

    person.set("name", json!("will")).unwrap();
    db.update(&mut person).unwrap();
    assert_eq!(person.rev(), Some("2-mock"));

    stale.set("name", json!("bob")).unwrap();
    let err = db.update(&mut stale);
    assert!(matches!(err, Err(Error::Conflict(id)) if id == stale.id()));

    // The store kept the winning write.
    assert_eq!(db.get(person.id()).unwrap().get_str("name"), Some("will"));
}

#[test]
fn get_multiple_skips_missing_ids() {
    let db = database();
    let mut a = db.registry().create("person").unwrap();
    let mut b = db.registry().create("person").unwrap();
    db.add(&mut a).unwrap();
    db.add(&mut b).unwrap();

    let docs = db
        .get_multiple([a.id().to_string(), "ghost".to_string(), b.id().to_string()])
        .unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.is_bound()));
}

#[test]
fn bulk_add_assigns_revisions() {
    let db = database();
    let mut docs = vec![
        db.registry().create("person").unwrap(),
        db.registry().create("pet").unwrap(),
    ];

    let result = db.add_multiple(&mut docs).unwrap();
    assert!(result.is_all_ok());
    assert_eq!(result.ok.len(), 2);
    assert!(docs.iter().all(|d| d.rev() == Some("1-mock")));
}

#[test]
fn bulk_update_partitions_ok_and_failed() {
    let db = database();
    let mut fresh = db.registry().create("person").unwrap();
    let mut other = db.registry().create("person").unwrap();
    db.add(&mut fresh).unwrap();
    db.add(&mut other).unwrap();

    let mut stale = fresh.clone();
    db.update(&mut fresh).unwrap();

    let mut batch = vec![stale.clone(), other.clone()];
    let result = db.update_multiple(&mut batch).unwrap();

    assert_eq!(result.ok, vec![other.id().to_string()]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].id, stale.id());
    assert_eq!(result.failed[0].reason, "conflict");
    assert_eq!(batch[1].rev(), Some("2-mock"));
}

#[test]
fn delete_removes_the_document() {
    let db = database();
    let mut person = db.registry().create("person").unwrap();
    db.add(&mut person).unwrap();

    db.delete(&mut person).unwrap();
    assert!(person.is_marked_for_delete());
    assert!(matches!(db.get(person.id()), Err(Error::NotFound(_))));
}

#[test]
fn delete_of_unpersisted_document_fails() {
    let db = database();
    let mut person = db.registry().create("person").unwrap();
    assert!(matches!(db.delete(&mut person), Err(Error::NotFound(_))));
}

#[test]
fn bulk_delete_unmarks_conflicted_documents() {
    let db = database();
    let mut a = db.registry().create("person").unwrap();
    let mut b = db.registry().create("person").unwrap();
    db.add(&mut a).unwrap();
    db.add(&mut b).unwrap();

    let mut stale = a.clone();
    db.update(&mut a).unwrap();

    let mut batch = vec![stale.clone(), b.clone()];
    let result = db.delete_multiple(&mut batch).unwrap();
    assert_eq!(result.ok, vec![b.id().to_string()]);
    assert_eq!(result.failed[0].id, stale.id());
    assert!(!batch[0].is_marked_for_delete());
    assert!(batch[1].is_marked_for_delete());

    // The stale one survived, the other is gone.
    assert!(db.get(a.id()).is_ok());
    assert!(matches!(db.get(b.id()), Err(Error::NotFound(_))));
}

#[test]
fn get_by_index_matches_exact_key() {
    let db = database();
    db.sync().unwrap();

    let mut will = db.registry().create("person").unwrap();
    will.set("name", json!("will")).unwrap();
    let mut bob = db.registry().create("person").unwrap();
    bob.set("name", json!("bob")).unwrap();
    db.add(&mut will).unwrap();
    db.add(&mut bob).unwrap();

    let found = db
        .get_by_index("person", "get_by_name", [json!("will")])
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), will.id());

    let none = db
        .get_by_index("person", "get_by_name", [json!("nobody")])
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn get_by_index_unknown_index_rejected() {
    let db = database();
    assert!(matches!(
        db.get_by_index("person", "bogus", [json!("x")]),
        Err(Error::UnknownProperty(_))
    ));
}

#[test]
fn get_by_view_returns_class_documents() {
    let db = database();
    db.sync().unwrap();

    let mut a = db.registry().create("person").unwrap();
    let mut b = db.registry().create("person").unwrap();
    let mut pet = db.registry().create("pet").unwrap();
    db.add(&mut a).unwrap();
    db.add(&mut b).unwrap();
    db.add(&mut pet).unwrap();

    let people = db.get_by_view("person", "all", ViewQuery::new()).unwrap();
    assert_eq!(people.len(), 2);
    assert!(people.iter().all(|d| d.type_name() == "person"));
}
