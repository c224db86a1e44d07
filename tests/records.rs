mod support;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use recordset::{
    Attributes, Events, Group, GroupOf, Phase, Plain, Record, Schema, SetOptions, ValidationError,
};
use serde_json::{json, Value};
use support::person::{persons, Person};
use support::{attrs, count, event_log, init_tracing};

struct NonNegative;

impl Schema for NonNegative {
    fn validate(&self, attrs: &Attributes) -> Option<ValidationError> {
        attrs
            .get("x")
            .and_then(Value::as_i64)
            .is_some_and(|x| x < 0)
            .then(|| ValidationError::for_field("x", "must not be negative"))
    }
}

#[test]
fn change_set_tracks_only_real_differences() {
    init_tracing();
    let record = Record::new(Plain, json!({"a": 1, "b": 2}));
    let log = event_log(&record);

    record.set(json!({"a": 1, "b": 3, "c": 4})).unwrap();

    assert_eq!(*log.borrow(), vec!["change:b", "change:c", "change"]);
    assert_eq!(record.changed(), attrs(json!({"b": 3, "c": 4})));
    assert!(record.has_changed(Some("b")));
    assert!(!record.has_changed(Some("a")));
    assert_eq!(record.previous("b"), Some(json!(2)));
    assert_eq!(record.previous("c"), None);
}

#[test]
fn setting_the_same_values_is_quiet() {
    let record = Record::new(Plain, json!({"a": 1}));
    let log = event_log(&record);

    record.set(("a", json!(1))).unwrap();

    assert!(log.borrow().is_empty());
    assert!(!record.has_changed(None));
    assert_eq!(record.changed_attributes(None), None);
}

#[test]
fn reverting_within_a_batch_drops_the_change() {
    let record = Record::new(Plain, json!({"a": 1}));
    let reverted = record.clone();
    record.once("change:a", move |_| {
        reverted.set(("a", json!(1))).unwrap();
    });

    record.set(("a", json!(2))).unwrap();

    assert_eq!(record.get("a"), Some(json!(1)));
    assert!(!record.has_changed(Some("a")));
}

#[test]
fn unset_is_reported_as_a_change() {
    let record = Record::new(Plain, json!({"a": 1, "b": 2}));
    let values = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&values);
    record.on("change:a", move |event| {
        sink.borrow_mut().push(event.data.value().cloned())
    });

    record.unset("a").unwrap();

    assert!(!record.has("a"));
    assert_eq!(*values.borrow(), vec![None]);
    assert_eq!(record.changed().get("a"), Some(&Value::Null));

    record.clear().unwrap();
    assert!(record.attributes().is_empty());
}

#[test]
fn invalid_update_leaves_state_untouched() {
    let record = Record::new(NonNegative, json!({"x": 1}));
    let log = event_log(&record);

    let err = record.set(("x", json!(-1))).unwrap_err();

    assert_eq!(err.field.as_deref(), Some("x"));
    assert_eq!(record.get("x"), Some(json!(1)));
    assert_eq!(count(&log, "invalid"), 1);
    assert_eq!(count(&log, "change"), 0);
    assert_eq!(count(&log, "change:x"), 0);
    assert_eq!(record.validation_error(), Some(err));

    record.set(("x", json!(3))).unwrap();
    assert_eq!(record.validation_error(), None);
}

#[test]
fn silent_set_applies_without_events() {
    let record = Record::new(Plain, json!({}));
    let log = event_log(&record);

    record
        .set_with(json!({"a": 1}), SetOptions::silent())
        .unwrap();

    assert!(log.borrow().is_empty());
    assert_eq!(record.get("a"), Some(json!(1)));
    assert!(record.has_changed(Some("a")));
}

#[test]
fn nested_sets_drain_into_one_final_change() {
    let record = Record::new(Plain, json!({"first": "a", "last": "b"}));
    let follower = record.clone();
    record.on("change:first", move |event| {
        let first = event.data.value().cloned().unwrap_or(Value::Null);
        follower.set(("full", first)).unwrap();
        assert_eq!(follower.phase(), Phase::Mutating);
    });

    let changes = Rc::new(Cell::new(0));
    let seen = Rc::clone(&changes);
    let observer = record.clone();
    record.on("change", move |_| {
        seen.set(seen.get() + 1);
        assert_eq!(observer.phase(), Phase::Draining);
    });

    record.set(("first", json!("c"))).unwrap();

    assert_eq!(changes.get(), 1);
    assert_eq!(record.get("full"), Some(json!("c")));
    assert!(record.has_changed(Some("full")));
    assert_eq!(record.phase(), Phase::Idle);
}

#[test]
fn set_from_a_change_handler_fires_another_change() {
    let record = Record::new(Plain, json!({"n": 0}));
    let bumper = record.clone();
    record.on("change", move |_| {
        if bumper.get("n") == Some(json!(1)) {
            bumper.set(("n", json!(2))).unwrap();
        }
    });
    let log = event_log(&record);

    record.set(("n", json!(1))).unwrap();

    assert_eq!(record.get("n"), Some(json!(2)));
    assert_eq!(count(&log, "change"), 2);
    assert_eq!(count(&log, "change:n"), 2);
}

#[test]
fn derived_defaults_fill_missing_attributes() {
    let record = Record::new(Person, json!({"name": "Ann"}));
    assert!(record.is("active"));
    assert!(!record.has_changed(None));

    let record = Record::new(Person, json!({"name": "Ann", "active": false}));
    assert!(!record.is("active"));
}

#[test]
fn derived_kind_names() {
    #[derive(recordset::Schema)]
    #[schema(name = "people", url_root = "/people")]
    struct Staff;

    assert_eq!(Person.name(), "Person");
    assert_eq!(Record::new(Staff, json!({})).schema().name(), "people");
}

#[test]
fn derived_validation_blocks_bad_names() {
    let record = Record::new(Person, json!({"name": "Ann"}));
    let log = event_log(&record);

    assert!(record.set(("name", json!("  "))).is_err());
    assert!(record.set(("name", json!(7))).is_err());

    assert_eq!(record.get("name"), Some(json!("Ann")));
    assert_eq!(count(&log, "invalid"), 2);
    assert!(record.is_valid());
}

#[test]
fn id_follows_the_id_attribute() {
    let record = Record::new(Person, json!({"name": "Ann"}));
    assert!(record.is_new());
    assert_eq!(record.url().unwrap(), "/persons");

    record.set(("id", json!("a b"))).unwrap();
    assert!(!record.is_new());
    assert_eq!(record.url().unwrap(), "/persons/a%20b");

    record.unset("id").unwrap();
    assert!(record.is_new());
}

#[test]
fn records_without_a_url_use_their_group() {
    let record = Record::new(Plain, json!({"id": 3}));
    assert!(record.url().is_err());

    let group = Group::new(GroupOf::new(Plain).with_url("/things"));
    group.add(record.clone());
    assert_eq!(record.url().unwrap(), "/things/3");
}

#[test]
fn nested_values_serialize_when_listed() {
    #[derive(recordset::Schema)]
    #[schema(serialize = ["author", "friends"])]
    struct Post;

    let post = Record::new(Post, json!({"title": "t"}));
    let author = Record::new(Person, json!({"name": "Ann"}));
    let friends = Group::new(persons());
    friends.add(json!([{"name": "Bo"}, {"name": "Cy"}]));
    post.embed("author", author);
    post.embed("friends", friends);
    post.embed("hidden", Record::new(Plain, json!({"x": 1})));

    let json = Value::Object(post.to_json());
    assert_eq!(
        json,
        json!({
            "title": "t",
            "author": {"name": "Ann", "active": true},
            "friends": [
                {"name": "Bo", "active": true},
                {"name": "Cy", "active": true}
            ]
        })
    );
}

#[test]
fn duplicate_has_same_attributes_and_new_identity() {
    let record = Record::new(Person, json!({"id": 1, "name": "Ann"}));
    let copy = record.duplicate();

    assert_eq!(copy.attributes(), record.attributes());
    assert_ne!(copy.cid(), record.cid());
    assert_ne!(copy, record);
    assert!(record.ptr_eq(&record.clone()));
}
