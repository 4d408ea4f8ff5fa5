use std::{
    collections::BTreeMap,
    fs,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use mosaic_data::{Condition, DataError, DataStore, Matcher, Value};

fn record(pairs: &[(&str, Value)]) -> Value {
    Value::Map(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn numbered(count: usize) -> DataStore {
    let mut store = DataStore::new("data");
    store
        .define("items", |def| {
            def.from_array((1..=count).map(|n| record(&[("n", Value::from(n))])))?;
            Ok(())
        })
        .unwrap();
    store
}

fn seeded_posts() -> DataStore {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("posts.toml"),
        r#"
[[posts]]
title = "Old featured"
featured = true
published_at = 2023-05-01

[[posts]]
title = "New featured"
featured = true
published_at = 2024-02-10

[[posts]]
title = "Newest plain"
featured = false
published_at = 2024-06-01
"#,
    )
    .unwrap();

    let mut store = DataStore::new(dir.path());
    store.load_directory().unwrap();
    store
}

#[test]
fn test_paginate_twenty_three_records_by_five() {
    let store = numbered(23);
    let pages = store.query("items").unwrap().paginate(5).unwrap();

    assert_eq!(pages.len(), 5);
    assert_eq!(pages[0].items.len(), 5);
    assert_eq!(pages[0].prev_page, None);
    assert_eq!(pages[0].next_page, Some(2));
    assert_eq!(pages[4].items.len(), 3);
    assert_eq!(pages[4].next_page, None);
    assert_eq!(pages.iter().map(|p| p.items.len()).sum::<usize>(), 23);
    assert!(pages.iter().all(|p| p.total_items == 23 && p.total_pages == 5));
}

#[test]
fn test_paginate_respects_effective_result() {
    let store = numbered(23);
    let query = store.query("items").unwrap().offset(2).limit(7);
    let pages = query.paginate(5).unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].items.len(), 2);
    assert_eq!(pages[0].items[0].field("n"), &Value::Int(3));
}

#[test]
fn test_paginate_empty_and_zero() {
    let store = numbered(0);
    let query = store.query("items").unwrap();

    let pages = query.paginate(10).unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].items.is_empty());
    assert!(matches!(
        query.paginate(0),
        Err(DataError::InvalidArgument(_))
    ));
}

#[test]
fn test_featured_most_recent_first() {
    let store = seeded_posts();
    let result = store
        .query("posts")
        .unwrap()
        .filter([("featured", true)])
        .order("published_at", true)
        .limit(1)
        .all();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].field("title"), &Value::from("New featured"));
}

#[test]
fn test_limit_bounds_count() {
    let store = numbered(12);
    let query = store.query("items").unwrap();
    for n in [0, 1, 5, 12, 40] {
        assert_eq!(query.limit(n).count(), n.min(12));
    }
    assert_eq!(query.offset(20).count(), 0);
}

#[test]
fn test_nil_values_sort_last_in_both_directions() {
    let mut store = DataStore::new("data");
    store
        .define("people", |def| {
            def.from_array(vec![
                record(&[("name", "b".into()), ("age", 30.into())]),
                record(&[("name", "nobody".into())]),
                record(&[("name", "a".into()), ("age", 20.into())]),
                record(&[("name", "c".into()), ("age", Value::Float(25.5))]),
            ])?;
            Ok(())
        })
        .unwrap();
    let query = store.query("people").unwrap();

    let names = |desc: bool| -> Vec<String> {
        query
            .order("age", desc)
            .all()
            .iter()
            .map(|item| item.field("name").to_string())
            .collect()
    };
    assert_eq!(names(false), ["a", "c", "b", "nobody"]);
    assert_eq!(names(true), ["b", "c", "a", "nobody"]);
}

#[test]
fn test_mixed_types_rank_numbers_before_strings() {
    let mut store = DataStore::new("data");
    store
        .define("mixed", |def| {
            def.from_array(vec![
                record(&[("v", "apple".into())]),
                record(&[("v", 10.into())]),
                record(&[("v", 2.into())]),
            ])?;
            Ok(())
        })
        .unwrap();

    let values: Vec<String> = store
        .query("mixed")
        .unwrap()
        .order("v", false)
        .all()
        .iter()
        .map(|item| item.field("v").to_string())
        .collect();
    assert_eq!(values, ["2", "10", "apple"]);
}

#[test]
fn test_filters_and_across_groups() {
    let store = numbered(10);
    let query = store
        .query("items")
        .unwrap()
        .filter([("n", Matcher::GreaterThan(3.into()))])
        .filter([("n", Condition::from(1..=6))]);

    assert_eq!(query.count(), 3);
    assert_eq!(query.last().unwrap().field("n"), &Value::Int(6));
    assert!(query.find_by([("n", 9)]).is_none());
    assert_eq!(
        query.find_by([("n", 5)]).unwrap().field("n"),
        &Value::Int(5)
    );
}

#[test]
fn test_queries_never_mutate_the_collection() {
    let store = numbered(5);
    let base = store.query("items").unwrap();
    let _narrowed = base.filter([("n", 1)]).limit(1);

    assert_eq!(base.count(), 5);
    assert_eq!(store.collection("items").unwrap().len(), 5);
}

#[test]
fn test_scopes_run_and_wrap_errors() {
    let mut store = DataStore::new("data");
    store
        .define("posts", |def| {
            def.from_array(vec![
                record(&[("title", "a".into()), ("status", "live".into())]),
                record(&[("title", "b".into()), ("status", "draft".into())]),
            ])?
            .scope("live", |q, _| Ok(q.filter([("status", "live")])))
            .scope("by_status", |q, args| {
                let status = args
                    .first()
                    .cloned()
                    .ok_or_else(|| DataError::invalid("status required"))?;
                Ok(q.filter([("status", status)]))
            });
            Ok(())
        })
        .unwrap();
    let query = store.query("posts").unwrap();

    assert_eq!(query.scope("live", &[]).unwrap().count(), 1);
    assert_eq!(
        query
            .scope("by_status", &["draft".into()])
            .unwrap()
            .first()
            .unwrap()
            .field("title"),
        &Value::from("b")
    );

    let err = query.scope("by_status", &[]).unwrap_err();
    assert!(matches!(err, DataError::Scope { ref scope, .. } if scope == "by_status"));
    assert!(err.to_string().contains("status required"));
    assert!(matches!(
        query.scope("missing", &[]),
        Err(DataError::UnknownScope { .. })
    ));
}

#[test]
fn test_computed_methods_are_memoized_and_wrapped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut store = DataStore::new("data");
    store
        .define("posts", move |def| {
            def.from_array(vec![record(&[("title", "Hello World".into())])])?
                .method("slug", move |item, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(item
                        .field("title")
                        .to_string()
                        .to_lowercase()
                        .replace(' ', "-")
                        .into())
                })
                .method("broken", |_, _| Err(DataError::invalid("no")));
            Ok(())
        })
        .unwrap();

    let query = store.query("posts").unwrap();
    let item = query.first().unwrap();
    assert_eq!(item.call("slug", &[]).unwrap(), Value::from("hello-world"));
    assert_eq!(item.lookup("slug").unwrap(), Value::from("hello-world"));
    // A fresh accessor for the same record shares the memo.
    assert_eq!(
        query.first().unwrap().call("slug", &[]).unwrap(),
        Value::from("hello-world")
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(matches!(
        item.call("broken", &[]),
        Err(DataError::ItemMethod { ref method, ref model, .. }) if method == "broken" && model == "posts"
    ));
    assert!(matches!(
        item.call("nope", &[]),
        Err(DataError::UnknownMethod { .. })
    ));
    assert_eq!(item.lookup("nope").unwrap(), Value::Null);
}

#[test]
fn test_items_are_read_only() {
    let store = numbered(1);
    let item = store.query("items").unwrap().first().unwrap();

    assert!(matches!(
        item.set("n", 5),
        Err(DataError::ImmutableMutation { ref key, .. }) if key == "n"
    ));
    assert_eq!(item.field("n"), &Value::Int(1));
    assert_eq!(item.keys().collect::<Vec<_>>(), ["n"]);
}

#[test]
fn test_toml_dates_order_correctly() {
    let store = seeded_posts();
    let titles: Vec<String> = store
        .query("posts")
        .unwrap()
        .order("published_at", false)
        .all()
        .iter()
        .map(|item| item.field("title").to_string())
        .collect();

    assert_eq!(titles, ["Old featured", "New featured", "Newest plain"]);
}

#[test]
fn test_open_ended_ranges() {
    let store = numbered(10);
    let items = store.query("items").unwrap();
    let values = |query: &mosaic_data::Query| -> Vec<Value> {
        query.all().iter().map(|item| item.field("n").clone()).collect()
    };

    let from_only = items.filter([(
        "n",
        Matcher::Between {
            from: Some(Value::from(8)),
            to: None,
        },
    )]);
    assert_eq!(values(&from_only), [8, 9, 10].map(Value::Int));

    let to_only = items.filter([(
        "n",
        Matcher::Between {
            from: None,
            to: Some(Value::from(2)),
        },
    )]);
    assert_eq!(values(&to_only), [1, 2].map(Value::Int));

    // Both endpoints are inclusive.
    let closed = items.filter([(
        "n",
        Matcher::Between {
            from: Some(Value::from(4)),
            to: Some(Value::from(4)),
        },
    )]);
    assert_eq!(closed.count(), 1);

    assert_eq!(items.filter([("n", 9..)]).count(), 2);
    assert_eq!(items.filter([("n", ..=3)]).count(), 3);
}
