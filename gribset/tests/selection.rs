mod common;

use gribset::{Collection, DisplayConfig, Error, Selector, Value};
use pretty_assertions::assert_eq;

use common::{LEVELS, SHORT_NAMES, fixture, store};

#[test]
fn positional_access() {
    let (_dir, path) = fixture(10);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    assert_eq!(coll.get(3).unwrap().get("index").unwrap(), Value::Int(3));
    assert_eq!(coll.get(-1).unwrap().get("index").unwrap(), Value::Int(9));
    assert_eq!(coll.get(-10).unwrap().get("index").unwrap(), Value::Int(0));
    assert!(matches!(
        coll.get(1000),
        Err(Error::IndexOutOfRange { index: 1000, len: 10 })
    ));
    assert!(matches!(
        coll.get(-11),
        Err(Error::IndexOutOfRange { index: -11, len: 10 })
    ));
}

#[test]
fn slice_bounds_clamp() {
    let (_dir, path) = fixture(10);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    assert_eq!(coll.slice(..).len(), 10);
    assert_eq!(coll.slice(8..50).len(), 2);
    assert_eq!(coll.slice(12..).len(), 0);
    assert_eq!(coll.slice_span(Some(-3), None).len(), 3);
    assert_eq!(coll.slice_span(Some(-30), Some(2)).len(), 2);
    assert_eq!(coll.slice_span(Some(6), Some(2)).len(), 0);

    let tail = coll.slice_span(Some(-3), None);
    assert_eq!(tail.field(0, "index").unwrap(), Value::Int(7));
}

#[test]
fn field_selectors() {
    let (_dir, path) = fixture(8);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    let one = coll
        .select(&Selector::At(1).key("shortName"))
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(one, Value::from("z"));

    let names = coll
        .select(&Selector::from(0..2).key("shortName"))
        .unwrap()
        .into_values()
        .unwrap();
    assert_eq!(names, vec![Value::from("t"), Value::from("z")]);

    let levels = coll.slice_field(Some(-2), None, "level").unwrap();
    assert_eq!(levels, vec![Value::Int(LEVELS[1]), Value::Int(LEVELS[1])]);
}

#[test]
fn record_and_collection_selectors() {
    let (_dir, path) = fixture(6);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    let rec = coll.select(&Selector::At(-2)).unwrap().into_record().unwrap();
    assert_eq!(rec.get("index").unwrap(), Value::Int(4));

    let all = coll.select(&Selector::from(..)).unwrap().into_collection().unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(store.collection_count(), 2);
}

#[test]
fn unsupported_selectors_are_type_mismatches() {
    let (_dir, path) = fixture(4);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    assert!(matches!(
        coll.select(&Selector::from("shortName")),
        Err(Error::TypeMismatch(_))
    ));
    assert!(matches!(
        coll.select(&Selector::At(0).key("level").key("shortName")),
        Err(Error::TypeMismatch(_))
    ));
    assert!(matches!(
        coll.field(0, "noSuchKey"),
        Err(Error::KeyNotFound { key }) if key == "noSuchKey"
    ));
}

#[test]
fn filter_matches_every_criterion() {
    let (_dir, path) = fixture(32);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    let temps = coll.filter(&[("shortName", Value::from("t"))]).unwrap();
    assert_eq!(temps.len(), 8);
    assert!(
        temps
            .slice_field(None, None, "shortName")
            .unwrap()
            .iter()
            .all(|v| v == &Value::from(SHORT_NAMES[0]))
    );

    let narrow = coll
        .filter(&[
            ("shortName", Value::from("t")),
            ("level", Value::Int(925)),
        ])
        .unwrap();
    assert_eq!(narrow.len(), 2);
    assert_eq!(
        narrow.slice_field(None, None, "index").unwrap(),
        vec![Value::Int(4), Value::Int(20)]
    );

    let none = coll.filter(&[("level", Value::Int(1))]).unwrap();
    assert!(none.is_empty());

    assert!(matches!(
        coll.filter(&[("noSuchKey", Value::Int(1))]),
        Err(Error::KeyNotFound { .. })
    ));
}

#[test]
fn concat_joins_in_order() {
    let (_dir, path) = fixture(6);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();
    let head = coll.slice(..2);
    let tail = coll.slice(4..);

    let joined = (&head + &tail).unwrap();
    assert_eq!(joined.len(), 4);
    assert_eq!(
        joined.slice_field(None, None, "index").unwrap(),
        vec![Value::Int(0), Value::Int(1), Value::Int(4), Value::Int(5)]
    );
}

#[test]
fn iteration_yields_every_record() {
    let (_dir, path) = fixture(5);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();
    let indices: Vec<Value> = coll
        .iter()
        .map(|r| r.unwrap().get("index").unwrap())
        .collect();
    assert_eq!(indices, (0..5).map(Value::Int).collect::<Vec<_>>());
    assert_eq!(store.record_owner_count(), 0);
}

#[test]
fn render_default_columns() {
    let (_dir, path) = fixture(3);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    let out = coll.render(&DisplayConfig::default()).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0].split_whitespace().collect::<Vec<_>>(),
        vec![
            "edition",
            "centre",
            "typeOfLevel",
            "level",
            "dataDate",
            "stepRange",
            "shortName",
            "packingType",
            "gridType",
        ]
    );
    assert_eq!(
        lines[2].split_whitespace().collect::<Vec<_>>(),
        vec![
            "2",
            "ecmf",
            "isobaricInhPa",
            "1000",
            "20240101",
            "0",
            "z",
            "grid_simple",
            "regular_ll",
        ]
    );
}

#[test]
fn render_custom_keys_and_namespace() {
    let (_dir, path) = fixture(2);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    let cfg =
        DisplayConfig::new(Some(vec!["shortName".into(), "level".into()]), None, None).unwrap();
    assert_eq!(
        coll.render(&cfg).unwrap(),
        "shortName  level\n        t   1000\n        z   1000\n"
    );

    let cfg = DisplayConfig::new(None, Some("time".into()), None).unwrap();
    let out = coll.render(&cfg).unwrap();
    assert_eq!(
        out.lines().next().unwrap().split_whitespace().collect::<Vec<_>>(),
        vec!["dataDate", "dataTime", "stepRange"]
    );

    let rec = coll.get(0).unwrap();
    let one = rec.render(&cfg).unwrap();
    assert_eq!(one.lines().count(), 2);
    assert_eq!(
        one.lines().nth(1).unwrap().split_whitespace().collect::<Vec<_>>(),
        vec!["20240101", "1200", "0"]
    );
}

#[test]
fn render_elides_long_listings() {
    let (_dir, path) = fixture(20);
    let (_codec, store) = store();
    let coll = Collection::open(&store, &path).unwrap();

    let mut cfg = DisplayConfig::default();
    cfg.update("keys", "index").unwrap();
    cfg.update("max_rows", "4").unwrap();
    let out = coll.render(&cfg).unwrap();
    let lines: Vec<&str> = out.lines().map(str::trim).collect();
    assert_eq!(
        lines,
        vec!["index", "0", "1", "...", "18", "19", "20 records"]
    );
}
