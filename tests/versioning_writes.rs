// Archive writes driven by live-table mutations: versions, tombstones, key moves.

mod common;

use anyhow::Result;
use serde_json::json;

use common::{multi_key_fixture, mkey, p1, p2, pid, Fixture};
use VersionDB::{
    is_conflict, is_validation, ColumnType, Filter, Row, Storage, TableSpec, Value,
};

fn versions(rows: &[Row]) -> Vec<i64> {
    rows.iter().filter_map(|r| r.value("version").as_i64()).collect()
}

fn deleted(rows: &[Row]) -> Vec<bool> {
    rows.iter().filter_map(|r| r.value("deleted").as_bool()).collect()
}

#[test]
fn insert_writes_version_zero_and_points_log_ref() -> Result<()> {
    let fx = Fixture::new()?;
    fx.at(10);
    let log_id = fx.insert(p1())?;

    let archive = fx.archive_of(10)?;
    assert_eq!(archive.len(), 1);
    let a = &archive[0];
    assert_eq!(a.value("version"), Value::Int(0));
    assert_eq!(a.value("deleted"), Value::Bool(false));
    assert_eq!(a.value("log_id"), Value::Int(log_id as i64));
    assert_eq!(a.value("updated_at"), Value::Timestamp(common::ts(10)));
    assert_eq!(a.value("actor"), Value::Null);

    let data = match a.value("data") {
        Value::Json(j) => j,
        other => panic!("data column holds {:?}", other),
    };
    assert_eq!(data["product_id"], json!(10));
    assert_eq!(data["col1"], json!("foobar"));
    assert_eq!(data["col2"], json!(10));
    assert!(data.get("log_ref").is_none());

    let live = fx.live_of(10)?.expect("live row");
    assert_eq!(live.value("log_ref"), Value::Int(log_id as i64));
    assert_eq!(fx.current_version(10)?, Some(0));
    Ok(())
}

#[test]
fn updates_produce_contiguous_versions() -> Result<()> {
    let fx = Fixture::new()?;
    fx.at(10);
    fx.insert(p1())?;
    for (i, t) in [20, 30, 40].into_iter().enumerate() {
        fx.at(t);
        fx.update(10, Row::new().with("col2", 100 + i as i64))?;
    }
    let archive = fx.archive_of(10)?;
    assert_eq!(versions(&archive), vec![0, 1, 2, 3]);
    assert_eq!(deleted(&archive), vec![false; 4]);
    assert_eq!(fx.current_version(10)?, Some(3));

    let live = fx.live_of(10)?.expect("live row");
    assert_eq!(live.value("col2"), Value::Int(102));
    assert_eq!(live.value("log_ref"), archive[3].value("log_id"));
    Ok(())
}

#[test]
fn unchanged_update_writes_nothing() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert(p1())?;
    let ids = fx.update(10, Row::new().with("col1", "foobar").with("col2", 10))?;
    assert!(ids.is_empty());
    assert_eq!(fx.archive_of(10)?.len(), 1);
    assert_eq!(fx.current_version(10)?, Some(0));
    Ok(())
}

#[test]
fn ignored_column_change_does_not_version() -> Result<()> {
    let fx = Fixture::with_spec(
        TableSpec::new("products", "products_archive", &["product_id"]).ignore(&["col3"]),
    )?;
    fx.insert(p1())?;
    let ids = fx.update(10, Row::new().with("col3", 0))?;
    assert!(ids.is_empty());
    assert_eq!(fx.archive_of(10)?.len(), 1);
    // the live row still changes
    assert_eq!(fx.live_of(10)?.expect("live").value("col3"), Value::Int(0));

    // ignored columns are left out of the snapshot
    let ids = fx.update(10, Row::new().with("col2", 99).with("col3", 1))?;
    assert_eq!(ids.len(), 1);
    let archive = fx.archive_of(10)?;
    assert_eq!(versions(&archive), vec![0, 1]);
    match archive[1].value("data") {
        Value::Json(j) => {
            assert_eq!(j["col2"], json!(99));
            assert!(j.get("col3").is_none());
        }
        other => panic!("data column holds {:?}", other),
    }
    Ok(())
}

#[test]
fn delete_appends_tombstone_with_last_image() -> Result<()> {
    let fx = Fixture::new()?;
    fx.at(10);
    fx.insert(p1())?;
    fx.at(20);
    fx.update(10, Row::new().with("col1", "change1"))?;
    fx.at(30);
    let ids = fx.delete(10)?;
    assert_eq!(ids.len(), 1);

    assert!(fx.live_of(10)?.is_none());
    let archive = fx.archive_of(10)?;
    assert_eq!(versions(&archive), vec![0, 1, 2]);
    assert_eq!(deleted(&archive), vec![false, false, true]);
    match archive[2].value("data") {
        Value::Json(j) => assert_eq!(j["col1"], json!("change1")),
        other => panic!("data column holds {:?}", other),
    }
    assert_eq!(fx.current_version(10)?, None);
    Ok(())
}

#[test]
fn reinsert_after_soft_delete_continues_numbering() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert(p1())?;
    fx.delete(10)?;
    fx.insert(p1().with("col1", "back"))?;

    let archive = fx.archive_of(10)?;
    assert_eq!(versions(&archive), vec![0, 1, 2]);
    assert_eq!(deleted(&archive), vec![false, true, false]);
    assert_eq!(fx.current_version(10)?, Some(2));
    Ok(())
}

#[test]
fn key_change_tombstones_old_key_and_starts_new_one() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert(p1())?;
    fx.update(10, Row::new().with("col2", 20))?;

    let ids = fx.update(10, Row::new().with("product_id", 99))?;
    assert_eq!(ids.len(), 2);

    let old = fx.archive_of(10)?;
    assert_eq!(versions(&old), vec![0, 1, 2]);
    assert_eq!(deleted(&old), vec![false, false, true]);

    let new = fx.archive_of(99)?;
    assert_eq!(versions(&new), vec![0]);
    assert_eq!(deleted(&new), vec![false]);
    assert_eq!(new[0].value("log_id"), Value::Int(ids[1] as i64));

    assert!(fx.live_of(10)?.is_none());
    assert_eq!(fx.current_version(99)?, Some(0));
    Ok(())
}

#[test]
fn key_change_onto_soft_deleted_key_continues_its_numbering() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert(p2())?;
    fx.delete(11)?;

    fx.insert(p1())?;
    let ids = fx.update(10, Row::new().with("product_id", 11))?;
    assert_eq!(ids.len(), 2);

    let moved = fx.archive_of(11)?;
    assert_eq!(versions(&moved), vec![0, 1, 2]);
    assert_eq!(deleted(&moved), vec![false, true, false]);
    assert_eq!(moved[2].value("log_id"), Value::Int(ids[1] as i64));
    match moved[2].value("data") {
        Value::Json(j) => assert_eq!(j["col1"], json!("foobar")),
        other => panic!("data column holds {:?}", other),
    }

    let old = fx.archive_of(10)?;
    assert_eq!(versions(&old), vec![0, 1]);
    assert_eq!(deleted(&old), vec![false, true]);

    assert_eq!(fx.current_version(11)?, Some(2));
    assert_eq!(fx.current_version(10)?, None);
    Ok(())
}

#[test]
fn several_changes_in_one_session() -> Result<()> {
    let fx = Fixture::new()?;
    let mut s = fx.registry.session(&fx.store)?;
    s.insert("products", p1())?;
    s.insert("products", p2())?;
    assert!(s.update("products", &pid(10), Row::new().with("col2", 1))?);
    assert!(s.update("products", &pid(10), Row::new().with("col2", 2))?);
    assert_eq!(s.pending_changes().len(), 4);
    // own writes are visible before commit; archive entries are not written yet
    let (_, live) = s.find("products", &pid(10))?.expect("own insert visible");
    assert_eq!(live.value("col2"), Value::Int(2));
    assert_eq!(s.current_version("products", &pid(10))?, None);
    let ids = s.commit()?;
    assert_eq!(ids.len(), 4);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(versions(&fx.archive_of(10)?), vec![0, 1, 2]);
    assert_eq!(versions(&fx.archive_of(11)?), vec![0]);
    assert_eq!(fx.current_version(10)?, Some(2));
    Ok(())
}

#[test]
fn insert_then_delete_in_one_session() -> Result<()> {
    let fx = Fixture::new()?;
    let mut s = fx.registry.session(&fx.store)?;
    s.insert("products", p1())?;
    assert!(s.delete("products", &pid(10))?);
    s.commit()?;

    let archive = fx.archive_of(10)?;
    assert_eq!(deleted(&archive), vec![false, true]);
    assert!(fx.live_of(10)?.is_none());
    Ok(())
}

#[test]
fn missing_key_update_and_delete_return_false() -> Result<()> {
    let fx = Fixture::new()?;
    let mut s = fx.registry.session(&fx.store)?;
    assert!(!s.update("products", &pid(404), Row::new().with("col2", 1))?);
    assert!(!s.delete("products", &pid(404))?);
    assert!(s.commit()?.is_empty());
    assert_eq!(fx.archive_len()?, 0);
    Ok(())
}

#[test]
fn actor_is_stamped_on_every_entry() -> Result<()> {
    let fx = Fixture::new()?;
    let mut s = fx.registry.session(&fx.store)?.updated_by("alice");
    s.insert("products", p1())?;
    s.commit()?;

    let mut s = fx.registry.session(&fx.store)?;
    s.set_actor(Some("bob"));
    assert_eq!(s.actor(), Some("bob"));
    s.update("products", &pid(10), Row::new().with("col2", 1))?;
    s.delete("products", &pid(10))?;
    s.commit()?;

    let actors: Vec<Value> = fx
        .archive_of(10)?
        .iter()
        .map(|r| r.value("actor"))
        .collect();
    assert_eq!(
        actors,
        vec![Value::from("alice"), Value::from("bob"), Value::from("bob")]
    );
    Ok(())
}

#[test]
fn rollback_and_drop_leave_no_trace() -> Result<()> {
    let fx = Fixture::new()?;
    let mut s = fx.registry.session(&fx.store)?;
    s.insert("products", p1())?;
    s.rollback()?;

    {
        let mut s = fx.registry.session(&fx.store)?;
        s.insert("products", p2())?;
        // dropped without commit
    }

    assert!(fx.live_of(10)?.is_none());
    assert!(fx.live_of(11)?.is_none());
    assert_eq!(fx.archive_len()?, 0);
    Ok(())
}

#[test]
fn log_ref_is_not_writable() -> Result<()> {
    let fx = Fixture::new()?;
    let mut s = fx.registry.session(&fx.store)?;
    let err = s
        .insert("products", p1().with("log_ref", 5))
        .expect_err("caller-supplied log_ref");
    assert!(is_validation(&err));

    s.insert("products", p1())?;
    let err = s
        .update("products", &pid(10), Row::new().with("log_ref", Value::Null))
        .expect_err("caller-supplied log_ref");
    assert!(is_validation(&err));
    Ok(())
}

#[test]
fn null_key_and_unregistered_table_are_rejected() -> Result<()> {
    let fx = Fixture::new()?;
    let mut s = fx.registry.session(&fx.store)?;
    let err = s
        .insert("products", Row::new().with("col1", "no key"))
        .expect_err("missing key");
    assert!(is_validation(&err));

    let err = s.insert("unknown", p1()).expect_err("unregistered");
    assert!(is_validation(&err));
    Ok(())
}

#[test]
fn duplicate_live_key_conflicts() -> Result<()> {
    let fx = Fixture::new()?;
    fx.insert(p1())?;
    let mut s = fx.registry.session(&fx.store)?;
    let err = s.insert("products", p1()).expect_err("duplicate key");
    assert!(is_conflict(&err));
    Ok(())
}

#[test]
fn multi_column_key_versions_each_combination() -> Result<()> {
    let (store, registry, handle) = multi_key_fixture()?;
    let row = |a: i64, b: &str, c: &str| {
        Row::new()
            .with("product_id_1", a)
            .with("product_id_2", b)
            .with("col1", c)
            .with("col2", 1)
    };

    let mut s = registry.session(&store)?;
    s.insert("multi", row(1, "a", "x"))?;
    s.insert("multi", row(1, "b", "x"))?;
    s.commit()?;

    let mut s = registry.session(&store)?;
    assert!(s.update("multi", &mkey(1, "a"), Row::new().with("col1", "y"))?);
    s.commit()?;

    let tx = store.begin()?;
    assert_eq!(handle.current_version(tx.as_ref(), &mkey(1, "a"))?, Some(1));
    assert_eq!(handle.current_version(tx.as_ref(), &mkey(1, "b"))?, Some(0));
    let a_rows = tx.select(
        "multi_archive",
        &Filter::all().eq("product_id_1", 1).eq("product_id_2", "a"),
    )?;
    assert_eq!(a_rows.len(), 2);
    tx.rollback()?;

    let schema = handle.archive_schema();
    assert_eq!(
        schema.get_column("product_id_2").map(|c| c.ty),
        Some(ColumnType::Text)
    );
    Ok(())
}
