// Time-travel reads: latest / as-of / range / cursor, projection dedup, paging.

mod common;

use anyhow::Result;
use serde_json::{json, Map, Value as Json};

use common::{cond, p1, p2, p3, ts, Fixture};
use VersionDB::{is_validation, GetOptions, HistoryRecord, Row};

/// Expected projected states of one product over time.
fn state(pid: i64, col1: &str, col2: i64, col3: i64) -> Map<String, Json> {
    let v = json!({"product_id": pid, "col1": col1, "col2": col2, "col3": col3});
    match v {
        Json::Object(m) => m,
        _ => unreachable!(),
    }
}

fn p1_history() -> Vec<Map<String, Json>> {
    vec![
        state(10, "foobar", 10, 1),
        state(10, "change1", 10, 1),
        state(10, "change2", 10, 0),
        state(10, "change2", 15, 0),
    ]
}

fn p2_history() -> Vec<Map<String, Json>> {
    vec![state(11, "baz", 11, 1), state(11, "baz", 12, 1)]
}

fn p3_history() -> Vec<Map<String, Json>> {
    vec![state(2546, "test", 12, 0)]
}

fn data(recs: &[HistoryRecord]) -> Vec<Map<String, Json>> {
    recs.iter().map(|r| r.data.clone()).collect()
}

/// t=10: insert p1, p3
/// t=20: p1.col1 = change1; insert p2 (p2 is written first)
/// t=30: p1.col3 = 0, p1.col1 = change2
/// t=40: p1.col2 = 15, p2.col2 = 12
fn scenario() -> Result<Fixture> {
    let fx = Fixture::new()?;

    fx.at(10);
    let mut s = fx.registry.session(&fx.store)?;
    s.insert("products", p1())?;
    s.insert("products", p3())?;
    s.commit()?;

    fx.at(20);
    let mut s = fx.registry.session(&fx.store)?;
    s.insert("products", p2())?;
    s.update("products", &common::pid(10), Row::new().with("col1", "change1"))?;
    s.commit()?;

    fx.at(30);
    fx.update(10, Row::new().with("col3", 0).with("col1", "change2"))?;

    fx.at(40);
    let mut s = fx.registry.session(&fx.store)?;
    s.update("products", &common::pid(10), Row::new().with("col2", 15))?;
    s.update("products", &common::pid(11), Row::new().with("col2", 12))?;
    s.commit()?;

    Ok(fx)
}

fn get(fx: &Fixture, opts: GetOptions) -> Result<Vec<HistoryRecord>> {
    fx.registry.get(&fx.store, "products", &opts)
}

#[test]
fn as_of_before_first_write_is_empty() -> Result<()> {
    let fx = scenario()?;
    let res = get(&fx, GetOptions::new().cond(cond(2546)).at(ts(5)))?;
    assert!(res.is_empty());

    let res = get(&fx, GetOptions::new().cond(cond(10)).at(ts(15)))?;
    assert_eq!(data(&res), vec![p1_history()[0].clone()]);
    assert_eq!(res[0].version, 0);
    Ok(())
}

#[test]
fn as_of_between_writes() -> Result<()> {
    let fx = scenario()?;
    let res = get(&fx, GetOptions::new().cond(cond(10)).at(ts(35)))?;
    assert_eq!(data(&res), vec![p1_history()[2].clone()]);

    // boundary: updated_at == t is included
    let res = get(&fx, GetOptions::new().cond(cond(10)).at(ts(30)))?;
    assert_eq!(res[0].version, 2);
    Ok(())
}

#[test]
fn until_returns_every_change_before_t2() -> Result<()> {
    let fx = scenario()?;
    let res = get(&fx, GetOptions::new().cond(cond(10)).until(ts(35)))?;
    assert_eq!(data(&res), p1_history()[..3].to_vec());
    Ok(())
}

#[test]
fn range_is_half_open() -> Result<()> {
    let fx = scenario()?;
    let res = get(&fx, GetOptions::new().cond(cond(10)).between(ts(11), ts(45)))?;
    assert_eq!(data(&res), p1_history()[1..].to_vec());

    let res = get(&fx, GetOptions::new().cond(cond(10)).between(ts(20), ts(40)))?;
    let versions: Vec<u64> = res.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1, 2]);
    Ok(())
}

#[test]
fn latest_with_several_conds() -> Result<()> {
    let fx = scenario()?;
    let res = get(&fx, GetOptions::new().cond(cond(10)).cond(cond(11)))?;
    assert_eq!(
        data(&res),
        vec![p1_history()[3].clone(), p2_history()[1].clone()]
    );

    let res = get(
        &fx,
        GetOptions::new().cond(cond(10)).cond(cond(11)).at(ts(25)),
    )?;
    assert_eq!(
        data(&res),
        vec![p1_history()[1].clone(), p2_history()[0].clone()]
    );
    Ok(())
}

#[test]
fn as_of_over_every_key() -> Result<()> {
    let fx = scenario()?;
    let res = get(&fx, GetOptions::new().at(ts(31)))?;
    assert_eq!(
        data(&res),
        vec![
            p1_history()[2].clone(),
            p2_history()[0].clone(),
            p3_history()[0].clone()
        ]
    );

    let res = get(&fx, GetOptions::new().at(ts(11)))?;
    assert_eq!(
        data(&res),
        vec![p1_history()[0].clone(), p3_history()[0].clone()]
    );
    Ok(())
}

#[test]
fn as_of_pages_one_state_per_key() -> Result<()> {
    let fx = scenario()?;
    let res = get(&fx, GetOptions::new().at(ts(31)).page(2).page_size(1))?;
    assert_eq!(data(&res), vec![p2_history()[0].clone()]);

    // a key whose state at t is a tombstone takes no slot on the page
    fx.at(50);
    fx.delete(10)?;
    let opts = GetOptions::new().at(ts(55)).include_deleted(false).page_size(2);
    let res = get(&fx, opts.clone())?;
    assert_eq!(
        data(&res),
        vec![p2_history()[1].clone(), p3_history()[0].clone()]
    );
    assert!(get(&fx, opts.page(2))?.is_empty());
    Ok(())
}

#[test]
fn cursor_returns_entries_after_log_id_in_log_order() -> Result<()> {
    let fx = scenario()?;
    // log ids: p1h0=1, p3h0=2, p2h0=3, p1h1=4, p1h2=5, p1h3=6, p2h1=7
    let res = get(&fx, GetOptions::new().since_log_id(3))?;
    let ids: Vec<u64> = res.iter().map(|r| r.log_id).collect();
    assert_eq!(ids, vec![4, 5, 6, 7]);
    assert_eq!(
        data(&res),
        vec![
            p1_history()[1].clone(),
            p1_history()[2].clone(),
            p1_history()[3].clone(),
            p2_history()[1].clone()
        ]
    );

    // time options are ignored in cursor mode
    let res = get(&fx, GetOptions::new().since_log_id(6).at(ts(5)))?;
    assert_eq!(res.len(), 1);
    assert_eq!(res[0].log_id, 7);
    Ok(())
}

#[test]
fn projection_collapses_unchanged_states() -> Result<()> {
    let fx = scenario()?;
    let res = get(
        &fx,
        GetOptions::new()
            .cond(cond(10))
            .between(ts(9), ts(45))
            .fields(&["col2"]),
    )?;
    let versions: Vec<u64> = res.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![0, 3]);
    assert_eq!(res[0].data, state_only("col2", json!(10)));
    assert_eq!(res[1].data, state_only("col2", json!(15)));
    Ok(())
}

fn state_only(col: &str, v: Json) -> Map<String, Json> {
    let mut m = Map::new();
    m.insert(col.to_string(), v);
    m
}

#[test]
fn projection_across_keys_restarts_at_key_boundary() -> Result<()> {
    let fx = scenario()?;
    let res = get(
        &fx,
        GetOptions::new().between(ts(0), ts(45)).fields(&["col1"]),
    )?;
    let got: Vec<(i64, u64)> = res
        .iter()
        .map(|r| {
            (
                r.version_key
                    .get("product_id")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(-1),
                r.version,
            )
        })
        .collect();
    assert_eq!(got, vec![(10, 0), (10, 1), (10, 2), (11, 0), (2546, 0)]);
    Ok(())
}

#[test]
fn unknown_field_projects_to_null() -> Result<()> {
    let fx = scenario()?;
    let res = get(
        &fx,
        GetOptions::new()
            .cond(cond(10))
            .fields(&["col1", "invalid_col"]),
    )?;
    assert_eq!(res.len(), 1);
    assert_eq!(res[0].data["col1"], json!("change2"));
    assert_eq!(res[0].data["invalid_col"], Json::Null);
    Ok(())
}

#[test]
fn tombstones_follow_include_deleted() -> Result<()> {
    let fx = scenario()?;
    fx.at(50);
    fx.delete(2546)?;

    let all = get(&fx, GetOptions::new().cond(cond(2546)).between(ts(0), ts(60)))?;
    assert_eq!(all.len(), 2);
    assert!(all[1].deleted);
    // tombstone carries the last image
    assert_eq!(all[1].data, p3_history()[0]);

    let live_only = get(
        &fx,
        GetOptions::new()
            .cond(cond(2546))
            .between(ts(0), ts(60))
            .include_deleted(false),
    )?;
    assert_eq!(live_only.len(), 1);
    assert!(!live_only[0].deleted);

    // as-of after the delete: the key's state is the tombstone
    let res = get(&fx, GetOptions::new().cond(cond(2546)).at(ts(55)))?;
    assert_eq!(res.len(), 1);
    assert!(res[0].deleted);
    let res = get(
        &fx,
        GetOptions::new().cond(cond(2546)).at(ts(55)).include_deleted(false),
    )?;
    assert!(res.is_empty());

    // deleted keys have no live row and drop out of the latest view
    let res = get(&fx, GetOptions::new())?;
    let keys: Vec<i64> = res
        .iter()
        .filter_map(|r| r.version_key.get("product_id").and_then(|v| v.as_i64()))
        .collect();
    assert_eq!(keys, vec![10, 11]);
    Ok(())
}

#[test]
fn invalid_conds_are_rejected() -> Result<()> {
    let fx = scenario()?;

    let extra = Row::new().with("product_id", 10).with("col1", "foobar");
    let err = get(&fx, GetOptions::new().cond(extra)).expect_err("extra column");
    assert!(is_validation(&err));

    let wrong = Row::new().with("id", 10);
    let err = get(&fx, GetOptions::new().cond(wrong)).expect_err("non-key column");
    assert!(is_validation(&err));

    let typed = Row::new().with("product_id", "ten");
    let err = get(&fx, GetOptions::new().cond(typed)).expect_err("wrong type");
    assert!(is_validation(&err));
    Ok(())
}

#[test]
fn invalid_paging_is_rejected() -> Result<()> {
    let fx = scenario()?;
    let err = get(&fx, GetOptions::new().page(0)).expect_err("page 0");
    assert!(is_validation(&err));
    let err = get(&fx, GetOptions::new().page_size(0)).expect_err("page_size 0");
    assert!(is_validation(&err));
    Ok(())
}

#[test]
fn unregistered_table_is_rejected() -> Result<()> {
    let fx = scenario()?;
    let err = fx
        .registry
        .get(&fx.store, "nope", &GetOptions::new())
        .expect_err("unregistered");
    assert!(is_validation(&err));
    Ok(())
}

// ---- paging ----

/// p1 plus 500 updates, all at t=10000.
fn long_history() -> Result<(Fixture, Vec<Map<String, Json>>)> {
    let fx = Fixture::new()?;
    fx.at(10000);
    fx.insert(p1())?;

    let mut history = vec![state(10, "foobar", 10, 1)];
    for i in 0..500i64 {
        let col1 = format!("foobar{}", "1".repeat(((i + 1) / 10) as usize));
        let col2 = 11 + i;
        let col3 = i64::from(i < 250);
        fx.update(
            10,
            Row::new()
                .with("col1", col1.as_str())
                .with("col2", col2)
                .with("col3", col3),
        )?;
        history.push(state(10, &col1, col2, col3));
    }
    Ok((fx, history))
}

#[test]
fn paging_over_a_long_history() -> Result<()> {
    let (fx, history) = long_history()?;
    let range = || GetOptions::new().cond(cond(10)).until(ts(10001));

    let all = get(&fx, range().page_size(1000))?;
    assert_eq!(all.len(), 501);
    assert_eq!(data(&all), history);

    let page3 = get(&fx, range().page(3).page_size(100))?;
    assert_eq!(data(&page3), history[200..300].to_vec());

    // dedup runs per page, after pagination
    let col1 = get(&fx, range().fields(&["col1"]).page_size(80))?;
    let expected: Vec<Json> = history[0..80]
        .iter()
        .step_by(10)
        .map(|m| m["col1"].clone())
        .collect();
    let got: Vec<Json> = col1.iter().map(|r| r.data["col1"].clone()).collect();
    assert_eq!(got, expected);
    Ok(())
}

#[test]
fn default_page_size_comes_from_config() -> Result<()> {
    let (fx, _) = long_history()?;
    let res = get(&fx, GetOptions::new().cond(cond(10)).until(ts(10001)))?;
    assert_eq!(res.len(), fx.registry.config().page_size);
    Ok(())
}
