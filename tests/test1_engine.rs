use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sql_fanout::engine::{AffectedRowRecorder, Engine, Recorders, Reply};
use sql_fanout::prelude::*;

fn locations(n: usize) -> Vec<Location> {
    (0..n)
        .map(|i| Location::new(format!("10.0.1.{i}"), 3306, "shop", "app", "secret"))
        .collect()
}

fn connected(driver: &ScriptedDriver, locs: &[Location]) -> Result<Engine<ScriptedDriver>, FanoutError> {
    let engine = Engine::start(Arc::new(driver.clone()), locs.to_vec(), 8)?;
    engine
        .dispatch_all(ActionKind::Connect, &Filter::default(), None)?
        .into_result()?;
    Ok(engine)
}

#[test]
fn fan_out_collects_one_reply_per_location() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(4);
    // first Location finishes last
    driver.delay(&locs[0], Duration::from_millis(40));

    let engine = connected(&driver, &locs)?;
    assert_eq!(driver.threads_started(), 4);

    let round = engine.dispatch_all(ActionKind::Delete, &Filter::new("DELETE FROM t"), None)?;
    assert_eq!(round.reported(), 4);
    assert!(round.failures().is_empty());
    for loc in &locs {
        assert_eq!(round.replies().get(loc), Some(&Reply::Rows(1)));
    }

    engine.shutdown();
    engine.shutdown();
    Ok(())
}

#[test]
fn same_location_commands_keep_their_order() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    driver.delay(&locs[1], Duration::from_millis(2));
    let engine = connected(&driver, &locs)?;

    let mut expected = Vec::new();
    for i in 0..20 {
        let sql = format!("UPDATE t SET n = {i}");
        let works: BTreeMap<Location, Filter> = locs
            .iter()
            .map(|loc| (loc.clone(), Filter::new(sql.clone())))
            .collect();
        engine.dispatch(ActionKind::Update, works, None)?.into_result()?;
        expected.push(sql);
    }

    for loc in &locs {
        assert_eq!(driver.statements(loc, ActionKind::Update), expected);
    }
    Ok(())
}

#[test]
fn sync_dispatch_runs_on_the_calling_thread() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    let engine = connected(&driver, &locs)?;

    let reply = engine.dispatch_sync(
        ActionKind::Insert,
        &locs[1],
        &Filter::new("INSERT INTO t (id) VALUES (1),(2)"),
        None,
    )?;
    assert_eq!(reply.affected(), 2);

    let calls = driver.calls(&locs[1]);
    let connect = calls.first().ok_or("no connect call")?;
    let insert = calls.last().ok_or("no insert call")?;
    assert!(
        connect
            .thread
            .as_deref()
            .is_some_and(|name| name.starts_with("fanout-worker-"))
    );
    assert_eq!(insert.kind, ActionKind::Insert);
    assert_eq!(insert.thread.as_deref(), std::thread::current().name());
    assert!(driver.calls(&locs[0]).iter().all(|call| call.kind == ActionKind::Connect));
    Ok(())
}

#[test]
fn crossing_the_commit_threshold_commits_on_that_connection() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    let engine = connected(&driver, &locs)?;

    let mut recorders: Recorders = locs
        .iter()
        .map(|loc| (loc.clone(), AffectedRowRecorder::new(3)))
        .collect();
    let two_rows = Filter::new("INSERT INTO t (id) VALUES (1),(2)");
    for _ in 0..3 {
        engine
            .dispatch_all(ActionKind::Insert, &two_rows, Some(&mut recorders))?
            .into_result()?;
    }

    // totals 2, 4, 6 cross the multiples 3 and 6
    for loc in &locs {
        assert_eq!(recorders.get(loc).map(AffectedRowRecorder::total), Some(6));
        assert_eq!(driver.count(loc, ActionKind::Commit), 2);
        let kinds: Vec<ActionKind> = driver.calls(loc).iter().map(|call| call.kind).collect();
        assert_eq!(
            kinds,
            [
                ActionKind::Connect,
                ActionKind::Insert,
                ActionKind::Insert,
                ActionKind::Commit,
                ActionKind::Insert,
                ActionKind::Commit,
            ]
        );
    }
    Ok(())
}

#[test]
fn one_failing_location_does_not_stop_the_others() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(3);
    let engine = connected(&driver, &locs)?;
    driver.fail(&locs[1], ActionKind::Insert, 1062, "Duplicate entry '1' for key 'PRIMARY'");

    let sql = "INSERT INTO t (id) VALUES (1)";
    let round = engine.dispatch_all(ActionKind::Insert, &Filter::new(sql), None)?;
    assert_eq!(round.replies().len(), 2);
    let failure = round.failures().first().ok_or("missing failure")?;
    assert_eq!(failure.kind, ErrorKind::InsertDuplicateKey);
    assert_eq!(failure.location, locs[1]);
    assert_eq!(failure.code, 1062);
    assert_eq!(failure.statement.as_deref(), Some(sql));

    let err = round.into_result().expect_err("one location failed");
    assert_eq!(err.kind(), ErrorKind::InsertDuplicateKey);
    assert_eq!(err.succeeded(), [locs[0].clone(), locs[2].clone()]);
    Ok(())
}

#[test]
fn unknown_and_duplicate_locations_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(1);
    let engine = connected(&driver, &locs)?;

    let stranger = Location::new("192.168.0.1", 3306, "shop", "app", "");
    let works = BTreeMap::from([(stranger.clone(), Filter::default())]);
    let err = engine
        .dispatch(ActionKind::Commit, works, None)
        .expect_err("unknown location");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(engine.dispatch_sync(ActionKind::Commit, &stranger, &Filter::default(), None).is_err());

    let twice = vec![locs[0].clone(), locs[0].clone()];
    let err = Engine::start(Arc::new(driver), twice, 4).err().ok_or("duplicates accepted")?;
    assert_eq!(err.kind(), ErrorKind::ConfigError);
    Ok(())
}

#[test]
fn panicking_driver_reports_a_failure_and_keeps_the_worker() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    let engine = connected(&driver, &locs)?;
    driver.panic_on(&locs[1], ActionKind::Update);

    let round = engine.dispatch_all(ActionKind::Update, &Filter::new("UPDATE t SET n = 1"), None)?;
    assert_eq!(round.reported(), 2);
    let failure = round.failures().first().ok_or("missing failure")?;
    assert_eq!(failure.location, locs[1]);
    assert_eq!(failure.kind, ErrorKind::UpdateFailure);
    assert_eq!(round.replies().get(&locs[0]), Some(&Reply::Rows(1)));

    // the same worker serves the next round
    driver.clear_panics();
    let round = engine.dispatch_all(ActionKind::Update, &Filter::new("UPDATE t SET n = 2"), None)?;
    assert!(round.failures().is_empty());
    assert_eq!(driver.count(&locs[1], ActionKind::Update), 2);
    engine.shutdown();
    Ok(())
}
