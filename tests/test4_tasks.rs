use std::collections::BTreeMap;
use std::sync::Arc;

use sql_fanout::prelude::*;

fn locations(n: usize) -> Vec<Location> {
    (0..n)
        .map(|i| Location::new(format!("10.0.4.{i}"), 3306, "shop", "app", "secret"))
        .collect()
}

fn tasks_for(driver: &ScriptedDriver, locs: &[Location], mode: PropagationMode) -> DbTasks<ScriptedDriver> {
    let options = TasksOptions::new(locs.to_vec()).with_propagation(mode);
    DbTasks::new(Arc::new(driver.clone()), options)
}

#[test]
fn only_one_action_at_a_time() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
    tasks.connect()?;

    let insert = tasks.insert(1000)?.ok_or("no action")?;
    insert.run(&Filter::new("INSERT INTO t (id) VALUES (1)"))?;

    let err = tasks.select().err().ok_or("second action accepted")?;
    assert!(matches!(err, FanoutError::Coding(CodingError::PrevWorkNotFinished)));
    assert_eq!(err.kind(), ErrorKind::CodingError);
    assert!(tasks.has_unfinished_action());

    // the in-flight action is untouched by the refused request
    let insert = tasks.insert(1000).err().ok_or("second insert accepted")?;
    assert_eq!(insert.kind(), ErrorKind::CodingError);
    assert_eq!(driver.statements(&locs[0], ActionKind::Insert).len(), 1);

    tasks.disconnect()?;
    tasks.connect()?;
    let select = tasks.select()?.ok_or("no action")?;
    assert!(select.end_action()?);
    assert!(tasks.update(10)?.is_some());
    Ok(())
}

#[test]
fn actions_need_a_connection() {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let mut tasks = tasks_for(&driver, &locations(1), PropagationMode::Raise);
    let err = tasks.select().err();
    assert!(matches!(err, Some(FanoutError::Coding(CodingError::CodeSequence(_)))));
}

#[test]
fn accumulate_mode_stores_failures() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Accumulate);
    assert!(tasks.connect()?);

    driver.fail(&locs[1], ActionKind::Insert, 1062, "Duplicate entry '1' for key 'PRIMARY'");
    let insert = tasks.insert(1000)?.ok_or("no action")?;
    let outcome = insert.run(&Filter::new("INSERT INTO t (id) VALUES (1)"))?;
    assert_eq!(outcome, None);

    let rejected = tasks.select()?;
    assert!(rejected.is_none());
    let last = tasks.last_error().ok_or("nothing stored")?;
    assert_eq!(last.kind(), ErrorKind::CodingError);

    tasks.take_last_error();
    assert!(tasks.last_error().is_none());

    tasks.set_propagation_mode(PropagationMode::Raise);
    assert_eq!(tasks.propagation_mode(), PropagationMode::Raise);
    assert!(tasks.select().is_err());
    Ok(())
}

#[test]
fn duplicate_key_is_its_own_kind() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(1);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Accumulate);
    tasks.connect()?;
    driver.fail(&locs[0], ActionKind::Insert, 1062, "Duplicate entry '1' for key 'PRIMARY'");

    let insert = tasks.insert(1000)?.ok_or("no action")?;
    assert_eq!(insert.run_at(&Filter::new("INSERT INTO t (id) VALUES (1)"), &locs[0])?, None);

    let last = tasks.last_error().ok_or("nothing stored")?;
    assert_eq!(last.kind(), ErrorKind::InsertDuplicateKey);
    assert!(last.kind().is_execute_failure());
    let failure = last.failures().first().ok_or("no failure")?;
    assert_eq!(failure.location, locs[0]);
    assert_eq!(failure.statement.as_deref(), Some("INSERT INTO t (id) VALUES (1)"));

    let insert = tasks.insert(1000)?;
    assert!(insert.is_none(), "previous insert never ended");
    Ok(())
}

#[test]
fn execute_family_counts_and_commits() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
    tasks.connect()?;

    let truncate = tasks.truncate()?.ok_or("no action")?;
    assert_eq!(truncate.commit_limit(), 1);
    truncate.run_at(&Filter::new("TRUNCATE TABLE t"), &locs[0])?;
    assert_eq!(driver.count(&locs[0], ActionKind::Commit), 1);
    truncate.end_action()?;
    // only the touched Location commits again
    assert_eq!(driver.count(&locs[0], ActionKind::Commit), 2);
    assert_eq!(driver.count(&locs[1], ActionKind::Commit), 0);

    let delete = tasks.delete(10)?.ok_or("no action")?;
    let works = BTreeMap::from([
        (locs[0].clone(), Filter::new("DELETE FROM t WHERE id = 1")),
        (locs[1].clone(), Filter::new("DELETE FROM t WHERE id = 2")),
    ]);
    let affected = delete.run_many(works)?.ok_or("no rows")?;
    assert_eq!(affected.values().sum::<u64>(), 2);
    let result = delete.get_result();
    assert_eq!(result.affected_rows_at(&locs[1])?, Some(1));
    assert_eq!(result.total(), 2);
    delete.end_action()?;

    let execute = tasks.execute()?.ok_or("no action")?;
    let statuses = execute.run(&Filter::new("CREATE INDEX ix ON t (id)"))?.ok_or("no rows")?;
    assert!(statuses.values().all(|rows| *rows == 0));
    execute.end_action()?;
    Ok(())
}

#[test]
fn escape_string_per_location() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
    tasks.connect()?;

    let escape = tasks.escape_string()?.ok_or("no action")?;
    escape.run(b"it's\0a\r\nline")?;
    let expected = "it\\'s\\0a\\r\\nline";
    assert_eq!(escape.escaped_string_at(&locs[1])?.as_deref(), Some(expected));
    assert_eq!(escape.escaped_string().as_deref(), Some(expected));
    assert_eq!(escape.escaped_string().as_deref(), Some(expected));
    assert_eq!(escape.escaped_string(), None);

    escape.run_at(b"o'hara", &locs[0])?;
    assert_eq!(escape.escaped_string().as_deref(), Some("o\\'hara"));
    assert!(escape.escaped_string_at(&locs[1]).is_err());

    // escaping runs inline on the caller
    let calls = driver.calls(&locs[0]);
    assert!(calls.iter().filter(|call| call.kind == ActionKind::Escape).all(|call| {
        call.thread
            .as_deref()
            .is_none_or(|name| !name.starts_with("fanout-worker-"))
    }));

    assert!(escape.end_action()?);
    assert!(escape.is_finished());
    assert_eq!(driver.count(&locs[0], ActionKind::Commit), 0);
    Ok(())
}

#[test]
fn primary_key_action_collects_key_columns() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    driver.push_result(&locs[0], &["COL_NAME"], vec![
        vec![RowValues::Text("id".into())],
        vec![RowValues::Text("region".into())],
    ]);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
    tasks.connect()?;

    let keys = tasks.primary_keys()?.ok_or("no action")?;
    keys.lookup("orders")?;
    let found = keys.keys()?.ok_or("no keys")?;
    assert_eq!(found.get(&locs[0]), Some(&vec!["id".to_string(), "region".to_string()]));
    assert_eq!(found.get(&locs[1]), Some(&Vec::new()));

    let lookups = driver.statements(&locs[0], ActionKind::Query);
    assert!(lookups[0].contains("TABLE_NAME = 'orders' AND table_schema = 'shop'"));
    keys.end_action()?;
    Ok(())
}

#[test]
fn connect_failure_tears_everything_down() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(3);
    driver.fail(&locs[2], ActionKind::Connect, 2003, "Can't connect to MySQL server");
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);

    let err = tasks.connect().expect_err("one location is down");
    assert_eq!(err.kind(), ErrorKind::ConnectFailure);
    assert!(!tasks.is_connected());
    // the Locations that did connect were released
    assert_eq!(driver.count(&locs[0], ActionKind::Disconnect), 1);
    assert_eq!(driver.count(&locs[2], ActionKind::Disconnect), 0);

    driver.clear_failures();
    assert!(tasks.connect()?);
    assert!(tasks.connect()?);
    assert_eq!(driver.count(&locs[2], ActionKind::Connect), 2);
    Ok(())
}

#[test]
fn disconnect_stops_the_engine_even_when_the_action_fails() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
    tasks.connect()?;

    let insert = tasks.insert(1000)?.ok_or("no action")?;
    insert.run(&Filter::new("INSERT INTO t (id) VALUES (1)"))?;
    driver.fail(&locs[0], ActionKind::Commit, 1205, "Lock wait timeout exceeded");

    let err = tasks.disconnect().expect_err("commit fails");
    assert_eq!(err.kind(), ErrorKind::CommitFailure);
    assert!(!tasks.is_connected());
    assert!(!tasks.has_unfinished_action());
    for loc in &locs {
        assert_eq!(driver.count(loc, ActionKind::Disconnect), 1);
    }
    // already disconnected
    assert!(tasks.disconnect()?);
    Ok(())
}

#[test]
fn dropping_a_connected_facade_disconnects() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    {
        let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
        tasks.connect()?;
    }
    for loc in &locs {
        assert_eq!(driver.count(loc, ActionKind::Disconnect), 1);
    }
    Ok(())
}

#[test]
fn truncate_commits_even_without_affected_rows() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(2);
    // MySQL reports 0 rows for TRUNCATE TABLE
    for loc in &locs {
        driver.report_rows(loc, 0);
    }
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
    tasks.connect()?;

    let truncate = tasks.truncate()?.ok_or("no action")?;
    truncate.run(&Filter::new("TRUNCATE TABLE t"))?;
    for loc in &locs {
        assert_eq!(driver.count(loc, ActionKind::Commit), 1);
    }
    truncate.run_at(&Filter::new("TRUNCATE TABLE u"), &locs[1])?;
    assert_eq!(driver.count(&locs[1], ActionKind::Commit), 2);
    assert_eq!(truncate.get_result().total(), 0);

    // a zero-row delete stays below its threshold
    truncate.end_action()?;
    let delete = tasks.delete(1)?.ok_or("no action")?;
    delete.run_at(&Filter::new("DELETE FROM t WHERE 1 = 0"), &locs[0])?;
    assert_eq!(driver.count(&locs[0], ActionKind::Commit), 2);
    Ok(())
}

#[test]
fn last_affected_rows_asks_each_connection() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Mysql);
    let locs = locations(3);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
    tasks.connect()?;

    let insert = tasks.insert(1000)?.ok_or("no action")?;
    insert.run_at(&Filter::new("INSERT INTO t (id) VALUES (1),(2),(3)"), &locs[0])?;
    insert.run_at(&Filter::new("INSERT INTO t (id) VALUES (4)"), &locs[2])?;

    let last = insert.last_affected_rows()?.ok_or("no rows")?;
    assert_eq!(last, BTreeMap::from([(locs[0].clone(), 3), (locs[2].clone(), 1)]));
    assert_eq!(driver.count(&locs[0], ActionKind::AffectedRows), 1);
    assert_eq!(driver.count(&locs[1], ActionKind::AffectedRows), 0);
    // asking twice does not grow the totals
    insert.last_affected_rows()?;
    assert_eq!(insert.get_result().total(), 4);

    driver.fail(&locs[2], ActionKind::AffectedRows, 2006, "MySQL server has gone away");
    let err = insert.last_affected_rows().expect_err("one location is gone");
    assert_eq!(err.kind(), ErrorKind::AffectedRowsFailure);
    assert_eq!(err.succeeded(), [locs[0].clone()]);
    Ok(())
}

#[test]
fn escaped_strings_are_handed_out_once_each() -> Result<(), Box<dyn std::error::Error>> {
    let driver = ScriptedDriver::new(Dialect::Sqlite);
    let locs = locations(5);
    let mut tasks = tasks_for(&driver, &locs, PropagationMode::Raise);
    tasks.connect()?;

    let escape = tasks.escape_string()?.ok_or("no action")?;
    escape.run(b"o'hara")?;
    let mut handed_out = Vec::new();
    while let Some(text) = escape.escaped_string() {
        handed_out.push(text);
    }
    assert_eq!(handed_out, vec!["o''hara".to_string(); 5]);
    // still readable per Location after the queue is drained
    assert_eq!(escape.escaped_string_at(&locs[4])?.as_deref(), Some("o''hara"));

    escape.run(b"x")?;
    assert_eq!(escape.escaped_string().as_deref(), Some("x"));
    escape.end_action()?;
    Ok(())
}
