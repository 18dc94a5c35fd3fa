//! Criterion measurements of batch statement generation: the raw generator
//! buffering rows into one multi-value statement, and the full batch action
//! path on an in-process driver so engine overhead shows up next to it.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sql_fanout::prelude::*;
use sql_fanout::statement::{NoPrimaryKeys, PrimaryKeySource, batch_generator};

/// Fixed key list so the DB2 MERGE generator never touches a database.
#[derive(Debug)]
struct StaticKeys(Arc<Vec<String>>);

impl PrimaryKeySource for StaticKeys {
    fn primary_keys(&self, _: &Location, _: &str) -> Result<Arc<Vec<String>>, FanoutError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Resolve how many rows each iteration submits.
fn bench_rows() -> usize {
    std::env::var("BENCH_ROWS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1_000)
}

// Same seed every run so both paths see identical rows.
fn seeded_rows(count: usize) -> Vec<BatchFilter> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let mut row = BatchFilter::new("TEST.EVENTS");
            row.append("ID", i as i64)
                .append("KIND", format!("kind-{}", rng.random_range(1..20)))
                .append("SCORE", rng.random_range(0.0..1000.0))
                .append("ACTIVE", rng.random_bool(0.5))
                .append("NOTE", format!("it's note {}", rng.random_range(1..1000)));
            row
        })
        .collect()
}

fn generate(dialect: Dialect, mode: BatchMode, rows: &[BatchFilter], keys: &dyn PrimaryKeySource) -> usize {
    let location = Location::new("bench", 0, "BENCH", "", "");
    let mut generator = batch_generator(dialect, mode);
    for row in rows {
        let incompatible = generator.makeup_statement(row.columns(), row.table(), row.values(), false);
        assert!(!incompatible, "benchmark rows share one table");
    }
    let statement = generator
        .form_statement(&location, keys)
        .expect("statement renders");
    generator.clear_content();
    statement.len()
}

fn statement_generation(c: &mut Criterion) {
    let row_count = bench_rows();
    let rows = seeded_rows(row_count);
    let db2_keys = StaticKeys(Arc::new(vec!["ID".to_string()]));

    let mut group = c.benchmark_group("statement_generation");
    group.throughput(Throughput::Elements(row_count as u64));

    let cases: [(&str, Dialect, BatchMode, &dyn PrimaryKeySource); 3] = [
        ("mysql_insert", Dialect::Mysql, BatchMode::Insert, &NoPrimaryKeys),
        ("sqlite_replace", Dialect::Sqlite, BatchMode::Replace, &NoPrimaryKeys),
        ("db2_merge", Dialect::Db2, BatchMode::Replace, &db2_keys),
    ];
    for (name, dialect, mode, keys) in cases {
        group.bench_with_input(BenchmarkId::new(name, row_count), &rows, |b, rows| {
            b.iter(|| black_box(generate(dialect, mode, rows, keys)));
        });
    }
    group.finish();
}

fn batch_action(c: &mut Criterion) {
    let row_count = bench_rows();
    let rows = seeded_rows(row_count);
    let locations: Vec<Location> = (0..4)
        .map(|i| Location::new(format!("10.9.0.{i}"), 3306, "bench", "app", ""))
        .collect();

    let mut group = c.benchmark_group("batch_action");
    group.throughput(Throughput::Elements(row_count as u64));

    for values_per_batch in [10, 100, 1_000] {
        group.bench_with_input(
            BenchmarkId::new("scripted_mysql", values_per_batch),
            &values_per_batch,
            |b, &values_per_batch| {
                b.iter(|| {
                    let driver = ScriptedDriver::new(Dialect::Mysql);
                    let mut tasks =
                        DbTasks::new(Arc::new(driver), TasksOptions::new(locations.clone()));
                    tasks.connect().expect("connect");
                    let batch = tasks
                        .batch_insert(5_000, values_per_batch)
                        .expect("batch action")
                        .expect("no stored error");
                    for row in &rows {
                        batch.run(row).expect("buffer row");
                    }
                    batch.end_action().expect("flush");
                    black_box(batch.get_result().total())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, statement_generation, batch_action);
criterion_main!(benches);
