// Statement dispatcher performance benchmarks.
// Tests the guarded-execution wrapper's overhead (circuit breaker check,
// slow-query classification, session lock) in isolation from any real
// network or database round trip.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ojp_core::backend::{BackendConnection, ColumnMeta, IsolationLevel, LobSink, LobSource, ResultCursor, Row};
use ojp_core::common::{ConnectionFingerprint, Value};
use ojp_core::dispatch::{query::execute_query, update::execute_update};
use ojp_core::error::Result;
use ojp_core::pool_registry::PoolRegistry;
use ojp_core::session::Session;
use std::sync::Arc;
use tokio::runtime::Runtime;

struct NoopCursor;

#[async_trait]
impl ResultCursor for NoopCursor {
    async fn fetch(&mut self, _max_rows: usize) -> Result<(Vec<Row>, bool)> {
        Ok((vec![], true))
    }
}

#[derive(Default)]
struct NoopConnection;

#[async_trait]
impl BackendConnection for NoopConnection {
    async fn execute_update(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
        Ok(1)
    }
    async fn execute_query(&self, _sql: &str, _params: &[Value]) -> Result<(Vec<ColumnMeta>, Box<dyn ResultCursor>)> {
        Ok((vec![], Box::new(NoopCursor)))
    }
    async fn is_valid(&self) -> bool {
        true
    }
    async fn set_autocommit(&self, _autocommit: bool) -> Result<()> {
        Ok(())
    }
    async fn commit(&self) -> Result<()> {
        Ok(())
    }
    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
    async fn set_transaction_isolation(&self, _level: IsolationLevel) -> Result<()> {
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
    async fn open_lob_sink(&self, _lob_id: &str) -> Result<Box<dyn LobSink>> {
        unimplemented!()
    }
    async fn open_lob_source(&self, _lob_id: &str, _block_size: usize) -> Result<Box<dyn LobSource>> {
        unimplemented!()
    }
}

fn session() -> Arc<Session> {
    let fp = ConnectionFingerprint::compute("jdbc:postgresql://db/app", "u", "p", false, &Default::default());
    Arc::new(Session::new(
        uuid::Uuid::new_v4(),
        fp,
        uuid::Uuid::new_v4(),
        false,
        Arc::new(NoopConnection::default()),
        None,
    ))
}

fn bench_execute_update(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let session = session();
    let registry = PoolRegistry::new();

    c.bench_function("execute_update", |b| {
        b.iter(|| {
            rt.block_on(async {
                let affected = execute_update(&session, &registry, black_box("UPDATE t SET x = 1"), &[]).await.unwrap();
                black_box(affected);
            });
        });
    });
}

fn bench_execute_query_by_sql_shape(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = PoolRegistry::new();
    let mut group = c.benchmark_group("execute_query");

    let statements = vec!["SELECT 1", "SELECT * FROM accounts WHERE id = ?", "SELECT a.*, b.* FROM a JOIN b ON a.id = b.a_id"];

    for sql in statements {
        let session = session();
        group.bench_with_input(BenchmarkId::from_parameter(sql), &sql, |b, &sql| {
            b.iter(|| {
                rt.block_on(async {
                    let outcome = execute_query(&session, &registry, black_box(sql), &[]).await.unwrap();
                    black_box(outcome.result_set_id);
                });
            });
        });
    }

    group.finish();
}

fn bench_repeated_statement_circuit_breaker_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let session = session();
    let registry = PoolRegistry::new();

    // Same statement fingerprint every iteration, exercising the warmed
    // circuit-breaker/slow-query map path rather than first-insert cost.
    c.bench_function("execute_update_repeated_fingerprint", |b| {
        b.iter(|| {
            rt.block_on(async {
                for _ in 0..10 {
                    execute_update(&session, &registry, black_box("UPDATE accounts SET balance = balance - ? WHERE id = ?"), &[])
                        .await
                        .unwrap();
                }
            });
        });
    });
}

criterion_group!(benches, bench_execute_update, bench_execute_query_by_sql_shape, bench_repeated_statement_circuit_breaker_lookup);
criterion_main!(benches);
