//! Database metrics collection.

use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Record the duration of one statement against a table.
pub fn record_query_duration(operation: &'static str, table: &'static str, duration_secs: f64) {
    histogram!(
        "database_query_duration_seconds",
        "operation" => operation,
        "table" => table
    )
    .record(duration_secs);
}

/// Count a commit rejected because of a stale concurrency token.
pub fn record_conflict(table: &'static str) {
    counter!("database_concurrency_conflicts_total", "table" => table).increment(1);
}

/// Record database connection pool metrics.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("database_connections_active").set(active as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

/// Times a statement and records it on [`QueryTimer::record`].
///
/// ```ignore
/// let timer = QueryTimer::new("fetch", "clients");
/// let result = query.fetch_all(&pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    operation: &'static str,
    table: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(operation: &'static str, table: &'static str) -> Self {
        Self {
            operation,
            table,
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        record_query_duration(
            self.operation,
            self.table,
            self.start.elapsed().as_secs_f64(),
        );
    }
}
