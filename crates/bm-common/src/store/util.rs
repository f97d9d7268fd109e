use std::{sync::OnceLock, time::Instant};

use deadpool_postgres::Client;
use tokio_postgres::{Row, types::ToSql};
use tracing::warn;

fn slow_query_threshold_ms() -> Option<u64> {
    static CACHE: OnceLock<Option<u64>> = OnceLock::new();

    *CACHE.get_or_init(|| parse_threshold(std::env::var("BM_DB_LOG_MIN_DURATION_MS").ok()))
}

fn parse_threshold(raw: Option<String>) -> Option<u64> {
    raw.and_then(|raw| raw.parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .filter(|v| *v > 0)
}

fn maybe_log_slow_query(label: &str, started_at: Instant) {
    if let Some(threshold_ms) = slow_query_threshold_ms() {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if elapsed_ms >= threshold_ms {
            warn!(query = label, elapsed_ms, "slow_query_detected");
        }
    }
}

/// Runs a cached prepared statement and warns when it exceeds `BM_DB_LOG_MIN_DURATION_MS`.
pub async fn timed_query(
    client: &Client,
    statement: &str,
    params: &[&(dyn ToSql + Sync)],
    label: &str,
) -> Result<Vec<Row>, tokio_postgres::Error> {
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.query(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

pub async fn timed_query_opt(
    client: &Client,
    statement: &str,
    params: &[&(dyn ToSql + Sync)],
    label: &str,
) -> Result<Option<Row>, tokio_postgres::Error> {
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.query_opt(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

pub async fn timed_execute(
    client: &Client,
    statement: &str,
    params: &[&(dyn ToSql + Sync)],
    label: &str,
) -> Result<u64, tokio_postgres::Error> {
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.execute(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_ignores_zero_negative_and_garbage() {
        assert_eq!(parse_threshold(None), None);
        assert_eq!(parse_threshold(Some("0".into())), None);
        assert_eq!(parse_threshold(Some("-5".into())), None);
        assert_eq!(parse_threshold(Some("abc".into())), None);
        assert_eq!(parse_threshold(Some("250".into())), Some(250));
    }
}
