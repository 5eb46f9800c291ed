//! # Metric extractors.
//!
//! An [`Extractor`] turns one or more queries into samples. The collector runs
//! every extractor on each tick; a failing extractor is logged and the others
//! still run.
//!
//! [`StatusVars`] is always on: it reads the server status variables and keeps
//! the configured subset. The others are enabled per collector:
//!
//! - [`InnoDbMetrics`] reads the enabled `INNODB_METRICS` counters
//! - [`TableStats`] / [`IndexStats`] read the user statistics tables

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::collector::{Metric, MetricKind};
use crate::conn::Connection;
use crate::error::ConnError;

/// Query used by [`StatusVars`].
pub const STATUS_QUERY: &str = "SHOW /*!50002 GLOBAL */ STATUS";

/// Query used by [`InnoDbMetrics`].
pub const INNODB_QUERY: &str = "SELECT NAME, SUBSYSTEM, COUNT, TYPE \
     FROM INFORMATION_SCHEMA.INNODB_METRICS WHERE STATUS='enabled'";

const TABLE_STATS_QUERY: &str = "SELECT TABLE_SCHEMA, TABLE_NAME, ROWS_READ, ROWS_CHANGED, \
     ROWS_CHANGED_X_INDEXES FROM INFORMATION_SCHEMA.TABLE_STATISTICS";

const INDEX_STATS_QUERY: &str = "SELECT TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, ROWS_READ \
     FROM INFORMATION_SCHEMA.INDEX_STATISTICS";

/// Source of samples for one collection.
#[async_trait]
pub trait Extractor: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Reads samples over `conn`, naming them under `prefix`.
    async fn extract(
        &self,
        conn: &mut dyn Connection,
        prefix: &str,
    ) -> Result<Vec<Metric>, ConnError>;
}

/// Collects selected server status variables.
///
/// Variable names are matched case-insensitively and emitted lowercase as
/// `<prefix>/<name>`. A value that does not parse as a number is reported
/// as `0.0`.
#[derive(Clone, Debug, Default)]
pub struct StatusVars {
    wanted: BTreeMap<String, MetricKind>,
}

impl StatusVars {
    pub fn new(wanted: BTreeMap<String, MetricKind>) -> Self {
        let wanted = wanted
            .into_iter()
            .map(|(name, kind)| (name.to_lowercase(), kind))
            .collect();
        Self { wanted }
    }

    pub fn is_empty(&self) -> bool {
        self.wanted.is_empty()
    }
}

#[async_trait]
impl Extractor for StatusVars {
    fn name(&self) -> &str {
        "status"
    }

    async fn extract(
        &self,
        conn: &mut dyn Connection,
        prefix: &str,
    ) -> Result<Vec<Metric>, ConnError> {
        let rows = conn.query(STATUS_QUERY).await?;

        let mut metrics = Vec::new();
        for row in rows {
            let [name, value, ..] = row.as_slice() else {
                continue;
            };
            let name = name.to_lowercase();
            let Some(kind) = self.wanted.get(&name) else {
                continue;
            };
            let value = value.trim().parse().unwrap_or(0.0);
            metrics.push(Metric::new(format!("{prefix}/{name}"), *kind, value));
        }
        Ok(metrics)
    }
}

/// Collects the enabled InnoDB metrics as `<prefix>/innodb/<subsystem>/<name>`.
///
/// Rows of type `value` are gauges, everything else is a counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct InnoDbMetrics;

#[async_trait]
impl Extractor for InnoDbMetrics {
    fn name(&self) -> &str {
        "innodb"
    }

    async fn extract(
        &self,
        conn: &mut dyn Connection,
        prefix: &str,
    ) -> Result<Vec<Metric>, ConnError> {
        let rows = conn.query(INNODB_QUERY).await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in rows {
            let [name, subsystem, count, kind, ..] = row.as_slice() else {
                return Err(malformed(INNODB_QUERY, &row));
            };
            let kind = if kind == "value" {
                MetricKind::Gauge
            } else {
                MetricKind::Counter
            };
            metrics.push(Metric::new(
                format!(
                    "{prefix}/innodb/{}/{}",
                    subsystem.to_lowercase(),
                    name.to_lowercase()
                ),
                kind,
                count.trim().parse().unwrap_or(0.0),
            ));
        }
        Ok(metrics)
    }
}

fn ignoring(query: &str, ignore_db: &str) -> String {
    if ignore_db.is_empty() {
        query.to_string()
    } else {
        let pattern = ignore_db.replace('\'', "''");
        format!("{query} WHERE TABLE_SCHEMA NOT LIKE '{pattern}'")
    }
}

fn malformed(query: &str, row: &[String]) -> ConnError {
    ConnError::Query {
        reason: format!("unexpected row {row:?} for {query}"),
    }
}

fn rows_count(query: &str, row: &[String], raw: &str) -> Result<f64, ConnError> {
    raw.trim()
        .parse::<i64>()
        .map(|n| n as f64)
        .map_err(|_| malformed(query, row))
}

/// Per-table row counters from the user statistics plugin.
///
/// Samples are named `<prefix>/db.<schema>/t.<table>/<counter>`.
#[derive(Clone, Debug, Default)]
pub struct TableStats {
    ignore_db: String,
}

impl TableStats {
    /// `ignore_db` is a `LIKE` pattern of schemas to skip; empty keeps all.
    pub fn new(ignore_db: impl Into<String>) -> Self {
        Self {
            ignore_db: ignore_db.into(),
        }
    }
}

#[async_trait]
impl Extractor for TableStats {
    fn name(&self) -> &str {
        "table_stats"
    }

    async fn extract(
        &self,
        conn: &mut dyn Connection,
        prefix: &str,
    ) -> Result<Vec<Metric>, ConnError> {
        let sql = ignoring(TABLE_STATS_QUERY, &self.ignore_db);
        let rows = conn.query(&sql).await?;

        let mut metrics = Vec::with_capacity(rows.len() * 3);
        for row in &rows {
            let [schema, table, read, changed, changed_x_indexes, ..] = row.as_slice() else {
                return Err(malformed(TABLE_STATS_QUERY, row));
            };
            let base = format!("{prefix}/db.{schema}/t.{table}");
            for (counter, raw) in [
                ("rows_read", read),
                ("rows_changed", changed),
                ("rows_changed_x_indexes", changed_x_indexes),
            ] {
                let value = rows_count(TABLE_STATS_QUERY, row, raw)?;
                metrics.push(Metric::new(
                    format!("{base}/{counter}"),
                    MetricKind::Counter,
                    value,
                ));
            }
        }
        Ok(metrics)
    }
}

/// Per-index read counters from the user statistics plugin.
///
/// Samples are named `<prefix>/db.<schema>/t.<table>/idx.<index>/rows_read`.
#[derive(Clone, Debug, Default)]
pub struct IndexStats {
    ignore_db: String,
}

impl IndexStats {
    /// `ignore_db` is a `LIKE` pattern of schemas to skip; empty keeps all.
    pub fn new(ignore_db: impl Into<String>) -> Self {
        Self {
            ignore_db: ignore_db.into(),
        }
    }
}

#[async_trait]
impl Extractor for IndexStats {
    fn name(&self) -> &str {
        "index_stats"
    }

    async fn extract(
        &self,
        conn: &mut dyn Connection,
        prefix: &str,
    ) -> Result<Vec<Metric>, ConnError> {
        let sql = ignoring(INDEX_STATS_QUERY, &self.ignore_db);
        let rows = conn.query(&sql).await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in &rows {
            let [schema, table, index, read, ..] = row.as_slice() else {
                return Err(malformed(INDEX_STATS_QUERY, row));
            };
            metrics.push(Metric::new(
                format!("{prefix}/db.{schema}/t.{table}/idx.{index}/rows_read"),
                MetricKind::Counter,
                rows_count(INDEX_STATS_QUERY, row, read)?,
            ));
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::Row;

    struct Rows(Result<Vec<Row>, ()>, Option<String>);

    impl Rows {
        fn ok(rows: Vec<Row>) -> Self {
            Self(Ok(rows), None)
        }
    }

    #[async_trait]
    impl Connection for Rows {
        async fn open(&mut self) -> Result<(), ConnError> {
            Ok(())
        }
        async fn probe(&mut self) -> Result<(), ConnError> {
            Ok(())
        }
        async fn close(&mut self) {}
        async fn exec(&mut self, _stmt: &str) -> Result<(), ConnError> {
            Ok(())
        }
        async fn query(&mut self, sql: &str) -> Result<Vec<Row>, ConnError> {
            self.1 = Some(sql.to_string());
            self.0.clone().map_err(|()| ConnError::Query {
                reason: "server has gone away".into(),
            })
        }
    }

    fn rows(pairs: &[(&str, &str)]) -> Vec<Row> {
        pairs
            .iter()
            .map(|(n, v)| vec![n.to_string(), v.to_string()])
            .collect()
    }

    #[tokio::test]
    async fn test_keeps_configured_vars_only() {
        let extractor = StatusVars::new(BTreeMap::from([
            ("Threads_connected".to_string(), MetricKind::Gauge),
            ("queries".to_string(), MetricKind::Counter),
        ]));
        let mut conn = Rows::ok(rows(&[
            ("Aborted_clients", "3"),
            ("Queries", "1200"),
            ("Threads_connected", "7"),
        ]));

        let metrics = extractor.extract(&mut conn, "mysql/db1").await.unwrap();
        assert_eq!(
            metrics,
            vec![
                Metric::new("mysql/db1/queries", MetricKind::Counter, 1200.0),
                Metric::new("mysql/db1/threads_connected", MetricKind::Gauge, 7.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_unparsable_value_is_zero() {
        let extractor = StatusVars::new(BTreeMap::from([(
            "ssl_cipher".to_string(),
            MetricKind::Gauge,
        )]));
        let mut conn = Rows::ok(rows(&[("Ssl_cipher", "")]));

        let metrics = extractor.extract(&mut conn, "mysql").await.unwrap();
        assert_eq!(metrics[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_query_error_is_returned() {
        let extractor = StatusVars::default();
        let mut conn = Rows(Err(()), None);
        let err = extractor.extract(&mut conn, "mysql").await.unwrap_err();
        assert_eq!(err.as_label(), "conn_query");
    }

    #[tokio::test]
    async fn test_innodb_names_and_kinds() {
        let mut conn = Rows::ok(vec![
            ["buffer_pool_reads", "Buffer", "42", "status_counter"]
                .map(String::from)
                .to_vec(),
            ["buffer_pool_size", "server", "134217728", "value"]
                .map(String::from)
                .to_vec(),
        ]);

        let metrics = InnoDbMetrics.extract(&mut conn, "mysql").await.unwrap();
        assert_eq!(
            metrics,
            vec![
                Metric::new("mysql/innodb/buffer/buffer_pool_reads", MetricKind::Counter, 42.0),
                Metric::new("mysql/innodb/server/buffer_pool_size", MetricKind::Gauge, 134217728.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_table_stats_skip_ignored_schema() {
        let mut conn = Rows::ok(vec![
            ["shop", "orders", "10", "2", "6"].map(String::from).to_vec(),
        ]);

        let metrics = TableStats::new("mysql")
            .extract(&mut conn, "mysql/db1")
            .await
            .unwrap();
        let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "mysql/db1/db.shop/t.orders/rows_read",
                "mysql/db1/db.shop/t.orders/rows_changed",
                "mysql/db1/db.shop/t.orders/rows_changed_x_indexes",
            ]
        );
        assert_eq!(metrics[2].value, 6.0);
        assert!(conn.1.unwrap().ends_with("WHERE TABLE_SCHEMA NOT LIKE 'mysql'"));
    }

    #[tokio::test]
    async fn test_index_stats_reject_non_numeric_counts() {
        let mut conn = Rows::ok(vec![
            ["shop", "orders", "PRIMARY", "77"].map(String::from).to_vec(),
        ]);
        let metrics = IndexStats::default().extract(&mut conn, "mysql").await.unwrap();
        assert_eq!(
            metrics,
            vec![Metric::new(
                "mysql/db.shop/t.orders/idx.PRIMARY/rows_read",
                MetricKind::Counter,
                77.0
            )]
        );
        assert!(!conn.1.unwrap().contains("WHERE"));

        let mut bad = Rows::ok(vec![
            ["shop", "orders", "PRIMARY", "many"].map(String::from).to_vec(),
        ]);
        let err = IndexStats::default().extract(&mut bad, "mysql").await.unwrap_err();
        assert_eq!(err.as_label(), "conn_query");
    }
}
