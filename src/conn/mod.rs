//! # Connections to monitored targets.
//!
//! The crate never talks to a database driver directly. It consumes two
//! traits instead:
//!
//! - [`ConnectionFactory`] builds an unopened [`Connection`] for a target.
//! - [`Connection`] opens, probes, queries and closes one physical link.
//!
//! A connection is owned by exactly one loop at a time (the monitor's instance
//! record or a collector), so the trait takes `&mut self` and needs no
//! internal locking.
//!
//! ```text
//! ConnectionFactory::make(t) ─► Box<dyn Connection> (closed)
//!                                  │ open()
//!                                  ▼
//!                               probe() / exec() / query() / uptime()
//!                                  │ close()
//!                                  ▼
//!                               closed (may be reopened)
//! ```

use async_trait::async_trait;

use crate::error::ConnError;
use crate::redact::TargetId;

/// One result row, columns rendered as text.
pub type Row = Vec<String>;

/// Query used by the default [`Connection::uptime`].
pub const UPTIME_QUERY: &str = "SHOW GLOBAL STATUS LIKE 'Uptime'";

/// A link to one database server.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Establishes the link. Opening an open connection is allowed to reconnect.
    async fn open(&mut self) -> Result<(), ConnError>;

    /// Round-trips to the server to prove the link is usable.
    async fn probe(&mut self) -> Result<(), ConnError>;

    /// Releases the link. Closing a closed connection is a no-op.
    async fn close(&mut self);

    /// Runs a statement whose result is ignored.
    async fn exec(&mut self, stmt: &str) -> Result<(), ConnError>;

    /// Runs a query and returns every row.
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, ConnError>;

    /// Seconds since the server process started.
    ///
    /// The default reads the second column of [`UPTIME_QUERY`].
    async fn uptime(&mut self) -> Result<u64, ConnError> {
        let rows = self.query(UPTIME_QUERY).await?;
        let value = rows
            .first()
            .and_then(|row| row.get(1))
            .ok_or_else(|| ConnError::Query {
                reason: "uptime not reported".into(),
            })?;
        value.trim().parse().map_err(|_| ConnError::Query {
            reason: format!("uptime not numeric: {value}"),
        })
    }
}

/// Builds connections for targets.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Returns a new, not yet opened connection to `target`.
    fn make(&self, target: &TargetId) -> Box<dyn Connection>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Vec<Row>);

    #[async_trait]
    impl Connection for Canned {
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
            assert_eq!(sql, UPTIME_QUERY);
            Ok(self.0.clone())
        }
    }

    fn row(cols: &[&str]) -> Row {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_default_uptime_parses_second_column() {
        let mut conn = Canned(vec![row(&["Uptime", "4242"])]);
        assert_eq!(conn.uptime().await.ok(), Some(4242));
    }

    #[tokio::test]
    async fn test_default_uptime_rejects_missing_or_garbage() {
        let mut empty = Canned(vec![]);
        assert!(matches!(
            empty.uptime().await,
            Err(ConnError::Query { .. })
        ));

        let mut garbage = Canned(vec![row(&["Uptime", "soon"])]);
        let err = garbage.uptime().await.unwrap_err();
        assert_eq!(err.as_label(), "conn_query");
    }
}
