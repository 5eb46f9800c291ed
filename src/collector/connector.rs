//! # Connector loop.
//!
//! Establishes a collector's connection and hands it over. One connector runs
//! at a time per collector; it exits after a single successful hand-over or on
//! cancellation.
//!
//! ```text
//! close previous ─► ┌► backoff.wait() ─ sleep ─► make + open + probe ─┐
//!                   │                                  │ err         │ ok
//!                   └──────────────────────────────────┘             ▼
//!                                        backoff.success(), setup statements,
//!                                        send Session to the collector loop
//! ```
//!
//! ## Rules
//! - Failed attempts never reset the backoff.
//! - Setup statement failures are logged and do not fail the connect.
//! - Cancellation is observed at every await; a connection opened before
//!   cancellation is closed, never handed over.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::conn::{Connection, ConnectionFactory};
use crate::core::Status;
use crate::error::ConnError;
use crate::policies::Backoff;
use crate::redact::TargetId;

/// An established connection and the backoff that produced it.
pub(crate) struct Session {
    pub(crate) conn: Box<dyn Connection>,
    pub(crate) backoff: Backoff,
}

/// What a connector needs to know about its collector.
#[derive(Clone)]
pub(crate) struct ConnectorCtx {
    pub(crate) name: String,
    pub(crate) target: TargetId,
    pub(crate) factory: Arc<dyn ConnectionFactory>,
    pub(crate) setup: Arc<[String]>,
    pub(crate) status: Status,
}

async fn open_and_probe(conn: &mut dyn Connection) -> Result<(), ConnError> {
    conn.open().await?;
    conn.probe().await
}

async fn run_setup(ctx: &ConnectorCtx, conn: &mut dyn Connection) {
    for stmt in ctx.setup.iter() {
        if let Err(e) = conn.exec(stmt).await {
            tracing::error!(
                collector = %ctx.name,
                statement = %stmt,
                error = %e,
                "setup statement failed"
            );
        }
    }
}

/// Connects with backoff and sends the session to `up`.
pub(crate) async fn run(
    ctx: ConnectorCtx,
    previous: Option<Box<dyn Connection>>,
    mut backoff: Backoff,
    up: mpsc::Sender<Session>,
    token: CancellationToken,
) {
    if let Some(mut old) = previous {
        old.close().await;
    }

    loop {
        let wait = backoff.wait();
        ctx.status
            .update(&ctx.name, format!("Connect wait {}s", wait.as_secs()));
        tracing::debug!(
            collector = %ctx.name,
            delay = ?wait,
            attempt = backoff.attempt(),
            "connect wait"
        );
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = time::sleep(wait) => {}
        }

        ctx.status.update(&ctx.name, "Connecting");
        let mut conn = ctx.factory.make(&ctx.target);
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            res = open_and_probe(conn.as_mut()) => Some(res),
        };

        match opened {
            None => {
                conn.close().await;
                return;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    collector = %ctx.name,
                    instance = %ctx.target,
                    error = %e,
                    label = e.as_label(),
                    "connect failed"
                );
                conn.close().await;
                continue;
            }
            Some(Ok(())) => {}
        }

        backoff.success();
        let setup = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            _ = run_setup(&ctx, conn.as_mut()) => Some(()),
        };
        if setup.is_none() {
            conn.close().await;
            return;
        }

        ctx.status.update(&ctx.name, "Connected");
        tracing::info!(collector = %ctx.name, instance = %ctx.target, "connected");
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = up.reserve() => permit.ok(),
        };
        match permit {
            Some(permit) => permit.send(Session { conn, backoff }),
            None => conn.close().await,
        }
        return;
    }
}
