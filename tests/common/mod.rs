#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dbsentry::{Connection, ConnectionFactory, ConnError, Row, TargetId};

/// Scripted behaviour and call counters of one fake server.
#[derive(Debug, Default)]
pub struct FakeServer {
    /// Uptime readings returned in order; the last one repeats.
    pub uptimes: VecDeque<u64>,
    pub last_uptime: u64,
    /// Rows returned by any query.
    pub status_rows: Vec<Row>,

    /// Number of upcoming calls that fail.
    pub open_fail: usize,
    pub probe_fail: usize,
    pub query_fail: usize,
    pub uptime_fail: usize,
    pub exec_fail: bool,
    /// How long every `exec` takes.
    pub exec_delay: Option<Duration>,

    /// Calls that panic instead of returning.
    pub open_panic: bool,
    pub uptime_panic: bool,

    pub made: usize,
    pub opens: usize,
    pub closes: usize,
    pub probes: usize,
    pub execs: Vec<String>,
}

fn take(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

/// Connection factory backed by in-memory fake servers, one per target.
#[derive(Clone, Default)]
pub struct FakeFactory {
    servers: Arc<Mutex<HashMap<String, Arc<Mutex<FakeServer>>>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn server(&self, target: &TargetId) -> Arc<Mutex<FakeServer>> {
        let mut servers = self.servers.lock().unwrap();
        Arc::clone(servers.entry(target.expose().to_string()).or_default())
    }

    pub fn with<R>(&self, target: &TargetId, f: impl FnOnce(&mut FakeServer) -> R) -> R {
        let server = self.server(target);
        let mut guard = server.lock().unwrap();
        f(&mut guard)
    }
}

impl ConnectionFactory for FakeFactory {
    fn make(&self, target: &TargetId) -> Box<dyn Connection> {
        let server = self.server(target);
        server.lock().unwrap().made += 1;
        Box::new(FakeConn {
            server,
            open: false,
        })
    }
}

struct FakeConn {
    server: Arc<Mutex<FakeServer>>,
    open: bool,
}

impl FakeConn {
    fn ensure_open(&self) -> Result<(), ConnError> {
        if self.open {
            Ok(())
        } else {
            Err(ConnError::NotOpen)
        }
    }
}

#[async_trait]
impl Connection for FakeConn {
    async fn open(&mut self) -> Result<(), ConnError> {
        let panics = {
            let mut s = self.server.lock().unwrap();
            s.opens += 1;
            s.open_panic
        };
        if panics {
            panic!("driver bug in open");
        }

        let mut s = self.server.lock().unwrap();
        if take(&mut s.open_fail) {
            return Err(ConnError::Open {
                reason: "connection refused".into(),
            });
        }
        self.open = true;
        Ok(())
    }

    async fn probe(&mut self) -> Result<(), ConnError> {
        self.ensure_open()?;
        let mut s = self.server.lock().unwrap();
        s.probes += 1;
        if take(&mut s.probe_fail) {
            return Err(ConnError::Probe {
                reason: "server has gone away".into(),
            });
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.server.lock().unwrap().closes += 1;
        }
    }

    async fn exec(&mut self, stmt: &str) -> Result<(), ConnError> {
        self.ensure_open()?;
        let (delay, fail) = {
            let mut s = self.server.lock().unwrap();
            s.execs.push(stmt.to_string());
            (s.exec_delay, s.exec_fail)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ConnError::Query {
                reason: "access denied".into(),
            });
        }
        Ok(())
    }

    async fn query(&mut self, _sql: &str) -> Result<Vec<Row>, ConnError> {
        self.ensure_open()?;
        let mut s = self.server.lock().unwrap();
        if take(&mut s.query_fail) {
            return Err(ConnError::Query {
                reason: "lost connection during query".into(),
            });
        }
        Ok(s.status_rows.clone())
    }

    async fn uptime(&mut self) -> Result<u64, ConnError> {
        self.ensure_open()?;
        let panics = self.server.lock().unwrap().uptime_panic;
        if panics {
            panic!("driver bug in uptime");
        }
        let mut s = self.server.lock().unwrap();
        if take(&mut s.uptime_fail) {
            return Err(ConnError::Query {
                reason: "lost connection during query".into(),
            });
        }
        if let Some(next) = s.uptimes.pop_front() {
            s.last_uptime = next;
        }
        Ok(s.last_uptime)
    }
}

pub fn target(host: &str) -> TargetId {
    TargetId::new(format!("agent:s3cret@tcp({host}:3306)/"))
}

pub fn row(name: &str, value: &str) -> Row {
    vec![name.to_string(), value.to_string()]
}

/// Polls `read` until it returns `want`, letting paused time advance.
pub async fn wait_for(mut read: impl FnMut() -> Option<String>, want: &str) {
    for _ in 0..100_000 {
        if read().as_deref() == Some(want) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("status never became {want:?}, last: {:?}", read());
}
