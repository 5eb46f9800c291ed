//! # Metric collection under connection supervision.
//!
//! - [`Collector`] owns one target's collector loop and its connector.
//! - [`Extractor`] is the seam for metric sources; [`StatusVars`],
//!   [`InnoDbMetrics`], [`TableStats`] and [`IndexStats`] are built in.
//! - [`Ticker`] is a periodic tick source for collectors.
//! - [`Collection`], [`Metric`] and [`MetricKind`] are what reaches the sink.

mod collection;
mod connector;
mod extract;
mod ticker;
mod worker;

pub use collection::{Collection, Metric, MetricKind};
pub use extract::{
    Extractor, INNODB_QUERY, IndexStats, InnoDbMetrics, STATUS_QUERY, StatusVars, TableStats,
};
pub use ticker::Ticker;
pub use worker::Collector;
