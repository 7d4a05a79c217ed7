//! Randomized A/B benchmarking of simulator runs with and without device
//! model elision.
//!
//! Trials are external commands run through a [`harness::TrialRunner`];
//! their wall times and log-derived counters are aggregated into
//! [`stats::Summary`] values and rendered by [`report`].

pub mod bins;
pub mod config;
pub mod error;
pub mod harness;
pub mod logs;
pub mod metrics;
pub mod report;
pub mod schedule;
pub mod schema;
pub mod stats;
pub mod suites;

pub use error::{BenchError, Result};
