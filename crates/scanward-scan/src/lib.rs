//! Scan execution for scanward.
//!
//! This crate turns a [`ScanRequest`](scanward_core::ScanRequest) into a
//! [`ScanResult`](scanward_core::ScanResult) without blocking the caller.
//!
//! # Overview
//!
//! - **Enumeration** of the target via jwalk
//! - **Bounded concurrency** through [`FileExecutionPool`]
//! - **Cooperative cancellation** via [`CancellationController`]
//! - **Monotonic progress** through [`ProgressAggregator`]
//! - **Backoff** while the detection engine is unavailable
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use scanward_core::{ScanConfig, ScanRequest, SessionId};
//! use scanward_engine::AdapterSet;
//! use scanward_scan::{CancellationController, ProgressAggregator, ScanWorker};
//!
//! # async fn example(adapters: AdapterSet) {
//! let cancel = CancellationController::new();
//! let worker = ScanWorker::new(
//!     SessionId::new(1),
//!     ScanRequest::quick("/home"),
//!     Arc::new(ScanConfig::default()),
//!     adapters,
//!     cancel.token(),
//!     Arc::new(ProgressAggregator::detached()),
//! );
//!
//! let report = worker.run().await;
//! println!("{}", report.result.summary());
//! # }
//! ```

mod aggregate;
mod backoff;
mod cancel;
mod enumerate;
mod filter;
mod pool;
mod worker;

pub use aggregate::{ProgressAggregator, ProgressSink, ResultAggregator, resolve_scan_type};
pub use backoff::{Backoff, BackoffPolicy};
pub use cancel::CancellationController;
pub use enumerate::{Enumeration, enumerate_tasks};
pub use filter::RiskFilter;
pub use pool::{FileExecutionPool, PoolSummary};
pub use worker::{ScanWorker, WorkerHandle, WorkerReport};
