//! # Riskflow Runtime
//!
//! Runtime support shared by every Riskflow service:
//!
//! - [`retry`]: exponential backoff for transient failures (bus publishes,
//!   provider calls). Composed *around* operations, never inside handlers
//!   that the consumer worker already retries — double-retry amplifies
//!   dead-letter latency.
//! - [`shutdown`]: cooperative shutdown wired to `SIGINT`/`SIGTERM`. Workers
//!   poll the flag between batches; mid-batch cancellation waits for the
//!   current handler to finish.
//! - [`metrics`]: metric descriptions for the counters emitted across the
//!   pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod metrics;
pub mod retry;
pub mod shutdown;

pub use retry::{retry_with_backoff, RetryPolicy};
pub use shutdown::ShutdownSignal;
