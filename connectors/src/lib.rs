//! # Riskflow Connectors
//!
//! The universal polling connector: a per-instance state machine that fetches
//! from an external provider on a schedule, detects change against a
//! persisted per-item version, publishes only new or changed signals, records
//! per-connector state, and degrades gracefully on transient failure.
//!
//! ```text
//! Idle ─▶ Fetching ─▶ Transforming ─▶ Publishing ─▶ Persisting ─▶ Idle
//!   ▲                                                               │
//!   └──────────────────────── Backoff ◀── (any error) ◀─────────────┘
//! ```
//!
//! A connector owns its keyspace in the state store by construction: exactly
//! one connector task writes `riskflow:connector:{name}:state`. Individual
//! HTTP provider clients live outside this crate; they plug in through
//! [`provider::PollingProvider`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod polling;
pub mod provider;
pub mod state;

pub use polling::{ConnectorConfig, ConnectorError, PollingConnector, TickSummary};
pub use provider::{PollingProvider, ProviderError};
pub use state::{ConnectorState, ConnectorStateStore, VersionMap};
