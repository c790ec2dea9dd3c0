//! # Riskflow Core
//!
//! Core schemas and abstractions for the Riskflow supply-chain risk pipeline.
//!
//! This crate defines:
//!
//! - **Canonical schemas**: [`signal::ExternalSignal`] and its permissive raw
//!   counterpart, plus the domain records threaded through the pipeline
//!   ([`domain`]).
//! - **Stream names**: the wire-stable stream identifiers every producer and
//!   consumer agrees on ([`streams`]).
//! - **Event codec**: the two-field envelope used on the log ([`codec`]).
//! - **Log store contract**: the [`store::LogStore`] trait consumed by the
//!   bus — append, tail reads, consumer groups, ack, and the atomic key
//!   operations that back idempotency markers and retry counters.
//! - **Event bus**: [`bus::EventBus`], the typed publish/consume surface with
//!   dead-letter routing ([`bus::EventBus::move_to_dlq`]).
//! - **Idempotency**: [`idempotency::IdempotencyStore`], the first-seen-wins
//!   marker that makes at-least-once delivery behaviourally exactly-once at
//!   event-id granularity.
//!
//! # Pipeline shape
//!
//! ```text
//! connectors ──┐
//!              ▼
//!          raw-input-signals ──▶ external-signals ──▶ classified-events
//! gateways ────┘                                           │
//!                                                          ▼
//!          inventory-exposures ◀── mitigation-plans ◀── risk-evaluations
//!          at-risk-shipments  ◀────────┘
//! ```
//!
//! Control flow is strictly one-way: producers append to a stream; consumer
//! groups transform messages and append to the next stream. Back-pressure is
//! implicit in the blocking read + ack cycle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod codec;
pub mod domain;
pub mod idempotency;
pub mod signal;
pub mod store;
pub mod streams;

pub use bus::{EventBus, BusError, EventRecord, PublishedRecord};
pub use idempotency::IdempotencyStore;
pub use signal::{ExternalSignal, RawExternalSignal, SchemaError, SourceType};
pub use store::{LogStore, RecordId, StoreError};
