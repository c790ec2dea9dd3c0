//! # Riskflow Pipeline
//!
//! Consumer-group workers and the business transformers built on them.
//!
//! The generic [`worker::StreamWorker`] owns the delivery contract: a
//! message delivered to a handler has exactly one terminal outcome — `ack`
//! on success, `ack` after dead-letter routing once its delivery budget is
//! exhausted, or pending-retry in between. The retry counter lives outside
//! the log (atomic `INCR` with TTL keyed by message id) and is the
//! authoritative delivery count.
//!
//! On top of the worker sit the four transformers:
//!
//! | Service | Reads | Publishes |
//! |---|---|---|
//! | [`classify::ClassificationService`] | `external-signals` | `classified-events` |
//! | [`risk::RiskEngine`] | `classified-events` | `risk-evaluations` |
//! | [`mitigation::MitigationService`] | `risk-evaluations` | `mitigation-plans` |
//! | [`impact::PlanningImpactService`] | `mitigation-plans` | `at-risk-shipments`, `inventory-exposures` |
//!
//! plus the raw-input normaliser ([`raw_worker::RawSignalHandler`], from
//! `raw-input-signals` to `external-signals`) and the planning-state upsert
//! handlers ([`planning`]) that maintain the shipment/inventory lookup the
//! impact service joins against.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod impact;
pub mod mitigation;
pub mod planning;
pub mod raw_worker;
pub mod risk;
pub mod worker;

pub use worker::{HandlerError, MessageHandler, StreamWorker, WorkerConfig};
