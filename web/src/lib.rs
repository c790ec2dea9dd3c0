//! # Riskflow Web
//!
//! HTTP ingress gateways: the front doors that publish directly into the
//! bus.
//!
//! - **Signal gateway** ([`signal_gateway`]): `POST /signals` accepts a
//!   batch of raw external signals and appends each to `raw-input-signals`.
//! - **Planning gateway** ([`planning_gateway`]): `POST /shipments` and
//!   `POST /inventory` append to `shipment-plans` / `inventory-snapshots`.
//!
//! Both authenticate with an optional static bearer token, enforce a request
//! size cap (413) and a batch size cap (422), expose their counters at
//! `GET /metrics` as JSON, and answer `GET /health`. Error responses carry
//! the structured body `{ "error": <code>, "message": <text> }`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod planning_gateway;
pub mod signal_gateway;

pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use extractors::GatewayJson;
