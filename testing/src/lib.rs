//! # Riskflow Testing
//!
//! Testing utilities for the Riskflow pipeline.
//!
//! The centrepiece is [`InMemoryLogStore`]: a complete in-process
//! implementation of the [`LogStore`](riskflow_core::store::LogStore)
//! contract — ordered streams with approximate trimming, consumer groups
//! with pending-entry re-delivery, and TTL'd atomic key operations — so the
//! whole pipeline is exercisable in unit tests without infrastructure.
//!
//! ## Example
//!
//! ```
//! use riskflow_testing::InMemoryLogStore;
//! use riskflow_core::EventBus;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(Arc::new(InMemoryLogStore::new()));
//! let receipt = bus.publish("demo-stream", &serde_json::json!({"k": "v"})).await.unwrap();
//! assert_eq!(receipt.stream, "demo-stream");
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
mod store;

pub use store::InMemoryLogStore;
