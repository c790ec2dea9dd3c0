//! The provider seam a polling connector drives.

use riskflow_core::signal::RawExternalSignal;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Future type returned by [`PollingProvider::fetch`].
pub type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Errors from an external provider. Never fatal: the connector counts the
/// affected items as failed and carries on.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider request failed.
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider request exceeded the configured timeout.
    #[error("provider request timed out after {0}ms")]
    Timeout(u64),

    /// An item could not be transformed into a raw signal.
    #[error("failed to transform provider item: {0}")]
    Transform(String),
}

/// An external data source a [`PollingConnector`](crate::PollingConnector)
/// can drive.
///
/// Items flow through three provider hooks per tick: `fetch` returns the raw
/// items in provider order, `version` is the change detector (equal version
/// ⇒ skip), and `transform` adapts an item into a [`RawExternalSignal`] for
/// the input stream.
///
/// Methods return explicit boxed futures so providers can live behind
/// `Arc<dyn PollingProvider>` alongside the rest of the pipeline's seams.
pub trait PollingProvider: Send + Sync {
    /// Stable provider name, used in state keys, logs, and metrics.
    fn name(&self) -> &str;

    /// Fetch the current batch of items.
    fn fetch(&self) -> ProviderFuture<'_, Vec<serde_json::Value>>;

    /// The stable identity of an item across polls.
    fn item_id(&self, item: &serde_json::Value) -> String;

    /// The change-detection version of an item. Republish happens iff this
    /// differs from the stored version for the item's id.
    fn version(&self, item: &serde_json::Value) -> String;

    /// Adapt an item into a raw external signal.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transform`] when the item cannot be adapted;
    /// the connector counts the item as failed without advancing its version.
    fn transform(&self, item: &serde_json::Value) -> Result<RawExternalSignal, ProviderError>;
}
