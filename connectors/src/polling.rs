//! The universal polling connector state machine.

use crate::provider::{PollingProvider, ProviderError};
use crate::state::{ConnectorState, ConnectorStateStore, DEFAULT_VERSION_MAP_CAP};
use chrono::Utc;
use riskflow_core::bus::BusError;
use riskflow_core::store::StoreError;
use riskflow_core::streams::RAW_INPUT_SIGNALS;
use riskflow_core::EventBus;
use riskflow_runtime::retry::RetryPolicy;
use riskflow_runtime::shutdown::ShutdownSignal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

/// Errors from connector construction and ticks.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Invalid connector configuration; startup-fatal.
    #[error("invalid connector config: {0}")]
    Config(String),

    /// State store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Bus failure.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The provider fetch failed after every retry; this tick is surrendered.
    #[error("fetch failed after {attempts} attempts: {source}")]
    FetchExhausted {
        /// Attempts made, including the first.
        attempts: usize,
        /// The final provider error.
        source: ProviderError,
    },
}

/// Configuration of one connector instance.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Connector name; owns the state key and labels logs and metrics.
    pub name: String,
    /// Interval between poll ticks. Must be positive.
    pub poll_interval: Duration,
    /// Timeout for a single provider fetch. Must be positive.
    pub request_timeout: Duration,
    /// Fetch retries per tick before the tick is surrendered.
    pub max_retries: usize,
    /// Stream raw signals are published to.
    pub input_stream: String,
    /// Bound on the per-item version map.
    pub version_map_cap: usize,
}

impl ConnectorConfig {
    /// Configuration with the default stream, retry count and version cap.
    #[must_use]
    pub fn new(name: impl Into<String>, poll_interval: Duration, request_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            poll_interval,
            request_timeout,
            max_retries: 3,
            input_stream: RAW_INPUT_SIGNALS.to_string(),
            version_map_cap: DEFAULT_VERSION_MAP_CAP,
        }
    }

    /// Override the fetch retry count.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the target stream.
    #[must_use]
    pub fn with_input_stream(mut self, stream: impl Into<String>) -> Self {
        self.input_stream = stream.into();
        self
    }

    /// Override the version map cap.
    #[must_use]
    pub const fn with_version_map_cap(mut self, cap: usize) -> Self {
        self.version_map_cap = cap;
        self
    }

    fn validate(&self) -> Result<(), ConnectorError> {
        if self.name.trim().is_empty() {
            return Err(ConnectorError::Config("name must be non-empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConnectorError::Config("poll_interval must be positive".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConnectorError::Config(
                "request_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one poll tick. Always satisfies
/// `published + skipped_unchanged + failed == fetched`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Items the provider returned.
    pub fetched: usize,
    /// Items published as new or changed.
    pub published: usize,
    /// Items whose version matched the stored version.
    pub skipped_unchanged: usize,
    /// Items that failed to transform or publish.
    pub failed: usize,
}

/// Connector phases, for logs and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectorPhase {
    Idle,
    Fetching,
    Transforming,
    Publishing,
    Persisting,
    Backoff,
}

/// A scheduled poller adapting one external provider into the input stream.
///
/// Per tick: load persisted state, fetch with timeout and bounded backoff,
/// change-detect each item against the stored version, transform and publish
/// the new or changed ones in provider order, then persist the updated state
/// in one write. A failure on one item never aborts the poll.
pub struct PollingConnector {
    config: ConnectorConfig,
    provider: Arc<dyn PollingProvider>,
    bus: EventBus,
    state_store: ConnectorStateStore,
    phase: ConnectorPhase,
}

impl PollingConnector {
    /// Build a connector, validating its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Config`] for a non-positive interval or
    /// timeout or an empty name.
    pub fn new(
        config: ConnectorConfig,
        provider: Arc<dyn PollingProvider>,
        bus: EventBus,
        state_store: ConnectorStateStore,
    ) -> Result<Self, ConnectorError> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            bus,
            state_store,
            phase: ConnectorPhase::Idle,
        })
    }

    fn set_phase(&mut self, phase: ConnectorPhase) {
        tracing::trace!(
            connector = %self.config.name,
            from = ?self.phase,
            to = ?phase,
            "connector phase"
        );
        self.phase = phase;
    }

    /// Drive the connector until shutdown.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            connector = %self.config.name,
            poll_interval_ms = self.config.poll_interval.as_millis(),
            stream = %self.config.input_stream,
            "connector started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(summary) => {
                            tracing::info!(
                                connector = %self.config.name,
                                fetched = summary.fetched,
                                published = summary.published,
                                skipped_unchanged = summary.skipped_unchanged,
                                failed = summary.failed,
                                "poll tick complete"
                            );
                        }
                        Err(e) => {
                            metrics::counter!(
                                "riskflow.connector.tick_errors",
                                "connector" => self.config.name.clone()
                            )
                            .increment(1);
                            tracing::warn!(
                                connector = %self.config.name,
                                error = %e,
                                "poll tick surrendered"
                            );
                        }
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        tracing::info!(connector = %self.config.name, "connector stopped");
    }

    /// Execute one poll tick.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::FetchExhausted`] when the provider could not
    /// be fetched within the retry budget, and store/bus errors when state
    /// cannot be loaded or persisted. Per-item failures are counted in the
    /// summary, not returned.
    pub async fn tick(&mut self) -> Result<TickSummary, ConnectorError> {
        let connector = self.config.name.clone();

        let mut state = self
            .state_store
            .load(&connector, self.config.version_map_cap)
            .await?;

        let items = match self.fetch_with_backoff().await {
            Ok(items) => items,
            Err(source) => {
                self.set_phase(ConnectorPhase::Idle);
                return Err(ConnectorError::FetchExhausted {
                    attempts: self.config.max_retries + 1,
                    source,
                });
            }
        };

        let mut summary = TickSummary {
            fetched: items.len(),
            ..TickSummary::default()
        };

        for item in &items {
            let item_id = self.provider.item_id(item);
            let version = self.provider.version(item);

            if state.versions.get(&item_id) == Some(version.as_str()) {
                summary.skipped_unchanged += 1;
                continue;
            }

            self.set_phase(ConnectorPhase::Transforming);
            let raw = match self.provider.transform(item) {
                Ok(raw) => raw,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        connector = %connector,
                        item_id = %item_id,
                        error = %e,
                        "item transform failed"
                    );
                    continue;
                }
            };

            self.set_phase(ConnectorPhase::Publishing);
            match self.bus.publish(&self.config.input_stream, &raw).await {
                Ok(_) => {
                    state.versions.insert(&item_id, &version);
                    summary.published += 1;
                }
                Err(e) => {
                    // Version not advanced: the item is retried next tick.
                    summary.failed += 1;
                    tracing::warn!(
                        connector = %connector,
                        item_id = %item_id,
                        error = %e,
                        "item publish failed"
                    );
                }
            }
        }

        self.set_phase(ConnectorPhase::Persisting);
        state.last_poll_utc = Some(Utc::now());
        self.state_store.save(&connector, &state).await?;
        self.set_phase(ConnectorPhase::Idle);

        metrics::counter!("riskflow.connector.fetched", "connector" => connector.clone())
            .increment(summary.fetched as u64);
        metrics::counter!("riskflow.connector.published", "connector" => connector.clone())
            .increment(summary.published as u64);
        metrics::counter!("riskflow.connector.skipped_unchanged", "connector" => connector.clone())
            .increment(summary.skipped_unchanged as u64);
        metrics::counter!("riskflow.connector.failed", "connector" => connector)
            .increment(summary.failed as u64);

        Ok(summary)
    }

    /// Fetch with timeout and bounded exponential backoff.
    ///
    /// The connector drives the attempt loop itself (over the policy's delay
    /// schedule) rather than composing `retry_with_backoff`, so the state
    /// machine sits in `Backoff` for the whole delay window between attempts
    /// and returns to `Fetching` for each attempt.
    async fn fetch_with_backoff(&mut self) -> Result<Vec<serde_json::Value>, ProviderError> {
        let policy = RetryPolicy::builder()
            .max_retries(self.config.max_retries)
            .initial_delay(Duration::from_millis(250).min(self.config.poll_interval))
            .max_delay(self.config.poll_interval)
            .build();
        let timeout = self.config.request_timeout;

        let mut attempt = 0;
        loop {
            self.set_phase(ConnectorPhase::Fetching);
            let outcome = match tokio::time::timeout(timeout, self.provider.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                )),
            };

            match outcome {
                Ok(items) => {
                    if attempt > 0 {
                        tracing::info!(
                            connector = %self.config.name,
                            attempt,
                            "fetch succeeded after retry"
                        );
                    }
                    return Ok(items);
                }
                Err(err) => {
                    if attempt >= policy.max_retries {
                        tracing::error!(
                            connector = %self.config.name,
                            attempt,
                            error = %err,
                            "fetch failed after max retries"
                        );
                        return Err(err);
                    }

                    attempt += 1;
                    let delay = policy.delay_for_attempt(attempt);
                    self.set_phase(ConnectorPhase::Backoff);
                    tracing::warn!(
                        connector = %self.config.name,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "fetch failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
