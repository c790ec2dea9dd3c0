//! Planning state: the shipment/inventory lookup the impact service joins
//! against.
//!
//! Snapshots arrive on `shipment-plans` and `inventory-snapshots` (published
//! by the planning gateway) and are upserted into the key-value store:
//! shipments grouped by lane at `riskflow:planning:shipments:{lane_id}`,
//! inventory by SKU at `riskflow:planning:inventory:{sku}`. Persistence
//! beyond this upsert contract is out of scope.

use crate::worker::{HandlerError, HandlerFuture, MessageHandler};
use riskflow_core::bus::EventRecord;
use riskflow_core::domain::{InventorySnapshot, ShipmentPlan};
use riskflow_core::store::{LogStore, StoreError};
use std::sync::Arc;

/// Key-value upsert store for planned shipments and inventory snapshots.
#[derive(Clone)]
pub struct PlanningStateStore {
    store: Arc<dyn LogStore>,
}

impl PlanningStateStore {
    /// Create the store over the shared log store handle.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    fn shipments_key(lane_id: &str) -> String {
        format!("riskflow:planning:shipments:{lane_id}")
    }

    fn inventory_key(sku: &str) -> String {
        format!("riskflow:planning:inventory:{sku}")
    }

    /// All planned shipments on a lane.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for transport failures or an unparseable blob.
    pub async fn shipments_for_lane(&self, lane_id: &str) -> Result<Vec<ShipmentPlan>, StoreError> {
        match self.store.get_value(&Self::shipments_key(lane_id)).await? {
            None => Ok(Vec::new()),
            Some(blob) => serde_json::from_str(&blob)
                .map_err(|e| StoreError::KeyOp(format!("corrupt shipment state: {e}"))),
        }
    }

    /// Insert or replace a shipment plan, keyed by shipment id within its
    /// lane. Single-writer per service by construction, so read-modify-write
    /// is safe here.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for transport failures.
    pub async fn upsert_shipment_plan(&self, plan: &ShipmentPlan) -> Result<(), StoreError> {
        let mut shipments = self.shipments_for_lane(&plan.lane_id).await?;
        match shipments
            .iter_mut()
            .find(|s| s.shipment_id == plan.shipment_id)
        {
            Some(existing) => *existing = plan.clone(),
            None => shipments.push(plan.clone()),
        }

        let blob = serde_json::to_string(&shipments)
            .map_err(|e| StoreError::KeyOp(format!("failed to serialize shipments: {e}")))?;
        self.store
            .put_value(&Self::shipments_key(&plan.lane_id), &blob)
            .await
    }

    /// The latest inventory snapshot for a SKU.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for transport failures or an unparseable blob.
    pub async fn inventory_for_sku(
        &self,
        sku: &str,
    ) -> Result<Option<InventorySnapshot>, StoreError> {
        match self.store.get_value(&Self::inventory_key(sku)).await? {
            None => Ok(None),
            Some(blob) => serde_json::from_str(&blob)
                .map(Some)
                .map_err(|e| StoreError::KeyOp(format!("corrupt inventory state: {e}"))),
        }
    }

    /// Insert or replace the inventory snapshot for a SKU.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] for transport failures.
    pub async fn upsert_inventory(&self, snapshot: &InventorySnapshot) -> Result<(), StoreError> {
        let blob = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::KeyOp(format!("failed to serialize inventory: {e}")))?;
        self.store
            .put_value(&Self::inventory_key(&snapshot.sku), &blob)
            .await
    }
}

/// Upserts `shipment-plans` messages into the planning state.
pub struct ShipmentPlanHandler {
    planning: PlanningStateStore,
}

impl ShipmentPlanHandler {
    /// Build the handler.
    #[must_use]
    pub const fn new(planning: PlanningStateStore) -> Self {
        Self { planning }
    }
}

impl MessageHandler for ShipmentPlanHandler {
    type Message = ShipmentPlan;

    fn handle<'a>(&'a self, record: &'a EventRecord<Self::Message>) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.planning
                .upsert_shipment_plan(&record.message)
                .await
                .map_err(HandlerError::from_display)?;
            tracing::debug!(
                shipment_id = %record.message.shipment_id,
                lane_id = %record.message.lane_id,
                "shipment plan upserted"
            );
            Ok(())
        })
    }
}

/// Upserts `inventory-snapshots` messages into the planning state.
pub struct InventorySnapshotHandler {
    planning: PlanningStateStore,
}

impl InventorySnapshotHandler {
    /// Build the handler.
    #[must_use]
    pub const fn new(planning: PlanningStateStore) -> Self {
        Self { planning }
    }
}

impl MessageHandler for InventorySnapshotHandler {
    type Message = InventorySnapshot;

    fn handle<'a>(&'a self, record: &'a EventRecord<Self::Message>) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.planning
                .upsert_inventory(&record.message)
                .await
                .map_err(HandlerError::from_display)?;
            tracing::debug!(sku = %record.message.sku, "inventory snapshot upserted");
            Ok(())
        })
    }
}
