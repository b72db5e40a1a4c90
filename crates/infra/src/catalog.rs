//! Material lookups used to validate receipt lines.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use factoryerp_core::TenantId;
use factoryerp_events::{EventBus, EventEnvelope};
use factoryerp_inventory::{MaterialId, RawMaterial};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

/// Aggregate type of raw-material streams.
pub const MATERIAL_STREAM: &str = "inventory.material";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialInfo {
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
}

/// Read-only material directory.
pub trait MaterialCatalog: Send + Sync {
    /// `Ok(None)` when the material is unknown to the tenant.
    fn lookup(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
    ) -> Result<Option<MaterialInfo>, DispatchError>;
}

/// Catalog backed by the raw-material streams of the stock ledger.
pub struct LedgerCatalog<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> LedgerCatalog<S, B> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }
}

impl<S, B> MaterialCatalog for LedgerCatalog<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>> + Send + Sync,
{
    fn lookup(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
    ) -> Result<Option<MaterialInfo>, DispatchError> {
        let material: RawMaterial =
            self.dispatcher
                .load(tenant_id, material_id.0, |_, id| RawMaterial::empty(MaterialId::new(id)))?;
        if !material.is_registered() {
            return Ok(None);
        }
        Ok(Some(MaterialInfo {
            material_id,
            name: material.name().to_string(),
            unit: material.unit().to_string(),
        }))
    }
}
