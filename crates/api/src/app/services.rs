use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use factoryerp_core::{AggregateId, TenantId};
use factoryerp_events::{EventEnvelope, InMemoryEventBus};
use factoryerp_infra::{
    catalog::{LedgerCatalog, MATERIAL_STREAM},
    command_dispatcher::CommandDispatcher,
    config::ReceivingConfig,
    event_store::InMemoryEventStore,
    posting::{LedgerPoster, TimeoutPoster},
    receiving::{ReceivingError, ReceivingResult, ReceivingService},
};
use factoryerp_inventory::{MaterialCommand, MaterialId, RawMaterial, RegisterMaterial};

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub type InMemoryDispatcher = CommandDispatcher<Store, Bus>;

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    dispatcher: Arc<InMemoryDispatcher>,
    receiving: ReceivingService<Store, Bus>,
}

impl AppServices {
    /// Wire the in-memory store and bus. Stock credits go to the material
    /// streams of the same store, bounded by the configured posting timeout.
    pub fn in_memory(config: ReceivingConfig) -> Self {
        let store: Store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store, bus));

        let catalog = Arc::new(LedgerCatalog::new(Arc::clone(&dispatcher)));
        let poster = Arc::new(TimeoutPoster::new(
            Arc::new(LedgerPoster::new(Arc::clone(&dispatcher))),
            config.posting_timeout,
        ));

        tracing::info!(
            qc_policy = ?config.qc_policy,
            posting_timeout_ms = config.posting_timeout.as_millis() as u64,
            "in-memory services ready"
        );

        let receiving = ReceivingService::new(Arc::clone(&dispatcher), catalog, poster, config);
        Self {
            dispatcher,
            receiving,
        }
    }

    pub fn receiving(&self) -> &ReceivingService<Store, Bus> {
        &self.receiving
    }

    pub fn register_material(
        &self,
        tenant_id: TenantId,
        name: String,
        unit: String,
    ) -> ReceivingResult<RawMaterial> {
        let material_id = MaterialId::new(AggregateId::new());
        let cmd = MaterialCommand::RegisterMaterial(RegisterMaterial {
            tenant_id,
            material_id,
            name,
            unit,
            occurred_at: Utc::now(),
        });
        let done = self.dispatcher.execute(tenant_id, material_id.0, MATERIAL_STREAM, cmd, |_, id| {
            RawMaterial::empty(MaterialId::new(id))
        })?;
        Ok(done.aggregate)
    }

    pub fn material(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
    ) -> ReceivingResult<RawMaterial> {
        let material: RawMaterial = self
            .dispatcher
            .load(tenant_id, material_id.0, |_, id| RawMaterial::empty(MaterialId::new(id)))?;
        if !material.is_registered() {
            return Err(ReceivingError::NotFound);
        }
        Ok(material)
    }
}

/// Run a service call on the blocking pool.
///
/// Receiving operations hold order locks and may wait on stock postings, so
/// they stay off the async workers.
pub async fn run_blocking<T, F>(services: &Arc<AppServices>, f: F) -> ReceivingResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AppServices) -> ReceivingResult<T> + Send + 'static,
{
    let services = Arc::clone(services);
    tokio::task::spawn_blocking(move || f(&*services))
        .await
        .map_err(|e| ReceivingError::Infrastructure(format!("service task failed: {e}")))?
}
