//! Crediting accepted purchase quantities into raw-material stock.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use factoryerp_core::TenantId;
use factoryerp_events::{EventBus, EventEnvelope};
use factoryerp_inventory::{CreditStock, MaterialCommand, MaterialId, RawMaterial};

use crate::catalog::MATERIAL_STREAM;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PostingError {
    #[error("stock ledger rejected credit for material {material}: {reason}")]
    Rejected { material: MaterialId, reason: String },

    #[error("stock credit for material {material} timed out")]
    TimedOut { material: MaterialId },
}

impl PostingError {
    pub fn material(&self) -> MaterialId {
        match self {
            PostingError::Rejected { material, .. } | PostingError::TimedOut { material } => {
                *material
            }
        }
    }
}

/// External stock ledger as seen by the completion pipeline.
///
/// `reference` identifies the credit (order + material). A retry resends the
/// same reference with the same quantity, and ledgers may use it to drop replays.
pub trait InventoryPoster: Send + Sync {
    fn credit_material(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
        quantity: Decimal,
        reference: &str,
    ) -> Result<(), PostingError>;
}

impl<P> InventoryPoster for Arc<P>
where
    P: InventoryPoster + ?Sized,
{
    fn credit_material(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
        quantity: Decimal,
        reference: &str,
    ) -> Result<(), PostingError> {
        (**self).credit_material(tenant_id, material_id, quantity, reference)
    }
}

/// Posts credits as `CreditStock` commands against `RawMaterial` streams.
pub struct LedgerPoster<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> LedgerPoster<S, B> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }
}

impl<S, B> InventoryPoster for LedgerPoster<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>> + Send + Sync,
{
    fn credit_material(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
        quantity: Decimal,
        reference: &str,
    ) -> Result<(), PostingError> {
        let cmd = MaterialCommand::CreditStock(CreditStock {
            tenant_id,
            material_id,
            quantity,
            reference: reference.to_string(),
            occurred_at: Utc::now(),
        });
        self.dispatcher
            .dispatch(tenant_id, material_id.0, MATERIAL_STREAM, cmd, |_, id| {
                RawMaterial::empty(MaterialId::new(id))
            })
            .map(|_| ())
            .map_err(|e| PostingError::Rejected {
                material: material_id,
                reason: match e {
                    DispatchError::NotFound => "unknown material".to_string(),
                    other => other.to_string(),
                },
            })
    }
}

/// Bounds every credit of the wrapped poster by `timeout`.
///
/// The credit runs on a helper thread. On timeout the thread is abandoned and may
/// still finish; the idempotency reference keeps a late credit from counting twice.
pub struct TimeoutPoster<P> {
    inner: Arc<P>,
    timeout: Duration,
}

impl<P> TimeoutPoster<P> {
    pub fn new(inner: Arc<P>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<P> InventoryPoster for TimeoutPoster<P>
where
    P: InventoryPoster + 'static,
{
    fn credit_material(
        &self,
        tenant_id: TenantId,
        material_id: MaterialId,
        quantity: Decimal,
        reference: &str,
    ) -> Result<(), PostingError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let reference = reference.to_string();
        thread::spawn(move || {
            let _ = tx.send(inner.credit_material(tenant_id, material_id, quantity, &reference));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(PostingError::TimedOut { material: material_id })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(PostingError::Rejected {
                material: material_id,
                reason: "poster aborted".to_string(),
            }),
        }
    }
}
