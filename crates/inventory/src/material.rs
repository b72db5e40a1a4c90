use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use factoryerp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use factoryerp_events::Event;

/// Raw material identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub AggregateId);

impl MaterialId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MaterialId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: RawMaterial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMaterial {
    id: MaterialId,
    tenant_id: Option<TenantId>,
    name: String,
    unit: String,
    stock: Decimal,
    references: BTreeMap<String, Decimal>,
    version: u64,
    created: bool,
}

impl RawMaterial {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: MaterialId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            unit: String::new(),
            stock: Decimal::ZERO,
            references: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MaterialId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_registered(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit of measure (e.g. "kg", "pcs").
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn stock(&self) -> Decimal {
        self.stock
    }

    /// Whether a credit with this posting reference has already been applied.
    pub fn has_reference(&self, reference: &str) -> bool {
        self.references.contains_key(reference)
    }

    /// Quantity credited under `reference`, if any.
    pub fn credited_under(&self, reference: &str) -> Option<Decimal> {
        self.references.get(reference).copied()
    }
}

impl AggregateRoot for RawMaterial {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMaterial {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CreditStock.
///
/// `reference` identifies the business document behind the credit (for purchase
/// postings: order + material). A reference is applied at most once; replaying it
/// with a different quantity is a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditStock {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub quantity: Decimal,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialCommand {
    RegisterMaterial(RegisterMaterial),
    CreditStock(CreditStock),
}

/// Event: MaterialRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRegistered {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub name: String,
    pub unit: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockCredited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCredited {
    pub tenant_id: TenantId,
    pub material_id: MaterialId,
    pub quantity: Decimal,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialEvent {
    MaterialRegistered(MaterialRegistered),
    StockCredited(StockCredited),
}

impl Event for MaterialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MaterialEvent::MaterialRegistered(_) => "inventory.material.registered",
            MaterialEvent::StockCredited(_) => "inventory.material.stock_credited",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MaterialEvent::MaterialRegistered(e) => e.occurred_at,
            MaterialEvent::StockCredited(e) => e.occurred_at,
        }
    }
}

impl Aggregate for RawMaterial {
    type Command = MaterialCommand;
    type Event = MaterialEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MaterialEvent::MaterialRegistered(e) => {
                self.id = e.material_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.stock = Decimal::ZERO;
                self.references.clear();
                self.created = true;
            }
            MaterialEvent::StockCredited(e) => {
                self.stock += e.quantity;
                self.references.insert(e.reference.clone(), e.quantity);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MaterialCommand::RegisterMaterial(cmd) => self.handle_register(cmd),
            MaterialCommand::CreditStock(cmd) => self.handle_credit(cmd),
        }
    }
}

impl RawMaterial {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invalid_state("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("material already registered"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.unit.trim().is_empty() {
            return Err(DomainError::validation("unit of measure cannot be empty"));
        }
        Ok(vec![MaterialEvent::MaterialRegistered(MaterialRegistered {
            tenant_id: cmd.tenant_id,
            material_id: cmd.material_id,
            name: cmd.name.trim().to_string(),
            unit: cmd.unit.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_credit(&self, cmd: &CreditStock) -> Result<Vec<MaterialEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if self.id != cmd.material_id {
            return Err(DomainError::invalid_state("material_id mismatch"));
        }
        if cmd.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("credit quantity must be positive"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("posting reference cannot be empty"));
        }

        // Replayed posting: already reflected in stock.
        if let Some(credited) = self.credited_under(&cmd.reference) {
            if credited != cmd.quantity {
                return Err(DomainError::conflict(format!(
                    "reference '{}' was credited with {credited}, not {}",
                    cmd.reference, cmd.quantity
                )));
            }
            return Ok(vec![]);
        }
        if self.stock.checked_add(cmd.quantity).is_none() {
            return Err(DomainError::validation("credit would overflow the stock balance"));
        }

        Ok(vec![MaterialEvent::StockCredited(StockCredited {
            tenant_id: cmd.tenant_id,
            material_id: cmd.material_id,
            quantity: cmd.quantity,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryerp_events::execute;

    fn registered(tenant_id: TenantId) -> RawMaterial {
        let material_id = MaterialId::new(AggregateId::new());
        let mut material = RawMaterial::empty(material_id);
        execute(
            &mut material,
            &MaterialCommand::RegisterMaterial(RegisterMaterial {
                tenant_id,
                material_id,
                name: " Steel Rod ".to_string(),
                unit: "kg".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        material
    }

    fn credit(
        material: &RawMaterial,
        tenant_id: TenantId,
        qty: i64,
        reference: &str,
    ) -> MaterialCommand {
        MaterialCommand::CreditStock(CreditStock {
            tenant_id,
            material_id: material.id_typed(),
            quantity: Decimal::from(qty),
            reference: reference.to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn register_trims_name_and_starts_with_zero_stock() {
        let material = registered(TenantId::new());
        assert!(material.is_registered());
        assert_eq!(material.name(), "Steel Rod");
        assert_eq!(material.unit(), "kg");
        assert_eq!(material.stock(), Decimal::ZERO);
        assert_eq!(material.version(), 1);
    }

    #[test]
    fn register_twice_is_conflict() {
        let tenant_id = TenantId::new();
        let material = registered(tenant_id);
        let err = material
            .handle(&MaterialCommand::RegisterMaterial(RegisterMaterial {
                tenant_id,
                material_id: material.id_typed(),
                name: "Again".to_string(),
                unit: "kg".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn credit_increases_stock() {
        let tenant_id = TenantId::new();
        let mut material = registered(tenant_id);
        let cmd = credit(&material, tenant_id, 80, "po-1/m-1");
        execute(&mut material, &cmd).unwrap();
        assert_eq!(material.stock(), Decimal::from(80));
        assert!(material.has_reference("po-1/m-1"));
    }

    #[test]
    fn duplicate_reference_is_a_no_op() {
        let tenant_id = TenantId::new();
        let mut material = registered(tenant_id);
        let cmd = credit(&material, tenant_id, 10, "po-1/m-1");
        execute(&mut material, &cmd).unwrap();

        let events = execute(&mut material, &cmd).unwrap();
        assert!(events.is_empty());
        assert_eq!(material.stock(), Decimal::from(10));
    }

    #[test]
    fn reused_reference_with_other_quantity_conflicts() {
        let tenant_id = TenantId::new();
        let mut material = registered(tenant_id);
        let first = credit(&material, tenant_id, 4, "po-1/m-1");
        execute(&mut material, &first).unwrap();

        let cmd = credit(&material, tenant_id, 6, "po-1/m-1");
        let err = execute(&mut material, &cmd).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(material.stock(), Decimal::from(4));
        assert_eq!(material.credited_under("po-1/m-1"), Some(Decimal::from(4)));
    }

    #[test]
    fn non_positive_credit_is_rejected() {
        let tenant_id = TenantId::new();
        let material = registered(tenant_id);
        let err = material.handle(&credit(&material, tenant_id, 0, "r")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn credit_unregistered_material_is_not_found() {
        let material = RawMaterial::empty(MaterialId::new(AggregateId::new()));
        let err = material
            .handle(&credit(&material, TenantId::new(), 1, "r"))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn credit_from_other_tenant_is_rejected() {
        let material = registered(TenantId::new());
        let err = material
            .handle(&credit(&material, TenantId::new(), 1, "r"))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: stock equals the sum of the first credit per reference;
            /// a replay succeeds only with the original quantity.
            #[test]
            fn stock_is_sum_of_distinct_credits(
                credits in proptest::collection::vec((1i64..1_000, 0u8..5), 1..30)
            ) {
                let tenant_id = TenantId::new();
                let mut material = registered(tenant_id);
                let mut seen = BTreeMap::new();
                let mut expected = Decimal::ZERO;

                for (qty, reference) in credits {
                    let reference = format!("ref-{reference}");
                    let cmd = credit(&material, tenant_id, qty, &reference);
                    let result = execute(&mut material, &cmd);
                    match seen.get(&reference) {
                        None => {
                            prop_assert!(result.is_ok());
                            seen.insert(reference, qty);
                            expected += Decimal::from(qty);
                        }
                        Some(&first) if first == qty => prop_assert!(result.is_ok()),
                        Some(_) => prop_assert!(matches!(result, Err(DomainError::Conflict(_)))),
                    }
                }

                prop_assert_eq!(material.stock(), expected);
            }
        }
    }
}
