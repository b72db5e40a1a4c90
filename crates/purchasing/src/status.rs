use serde::{Deserialize, Serialize};

/// Purchase order status lifecycle.
///
/// `Ordered` and `Arrived` are set by order placement and the arrival signal;
/// every other transition is decided by the completion evaluator from the
/// aggregate state of the order's receipts. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Ordered,
    Arrived,
    GrnVerified,
    QcInProgress,
    ReturnedToVendor,
    Completed,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordered => "ordered",
            Self::Arrived => "arrived",
            Self::GrnVerified => "grn_verified",
            Self::QcInProgress => "qc_in_progress",
            Self::ReturnedToVendor => "returned_to_vendor",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether goods receipts (and QC updates) may still be recorded.
    pub fn accepts_receipts(&self) -> bool {
        !self.is_terminal()
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_value(PurchaseOrderStatus::ReturnedToVendor).unwrap();
        assert_eq!(json, serde_json::json!("returned_to_vendor"));
        assert_eq!(PurchaseOrderStatus::GrnVerified.to_string(), "grn_verified");
    }

    #[test]
    fn only_completed_is_terminal() {
        for status in [
            PurchaseOrderStatus::Ordered,
            PurchaseOrderStatus::Arrived,
            PurchaseOrderStatus::GrnVerified,
            PurchaseOrderStatus::QcInProgress,
            PurchaseOrderStatus::ReturnedToVendor,
        ] {
            assert!(!status.is_terminal());
            assert!(status.accepts_receipts());
        }
        assert!(PurchaseOrderStatus::Completed.is_terminal());
        assert!(!PurchaseOrderStatus::Completed.accepts_receipts());
    }
}
