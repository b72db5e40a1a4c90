//! Purchasing domain: purchase orders, goods receipts and their reconciliation.
//!
//! Pure, deterministic domain logic (no IO, no HTTP, no storage):
//!
//! - [`order`]: the `PurchaseOrder` aggregate. Receipts, inspections, postings
//!   and completion are all commands against it.
//! - [`pending`]: per-material pending/replacement quantities across receipts.
//! - [`completion`]: status derivation and the decision to complete and post.

pub mod completion;
pub mod order;
pub mod pending;
pub mod qc;
pub mod receipt;
pub mod status;
pub mod terms;

#[cfg(test)]
pub(crate) mod fixtures;

pub use completion::{Evaluation, PostingCredit, derive_status, evaluate};
pub use order::{
    CompleteOrder, CreateInitialReceipt, CreateReplacementReceipt, EvaluateStatus, GoodsArrived,
    InspectionRecorded, MarkArrived, MaterialPosted, OrderCompleted, OrderPlaced, PlaceOrder,
    PlannedCredit, PostingStarted, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent,
    PurchaseOrderId, ReceiptCreated, RecordInspection, RecordPosting, StartPosting,
    StatusChanged, SupplierId,
};
pub use pending::{
    PendingQuantitySnapshot, ReplacementStatus, aggregate_receipts, compute_pending_quantities,
    pending_for_material,
};
pub use qc::{QcInputPolicy, normalize_defective};
pub use receipt::{
    QcStatus, Receipt, ReceiptId, ReceiptKind, ReceiptLine, ReceiptLineInput, ReplacementRef,
};
pub use status::PurchaseOrderStatus;
pub use terms::{MonetaryTerms, OrderedItem};
