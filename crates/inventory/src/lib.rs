//! Raw-material stock ledger (event-sourced).
//!
//! Materials are registered once and then only credited; the purchasing
//! workflow posts accepted goods-receipt quantities here when an order
//! completes. Pure domain logic (no IO, no HTTP, no storage).

pub mod material;

pub use material::{
    CreditStock, MaterialCommand, MaterialEvent, MaterialId, MaterialRegistered, RawMaterial,
    RegisterMaterial, StockCredited,
};
