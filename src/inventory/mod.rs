// src/inventory/mod.rs
//! Blood unit inventory: the donor-to-unit sync job and the read side

pub mod service;
pub mod store;
pub mod sync;

pub use service::{BloodTypeCount, DashboardSummary, InventoryFilters, InventoryPage, InventoryService, InventorySource};
pub use sync::{InventorySync, SyncError, SyncFailure, SyncReport};
