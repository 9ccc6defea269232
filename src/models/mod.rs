// src/models/mod.rs

pub mod donor;
pub mod inventory;
pub mod request;

pub use donor::*;
pub use inventory::*;
pub use request::*;
