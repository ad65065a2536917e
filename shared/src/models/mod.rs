//! Domain models for the Liquor Trade ERP

mod allocation;
mod catalog;
mod inventory;
mod order;

pub use allocation::*;
pub use catalog::*;
pub use inventory::*;
pub use order::*;
