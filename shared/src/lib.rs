//! Shared types and models for the Liquor Trade ERP
//!
//! This crate contains types shared between the allocation engine and the
//! other components of the system (order intake, reporting, accounting sync).

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
