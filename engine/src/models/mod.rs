//! Database models for the allocation engine, re-exported from the shared
//! crate

pub use shared::models::*;
