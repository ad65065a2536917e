//! Inventory Allocation & Reservation Engine
//!
//! Core stock subsystem of the Liquor Trade ERP: the per-warehouse
//! inventory ledger, the FIFO reservation/release protocol with
//! weighted-average cost capture, the pluggable allocation strategies for
//! oversubscribed demand, damage reclassification, and preorder
//! auto-conversion.
//!
//! This crate is a library consumed in-process by the surrounding
//! application; it owns no wire protocol. Every ledger-mutating operation
//! runs inside a database transaction that locks the lot rows it touches.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
