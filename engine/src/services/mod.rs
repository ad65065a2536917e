//! Business logic services for the allocation engine

pub mod allocation;
pub mod backorder;
pub mod catalog;
pub mod conversion;
pub mod executor;
pub mod ledger;
pub mod reclassification;
pub mod reservation;

pub use allocation::allocate;
pub use backorder::BackorderService;
pub use catalog::CatalogService;
pub use conversion::PreorderConversionService;
pub use executor::AllocationExecutor;
pub use ledger::LedgerService;
pub use reclassification::DamageTransferService;
pub use reservation::ReservationService;
