pub mod inventory;
pub mod lifecycle;
pub mod prescription;
pub mod sweeper;

pub use inventory::InventoryService;
pub use lifecycle::PrescriptionLifecycleService;
pub use prescription::PrescriptionService;
pub use sweeper::ExpirySweeper;
