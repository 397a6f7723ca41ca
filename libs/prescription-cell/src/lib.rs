pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{PrescriptionDetail, PrescriptionError, SweepReport};
pub use router::{batch_routes, prescription_routes, retail_prescription_routes};
pub use services::{ExpirySweeper, InventoryService, PrescriptionLifecycleService, PrescriptionService};
