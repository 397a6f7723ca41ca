pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AppointmentError, CancellationOutcome, DayOffOutcome, RescheduleOutcome};
pub use router::{appointment_routes, day_off_routes};
pub use services::{
    AppointmentBookingService, AppointmentLifecycleService, AppointmentTransitionService,
    CompensationService, DayOffService,
};
