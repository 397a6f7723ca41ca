pub mod booking;
pub mod compensation;
pub mod day_off;
pub mod lifecycle;
pub mod transitions;

pub use booking::AppointmentBookingService;
pub use compensation::CompensationService;
pub use day_off::DayOffService;
pub use lifecycle::AppointmentLifecycleService;
pub use transitions::AppointmentTransitionService;
