pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AvailabilityError, DaySlots, Slot, UnavailableReason};
pub use services::slots::{compute_day_slots, session_of, session_window};
pub use services::{AvailabilityService, ScheduleService};
