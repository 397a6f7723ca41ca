use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::schedule::Session;

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// One bookable slot. `date`, `start` and `end` are clinic-local;
/// `starts_at` is the UTC instant an appointment must carry to book it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub session: Session,
    pub starts_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
    /// Set only when `slots` is empty.
    pub reason: Option<UnavailableReason>,
}

impl DaySlots {
    pub fn unavailable(date: NaiveDate, reason: UnavailableReason) -> Self {
        Self {
            date,
            slots: Vec::new(),
            reason: Some(reason),
        }
    }

    pub fn slot_at(&self, instant: DateTime<Utc>) -> Option<&Slot> {
        self.slots.iter().find(|s| s.starts_at == instant)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    PastDate,
    NoSchedule,
    WeekdayDisabled,
    DayOffFull,
    DayOffPartial,
    NoLeadTime,
    FullyBooked,
    /// The requested instant is a slot start but someone holds it.
    SlotTaken,
    /// The requested instant is not the start of any working slot.
    OutsideWorkingHours,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::PastDate => "past_date",
            UnavailableReason::NoSchedule => "no_schedule",
            UnavailableReason::WeekdayDisabled => "weekday_disabled",
            UnavailableReason::DayOffFull => "day_off_full",
            UnavailableReason::DayOffPartial => "day_off_partial",
            UnavailableReason::NoLeadTime => "no_lead_time",
            UnavailableReason::FullyBooked => "fully_booked",
            UnavailableReason::SlotTaken => "slot_taken",
            UnavailableReason::OutsideWorkingHours => "outside_working_hours",
        }
    }

    /// Someone else holds the slot, as opposed to the slot never existing.
    pub fn is_contention(&self) -> bool {
        matches!(self, UnavailableReason::SlotTaken | UnavailableReason::FullyBooked)
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Slot unavailable: {0}")]
    SlotUnavailable(UnavailableReason),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Schedule not found")]
    ScheduleNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AvailabilityError> for AppError {
    fn from(e: AvailabilityError) -> Self {
        match e {
            AvailabilityError::SlotUnavailable(reason) if reason.is_contention() => {
                AppError::Conflict(format!("Slot unavailable: {}", reason))
            }
            AvailabilityError::SlotUnavailable(reason) => {
                AppError::BadRequest(format!("Slot unavailable: {}", reason))
            }
            AvailabilityError::InvalidRange(msg) => AppError::BadRequest(msg),
            AvailabilityError::ScheduleNotFound => {
                AppError::NotFound("Schedule not found".to_string())
            }
            AvailabilityError::Store(e) => e.into(),
        }
    }
}
