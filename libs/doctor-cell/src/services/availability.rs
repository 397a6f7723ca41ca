use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_config::ClinicHours;
use shared_database::store::{AppointmentStore, ScheduleStore};
use shared_database::ClinicStore;
use shared_models::appointment::{Appointment, AppointmentStatus};
use shared_models::schedule::DoctorDayOff;
use shared_utils::AppState;

use crate::models::{AvailabilityError, DaySlots, Slot, UnavailableReason};
use crate::services::slots::compute_day_slots;

pub struct AvailabilityService {
    store: Arc<dyn ClinicStore>,
    hours: ClinicHours,
}

impl AvailabilityService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            hours: state.config.clinic.clone(),
        }
    }

    /// Slots for every date in `from..=to`.
    #[instrument(skip(self))]
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<DaySlots>, AvailabilityError> {
        if to < from {
            return Err(AvailabilityError::InvalidRange(
                "'to' must not be before 'from'".to_string(),
            ));
        }
        let days = (to - from).num_days() + 1;
        if days > self.hours.max_range_days {
            return Err(AvailabilityError::InvalidRange(format!(
                "range covers {} days, at most {} allowed",
                days, self.hours.max_range_days
            )));
        }

        debug!("Computing slots for doctor {} from {} to {}", doctor_id, from, to);
        self.compute_range(doctor_id, from, to, None, now).await
    }

    /// Slots of one date, optionally ignoring one appointment that is being
    /// moved.
    pub async fn day_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<DaySlots, AvailabilityError> {
        let mut days = self
            .compute_range(doctor_id, date, date, exclude_appointment_id, now)
            .await?;
        Ok(days
            .pop()
            .unwrap_or_else(|| DaySlots::unavailable(date, UnavailableReason::NoSchedule)))
    }

    /// The instant must be the start of a free slot of the doctor.
    #[instrument(skip(self))]
    pub async fn ensure_bookable(
        &self,
        doctor_id: Uuid,
        instant: DateTime<Utc>,
        exclude_appointment_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Slot, AvailabilityError> {
        let date = self.hours.local_date(instant);
        let day = self
            .day_slots(doctor_id, date, exclude_appointment_id, now)
            .await?;

        if let Some(slot) = day.slot_at(instant) {
            return Ok(slot.clone());
        }

        let reason = match day.reason {
            Some(reason) => reason,
            None => {
                let schedule = self.store.get_schedule(doctor_id).await?;
                let unbooked = compute_day_slots(date, schedule.as_ref(), None, &[], &self.hours, now);
                if unbooked.slot_at(instant).is_some() {
                    UnavailableReason::SlotTaken
                } else if instant < now + Duration::minutes(self.hours.min_lead_minutes) {
                    UnavailableReason::NoLeadTime
                } else {
                    UnavailableReason::OutsideWorkingHours
                }
            }
        };

        debug!("Instant {} is not bookable for doctor {}: {}", instant, doctor_id, reason);
        Err(AvailabilityError::SlotUnavailable(reason))
    }

    async fn compute_range(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        exclude_appointment_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DaySlots>, AvailabilityError> {
        let schedule = self.store.get_schedule(doctor_id).await?;

        let day_offs: HashMap<NaiveDate, DoctorDayOff> = self
            .store
            .day_offs_for_doctor(doctor_id, from, to)
            .await?
            .into_iter()
            .filter(|d| d.is_active())
            .map(|d| (d.off_date, d))
            .collect();

        let window_start = self.hours.to_utc(from, NaiveTime::MIN);
        let window_end = self.hours.to_utc(to + Duration::days(1), NaiveTime::MIN);
        let booked: Vec<Appointment> = self
            .store
            .appointments_for_doctor_between(
                doctor_id,
                window_start,
                window_end,
                &AppointmentStatus::slot_blocking(),
            )
            .await?
            .into_iter()
            .filter(|a| Some(a.id) != exclude_appointment_id)
            .collect();

        let result = from
            .iter_days()
            .take_while(|date| *date <= to)
            .map(|date| {
                let same_day: Vec<Appointment> = booked
                    .iter()
                    .filter(|a| self.hours.local_date(a.appointment_datetime) == date)
                    .cloned()
                    .collect();
                compute_day_slots(
                    date,
                    schedule.as_ref(),
                    day_offs.get(&date),
                    &same_day,
                    &self.hours,
                    now,
                )
            })
            .collect();

        Ok(result)
    }
}
