use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use shared_config::ClinicHours;
use shared_database::store::ScheduleStore;
use shared_database::{ClinicStore, StoreError};
use shared_models::schedule::{DoctorDayOff, NewDayOff};
use shared_utils::AppState;

use crate::models::{AppointmentError, CreateDayOffRequest, DayOffOutcome};
use crate::services::transitions::AppointmentTransitionService;

const DAY_OFF_CANCEL_REASON: &str = "Doctor is unavailable on this date";

/// Records doctor day-offs and withdraws the appointments they displace.
pub struct DayOffService {
    store: Arc<dyn ClinicStore>,
    hours: ClinicHours,
    transitions: AppointmentTransitionService,
}

impl DayOffService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            hours: state.config.clinic.clone(),
            transitions: AppointmentTransitionService::new(state),
        }
    }

    #[instrument(skip(self, request))]
    pub async fn create_day_off(
        &self,
        doctor_id: Uuid,
        request: CreateDayOffRequest,
        now: DateTime<Utc>,
    ) -> Result<DayOffOutcome, AppointmentError> {
        if request.off_date < self.hours.local_date(now) {
            return Err(AppointmentError::ValidationError(
                "day-off date is in the past".to_string(),
            ));
        }
        if !request.morning && !request.afternoon {
            return Err(AppointmentError::ValidationError(
                "at least one session must be marked off".to_string(),
            ));
        }

        let day_off = match self
            .store
            .insert_day_off(NewDayOff {
                doctor_id,
                off_date: request.off_date,
                morning: request.morning,
                afternoon: request.afternoon,
                reason: request.reason,
            })
            .await
        {
            Ok(day_off) => day_off,
            Err(StoreError::Conflict(_)) => {
                return Err(AppointmentError::DayOffConflict(request.off_date))
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Doctor {} is off on {} (morning: {}, afternoon: {})",
            doctor_id, day_off.off_date, day_off.morning, day_off.afternoon
        );

        let (cancelled, skipped) = self
            .transitions
            .cancel_affected_by_day_off(
                doctor_id,
                day_off.off_date,
                &day_off.sessions(),
                DAY_OFF_CANCEL_REASON,
                now,
            )
            .await?;

        Ok(DayOffOutcome {
            day_off,
            cancelled,
            skipped,
        })
    }

    pub async fn get_day_off(&self, id: i64) -> Result<DoctorDayOff, AppointmentError> {
        self.store
            .get_day_off(id)
            .await?
            .ok_or(AppointmentError::DayOffNotFound)
    }

    /// Restores the doctor's availability. Appointments cancelled when the
    /// day-off was created stay cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_day_off(&self, id: i64) -> Result<DoctorDayOff, AppointmentError> {
        let existing = self.get_day_off(id).await?;
        if !existing.is_active() {
            return Err(AppointmentError::ValidationError(
                "day-off is already cancelled".to_string(),
            ));
        }

        let cancelled = self
            .store
            .cancel_day_off(id)
            .await?
            .ok_or(AppointmentError::ConcurrentModification)?;

        info!("Day-off {} of doctor {} cancelled", id, cancelled.doctor_id);
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use shared_database::store::{AppointmentStore, CompensationStore};
    use shared_models::appointment::{AppointmentStatus, CancelledBy};
    use shared_models::schedule::{DayOffStatus, Schedule};
    use shared_utils::test_utils::{Fixtures, TestConfig};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        ClinicHours::default().to_utc(monday(), NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn request(morning: bool, afternoon: bool) -> CreateDayOffRequest {
        CreateDayOffRequest {
            doctor_id: None,
            off_date: monday(),
            morning,
            afternoon,
            reason: Some("conference".to_string()),
        }
    }

    #[tokio::test]
    async fn afternoon_day_off_cancels_afternoon_appointment_with_code() {
        let (state, store) = TestConfig::default().to_state();
        let doctor = Uuid::new_v4();
        let patient = Uuid::new_v4();
        store.upsert_schedule(Schedule::weekdays(doctor)).await.unwrap();
        store
            .seed_appointment(Fixtures::appointment(30, patient, doctor, at(14, 0), AppointmentStatus::Accepted))
            .await;

        let service = DayOffService::new(&state);
        let outcome = service
            .create_day_off(doctor, request(false, true), at(9, 0) - Duration::days(3))
            .await
            .unwrap();

        assert_eq!(outcome.cancelled.len(), 1);
        let appointment = store.get_appointment(30).await.unwrap().unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Cancelled);
        assert_eq!(appointment.cancelled_by, Some(CancelledBy::System));

        let code = store.compensation_code_for_appointment(30).await.unwrap().unwrap();
        assert_eq!(code.patient_id, patient);
        assert_eq!(code.doctor_id, doctor);
    }

    #[tokio::test]
    async fn rejects_empty_past_and_duplicate_day_offs() {
        let (state, _store) = TestConfig::default().to_state();
        let doctor = Uuid::new_v4();
        let service = DayOffService::new(&state);
        let before = at(9, 0) - Duration::days(3);

        assert_matches!(
            service.create_day_off(doctor, request(false, false), before).await,
            Err(AppointmentError::ValidationError(_))
        );
        assert_matches!(
            service
                .create_day_off(doctor, request(true, false), at(9, 0) + Duration::days(1))
                .await,
            Err(AppointmentError::ValidationError(_))
        );

        service.create_day_off(doctor, request(true, false), before).await.unwrap();
        assert_matches!(
            service.create_day_off(doctor, request(false, true), before).await,
            Err(AppointmentError::DayOffConflict(_))
        );
    }

    #[tokio::test]
    async fn cancelling_a_day_off_keeps_cancelled_appointments() {
        let (state, store) = TestConfig::default().to_state();
        let doctor = Uuid::new_v4();
        store
            .seed_appointment(Fixtures::appointment(
                31,
                Uuid::new_v4(),
                doctor,
                at(8, 30),
                AppointmentStatus::WaitingForConfirmation,
            ))
            .await;

        let service = DayOffService::new(&state);
        let outcome = service
            .create_day_off(doctor, request(true, true), at(9, 0) - Duration::days(3))
            .await
            .unwrap();

        let restored = service.cancel_day_off(outcome.day_off.id).await.unwrap();
        assert_eq!(restored.status, DayOffStatus::Cancelled);
        assert_matches!(
            service.cancel_day_off(outcome.day_off.id).await,
            Err(AppointmentError::ValidationError(_))
        );

        let appointment = store.get_appointment(31).await.unwrap().unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Cancelled);
    }
}
