use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use shared_database::store::ScheduleStore;
use shared_database::ClinicStore;
use shared_models::schedule::{DoctorDayOff, Schedule};
use shared_utils::AppState;

use crate::models::{AvailabilityError, UpdateScheduleRequest};

pub struct ScheduleService {
    store: Arc<dyn ClinicStore>,
}

impl ScheduleService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    pub async fn get_schedule(&self, doctor_id: Uuid) -> Result<Schedule, AvailabilityError> {
        self.store
            .get_schedule(doctor_id)
            .await?
            .ok_or(AvailabilityError::ScheduleNotFound)
    }

    pub async fn update_schedule(
        &self,
        doctor_id: Uuid,
        request: UpdateScheduleRequest,
    ) -> Result<Schedule, AvailabilityError> {
        let schedule = Schedule {
            doctor_id,
            monday: request.monday,
            tuesday: request.tuesday,
            wednesday: request.wednesday,
            thursday: request.thursday,
            friday: request.friday,
            saturday: request.saturday,
            sunday: request.sunday,
            updated_at: None,
        };

        let saved = self.store.upsert_schedule(schedule).await?;
        info!("Weekly schedule updated for doctor {}", doctor_id);
        Ok(saved)
    }

    pub async fn day_offs(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DoctorDayOff>, AvailabilityError> {
        if to < from {
            return Err(AvailabilityError::InvalidRange(
                "'to' must not be before 'from'".to_string(),
            ));
        }
        Ok(self.store.day_offs_for_doctor(doctor_id, from, to).await?)
    }
}
