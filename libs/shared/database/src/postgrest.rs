use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    appointment::{Appointment, AppointmentPatch, AppointmentStatus, NewAppointment},
    compensation::{CompensationCode, NewCompensationCode},
    inventory::{Batch, BatchStatus},
    payment::{CallbackFailure, NewPayment, Payment, PaymentKind, PaymentPatch, PaymentStatus},
    prescription::{
        NewPrescription, Prescription, PrescriptionKind, PrescriptionMedicine, PrescriptionPatch,
        PrescriptionStatus,
    },
    schedule::{DayOffStatus, DoctorDayOff, NewDayOff, Schedule},
};

use crate::store::{
    AppointmentStore, CompensationStore, InventoryStore, PaymentStore, PrescriptionStore,
    ScheduleStore, StoreError, StoreResult,
};
use crate::supabase::SupabaseClient;

/// Store backed by the Supabase REST API. Conditional transitions are PATCH
/// requests filtered on the expected status, so an empty response means the
/// row had already moved on.
#[derive(Clone)]
pub struct PostgrestStore {
    supabase: SupabaseClient,
}

impl PostgrestStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub fn from_client(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Vec<T>> {
        self.supabase.request(Method::GET, path, None, None).await
    }

    async fn select_one<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Option<T>> {
        Ok(self.select(path).await?.into_iter().next())
    }

    async fn insert_one<T: DeserializeOwned>(&self, table: &str, body: Value) -> StoreResult<T> {
        let path = format!("/rest/v1/{}", table);
        self.supabase
            .returning::<T>(Method::POST, &path, body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("insert into {} returned no row", table)))
    }

    async fn patch<T: DeserializeOwned>(&self, path: &str, body: Value) -> StoreResult<Vec<T>> {
        self.supabase.returning(Method::PATCH, path, body).await
    }
}

fn ts(at: DateTime<Utc>) -> String {
    urlencoding::encode(&at.to_rfc3339_opts(SecondsFormat::Millis, true)).into_owned()
}

fn to_body<T: Serialize>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Serializes a patch and stamps `updated_at`.
fn patch_body<T: Serialize>(patch: &T) -> StoreResult<Value> {
    let mut body = to_body(patch)?;
    if let Value::Object(map) = &mut body {
        map.insert("updated_at".to_string(), json!(Utc::now()));
    }
    Ok(body)
}

fn status_list(statuses: &[AppointmentStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[async_trait]
impl AppointmentStore for PostgrestStore {
    async fn get_appointment(&self, id: i64) -> StoreResult<Option<Appointment>> {
        self.select_one(&format!("/rest/v1/appointments?id=eq.{}", id))
            .await
    }

    async fn appointments_for_doctor_between(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        statuses: &[AppointmentStatus],
    ) -> StoreResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_datetime=gte.{}&appointment_datetime=lt.{}&status=in.({})&order=appointment_datetime.asc",
            doctor_id,
            ts(from),
            ts(to),
            status_list(statuses)
        );
        self.select(&path).await
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        debug!(
            "Inserting appointment for doctor {} at {}",
            appointment.doctor_id, appointment.appointment_datetime
        );
        self.insert_one("appointments", to_body(&appointment)?).await
    }

    async fn transition_appointment(
        &self,
        id: i64,
        expected: AppointmentStatus,
        patch: AppointmentPatch,
    ) -> StoreResult<Option<Appointment>> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", id, expected);
        let rows: Vec<Appointment> = self.patch(&path, patch_body(&patch)?).await?;
        Ok(rows.into_iter().next())
    }
}

// ==============================================================================
// SCHEDULES AND DAY-OFFS
// ==============================================================================

#[async_trait]
impl ScheduleStore for PostgrestStore {
    async fn get_schedule(&self, doctor_id: Uuid) -> StoreResult<Option<Schedule>> {
        self.select_one(&format!("/rest/v1/doctor_schedules?doctor_id=eq.{}", doctor_id))
            .await
    }

    async fn upsert_schedule(&self, schedule: Schedule) -> StoreResult<Schedule> {
        let mut body = to_body(&schedule)?;
        if let Value::Object(map) = &mut body {
            map.insert("updated_at".to_string(), json!(Utc::now()));
        }
        self.supabase
            .upsert::<Schedule>("/rest/v1/doctor_schedules?on_conflict=doctor_id", body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("schedule upsert returned no row".to_string()))
    }

    async fn day_offs_for_doctor(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DoctorDayOff>> {
        let path = format!(
            "/rest/v1/doctor_day_offs?doctor_id=eq.{}&off_date=gte.{}&off_date=lte.{}&order=off_date.asc,id.asc",
            doctor_id, from, to
        );
        self.select(&path).await
    }

    async fn get_day_off(&self, id: i64) -> StoreResult<Option<DoctorDayOff>> {
        self.select_one(&format!("/rest/v1/doctor_day_offs?id=eq.{}", id))
            .await
    }

    async fn insert_day_off(&self, day_off: NewDayOff) -> StoreResult<DoctorDayOff> {
        let mut body = to_body(&day_off)?;
        if let Value::Object(map) = &mut body {
            map.insert("status".to_string(), json!(DayOffStatus::Active));
        }
        self.insert_one("doctor_day_offs", body).await
    }

    async fn cancel_day_off(&self, id: i64) -> StoreResult<Option<DoctorDayOff>> {
        let path = format!("/rest/v1/doctor_day_offs?id=eq.{}&status=eq.active", id);
        let rows: Vec<DoctorDayOff> = self
            .patch(&path, json!({ "status": DayOffStatus::Cancelled }))
            .await?;
        Ok(rows.into_iter().next())
    }
}

// ==============================================================================
// COMPENSATION CODES
// ==============================================================================

#[async_trait]
impl CompensationStore for PostgrestStore {
    async fn insert_compensation_code(
        &self,
        code: NewCompensationCode,
    ) -> StoreResult<CompensationCode> {
        self.insert_one("compensation_codes", to_body(&code)?).await
    }

    async fn find_compensation_code(&self, code: &str) -> StoreResult<Option<CompensationCode>> {
        let path = format!(
            "/rest/v1/compensation_codes?code=eq.{}",
            urlencoding::encode(code)
        );
        self.select_one(&path).await
    }

    async fn compensation_code_for_appointment(
        &self,
        source_appointment_id: i64,
    ) -> StoreResult<Option<CompensationCode>> {
        let path = format!(
            "/rest/v1/compensation_codes?source_appointment_id=eq.{}",
            source_appointment_id
        );
        self.select_one(&path).await
    }

    async fn redeem_compensation_code(
        &self,
        id: i64,
        used_appointment_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<CompensationCode>> {
        let path = format!("/rest/v1/compensation_codes?id=eq.{}&is_used=eq.false", id);
        let rows: Vec<CompensationCode> = self
            .patch(
                &path,
                json!({
                    "is_used": true,
                    "used_appointment_id": used_appointment_id,
                    "used_at": at,
                }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

// ==============================================================================
// PAYMENTS
// ==============================================================================

#[async_trait]
impl PaymentStore for PostgrestStore {
    async fn payments_for(&self, kind: PaymentKind, owner_id: i64) -> StoreResult<Vec<Payment>> {
        let path = format!(
            "/rest/v1/{}?{}=eq.{}&order=created_at.desc,id.desc",
            kind.table(),
            kind.owner_column(),
            owner_id
        );
        self.select(&path).await
    }

    async fn insert_payment(&self, kind: PaymentKind, payment: NewPayment) -> StoreResult<Payment> {
        let body = json!({
            kind.owner_column(): payment.owner_id,
            "amount": payment.amount,
            "payment_method": payment.payment_method,
            "status": payment.status,
            "order_id": payment.order_id,
            "transaction_ref": payment.transaction_ref,
            "paid_at": payment.paid_at,
        });
        self.insert_one(kind.table(), body).await
    }

    async fn update_payment(
        &self,
        kind: PaymentKind,
        id: i64,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> StoreResult<Option<Payment>> {
        let path = format!("/rest/v1/{}?id=eq.{}&status=eq.{}", kind.table(), id, expected);
        let rows: Vec<Payment> = self.patch(&path, patch_body(&patch)?).await?;
        Ok(rows.into_iter().next())
    }

    async fn record_callback_failure(&self, failure: CallbackFailure) -> StoreResult<()> {
        let _: Value = self
            .insert_one("payment_callback_failures", to_body(&failure)?)
            .await?;
        Ok(())
    }
}

// ==============================================================================
// PRESCRIPTIONS
// ==============================================================================

#[async_trait]
impl PrescriptionStore for PostgrestStore {
    async fn get_prescription(
        &self,
        kind: PrescriptionKind,
        id: i64,
    ) -> StoreResult<Option<Prescription>> {
        self.select_one(&format!("/rest/v1/{}?id=eq.{}", kind.table(), id))
            .await
    }

    async fn prescription_for_appointment(
        &self,
        appointment_id: i64,
    ) -> StoreResult<Option<Prescription>> {
        let path = format!(
            "/rest/v1/{}?appointment_id=eq.{}",
            PrescriptionKind::Appointment.table(),
            appointment_id
        );
        self.select_one(&path).await
    }

    async fn insert_prescription(
        &self,
        kind: PrescriptionKind,
        prescription: NewPrescription,
    ) -> StoreResult<Prescription> {
        let mut body = json!({
            "patient_id": prescription.patient_id,
            "status": PrescriptionStatus::PendingPrepare,
            "note": prescription.note,
        });
        if kind == PrescriptionKind::Appointment {
            if let Value::Object(map) = &mut body {
                map.insert("appointment_id".to_string(), json!(prescription.appointment_id));
                map.insert("doctor_id".to_string(), json!(prescription.doctor_id));
            }
        }

        let created: Prescription = self.insert_one(kind.table(), body).await?;

        let medicines: Vec<Value> = prescription
            .medicines
            .iter()
            .map(|m| {
                json!({
                    kind.owner_column(): created.id,
                    "medicine_id": m.medicine_id,
                    "quantity": m.quantity,
                    "unit_price": m.unit_price,
                    "dosage": m.dosage,
                })
            })
            .collect();

        if !medicines.is_empty() {
            let path = format!("/rest/v1/{}", kind.medicine_table());
            let _: Vec<Value> = self
                .supabase
                .returning(Method::POST, &path, Value::Array(medicines))
                .await?;
        }

        Ok(created)
    }

    async fn prescription_medicines(
        &self,
        kind: PrescriptionKind,
        id: i64,
    ) -> StoreResult<Vec<PrescriptionMedicine>> {
        let path = format!(
            "/rest/v1/{}?{}=eq.{}&order=id.asc",
            kind.medicine_table(),
            kind.owner_column(),
            id
        );
        self.select(&path).await
    }

    async fn transition_prescription(
        &self,
        kind: PrescriptionKind,
        id: i64,
        expected: PrescriptionStatus,
        patch: PrescriptionPatch,
    ) -> StoreResult<Option<Prescription>> {
        let path = format!("/rest/v1/{}?id=eq.{}&status=eq.{}", kind.table(), id, expected);
        let rows: Vec<Prescription> = self.patch(&path, patch_body(&patch)?).await?;
        Ok(rows.into_iter().next())
    }

    async fn cancel_stale_prescriptions(
        &self,
        kind: PrescriptionKind,
        created_before: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let path = format!(
            "/rest/v1/{}?status=eq.{}&created_at=lt.{}",
            kind.table(),
            PrescriptionStatus::PendingPrepare,
            ts(created_before)
        );
        let patch = PrescriptionPatch {
            status: Some(PrescriptionStatus::Cancelled),
            cancel_reason: Some(reason.to_string()),
            cancelled_at: Some(at),
            ..Default::default()
        };
        let rows: Vec<Value> = self.patch(&path, patch_body(&patch)?).await?;
        Ok(rows.len() as u64)
    }
}

// ==============================================================================
// INVENTORY
// ==============================================================================

#[async_trait]
impl InventoryStore for PostgrestStore {
    async fn get_batch(&self, id: i64) -> StoreResult<Option<Batch>> {
        self.select_one(&format!("/rest/v1/batches?id=eq.{}", id))
            .await
    }

    async fn dispensable_batches(
        &self,
        medicine_id: i64,
        today: NaiveDate,
    ) -> StoreResult<Vec<Batch>> {
        let path = format!(
            "/rest/v1/batches?medicine_id=eq.{}&status=eq.{}&expiry_date=gte.{}&quantity=gt.0&order=expiry_date.asc,id.asc",
            medicine_id,
            BatchStatus::Active,
            today
        );
        self.select(&path).await
    }

    async fn adjust_batch_quantity(
        &self,
        id: i64,
        expected_quantity: i32,
        new_quantity: i32,
    ) -> StoreResult<Option<Batch>> {
        let path = format!("/rest/v1/batches?id=eq.{}&quantity=eq.{}", id, expected_quantity);
        let rows: Vec<Batch> = self
            .patch(&path, json!({ "quantity": new_quantity, "updated_at": Utc::now() }))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn set_batch_status(
        &self,
        id: i64,
        expected: BatchStatus,
        status: BatchStatus,
    ) -> StoreResult<Option<Batch>> {
        let path = format!("/rest/v1/batches?id=eq.{}&status=eq.{}", id, expected);
        let rows: Vec<Batch> = self
            .patch(&path, json!({ "status": status, "updated_at": Utc::now() }))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn expire_batches(&self, today: NaiveDate) -> StoreResult<u64> {
        let path = format!(
            "/rest/v1/batches?status=eq.{}&expiry_date=lt.{}",
            BatchStatus::Active,
            today
        );
        let rows: Vec<Value> = self
            .patch(
                &path,
                json!({ "status": BatchStatus::Expired, "updated_at": Utc::now() }),
            )
            .await?;
        Ok(rows.len() as u64)
    }
}
