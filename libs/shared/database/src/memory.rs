use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

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

/// Process-local store with the same uniqueness rules as the SQL schema.
/// Used by tests and by `STORE_BACKEND=memory`.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    appointments: BTreeMap<i64, Appointment>,
    schedules: HashMap<Uuid, Schedule>,
    day_offs: BTreeMap<i64, DoctorDayOff>,
    codes: BTreeMap<i64, CompensationCode>,
    payments: HashMap<PaymentKind, BTreeMap<i64, Payment>>,
    prescriptions: HashMap<PrescriptionKind, BTreeMap<i64, Prescription>>,
    medicines: HashMap<PrescriptionKind, Vec<PrescriptionMedicine>>,
    batches: BTreeMap<i64, Batch>,
    callback_failures: Vec<CallbackFailure>,
    unavailable: HashSet<&'static str>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn writable(&self, table: &'static str) -> StoreResult<()> {
        if self.unavailable.contains(table) {
            return Err(StoreError::Unavailable(format!("{} is not accepting writes", table)));
        }
        Ok(())
    }

    fn slot_taken(&self, doctor_id: Uuid, at: DateTime<Utc>, except: Option<i64>) -> bool {
        self.appointments.values().any(|a| {
            Some(a.id) != except
                && a.doctor_id == doctor_id
                && a.appointment_datetime == at
                && a.status.blocks_slot()
        })
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fully formed appointment, replacing any with the same id.
    pub async fn seed_appointment(&self, appointment: Appointment) {
        let mut tables = self.tables.write().await;
        tables.next_id = tables.next_id.max(appointment.id);
        tables.appointments.insert(appointment.id, appointment);
    }

    pub async fn seed_batch(&self, batch: Batch) {
        let mut tables = self.tables.write().await;
        tables.next_id = tables.next_id.max(batch.id);
        tables.batches.insert(batch.id, batch);
    }

    pub async fn seed_compensation_code(&self, code: CompensationCode) {
        let mut tables = self.tables.write().await;
        tables.next_id = tables.next_id.max(code.id);
        tables.codes.insert(code.id, code);
    }

    /// Moves a prescription's creation time, for age-based sweeps.
    pub async fn backdate_prescription(
        &self,
        kind: PrescriptionKind,
        id: i64,
        created_at: DateTime<Utc>,
    ) {
        let mut tables = self.tables.write().await;
        if let Some(p) = tables.prescriptions.entry(kind).or_default().get_mut(&id) {
            p.created_at = created_at;
        }
    }

    /// Makes inserts into `table` fail with `StoreError::Unavailable` until
    /// `restore_writes_to` is called.
    pub async fn fail_writes_to(&self, table: &'static str) {
        self.tables.write().await.unavailable.insert(table);
    }

    pub async fn restore_writes_to(&self, table: &'static str) {
        self.tables.write().await.unavailable.remove(table);
    }

    pub async fn callback_failures(&self) -> Vec<CallbackFailure> {
        self.tables.read().await.callback_failures.clone()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn get_appointment(&self, id: i64) -> StoreResult<Option<Appointment>> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn appointments_for_doctor_between(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        statuses: &[AppointmentStatus],
    ) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| {
                a.doctor_id == doctor_id
                    && a.appointment_datetime >= from
                    && a.appointment_datetime < to
                    && statuses.contains(&a.status)
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.appointment_datetime, a.id));
        Ok(found)
    }

    async fn insert_appointment(&self, new: NewAppointment) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;
        if new.status.blocks_slot()
            && tables.slot_taken(new.doctor_id, new.appointment_datetime, None)
        {
            return Err(StoreError::Conflict(format!(
                "doctor {} already has an appointment at {}",
                new.doctor_id, new.appointment_datetime
            )));
        }

        let now = Utc::now();
        let appointment = Appointment {
            id: tables.next_id(),
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            appointment_datetime: new.appointment_datetime,
            fee: new.fee,
            status: new.status,
            note: new.note,
            compensation_code_id: new.compensation_code_id,
            cancelled_by: None,
            cancel_reason: None,
            cancelled_at: None,
            accepted_at: None,
            completed_at: None,
            rescheduled_from_id: new.rescheduled_from_id,
            rescheduled_to_id: None,
            created_at: now,
            updated_at: now,
        };
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn transition_appointment(
        &self,
        id: i64,
        expected: AppointmentStatus,
        patch: AppointmentPatch,
    ) -> StoreResult<Option<Appointment>> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.appointments.get(&id) else {
            return Ok(None);
        };
        if current.status != expected {
            return Ok(None);
        }

        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        updated.updated_at = Utc::now();

        if updated.status.blocks_slot()
            && tables.slot_taken(updated.doctor_id, updated.appointment_datetime, Some(id))
        {
            return Err(StoreError::Conflict(format!(
                "doctor {} already has an appointment at {}",
                updated.doctor_id, updated.appointment_datetime
            )));
        }

        tables.appointments.insert(id, updated.clone());
        Ok(Some(updated))
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStore {
    async fn get_schedule(&self, doctor_id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.tables.read().await.schedules.get(&doctor_id).cloned())
    }

    async fn upsert_schedule(&self, mut schedule: Schedule) -> StoreResult<Schedule> {
        schedule.updated_at = Some(Utc::now());
        self.tables
            .write()
            .await
            .schedules
            .insert(schedule.doctor_id, schedule.clone());
        Ok(schedule)
    }

    async fn day_offs_for_doctor(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<DoctorDayOff>> {
        let tables = self.tables.read().await;
        let mut found: Vec<DoctorDayOff> = tables
            .day_offs
            .values()
            .filter(|d| d.doctor_id == doctor_id && d.off_date >= from && d.off_date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|d| (d.off_date, d.id));
        Ok(found)
    }

    async fn get_day_off(&self, id: i64) -> StoreResult<Option<DoctorDayOff>> {
        Ok(self.tables.read().await.day_offs.get(&id).cloned())
    }

    async fn insert_day_off(&self, new: NewDayOff) -> StoreResult<DoctorDayOff> {
        let mut tables = self.tables.write().await;
        let clash = tables
            .day_offs
            .values()
            .any(|d| d.doctor_id == new.doctor_id && d.off_date == new.off_date && d.is_active());
        if clash {
            return Err(StoreError::Conflict(format!(
                "doctor {} already has an active day-off on {}",
                new.doctor_id, new.off_date
            )));
        }

        let day_off = DoctorDayOff {
            id: tables.next_id(),
            doctor_id: new.doctor_id,
            off_date: new.off_date,
            morning: new.morning,
            afternoon: new.afternoon,
            status: DayOffStatus::Active,
            reason: new.reason,
            created_at: Utc::now(),
        };
        tables.day_offs.insert(day_off.id, day_off.clone());
        Ok(day_off)
    }

    async fn cancel_day_off(&self, id: i64) -> StoreResult<Option<DoctorDayOff>> {
        let mut tables = self.tables.write().await;
        match tables.day_offs.get_mut(&id) {
            Some(d) if d.is_active() => {
                d.status = DayOffStatus::Cancelled;
                Ok(Some(d.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl CompensationStore for InMemoryStore {
    async fn insert_compensation_code(
        &self,
        new: NewCompensationCode,
    ) -> StoreResult<CompensationCode> {
        let mut tables = self.tables.write().await;
        tables.writable("compensation_codes")?;
        if let Some(existing) = tables
            .codes
            .values()
            .find(|c| c.source_appointment_id == new.source_appointment_id || c.code == new.code)
        {
            return Err(StoreError::Conflict(format!(
                "compensation code {} already exists for appointment {}",
                existing.code, existing.source_appointment_id
            )));
        }

        let code = CompensationCode {
            id: tables.next_id(),
            code: new.code,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            source_appointment_id: new.source_appointment_id,
            discount_percent: new.discount_percent,
            is_used: false,
            used_appointment_id: None,
            used_at: None,
            expires_at: new.expires_at,
            created_at: Utc::now(),
        };
        tables.codes.insert(code.id, code.clone());
        Ok(code)
    }

    async fn find_compensation_code(&self, code: &str) -> StoreResult<Option<CompensationCode>> {
        let tables = self.tables.read().await;
        Ok(tables.codes.values().find(|c| c.code == code).cloned())
    }

    async fn compensation_code_for_appointment(
        &self,
        source_appointment_id: i64,
    ) -> StoreResult<Option<CompensationCode>> {
        let tables = self.tables.read().await;
        Ok(tables
            .codes
            .values()
            .find(|c| c.source_appointment_id == source_appointment_id)
            .cloned())
    }

    async fn redeem_compensation_code(
        &self,
        id: i64,
        used_appointment_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<CompensationCode>> {
        let mut tables = self.tables.write().await;
        match tables.codes.get_mut(&id) {
            Some(c) if !c.is_used => {
                c.is_used = true;
                c.used_appointment_id = Some(used_appointment_id);
                c.used_at = Some(at);
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn payments_for(&self, kind: PaymentKind, owner_id: i64) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Payment> = tables
            .payments
            .get(&kind)
            .map(|rows| rows.values().filter(|p| p.owner_id == owner_id).cloned().collect())
            .unwrap_or_default();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(found)
    }

    async fn insert_payment(&self, kind: PaymentKind, new: NewPayment) -> StoreResult<Payment> {
        let mut tables = self.tables.write().await;
        tables.writable(kind.table())?;
        let id = tables.next_id();
        let rows = tables.payments.entry(kind).or_default();

        if new.status == PaymentStatus::Paid
            && rows
                .values()
                .any(|p| p.owner_id == new.owner_id && p.status == PaymentStatus::Paid)
        {
            return Err(StoreError::Conflict(format!(
                "{} {} is already paid",
                kind, new.owner_id
            )));
        }

        let now = Utc::now();
        let payment = Payment {
            id,
            owner_id: new.owner_id,
            amount: new.amount,
            payment_method: new.payment_method,
            status: new.status,
            order_id: new.order_id,
            transaction_ref: new.transaction_ref,
            paid_at: new.paid_at,
            created_at: now,
            updated_at: now,
        };
        rows.insert(id, payment.clone());
        Ok(payment)
    }

    async fn update_payment(
        &self,
        kind: PaymentKind,
        id: i64,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> StoreResult<Option<Payment>> {
        let mut tables = self.tables.write().await;
        let rows = tables.payments.entry(kind).or_default();

        let Some(current) = rows.get(&id) else {
            return Ok(None);
        };
        if current.status != expected {
            return Ok(None);
        }

        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        updated.updated_at = Utc::now();

        if updated.status == PaymentStatus::Paid
            && rows.values().any(|p| {
                p.id != id && p.owner_id == updated.owner_id && p.status == PaymentStatus::Paid
            })
        {
            return Err(StoreError::Conflict(format!(
                "{} {} is already paid",
                kind, updated.owner_id
            )));
        }

        rows.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn record_callback_failure(&self, failure: CallbackFailure) -> StoreResult<()> {
        self.tables.write().await.callback_failures.push(failure);
        Ok(())
    }
}

#[async_trait]
impl PrescriptionStore for InMemoryStore {
    async fn get_prescription(
        &self,
        kind: PrescriptionKind,
        id: i64,
    ) -> StoreResult<Option<Prescription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .prescriptions
            .get(&kind)
            .and_then(|rows| rows.get(&id))
            .cloned())
    }

    async fn prescription_for_appointment(
        &self,
        appointment_id: i64,
    ) -> StoreResult<Option<Prescription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .prescriptions
            .get(&PrescriptionKind::Appointment)
            .and_then(|rows| {
                rows.values()
                    .find(|p| p.appointment_id == Some(appointment_id))
                    .cloned()
            }))
    }

    async fn insert_prescription(
        &self,
        kind: PrescriptionKind,
        new: NewPrescription,
    ) -> StoreResult<Prescription> {
        let mut tables = self.tables.write().await;

        if let Some(appointment_id) = new.appointment_id {
            let taken = tables
                .prescriptions
                .get(&kind)
                .map(|rows| rows.values().any(|p| p.appointment_id == Some(appointment_id)))
                .unwrap_or(false);
            if taken {
                return Err(StoreError::Conflict(format!(
                    "appointment {} already has a prescription",
                    appointment_id
                )));
            }
        }

        let now = Utc::now();
        let prescription = Prescription {
            id: tables.next_id(),
            appointment_id: new.appointment_id,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            pharmacist_id: None,
            status: PrescriptionStatus::PendingPrepare,
            note: new.note,
            cancel_reason: None,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut medicines = Vec::with_capacity(new.medicines.len());
        for m in new.medicines {
            medicines.push(PrescriptionMedicine {
                id: tables.next_id(),
                owner_id: prescription.id,
                medicine_id: m.medicine_id,
                quantity: m.quantity,
                unit_price: m.unit_price,
                dosage: m.dosage,
            });
        }

        tables
            .prescriptions
            .entry(kind)
            .or_default()
            .insert(prescription.id, prescription.clone());
        tables.medicines.entry(kind).or_default().extend(medicines);
        Ok(prescription)
    }

    async fn prescription_medicines(
        &self,
        kind: PrescriptionKind,
        id: i64,
    ) -> StoreResult<Vec<PrescriptionMedicine>> {
        let tables = self.tables.read().await;
        Ok(tables
            .medicines
            .get(&kind)
            .map(|rows| rows.iter().filter(|m| m.owner_id == id).cloned().collect())
            .unwrap_or_default())
    }

    async fn transition_prescription(
        &self,
        kind: PrescriptionKind,
        id: i64,
        expected: PrescriptionStatus,
        patch: PrescriptionPatch,
    ) -> StoreResult<Option<Prescription>> {
        let mut tables = self.tables.write().await;
        match tables.prescriptions.entry(kind).or_default().get_mut(&id) {
            Some(p) if p.status == expected => {
                patch.apply_to(p);
                p.updated_at = Utc::now();
                Ok(Some(p.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cancel_stale_prescriptions(
        &self,
        kind: PrescriptionKind,
        created_before: DateTime<Utc>,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut count = 0;
        for p in tables.prescriptions.entry(kind).or_default().values_mut() {
            if p.status == PrescriptionStatus::PendingPrepare && p.created_at < created_before {
                p.status = PrescriptionStatus::Cancelled;
                p.cancel_reason = Some(reason.to_string());
                p.cancelled_at = Some(at);
                p.updated_at = at;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn get_batch(&self, id: i64) -> StoreResult<Option<Batch>> {
        Ok(self.tables.read().await.batches.get(&id).cloned())
    }

    async fn dispensable_batches(
        &self,
        medicine_id: i64,
        today: NaiveDate,
    ) -> StoreResult<Vec<Batch>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Batch> = tables
            .batches
            .values()
            .filter(|b| b.medicine_id == medicine_id && b.is_dispensable(today))
            .cloned()
            .collect();
        found.sort_by_key(|b| (b.expiry_date, b.id));
        Ok(found)
    }

    async fn adjust_batch_quantity(
        &self,
        id: i64,
        expected_quantity: i32,
        new_quantity: i32,
    ) -> StoreResult<Option<Batch>> {
        let mut tables = self.tables.write().await;
        match tables.batches.get_mut(&id) {
            Some(b) if b.quantity == expected_quantity => {
                b.quantity = new_quantity;
                b.updated_at = Some(Utc::now());
                Ok(Some(b.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_batch_status(
        &self,
        id: i64,
        expected: BatchStatus,
        status: BatchStatus,
    ) -> StoreResult<Option<Batch>> {
        let mut tables = self.tables.write().await;
        match tables.batches.get_mut(&id) {
            Some(b) if b.status == expected => {
                b.status = status;
                b.updated_at = Some(Utc::now());
                Ok(Some(b.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn expire_batches(&self, today: NaiveDate) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut count = 0;
        for b in tables.batches.values_mut() {
            if b.status == BatchStatus::Active && b.expiry_date < today {
                b.status = BatchStatus::Expired;
                b.updated_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn new_appointment(doctor_id: Uuid, at: DateTime<Utc>) -> NewAppointment {
        NewAppointment {
            patient_id: Uuid::new_v4(),
            doctor_id,
            appointment_datetime: at,
            fee: 200_000,
            status: AppointmentStatus::WaitingForConfirmation,
            note: None,
            compensation_code_id: None,
            rescheduled_from_id: None,
        }
    }

    #[tokio::test]
    async fn second_booking_of_same_slot_conflicts() {
        let store = InMemoryStore::new();
        let doctor = Uuid::new_v4();
        let at = Utc::now() + Duration::days(2);

        let first = store.insert_appointment(new_appointment(doctor, at)).await.unwrap();
        assert_matches!(
            store.insert_appointment(new_appointment(doctor, at)).await,
            Err(StoreError::Conflict(_))
        );

        store
            .transition_appointment(
                first.id,
                AppointmentStatus::WaitingForConfirmation,
                AppointmentPatch::status(AppointmentStatus::Cancelled),
            )
            .await
            .unwrap();
        assert!(store.insert_appointment(new_appointment(doctor, at)).await.is_ok());
    }

    #[tokio::test]
    async fn transition_requires_expected_status() {
        let store = InMemoryStore::new();
        let created = store
            .insert_appointment(new_appointment(Uuid::new_v4(), Utc::now()))
            .await
            .unwrap();

        let stale = store
            .transition_appointment(
                created.id,
                AppointmentStatus::Accepted,
                AppointmentPatch::status(AppointmentStatus::Completed),
            )
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn only_one_paid_row_per_owner() {
        let store = InMemoryStore::new();
        let paid = NewPayment {
            owner_id: 42,
            amount: 200_000,
            payment_method: Some("cash".into()),
            status: PaymentStatus::Paid,
            order_id: None,
            transaction_ref: None,
            paid_at: Some(Utc::now()),
        };

        store.insert_payment(PaymentKind::Appointment, paid.clone()).await.unwrap();
        assert_matches!(
            store.insert_payment(PaymentKind::Appointment, paid.clone()).await,
            Err(StoreError::Conflict(_))
        );
        // Other payment tables are independent.
        assert!(store.insert_payment(PaymentKind::Prescription, paid).await.is_ok());
    }

    #[tokio::test]
    async fn redeem_is_single_use() {
        let store = InMemoryStore::new();
        let code = store
            .insert_compensation_code(NewCompensationCode {
                code: "ZXCV1234".into(),
                patient_id: Uuid::new_v4(),
                doctor_id: Uuid::new_v4(),
                source_appointment_id: 5,
                discount_percent: 20,
                expires_at: Utc::now() + Duration::days(30),
            })
            .await
            .unwrap();

        assert!(store.redeem_compensation_code(code.id, 9, Utc::now()).await.unwrap().is_some());
        assert!(store.redeem_compensation_code(code.id, 10, Utc::now()).await.unwrap().is_none());
    }
}
