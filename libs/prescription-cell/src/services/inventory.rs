use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info, instrument, warn};

use shared_database::store::InventoryStore;
use shared_database::ClinicStore;
use shared_models::inventory::{Batch, BatchStatus};
use shared_models::prescription::PrescriptionMedicine;
use shared_utils::AppState;

use crate::models::{DispenseLine, PrescriptionError};

/// Stock movements: first-expiry-first-out dispensing and batch disposal.
pub struct InventoryService {
    store: Arc<dyn ClinicStore>,
}

impl InventoryService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    /// Picks batches for every medicine without touching stock. Fails when
    /// any medicine cannot be covered in full.
    pub async fn plan_dispense(
        &self,
        medicines: &[PrescriptionMedicine],
        today: NaiveDate,
    ) -> Result<Vec<(Batch, DispenseLine)>, PrescriptionError> {
        let mut wanted: BTreeMap<i64, i32> = BTreeMap::new();
        for medicine in medicines {
            *wanted.entry(medicine.medicine_id).or_default() += medicine.quantity;
        }

        let mut plan = Vec::new();
        for (medicine_id, requested) in wanted {
            let batches = self.store.dispensable_batches(medicine_id, today).await?;
            let available: i32 = batches.iter().map(|b| b.quantity).sum();
            if available < requested {
                return Err(PrescriptionError::InsufficientStock {
                    medicine_id,
                    requested,
                    available,
                });
            }

            let mut remaining = requested;
            for batch in batches {
                if remaining == 0 {
                    break;
                }
                let take = remaining.min(batch.quantity);
                remaining -= take;
                plan.push((
                    batch.clone(),
                    DispenseLine {
                        batch_id: batch.id,
                        medicine_id,
                        quantity: take,
                    },
                ));
            }
        }

        Ok(plan)
    }

    /// Takes the planned units out of stock. Each decrement is conditional
    /// on the quantity read while planning; on a lost race every decrement
    /// already applied is put back. The returned pairs can be handed to
    /// [`InventoryService::restore`] to undo the whole dispense.
    #[instrument(skip(self, medicines))]
    pub async fn dispense(
        &self,
        medicines: &[PrescriptionMedicine],
        today: NaiveDate,
    ) -> Result<Vec<(Batch, DispenseLine)>, PrescriptionError> {
        let plan = self.plan_dispense(medicines, today).await?;
        let mut applied: Vec<(Batch, DispenseLine)> = Vec::new();

        for (batch, line) in plan {
            let remaining = batch.quantity - line.quantity;
            match self
                .store
                .adjust_batch_quantity(batch.id, batch.quantity, remaining)
                .await
            {
                Ok(Some(_)) => applied.push((batch, line)),
                Ok(None) => {
                    warn!("Batch {} changed while dispensing", batch.id);
                    self.restore(&applied).await;
                    return Err(PrescriptionError::ConcurrentModification);
                }
                Err(e) => {
                    self.restore(&applied).await;
                    return Err(e.into());
                }
            }
        }

        debug!("Dispensed {} batch lines", applied.len());
        Ok(applied)
    }

    /// Puts dispensed units back, newest decrement first.
    pub async fn restore(&self, applied: &[(Batch, DispenseLine)]) {
        for (batch, line) in applied.iter().rev() {
            let dispensed = batch.quantity - line.quantity;
            match self
                .store
                .adjust_batch_quantity(batch.id, dispensed, batch.quantity)
                .await
            {
                Ok(Some(_)) => {}
                Ok(None) => error!(
                    "Could not restore {} units to batch {}: quantity changed",
                    line.quantity, batch.id
                ),
                Err(e) => error!("Could not restore batch {}: {}", batch.id, e),
            }
        }
    }

    /// Active or Expired batch → Disposed.
    #[instrument(skip(self))]
    pub async fn dispose_batch(&self, batch_id: i64) -> Result<Batch, PrescriptionError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(PrescriptionError::BatchNotFound)?;

        if batch.status == BatchStatus::Disposed {
            return Err(PrescriptionError::BatchNotDisposable(batch.status));
        }

        let disposed = self
            .store
            .set_batch_status(batch_id, batch.status, BatchStatus::Disposed)
            .await?
            .ok_or(PrescriptionError::ConcurrentModification)?;

        info!("Batch {} of medicine {} disposed", batch_id, disposed.medicine_id);
        Ok(disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use shared_utils::test_utils::{Fixtures, TestConfig};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn line(medicine_id: i64, quantity: i32) -> PrescriptionMedicine {
        PrescriptionMedicine {
            id: 0,
            owner_id: 1,
            medicine_id,
            quantity,
            unit_price: 5_000,
            dosage: None,
        }
    }

    #[tokio::test]
    async fn dispenses_earliest_expiry_first() {
        let (state, store) = TestConfig::default().to_state();
        store.seed_batch(Fixtures::batch(1, 100, 5, today() + Duration::days(90))).await;
        store.seed_batch(Fixtures::batch(2, 100, 4, today() + Duration::days(10))).await;
        store.seed_batch(Fixtures::batch(3, 100, 50, today() - Duration::days(1))).await;

        let service = InventoryService::new(&state);
        let lines: Vec<DispenseLine> = service
            .dispense(&[line(100, 6)], today())
            .await
            .unwrap()
            .into_iter()
            .map(|(_, line)| line)
            .collect();

        assert_eq!(
            lines,
            vec![
                DispenseLine { batch_id: 2, medicine_id: 100, quantity: 4 },
                DispenseLine { batch_id: 1, medicine_id: 100, quantity: 2 },
            ]
        );
        assert_eq!(store.get_batch(2).await.unwrap().unwrap().quantity, 0);
        assert_eq!(store.get_batch(1).await.unwrap().unwrap().quantity, 3);
        assert_eq!(store.get_batch(3).await.unwrap().unwrap().quantity, 50);
    }

    #[tokio::test]
    async fn insufficient_stock_changes_nothing() {
        let (state, store) = TestConfig::default().to_state();
        store.seed_batch(Fixtures::batch(1, 100, 5, today() + Duration::days(30))).await;
        store.seed_batch(Fixtures::batch(2, 200, 1, today() + Duration::days(30))).await;

        let service = InventoryService::new(&state);
        assert_matches!(
            service.dispense(&[line(100, 2), line(200, 3)], today()).await,
            Err(PrescriptionError::InsufficientStock { medicine_id: 200, requested: 3, available: 1 })
        );
        assert_eq!(store.get_batch(1).await.unwrap().unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn disposal_accepts_active_and_expired_once() {
        let (state, store) = TestConfig::default().to_state();
        let mut expired = Fixtures::batch(2, 100, 3, today() - Duration::days(3));
        expired.status = BatchStatus::Expired;
        store.seed_batch(Fixtures::batch(1, 100, 5, today() + Duration::days(30))).await;
        store.seed_batch(expired).await;

        let service = InventoryService::new(&state);
        assert_eq!(service.dispose_batch(1).await.unwrap().status, BatchStatus::Disposed);
        assert_eq!(service.dispose_batch(2).await.unwrap().status, BatchStatus::Disposed);
        assert_matches!(
            service.dispose_batch(2).await,
            Err(PrescriptionError::BatchNotDisposable(BatchStatus::Disposed))
        );
        assert_matches!(service.dispose_batch(99).await, Err(PrescriptionError::BatchNotFound));
    }
}
