use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{error, info, instrument};

use shared_config::{ClinicHours, ClinicPolicy};
use shared_database::store::{InventoryStore, PrescriptionStore};
use shared_database::ClinicStore;
use shared_models::prescription::PrescriptionKind;
use shared_utils::AppState;

use crate::models::SweepReport;

pub const STALE_PRESCRIPTION_REASON: &str = "Not prepared within the allowed time";

/// Daily housekeeping run at clinic-local midnight: expires lapsed batches and
/// cancels prescriptions nobody started preparing. Both steps are idempotent
/// bulk updates and run independently of each other.
pub struct ExpirySweeper {
    store: Arc<dyn ClinicStore>,
    hours: ClinicHours,
    policy: ClinicPolicy,
}

impl ExpirySweeper {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            hours: state.config.clinic.clone(),
            policy: state.config.policy.clone(),
        }
    }

    /// First clinic-local midnight strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tomorrow = self.hours.local_date(now) + Duration::days(1);
        self.hours.to_utc(tomorrow, NaiveTime::MIN)
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let today = self.hours.local_date(now);

        match self.store.expire_batches(today).await {
            Ok(count) => report.expired_batches = count,
            Err(e) => {
                error!("Batch expiry sweep failed: {}", e);
                report.failures.push(format!("batches: {}", e));
            }
        }

        let cutoff = now - Duration::days(self.policy.prescription_grace_days);
        for kind in PrescriptionKind::ALL {
            match self
                .store
                .cancel_stale_prescriptions(kind, cutoff, STALE_PRESCRIPTION_REASON, now)
                .await
            {
                Ok(count) => match kind {
                    PrescriptionKind::Appointment => report.cancelled_prescriptions = count,
                    PrescriptionKind::Retail => report.cancelled_retail_prescriptions = count,
                },
                Err(e) => {
                    error!("Stale {} sweep failed: {}", kind, e);
                    report.failures.push(format!("{}: {}", kind, e));
                }
            }
        }

        info!(
            "Expiry sweep done: {} batches expired, {} prescriptions and {} retail prescriptions cancelled",
            report.expired_batches, report.cancelled_prescriptions, report.cancelled_retail_prescriptions
        );
        report
    }

    /// Sweeps once immediately, then at every clinic-local midnight. Never
    /// returns; failures are logged by `run_once`.
    pub async fn run(self) {
        self.run_once(Utc::now()).await;

        loop {
            let now = Utc::now();
            let wait = (self.next_run_after(now) - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(60));
            tokio::time::sleep(wait).await;
            self.run_once(Utc::now()).await;
        }
    }
}
