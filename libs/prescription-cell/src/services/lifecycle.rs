use tracing::warn;

use shared_models::prescription::PrescriptionStatus;

use crate::models::PrescriptionError;

pub struct PrescriptionLifecycleService;

impl Default for PrescriptionLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl PrescriptionLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: PrescriptionStatus,
        new_status: PrescriptionStatus,
    ) -> Result<(), PrescriptionError> {
        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid prescription transition attempted: {} -> {}", current_status, new_status);
            return Err(PrescriptionError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: PrescriptionStatus) -> Vec<PrescriptionStatus> {
        match current_status {
            PrescriptionStatus::PendingPrepare => vec![
                PrescriptionStatus::WaitingPayment,
                PrescriptionStatus::Cancelled,
            ],
            PrescriptionStatus::WaitingPayment => vec![
                PrescriptionStatus::Completed,
                PrescriptionStatus::Cancelled,
            ],
            PrescriptionStatus::Completed | PrescriptionStatus::Cancelled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn preparation_precedes_completion() {
        let lifecycle = PrescriptionLifecycleService::new();
        assert_matches!(
            lifecycle.validate_status_transition(
                PrescriptionStatus::PendingPrepare,
                PrescriptionStatus::Completed
            ),
            Err(PrescriptionError::InvalidStatusTransition { .. })
        );
        assert!(lifecycle
            .validate_status_transition(
                PrescriptionStatus::WaitingPayment,
                PrescriptionStatus::Completed
            )
            .is_ok());
    }

    #[test]
    fn cancellation_only_from_open_states() {
        let lifecycle = PrescriptionLifecycleService::new();
        for status in [PrescriptionStatus::PendingPrepare, PrescriptionStatus::WaitingPayment] {
            assert!(lifecycle
                .validate_status_transition(status, PrescriptionStatus::Cancelled)
                .is_ok());
        }
        for status in [PrescriptionStatus::Completed, PrescriptionStatus::Cancelled] {
            assert!(lifecycle.get_valid_transitions(status).is_empty());
        }
    }
}
