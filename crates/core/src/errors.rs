use thiserror::Error;

use crate::domain::member::GroupId;
use crate::domain::offer::OfferId;
use crate::domain::redemption::{RedemptionId, RedemptionStatus};
use crate::ports::StoreError;

/// Broad classification callers use to decide how to react: validation
/// failures leave state untouched and are safe to retry once corrected,
/// state conflicts mean the caller lost a race and should refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainErrorKind {
    Validation,
    StateConflict,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("offer `{offer_id}` was not found")]
    OfferNotFound { offer_id: OfferId },
    #[error("offer `{offer_id}` is not active")]
    OfferInactive { offer_id: OfferId },
    #[error("group `{group_id}` holds {balance} points but the offer costs {required}")]
    InsufficientBalance { group_id: GroupId, balance: u64, required: u64 },
    #[error("offer `{offer_id}` reached its redemption limit of {max_redemptions}")]
    RedemptionLimitReached { offer_id: OfferId, max_redemptions: u32 },
    #[error("group `{group_id}` already has a pending redemption for offer `{offer_id}`")]
    DuplicatePendingRequest { group_id: GroupId, offer_id: OfferId },
    #[error("redemption request `{request_id}` was not found")]
    RequestNotFound { request_id: RedemptionId },
    #[error("redemption request `{request_id}` is {status}, not pending approval")]
    RequestNotPending { request_id: RedemptionId, status: RedemptionStatus },
    #[error("approver `{approver_id}` already approved redemption request `{request_id}`")]
    AlreadyApproved { request_id: RedemptionId, approver_id: String },
    #[error("redemption request `{request_id}` is {status}, not active")]
    RequestNotActive { request_id: RedemptionId, status: RedemptionStatus },
}

impl DomainError {
    pub fn kind(&self) -> DomainErrorKind {
        match self {
            Self::OfferNotFound { .. }
            | Self::OfferInactive { .. }
            | Self::InsufficientBalance { .. }
            | Self::RedemptionLimitReached { .. }
            | Self::DuplicatePendingRequest { .. }
            | Self::RequestNotFound { .. } => DomainErrorKind::Validation,
            Self::RequestNotPending { .. }
            | Self::AlreadyApproved { .. }
            | Self::RequestNotActive { .. } => DomainErrorKind::StateConflict,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StoreError> for ApplicationError {
    fn from(error: StoreError) -> Self {
        Self::Persistence(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::member::GroupId;
    use crate::domain::offer::OfferId;
    use crate::domain::redemption::{RedemptionId, RedemptionStatus};
    use crate::ports::StoreError;

    use super::{ApplicationError, DomainError, DomainErrorKind};

    #[test]
    fn insufficient_balance_message_names_both_numbers() {
        let error = DomainError::InsufficientBalance {
            group_id: GroupId("grp-eagle".to_string()),
            balance: 80,
            required: 120,
        };

        let message = error.to_string();
        assert!(message.contains("80"));
        assert!(message.contains("120"));
    }

    #[test]
    fn validation_and_conflict_errors_partition_cleanly() {
        let validation = DomainError::OfferInactive { offer_id: OfferId("off-1".to_string()) };
        assert_eq!(validation.kind(), DomainErrorKind::Validation);

        let conflict = DomainError::RequestNotPending {
            request_id: RedemptionId("red-1".to_string()),
            status: RedemptionStatus::Rejected,
        };
        assert_eq!(conflict.kind(), DomainErrorKind::StateConflict);

        let repeat = DomainError::AlreadyApproved {
            request_id: RedemptionId("red-1".to_string()),
            approver_id: "anim-1".to_string(),
        };
        assert_eq!(repeat.kind(), DomainErrorKind::StateConflict);
    }

    #[test]
    fn store_errors_surface_as_persistence_failures() {
        let error = ApplicationError::from(StoreError::Backend("disk full".to_string()));
        assert!(matches!(error, ApplicationError::Persistence(ref message) if message.contains("disk full")));
    }
}
