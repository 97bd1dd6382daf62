use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::member::GroupId;
use crate::domain::offer::OfferId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RedemptionId(pub String);

impl fmt::Display for RedemptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    PendingApproval,
    Active,
    Rejected,
    Used,
    Expired,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending_approval" => Some(Self::PendingApproval),
            "active" => Some(Self::Active),
            "rejected" => Some(Self::Rejected),
            "used" => Some(Self::Used),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single approver's vote. Approvals have no identity of their own; they
/// live and die with their request and are always read and written together
/// with the parent status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approver_id: String,
    pub approver_name: String,
    pub approved_at: DateTime<Utc>,
}

/// A request to spend part of the group's points pool on an offer.
///
/// `points_spent` snapshots the offer cost at creation time; later catalog
/// edits do not change what an in-flight request will charge.
/// `state_version` is the optimistic-concurrency token: every persisted
/// transition bumps it, and stores only apply a write when the caller saw
/// the current version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub id: RedemptionId,
    pub offer_id: OfferId,
    pub group_id: GroupId,
    pub requested_by: String,
    pub requester_name: String,
    pub points_spent: u64,
    pub status: RedemptionStatus,
    pub approvals: Vec<Approval>,
    pub required_approvals: u32,
    pub code: Option<String>,
    pub rejection_reason: Option<String>,
    pub state_version: u32,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RedemptionRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: RedemptionId,
        offer_id: OfferId,
        group_id: GroupId,
        requested_by: String,
        requester_name: String,
        points_spent: u64,
        required_approvals: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            offer_id,
            group_id,
            requested_by,
            requester_name,
            points_spent,
            status: RedemptionStatus::PendingApproval,
            approvals: Vec::new(),
            required_approvals,
            code: None,
            rejection_reason: None,
            state_version: 1,
            created_at,
            approved_at: None,
            expires_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RedemptionStatus::PendingApproval
    }

    pub fn has_approval_from(&self, approver_id: &str) -> bool {
        self.approvals.iter().any(|approval| approval.approver_id == approver_id)
    }

    /// Appends an approval vote. A repeat vote from the same approver fails
    /// the action; it is never silently deduplicated.
    pub fn record_approval(&mut self, approval: Approval) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::RequestNotPending {
                request_id: self.id.clone(),
                status: self.status,
            });
        }
        if self.has_approval_from(&approval.approver_id) {
            return Err(DomainError::AlreadyApproved {
                request_id: self.id.clone(),
                approver_id: approval.approver_id,
            });
        }

        self.approvals.push(approval);
        Ok(())
    }

    pub fn quorum_reached(&self) -> bool {
        self.approvals.len() as u32 >= self.required_approvals
    }

    pub fn activate(
        &mut self,
        code: String,
        approved_at: DateTime<Utc>,
        validity_days: u32,
    ) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::RequestNotPending {
                request_id: self.id.clone(),
                status: self.status,
            });
        }

        self.status = RedemptionStatus::Active;
        self.code = Some(code);
        self.approved_at = Some(approved_at);
        self.expires_at = Some(approved_at + Duration::days(i64::from(validity_days)));
        Ok(())
    }

    pub fn reject(&mut self, reason: Option<String>) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::RequestNotPending {
                request_id: self.id.clone(),
                status: self.status,
            });
        }

        self.status = RedemptionStatus::Rejected;
        self.rejection_reason = reason;
        Ok(())
    }

    pub fn mark_used(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        let effective = self.effective_status(now);
        if effective != RedemptionStatus::Active {
            return Err(DomainError::RequestNotActive {
                request_id: self.id.clone(),
                status: effective,
            });
        }

        self.status = RedemptionStatus::Used;
        Ok(())
    }

    /// Stored status alone does not answer "is this still usable": there is
    /// no background job flipping codes to expired, so readers compare
    /// `expires_at` against the current time instead.
    pub fn effective_status(&self, now: DateTime<Utc>) -> RedemptionStatus {
        match (self.status, self.expires_at) {
            (RedemptionStatus::Active, Some(expires_at)) if expires_at <= now => {
                RedemptionStatus::Expired
            }
            (status, _) => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::member::GroupId;
    use crate::domain::offer::OfferId;
    use crate::errors::DomainError;

    use super::{Approval, RedemptionId, RedemptionRequest, RedemptionStatus};

    fn request(required_approvals: u32) -> RedemptionRequest {
        RedemptionRequest::new(
            RedemptionId("red-1".to_string()),
            OfferId("off-cinema".to_string()),
            GroupId("grp-eagle".to_string()),
            "member-7".to_string(),
            "Robin".to_string(),
            120,
            required_approvals,
            Utc::now(),
        )
    }

    fn approval(approver_id: &str) -> Approval {
        Approval {
            approver_id: approver_id.to_string(),
            approver_name: approver_id.to_uppercase(),
            approved_at: Utc::now(),
        }
    }

    #[test]
    fn new_request_starts_pending_with_no_approvals() {
        let request = request(3);
        assert!(request.is_pending());
        assert!(request.approvals.is_empty());
        assert_eq!(request.state_version, 1);
        assert!(request.code.is_none());
    }

    #[test]
    fn approvals_accumulate_in_arrival_order() {
        let mut request = request(3);
        request.record_approval(approval("anim-1")).expect("first vote");
        request.record_approval(approval("anim-2")).expect("second vote");

        let order: Vec<&str> =
            request.approvals.iter().map(|a| a.approver_id.as_str()).collect();
        assert_eq!(order, vec!["anim-1", "anim-2"]);
        assert!(!request.quorum_reached());
    }

    #[test]
    fn repeat_vote_from_same_approver_fails_without_dedupe() {
        let mut request = request(3);
        request.record_approval(approval("anim-1")).expect("first vote");

        let error = request.record_approval(approval("anim-1")).expect_err("repeat vote");
        assert!(matches!(error, DomainError::AlreadyApproved { .. }));
        assert_eq!(request.approvals.len(), 1);
    }

    #[test]
    fn quorum_is_reached_exactly_at_required_approvals() {
        let mut request = request(2);
        request.record_approval(approval("anim-1")).expect("first vote");
        assert!(!request.quorum_reached());
        request.record_approval(approval("anim-2")).expect("second vote");
        assert!(request.quorum_reached());
    }

    #[test]
    fn activation_sets_code_and_expiry_window() {
        let mut request = request(1);
        let approved_at = Utc::now();
        request.activate("XK7P2M".to_string(), approved_at, 30).expect("activate");

        assert_eq!(request.status, RedemptionStatus::Active);
        assert_eq!(request.code.as_deref(), Some("XK7P2M"));
        assert_eq!(request.expires_at, Some(approved_at + Duration::days(30)));
    }

    #[test]
    fn rejection_is_terminal_for_further_votes() {
        let mut request = request(3);
        request.reject(Some("not this month".to_string())).expect("reject");

        let error = request.record_approval(approval("anim-1")).expect_err("vote after reject");
        assert!(matches!(error, DomainError::RequestNotPending { .. }));
        assert_eq!(request.rejection_reason.as_deref(), Some("not this month"));
    }

    #[test]
    fn activate_refuses_non_pending_request() {
        let mut request = request(1);
        request.reject(None).expect("reject");

        let error =
            request.activate("XK7P2M".to_string(), Utc::now(), 30).expect_err("activate rejected");
        assert!(matches!(error, DomainError::RequestNotPending { .. }));
    }

    #[test]
    fn effective_status_reports_expiry_lazily() {
        let mut request = request(1);
        let approved_at = Utc::now() - Duration::days(31);
        request.activate("XK7P2M".to_string(), approved_at, 30).expect("activate");

        assert_eq!(request.status, RedemptionStatus::Active);
        assert_eq!(request.effective_status(Utc::now()), RedemptionStatus::Expired);
    }

    #[test]
    fn effective_status_keeps_active_inside_the_window() {
        let mut request = request(1);
        request.activate("XK7P2M".to_string(), Utc::now(), 30).expect("activate");
        assert_eq!(request.effective_status(Utc::now()), RedemptionStatus::Active);
    }

    #[test]
    fn mark_used_consumes_an_active_code() {
        let mut request = request(1);
        request.activate("XK7P2M".to_string(), Utc::now(), 30).expect("activate");
        request.mark_used(Utc::now()).expect("mark used");

        assert_eq!(request.status, RedemptionStatus::Used);
        assert_eq!(request.code.as_deref(), Some("XK7P2M"));
    }

    #[test]
    fn mark_used_refuses_expired_codes() {
        let mut request = request(1);
        request
            .activate("XK7P2M".to_string(), Utc::now() - Duration::days(31), 30)
            .expect("activate");

        let error = request.mark_used(Utc::now()).expect_err("use expired code");
        assert!(matches!(
            error,
            DomainError::RequestNotActive { status: RedemptionStatus::Expired, .. }
        ));
    }

    #[test]
    fn mark_used_refuses_pending_requests() {
        let mut request = request(3);
        let error = request.mark_used(Utc::now()).expect_err("use pending request");
        assert!(matches!(
            error,
            DomainError::RequestNotActive { status: RedemptionStatus::PendingApproval, .. }
        ));
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            RedemptionStatus::PendingApproval,
            RedemptionStatus::Active,
            RedemptionStatus::Rejected,
            RedemptionStatus::Used,
            RedemptionStatus::Expired,
        ] {
            assert_eq!(RedemptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RedemptionStatus::parse("cancelled"), None);
    }
}
