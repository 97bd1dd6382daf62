//! Redemption workflow engine: request intake, the approval quorum, and the
//! finalization that issues a code and debits the group's points pool.
//!
//! Approvers act concurrently with no shared session, so every transition is
//! a version-guarded write against the authoritative stored record. The
//! quorum-completing approval computes its outcome first and then performs a
//! single compare-and-swap carrying both the new vote and the terminal
//! status; exactly one caller ever wins that write.

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codes::CodeGenerator;
use crate::config::RedemptionConfig;
use crate::debit::{plan_proportional_debit, DebitPlan, MemberDebit};
use crate::domain::member::{group_balance, GroupId};
use crate::domain::offer::{Offer, OfferId};
use crate::domain::redemption::{
    Approval, RedemptionId, RedemptionRequest, RedemptionStatus,
};
use crate::errors::{ApplicationError, DomainError};
use crate::ports::{MemberBalanceStore, OfferCatalog, RedemptionStore, StoreError};

/// Rejection reason recorded when the authoritative balance check fails at
/// quorum time.
pub const INSUFFICIENT_BALANCE_AT_APPROVAL: &str = "Insufficient balance at approval time";

/// Rejection reason recorded when the offer's redemption cap filled up while
/// the request was waiting for approvals.
pub const REDEMPTION_LIMIT_AT_APPROVAL: &str = "Offer redemption limit reached at approval time";

/// Version-guarded writes re-read and retry this many times before the
/// engine reports the request as too contended.
const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedemptionPolicy {
    pub required_approvals: u32,
}

impl Default for RedemptionPolicy {
    fn default() -> Self {
        Self { required_approvals: 3 }
    }
}

impl From<&RedemptionConfig> for RedemptionPolicy {
    fn from(config: &RedemptionConfig) -> Self {
        Self { required_approvals: config.required_approvals }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionRequestInput {
    pub offer_id: OfferId,
    pub group_id: GroupId,
    pub requested_by: String,
    pub requester_name: String,
}

/// What an approval call achieved: `finalized` distinguishes "vote recorded,
/// still waiting" from "this vote completed the quorum". A finalized outcome
/// without a code means the quorum completed but finalization rejected the
/// request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub finalized: bool,
    pub code: Option<String>,
    pub request: RedemptionRequest,
}

enum FinalizationOutcome {
    Rejected,
    Activated { offer: Offer, plan: DebitPlan },
}

pub struct RedemptionEngine<C, B, S, G> {
    catalog: C,
    balances: B,
    store: S,
    codes: G,
    policy: RedemptionPolicy,
}

impl<C, B, S, G> RedemptionEngine<C, B, S, G>
where
    C: OfferCatalog,
    B: MemberBalanceStore,
    S: RedemptionStore,
    G: CodeGenerator,
{
    pub fn new(catalog: C, balances: B, store: S, codes: G, policy: RedemptionPolicy) -> Self {
        Self { catalog, balances, store, codes, policy }
    }

    /// Current spendable balance of the group: the sum of member balances at
    /// the time of the read. Never cached.
    pub async fn group_balance(&self, group_id: &GroupId) -> Result<u64, ApplicationError> {
        let balances = self.balances.get_balances(group_id).await?;
        Ok(group_balance(&balances))
    }

    /// Opens a redemption request against an offer. The balance check here
    /// is advisory; the binding check runs again when the quorum completes.
    pub async fn request_redemption(
        &self,
        input: RedemptionRequestInput,
    ) -> Result<RedemptionRequest, ApplicationError> {
        let offer = self
            .catalog
            .get_offer(&input.offer_id)
            .await?
            .ok_or_else(|| DomainError::OfferNotFound { offer_id: input.offer_id.clone() })?;

        if !offer.is_active {
            return Err(DomainError::OfferInactive { offer_id: input.offer_id }.into());
        }

        let balance = self.group_balance(&input.group_id).await?;
        if balance < offer.points_cost {
            return Err(DomainError::InsufficientBalance {
                group_id: input.group_id,
                balance,
                required: offer.points_cost,
            }
            .into());
        }

        if let Some(max_redemptions) = offer.max_redemptions {
            if offer.current_redemptions >= max_redemptions {
                return Err(DomainError::RedemptionLimitReached {
                    offer_id: input.offer_id,
                    max_redemptions,
                }
                .into());
            }
        }

        if self
            .store
            .find_pending_for_offer(&input.group_id, &input.offer_id)
            .await?
            .is_some()
        {
            return Err(DomainError::DuplicatePendingRequest {
                group_id: input.group_id,
                offer_id: input.offer_id,
            }
            .into());
        }

        let request = RedemptionRequest::new(
            RedemptionId(Uuid::new_v4().to_string()),
            input.offer_id,
            input.group_id,
            input.requested_by,
            input.requester_name,
            offer.points_cost,
            self.policy.required_approvals,
            Utc::now(),
        );

        match self.store.insert(request.clone()).await {
            Ok(()) => {}
            // A racing request slipped past the pre-check; the store's
            // pending-uniqueness guard caught it.
            Err(StoreError::Conflict(_)) => {
                return Err(DomainError::DuplicatePendingRequest {
                    group_id: request.group_id,
                    offer_id: request.offer_id,
                }
                .into());
            }
            Err(error) => return Err(error.into()),
        }

        info!(
            request_id = %request.id,
            offer_id = %request.offer_id,
            group_id = %request.group_id,
            points = request.points_spent,
            "redemption requested"
        );
        Ok(request)
    }

    /// Records one approver's vote. The vote that completes the quorum also
    /// runs finalization before returning.
    pub async fn approve(
        &self,
        request_id: &RedemptionId,
        approver_id: &str,
        approver_name: &str,
    ) -> Result<ApprovalOutcome, ApplicationError> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let stored = self
                .store
                .find_by_id(request_id)
                .await?
                .ok_or_else(|| DomainError::RequestNotFound { request_id: request_id.clone() })?;

            // Guards run against the freshly read record on every attempt,
            // so a caller that lost the version race gets the state-conflict
            // error instead of a double apply.
            let expected_version = stored.state_version;
            let mut updated = stored;
            let now = Utc::now();
            updated.record_approval(Approval {
                approver_id: approver_id.to_string(),
                approver_name: approver_name.to_string(),
                approved_at: now,
            })?;

            let finalization = if updated.quorum_reached() {
                Some(self.prepare_finalization(&mut updated).await?)
            } else {
                None
            };

            updated.state_version += 1;
            if !self.store.update_if_version(updated.clone(), expected_version).await? {
                debug!(request_id = %request_id, attempt, "contended approval write, re-reading");
                continue;
            }

            return match finalization {
                None => {
                    debug!(
                        request_id = %updated.id,
                        approvals = updated.approvals.len(),
                        required = updated.required_approvals,
                        "approval recorded, quorum not yet reached"
                    );
                    Ok(ApprovalOutcome { finalized: false, code: None, request: updated })
                }
                Some(FinalizationOutcome::Rejected) => {
                    warn!(
                        request_id = %updated.id,
                        reason = updated.rejection_reason.as_deref().unwrap_or(""),
                        "quorum completed but finalization rejected the request"
                    );
                    Ok(ApprovalOutcome { finalized: true, code: None, request: updated })
                }
                Some(FinalizationOutcome::Activated { offer, plan }) => {
                    self.apply_activation_effects(&updated, &offer, &plan).await?;
                    info!(
                        request_id = %updated.id,
                        offer_id = %offer.id,
                        debited = plan.total(),
                        "redemption finalized"
                    );
                    Ok(ApprovalOutcome {
                        finalized: true,
                        code: updated.code.clone(),
                        request: updated,
                    })
                }
            };
        }

        Err(ApplicationError::Persistence(format!(
            "gave up on redemption request `{request_id}` after {MAX_WRITE_ATTEMPTS} contended write attempts"
        )))
    }

    /// Any single approver may veto a pending request; blocking a spend
    /// needs no quorum.
    pub async fn reject(
        &self,
        request_id: &RedemptionId,
        approver_id: &str,
        reason: Option<String>,
    ) -> Result<RedemptionRequest, ApplicationError> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let stored = self
                .store
                .find_by_id(request_id)
                .await?
                .ok_or_else(|| DomainError::RequestNotFound { request_id: request_id.clone() })?;

            let expected_version = stored.state_version;
            let mut updated = stored;
            updated.reject(reason.clone())?;
            updated.state_version += 1;

            if self.store.update_if_version(updated.clone(), expected_version).await? {
                info!(request_id = %updated.id, approver_id, "redemption rejected");
                return Ok(updated);
            }
            debug!(request_id = %request_id, attempt, "contended rejection write, re-reading");
        }

        Err(ApplicationError::Persistence(format!(
            "gave up on redemption request `{request_id}` after {MAX_WRITE_ATTEMPTS} contended write attempts"
        )))
    }

    /// Burns an active code once the partner has honored it.
    pub async fn mark_used(
        &self,
        request_id: &RedemptionId,
    ) -> Result<RedemptionRequest, ApplicationError> {
        for attempt in 0..MAX_WRITE_ATTEMPTS {
            let stored = self
                .store
                .find_by_id(request_id)
                .await?
                .ok_or_else(|| DomainError::RequestNotFound { request_id: request_id.clone() })?;

            let expected_version = stored.state_version;
            let mut updated = stored;
            updated.mark_used(Utc::now())?;
            updated.state_version += 1;

            if self.store.update_if_version(updated.clone(), expected_version).await? {
                info!(request_id = %updated.id, "redemption code marked used");
                return Ok(updated);
            }
            debug!(request_id = %request_id, attempt, "contended mark-used write, re-reading");
        }

        Err(ApplicationError::Persistence(format!(
            "gave up on redemption request `{request_id}` after {MAX_WRITE_ATTEMPTS} contended write attempts"
        )))
    }

    pub async fn list_pending(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<RedemptionRequest>, ApplicationError> {
        self.store
            .list_by_group(group_id, Some(RedemptionStatus::PendingApproval))
            .await
            .map_err(Into::into)
    }

    pub async fn list_history(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<RedemptionRequest>, ApplicationError> {
        self.store.list_by_group(group_id, None).await.map_err(Into::into)
    }

    /// Computes the terminal outcome for a quorum-completing vote without
    /// writing anything. A missing offer fails the whole call closed: the
    /// vote is not recorded and the request stays pending, so the action can
    /// be retried once the catalog is repaired. Insufficient balance or an
    /// exhausted redemption cap instead resolve the request to rejected,
    /// because by then the vote was legitimately cast.
    async fn prepare_finalization(
        &self,
        request: &mut RedemptionRequest,
    ) -> Result<FinalizationOutcome, ApplicationError> {
        let offer = self
            .catalog
            .get_offer(&request.offer_id)
            .await?
            .ok_or_else(|| DomainError::OfferNotFound { offer_id: request.offer_id.clone() })?;

        let balances = self.balances.get_balances(&request.group_id).await?;
        let balance = group_balance(&balances);
        if balance < request.points_spent {
            debug!(
                request_id = %request.id,
                balance,
                required = request.points_spent,
                "authoritative balance check failed at quorum"
            );
            request.reject(Some(INSUFFICIENT_BALANCE_AT_APPROVAL.to_string()))?;
            return Ok(FinalizationOutcome::Rejected);
        }

        if !offer.has_capacity() {
            request.reject(Some(REDEMPTION_LIMIT_AT_APPROVAL.to_string()))?;
            return Ok(FinalizationOutcome::Rejected);
        }

        let code = self.codes.generate();
        let approved_at = Utc::now();
        request.activate(code, approved_at, offer.validity_days)?;

        // Debit shares come from the same balance read as the authoritative
        // check; external credits landing after that read are a known,
        // narrow residual race.
        let plan = plan_proportional_debit(&balances, request.points_spent);
        Ok(FinalizationOutcome::Activated { offer, plan })
    }

    /// Side effects after the activation write has won: bump the offer
    /// counter, then debit each member. A failed debit re-credits the
    /// deductions already applied (best effort) before surfacing the
    /// failure.
    async fn apply_activation_effects(
        &self,
        request: &RedemptionRequest,
        offer: &Offer,
        plan: &DebitPlan,
    ) -> Result<(), ApplicationError> {
        self.catalog.increment_redemption_count(&offer.id).await.map_err(|err| {
            error!(
                request_id = %request.id,
                offer_id = %offer.id,
                %err,
                "redemption activated but the offer counter update failed"
            );
            ApplicationError::Persistence(format!(
                "offer redemption counter update failed: {err}"
            ))
        })?;

        let mut applied: Vec<&MemberDebit> = Vec::with_capacity(plan.deductions.len());
        for debit in &plan.deductions {
            if let Err(err) =
                self.balances.adjust_balance(&debit.member_id, -(debit.amount as i64)).await
            {
                error!(
                    request_id = %request.id,
                    member_id = %debit.member_id,
                    %err,
                    "member debit failed, re-crediting deductions already applied"
                );
                for done in &applied {
                    if let Err(recredit_err) =
                        self.balances.adjust_balance(&done.member_id, done.amount as i64).await
                    {
                        error!(
                            request_id = %request.id,
                            member_id = %done.member_id,
                            %recredit_err,
                            "re-credit failed, manual reconciliation required"
                        );
                    }
                }
                return Err(ApplicationError::Persistence(format!(
                    "debit of {} points from member `{}` failed: {err}",
                    debit.amount, debit.member_id
                )));
            }
            applied.push(debit);
        }

        Ok(())
    }
}
