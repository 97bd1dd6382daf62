//! Collaborator seams for the redemption core.
//!
//! The offer catalog, the member balance store, and the redemption request
//! store are owned by other parts of the system; the engine talks to them
//! through these traits. In-memory implementations back the engine tests
//! and local experimentation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::member::{GroupId, MemberBalance, MemberId};
use crate::domain::offer::{Offer, OfferId};
use crate::domain::redemption::{RedemptionId, RedemptionRequest, RedemptionStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
    #[error("storage conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait OfferCatalog: Send + Sync {
    async fn get_offer(&self, id: &OfferId) -> Result<Option<Offer>, StoreError>;

    /// Bumps the offer's redemption counter by one. Only finalization calls
    /// this.
    async fn increment_redemption_count(&self, id: &OfferId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MemberBalanceStore: Send + Sync {
    async fn get_balances(&self, group_id: &GroupId) -> Result<Vec<MemberBalance>, StoreError>;

    /// Applies `delta` to the member's balance, clamping the result at zero.
    async fn adjust_balance(&self, member_id: &MemberId, delta: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RedemptionStore: Send + Sync {
    async fn find_by_id(&self, id: &RedemptionId)
        -> Result<Option<RedemptionRequest>, StoreError>;

    /// Inserts a new request. Returns `Conflict` when the group already has
    /// a pending request for the same offer, so a racing duplicate loses
    /// deterministically.
    async fn insert(&self, request: RedemptionRequest) -> Result<(), StoreError>;

    /// Version-guarded write: applies `request` only when the stored
    /// `state_version` still equals `expected_version`, returning whether
    /// the write landed. Approvals travel inside the request record, so a
    /// winning write replaces status, votes, and version together.
    async fn update_if_version(
        &self,
        request: RedemptionRequest,
        expected_version: u32,
    ) -> Result<bool, StoreError>;

    async fn find_pending_for_offer(
        &self,
        group_id: &GroupId,
        offer_id: &OfferId,
    ) -> Result<Option<RedemptionRequest>, StoreError>;

    /// Requests for a group, newest first, optionally narrowed to one
    /// status.
    async fn list_by_group(
        &self,
        group_id: &GroupId,
        status: Option<RedemptionStatus>,
    ) -> Result<Vec<RedemptionRequest>, StoreError>;
}

#[async_trait]
impl<T> OfferCatalog for Arc<T>
where
    T: OfferCatalog + ?Sized,
{
    async fn get_offer(&self, id: &OfferId) -> Result<Option<Offer>, StoreError> {
        self.as_ref().get_offer(id).await
    }

    async fn increment_redemption_count(&self, id: &OfferId) -> Result<(), StoreError> {
        self.as_ref().increment_redemption_count(id).await
    }
}

#[async_trait]
impl<T> MemberBalanceStore for Arc<T>
where
    T: MemberBalanceStore + ?Sized,
{
    async fn get_balances(&self, group_id: &GroupId) -> Result<Vec<MemberBalance>, StoreError> {
        self.as_ref().get_balances(group_id).await
    }

    async fn adjust_balance(&self, member_id: &MemberId, delta: i64) -> Result<(), StoreError> {
        self.as_ref().adjust_balance(member_id, delta).await
    }
}

#[async_trait]
impl<T> RedemptionStore for Arc<T>
where
    T: RedemptionStore + ?Sized,
{
    async fn find_by_id(
        &self,
        id: &RedemptionId,
    ) -> Result<Option<RedemptionRequest>, StoreError> {
        self.as_ref().find_by_id(id).await
    }

    async fn insert(&self, request: RedemptionRequest) -> Result<(), StoreError> {
        self.as_ref().insert(request).await
    }

    async fn update_if_version(
        &self,
        request: RedemptionRequest,
        expected_version: u32,
    ) -> Result<bool, StoreError> {
        self.as_ref().update_if_version(request, expected_version).await
    }

    async fn find_pending_for_offer(
        &self,
        group_id: &GroupId,
        offer_id: &OfferId,
    ) -> Result<Option<RedemptionRequest>, StoreError> {
        self.as_ref().find_pending_for_offer(group_id, offer_id).await
    }

    async fn list_by_group(
        &self,
        group_id: &GroupId,
        status: Option<RedemptionStatus>,
    ) -> Result<Vec<RedemptionRequest>, StoreError> {
        self.as_ref().list_by_group(group_id, status).await
    }
}

fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_guard<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
pub struct InMemoryOfferCatalog {
    offers: RwLock<HashMap<String, Offer>>,
}

impl InMemoryOfferCatalog {
    pub fn upsert(&self, offer: Offer) {
        write_guard(&self.offers).insert(offer.id.0.clone(), offer);
    }

    pub fn remove(&self, id: &OfferId) {
        write_guard(&self.offers).remove(&id.0);
    }
}

#[async_trait]
impl OfferCatalog for InMemoryOfferCatalog {
    async fn get_offer(&self, id: &OfferId) -> Result<Option<Offer>, StoreError> {
        Ok(read_guard(&self.offers).get(&id.0).cloned())
    }

    async fn increment_redemption_count(&self, id: &OfferId) -> Result<(), StoreError> {
        let mut offers = write_guard(&self.offers);
        let Some(offer) = offers.get_mut(&id.0) else {
            return Err(StoreError::Backend(format!(
                "offer `{id}` missing during redemption count increment"
            )));
        };
        offer.current_redemptions += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMemberBalanceStore {
    balances: RwLock<HashMap<String, MemberBalance>>,
}

impl InMemoryMemberBalanceStore {
    pub fn upsert(&self, balance: MemberBalance) {
        write_guard(&self.balances).insert(balance.member_id.0.clone(), balance);
    }

    pub fn points_of(&self, member_id: &MemberId) -> Option<u64> {
        read_guard(&self.balances).get(&member_id.0).map(|balance| balance.points)
    }
}

#[async_trait]
impl MemberBalanceStore for InMemoryMemberBalanceStore {
    async fn get_balances(&self, group_id: &GroupId) -> Result<Vec<MemberBalance>, StoreError> {
        let mut balances: Vec<MemberBalance> = read_guard(&self.balances)
            .values()
            .filter(|balance| balance.group_id == *group_id)
            .cloned()
            .collect();
        balances.sort_by(|left, right| left.member_id.0.cmp(&right.member_id.0));
        Ok(balances)
    }

    async fn adjust_balance(&self, member_id: &MemberId, delta: i64) -> Result<(), StoreError> {
        let mut balances = write_guard(&self.balances);
        let Some(balance) = balances.get_mut(&member_id.0) else {
            return Err(StoreError::Backend(format!(
                "member `{member_id}` missing during balance adjustment"
            )));
        };
        balance.points = if delta >= 0 {
            balance.points.saturating_add(delta as u64)
        } else {
            balance.points.saturating_sub(delta.unsigned_abs())
        };
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRedemptionStore {
    requests: RwLock<HashMap<String, RedemptionRequest>>,
}

#[async_trait]
impl RedemptionStore for InMemoryRedemptionStore {
    async fn find_by_id(
        &self,
        id: &RedemptionId,
    ) -> Result<Option<RedemptionRequest>, StoreError> {
        Ok(read_guard(&self.requests).get(&id.0).cloned())
    }

    async fn insert(&self, request: RedemptionRequest) -> Result<(), StoreError> {
        let mut requests = write_guard(&self.requests);
        if requests.contains_key(&request.id.0) {
            return Err(StoreError::Conflict(format!(
                "redemption request `{}` already exists",
                request.id
            )));
        }
        let duplicate_pending = requests.values().any(|existing| {
            existing.is_pending()
                && existing.group_id == request.group_id
                && existing.offer_id == request.offer_id
        });
        if duplicate_pending {
            return Err(StoreError::Conflict(format!(
                "group `{}` already has a pending request for offer `{}`",
                request.group_id, request.offer_id
            )));
        }
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn update_if_version(
        &self,
        request: RedemptionRequest,
        expected_version: u32,
    ) -> Result<bool, StoreError> {
        let mut requests = write_guard(&self.requests);
        match requests.get(&request.id.0) {
            Some(stored) if stored.state_version == expected_version => {
                requests.insert(request.id.0.clone(), request);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_pending_for_offer(
        &self,
        group_id: &GroupId,
        offer_id: &OfferId,
    ) -> Result<Option<RedemptionRequest>, StoreError> {
        Ok(read_guard(&self.requests)
            .values()
            .find(|request| {
                request.is_pending()
                    && request.group_id == *group_id
                    && request.offer_id == *offer_id
            })
            .cloned())
    }

    async fn list_by_group(
        &self,
        group_id: &GroupId,
        status: Option<RedemptionStatus>,
    ) -> Result<Vec<RedemptionRequest>, StoreError> {
        let mut requests: Vec<RedemptionRequest> = read_guard(&self.requests)
            .values()
            .filter(|request| request.group_id == *group_id)
            .filter(|request| status.map_or(true, |wanted| request.status == wanted))
            .cloned()
            .collect();
        requests.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::member::{GroupId, MemberBalance, MemberId};
    use crate::domain::offer::{Offer, OfferId};
    use crate::domain::redemption::{RedemptionId, RedemptionRequest, RedemptionStatus};

    use super::{
        InMemoryMemberBalanceStore, InMemoryOfferCatalog, InMemoryRedemptionStore,
        MemberBalanceStore, OfferCatalog, RedemptionStore, StoreError,
    };

    fn offer(id: &str) -> Offer {
        let now = Utc::now();
        Offer {
            id: OfferId(id.to_string()),
            points_cost: 120,
            validity_days: 30,
            max_redemptions: Some(10),
            current_redemptions: 0,
            min_purchase: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(id: &str, group: &str, offer: &str) -> RedemptionRequest {
        RedemptionRequest::new(
            RedemptionId(id.to_string()),
            OfferId(offer.to_string()),
            GroupId(group.to_string()),
            "member-7".to_string(),
            "Robin".to_string(),
            120,
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn offer_catalog_round_trip_and_counter() {
        let catalog = InMemoryOfferCatalog::default();
        catalog.upsert(offer("off-cinema"));

        catalog
            .increment_redemption_count(&OfferId("off-cinema".to_string()))
            .await
            .expect("increment");

        let found = catalog
            .get_offer(&OfferId("off-cinema".to_string()))
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(found.current_redemptions, 1);

        let missing = catalog
            .increment_redemption_count(&OfferId("off-ghost".to_string()))
            .await
            .expect_err("missing offer");
        assert!(matches!(missing, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn balance_adjustment_clamps_at_zero() {
        let store = InMemoryMemberBalanceStore::default();
        store.upsert(MemberBalance {
            member_id: MemberId("m-1".to_string()),
            group_id: GroupId("grp-eagle".to_string()),
            points: 5,
        });

        store.adjust_balance(&MemberId("m-1".to_string()), -10).await.expect("debit");
        assert_eq!(store.points_of(&MemberId("m-1".to_string())), Some(0));

        store.adjust_balance(&MemberId("m-1".to_string()), 25).await.expect("credit");
        assert_eq!(store.points_of(&MemberId("m-1".to_string())), Some(25));
    }

    #[tokio::test]
    async fn duplicate_pending_insert_is_a_conflict() {
        let store = InMemoryRedemptionStore::default();
        store.insert(request("red-1", "grp-eagle", "off-cinema")).await.expect("first insert");

        let error = store
            .insert(request("red-2", "grp-eagle", "off-cinema"))
            .await
            .expect_err("duplicate pending");
        assert!(matches!(error, StoreError::Conflict(_)));

        // A different offer for the same group is fine.
        store.insert(request("red-3", "grp-eagle", "off-zoo")).await.expect("other offer");
    }

    #[tokio::test]
    async fn version_guard_rejects_stale_writers() {
        let store = InMemoryRedemptionStore::default();
        store.insert(request("red-1", "grp-eagle", "off-cinema")).await.expect("insert");

        let mut fresh = store
            .find_by_id(&RedemptionId("red-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        fresh.reject(Some("no budget".to_string())).expect("reject");
        let expected = fresh.state_version;
        fresh.state_version += 1;

        assert!(store.update_if_version(fresh.clone(), expected).await.expect("first write"));
        // A second writer still holding the old version loses.
        assert!(!store.update_if_version(fresh, expected).await.expect("stale write"));
    }

    #[tokio::test]
    async fn listing_filters_by_status_and_orders_newest_first() {
        let store = InMemoryRedemptionStore::default();
        let group = GroupId("grp-eagle".to_string());

        let mut older = request("red-1", "grp-eagle", "off-cinema");
        older.created_at = Utc::now() - Duration::hours(2);
        let mut resolved = request("red-2", "grp-eagle", "off-zoo");
        resolved.created_at = Utc::now() - Duration::hours(1);
        resolved.reject(None).expect("reject");
        let newest = request("red-3", "grp-eagle", "off-museum");

        store.insert(older).await.expect("insert older");
        // Terminal requests bypass the pending-uniqueness scan on insert.
        store.insert(resolved).await.expect("insert resolved");
        store.insert(newest).await.expect("insert newest");

        let pending = store
            .list_by_group(&group, Some(RedemptionStatus::PendingApproval))
            .await
            .expect("pending");
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id.0, "red-3");

        let all = store.list_by_group(&group, None).await.expect("all");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id.0, "red-3");
    }
}
