use sqlx::Executor;

use scoutpoints_core::ports::StoreError;

use crate::connection::DbPool;
use crate::repositories::backend_error;

const SEED_OFFER_IDS: &[&str] = &["off-cinema-2for1", "off-outdoor-15off"];

const SEED_MEMBER_IDS: &[&str] =
    &["mbr-eagle-ana", "mbr-eagle-bo", "mbr-eagle-cleo", "mbr-eagle-dan", "mbr-wolf-eli"];

const SEED_REQUEST_ID: &str = "red-demo-001";

/// Deterministic demo dataset: a catalog with two offers, one troop holding
/// a spendable pool, and a redemption already waiting for approvals.
pub struct DemoSeedDataset;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub offers_seeded: usize,
    pub members_seeded: usize,
    pub requests_seeded: usize,
}

#[derive(Clone, Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset. Re-running replaces the seeded rows in place.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, StoreError> {
        let mut tx = pool.begin().await.map_err(backend_error)?;
        tx.execute(sqlx::query(Self::SQL)).await.map_err(backend_error)?;
        tx.commit().await.map_err(backend_error)?;

        Ok(SeedResult {
            offers_seeded: SEED_OFFER_IDS.len(),
            members_seeded: SEED_MEMBER_IDS.len(),
            requests_seeded: 1,
        })
    }

    /// Verify that the seeded rows exist and still match the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, StoreError> {
        let mut checks = Vec::new();

        for offer_id in SEED_OFFER_IDS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM offer WHERE id = ?1 AND is_active = 1)",
            )
            .bind(offer_id)
            .fetch_one(pool)
            .await
            .map_err(backend_error)?;
            checks.push((*offer_id, present == 1));
        }

        let member_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM member_balance WHERE group_id = 'grp-eagle'")
                .fetch_one(pool)
                .await
                .map_err(backend_error)?;
        checks.push(("grp-eagle-members", member_count == 4));

        let pending_request: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM redemption_request
             WHERE id = ?1 AND status = 'pending_approval')",
        )
        .bind(SEED_REQUEST_ID)
        .fetch_one(pool)
        .await
        .map_err(backend_error)?;
        checks.push(("pending-demo-request", pending_request == 1));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}
