use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use scoutpoints_core::domain::member::GroupId;
use scoutpoints_core::domain::offer::OfferId;
use scoutpoints_core::domain::redemption::{
    Approval, RedemptionId, RedemptionRequest, RedemptionStatus,
};
use scoutpoints_core::ports::{RedemptionStore, StoreError};

use super::{backend_error, parse_optional_timestamp, parse_timestamp, parse_u32, parse_u64};
use crate::DbPool;

pub struct SqlRedemptionStore {
    pool: DbPool,
}

impl SqlRedemptionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const REQUEST_COLUMNS: &str = "id, offer_id, group_id, requested_by, requester_name, \
     points_spent, status, approvals_json, required_approvals, code, rejection_reason, \
     state_version, created_at, approved_at, expires_at";

fn row_to_request(row: &SqliteRow) -> Result<RedemptionRequest, StoreError> {
    let status_raw: String = row.try_get("status").map_err(backend_error)?;
    let status = RedemptionStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown redemption status `{status_raw}`")))?;

    let approvals_raw: String = row.try_get("approvals_json").map_err(backend_error)?;
    let approvals: Vec<Approval> = serde_json::from_str(&approvals_raw).map_err(|error| {
        StoreError::Decode(format!("invalid approvals payload: {error}"))
    })?;

    Ok(RedemptionRequest {
        id: RedemptionId(row.try_get("id").map_err(backend_error)?),
        offer_id: OfferId(row.try_get("offer_id").map_err(backend_error)?),
        group_id: GroupId(row.try_get("group_id").map_err(backend_error)?),
        requested_by: row.try_get("requested_by").map_err(backend_error)?,
        requester_name: row.try_get("requester_name").map_err(backend_error)?,
        points_spent: parse_u64(
            "points_spent",
            row.try_get("points_spent").map_err(backend_error)?,
        )?,
        status,
        approvals,
        required_approvals: parse_u32(
            "required_approvals",
            row.try_get("required_approvals").map_err(backend_error)?,
        )?,
        code: row.try_get("code").map_err(backend_error)?,
        rejection_reason: row.try_get("rejection_reason").map_err(backend_error)?,
        state_version: parse_u32(
            "state_version",
            row.try_get("state_version").map_err(backend_error)?,
        )?,
        created_at: parse_timestamp("created_at", row.try_get("created_at").map_err(backend_error)?)?,
        approved_at: parse_optional_timestamp(
            "approved_at",
            row.try_get("approved_at").map_err(backend_error)?,
        )?,
        expires_at: parse_optional_timestamp(
            "expires_at",
            row.try_get("expires_at").map_err(backend_error)?,
        )?,
    })
}

fn approvals_json(approvals: &[Approval]) -> Result<String, StoreError> {
    serde_json::to_string(approvals)
        .map_err(|error| StoreError::Decode(format!("unserializable approvals: {error}")))
}

#[async_trait::async_trait]
impl RedemptionStore for SqlRedemptionStore {
    async fn find_by_id(
        &self,
        id: &RedemptionId,
    ) -> Result<Option<RedemptionRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM redemption_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, request: RedemptionRequest) -> Result<(), StoreError> {
        let approvals = approvals_json(&request.approvals)?;

        let result = sqlx::query(
            "INSERT INTO redemption_request (id, offer_id, group_id, requested_by,
                 requester_name, points_spent, status, approvals_json, required_approvals,
                 code, rejection_reason, state_version, created_at, approved_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.offer_id.0)
        .bind(&request.group_id.0)
        .bind(&request.requested_by)
        .bind(&request.requester_name)
        .bind(request.points_spent as i64)
        .bind(request.status.as_str())
        .bind(&approvals)
        .bind(i64::from(request.required_approvals))
        .bind(request.code.as_deref())
        .bind(request.rejection_reason.as_deref())
        .bind(i64::from(request.state_version))
        .bind(request.created_at.to_rfc3339())
        .bind(request.approved_at.map(|value| value.to_rfc3339()))
        .bind(request.expires_at.map(|value| value.to_rfc3339()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // The partial unique index over pending (group, offer) pairs
            // turns a racing duplicate into a deterministic loser.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict(format!(
                    "group `{}` already has a pending request for offer `{}`",
                    request.group_id, request.offer_id
                )))
            }
            Err(error) => Err(backend_error(error)),
        }
    }

    async fn update_if_version(
        &self,
        request: RedemptionRequest,
        expected_version: u32,
    ) -> Result<bool, StoreError> {
        let approvals = approvals_json(&request.approvals)?;

        // Identity and intake fields never change after insert; the write
        // covers only what a transition may touch, guarded by the version
        // the caller read.
        let result = sqlx::query(
            "UPDATE redemption_request
             SET status = ?, approvals_json = ?, code = ?, rejection_reason = ?,
                 state_version = ?, approved_at = ?, expires_at = ?
             WHERE id = ? AND state_version = ?",
        )
        .bind(request.status.as_str())
        .bind(&approvals)
        .bind(request.code.as_deref())
        .bind(request.rejection_reason.as_deref())
        .bind(i64::from(request.state_version))
        .bind(request.approved_at.map(|value| value.to_rfc3339()))
        .bind(request.expires_at.map(|value| value.to_rfc3339()))
        .bind(&request.id.0)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_pending_for_offer(
        &self,
        group_id: &GroupId,
        offer_id: &OfferId,
    ) -> Result<Option<RedemptionRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM redemption_request
             WHERE group_id = ? AND offer_id = ? AND status = 'pending_approval'"
        ))
        .bind(&group_id.0)
        .bind(&offer_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_group(
        &self,
        group_id: &GroupId,
        status: Option<RedemptionStatus>,
    ) -> Result<Vec<RedemptionRequest>, StoreError> {
        let rows: Vec<SqliteRow> = if let Some(status) = status {
            sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM redemption_request
                 WHERE group_id = ? AND status = ?
                 ORDER BY created_at DESC"
            ))
            .bind(&group_id.0)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?
        } else {
            sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM redemption_request
                 WHERE group_id = ?
                 ORDER BY created_at DESC"
            ))
            .bind(&group_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?
        };

        rows.iter().map(row_to_request).collect()
    }
}
