use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use scoutpoints_core::domain::offer::{Offer, OfferId};
use scoutpoints_core::ports::{OfferCatalog, StoreError};

use super::{backend_error, parse_timestamp, parse_u32, parse_u64};
use crate::DbPool;

pub struct SqlOfferCatalog {
    pool: DbPool,
}

impl SqlOfferCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert used by the seed fixtures and catalog-administration tooling;
    /// the redemption core itself never writes offer terms.
    pub async fn upsert(&self, offer: Offer) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO offer (id, points_cost, validity_days, max_redemptions,
                                current_redemptions, min_purchase, is_active,
                                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 points_cost = excluded.points_cost,
                 validity_days = excluded.validity_days,
                 max_redemptions = excluded.max_redemptions,
                 current_redemptions = excluded.current_redemptions,
                 min_purchase = excluded.min_purchase,
                 is_active = excluded.is_active,
                 updated_at = excluded.updated_at",
        )
        .bind(&offer.id.0)
        .bind(offer.points_cost as i64)
        .bind(i64::from(offer.validity_days))
        .bind(offer.max_redemptions.map(i64::from))
        .bind(i64::from(offer.current_redemptions))
        .bind(offer.min_purchase.map(|value| value as i64))
        .bind(offer.is_active)
        .bind(offer.created_at.to_rfc3339())
        .bind(offer.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }
}

fn row_to_offer(row: &SqliteRow) -> Result<Offer, StoreError> {
    Ok(Offer {
        id: OfferId(row.try_get("id").map_err(backend_error)?),
        points_cost: parse_u64("points_cost", row.try_get("points_cost").map_err(backend_error)?)?,
        validity_days: parse_u32(
            "validity_days",
            row.try_get("validity_days").map_err(backend_error)?,
        )?,
        max_redemptions: row
            .try_get::<Option<i64>, _>("max_redemptions")
            .map_err(backend_error)?
            .map(|value| parse_u32("max_redemptions", value))
            .transpose()?,
        current_redemptions: parse_u32(
            "current_redemptions",
            row.try_get("current_redemptions").map_err(backend_error)?,
        )?,
        min_purchase: row
            .try_get::<Option<i64>, _>("min_purchase")
            .map_err(backend_error)?
            .map(|value| parse_u64("min_purchase", value))
            .transpose()?,
        is_active: row.try_get("is_active").map_err(backend_error)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at").map_err(backend_error)?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at").map_err(backend_error)?)?,
    })
}

#[async_trait::async_trait]
impl OfferCatalog for SqlOfferCatalog {
    async fn get_offer(&self, id: &OfferId) -> Result<Option<Offer>, StoreError> {
        let row = sqlx::query(
            "SELECT id, points_cost, validity_days, max_redemptions, current_redemptions,
                    min_purchase, is_active, created_at, updated_at
             FROM offer WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_offer(row)?)),
            None => Ok(None),
        }
    }

    async fn increment_redemption_count(&self, id: &OfferId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE offer
             SET current_redemptions = current_redemptions + 1, updated_at = ?
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "offer `{id}` missing during redemption count increment"
            )));
        }

        Ok(())
    }
}
