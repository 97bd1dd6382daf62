use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use scoutpoints_core::domain::member::{GroupId, MemberBalance, MemberId};
use scoutpoints_core::ports::{MemberBalanceStore, StoreError};

use super::{backend_error, parse_u64};
use crate::DbPool;

pub struct SqlMemberBalanceStore {
    pool: DbPool,
}

impl SqlMemberBalanceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert used by the seed fixtures; in production the earning
    /// subsystems own these rows.
    pub async fn upsert(&self, balance: MemberBalance) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO member_balance (member_id, group_id, points, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(member_id) DO UPDATE SET
                 group_id = excluded.group_id,
                 points = excluded.points,
                 updated_at = excluded.updated_at",
        )
        .bind(&balance.member_id.0)
        .bind(&balance.group_id.0)
        .bind(balance.points as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }
}

fn row_to_balance(row: &SqliteRow) -> Result<MemberBalance, StoreError> {
    Ok(MemberBalance {
        member_id: MemberId(row.try_get("member_id").map_err(backend_error)?),
        group_id: GroupId(row.try_get("group_id").map_err(backend_error)?),
        points: parse_u64("points", row.try_get("points").map_err(backend_error)?)?,
    })
}

#[async_trait::async_trait]
impl MemberBalanceStore for SqlMemberBalanceStore {
    async fn get_balances(&self, group_id: &GroupId) -> Result<Vec<MemberBalance>, StoreError> {
        let rows = sqlx::query(
            "SELECT member_id, group_id, points
             FROM member_balance
             WHERE group_id = ?
             ORDER BY member_id ASC",
        )
        .bind(&group_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        rows.iter().map(row_to_balance).collect()
    }

    async fn adjust_balance(&self, member_id: &MemberId, delta: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE member_balance
             SET points = MAX(0, points + ?), updated_at = ?
             WHERE member_id = ?",
        )
        .bind(delta)
        .bind(Utc::now().to_rfc3339())
        .bind(&member_id.0)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "member `{member_id}` missing during balance adjustment"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use scoutpoints_core::domain::member::{GroupId, MemberBalance, MemberId};
    use scoutpoints_core::ports::{MemberBalanceStore, StoreError};

    use super::SqlMemberBalanceStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn balance(member: &str, group: &str, points: u64) -> MemberBalance {
        MemberBalance {
            member_id: MemberId(member.to_string()),
            group_id: GroupId(group.to_string()),
            points,
        }
    }

    #[tokio::test]
    async fn balances_are_grouped_and_ordered_by_member() {
        let store = SqlMemberBalanceStore::new(setup().await);
        store.upsert(balance("m-2", "grp-eagle", 50)).await.expect("upsert m-2");
        store.upsert(balance("m-1", "grp-eagle", 100)).await.expect("upsert m-1");
        store.upsert(balance("m-9", "grp-wolf", 70)).await.expect("upsert m-9");

        let balances =
            store.get_balances(&GroupId("grp-eagle".to_string())).await.expect("get");
        let members: Vec<&str> =
            balances.iter().map(|balance| balance.member_id.0.as_str()).collect();
        assert_eq!(members, vec!["m-1", "m-2"]);
    }

    #[tokio::test]
    async fn empty_groups_read_as_no_rows() {
        let store = SqlMemberBalanceStore::new(setup().await);
        let balances =
            store.get_balances(&GroupId("grp-empty".to_string())).await.expect("get");
        assert!(balances.is_empty());
    }

    #[tokio::test]
    async fn debits_clamp_at_zero_and_credits_accumulate() {
        let store = SqlMemberBalanceStore::new(setup().await);
        store.upsert(balance("m-1", "grp-eagle", 5)).await.expect("upsert");

        store.adjust_balance(&MemberId("m-1".to_string()), -10).await.expect("debit");
        let after_debit =
            store.get_balances(&GroupId("grp-eagle".to_string())).await.expect("get");
        assert_eq!(after_debit[0].points, 0);

        store.adjust_balance(&MemberId("m-1".to_string()), 40).await.expect("credit");
        let after_credit =
            store.get_balances(&GroupId("grp-eagle".to_string())).await.expect("get");
        assert_eq!(after_credit[0].points, 40);
    }

    #[tokio::test]
    async fn adjusting_an_unknown_member_fails() {
        let store = SqlMemberBalanceStore::new(setup().await);
        let error = store
            .adjust_balance(&MemberId("m-ghost".to_string()), -10)
            .await
            .expect_err("unknown member");
        assert!(matches!(error, StoreError::Backend(_)));
    }
}
