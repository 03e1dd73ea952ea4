use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use atelier_core::domain::order::{Order, OrderId, OrderStatus};
use atelier_core::domain::snapshot::{
    CalculationSummary, ClientInfo, OrderItemSnapshot, OrderSnapshot, ProjectInfo,
};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

/// SQLite-backed order store. Snapshot history lives in `order_snapshot`
/// rows keyed by `(order_id, version_number)`; the `work_order` row carries
/// the cached current-version fields and is only advanced through a
/// compare-and-swap so concurrent revisions cannot silently lose the
/// current pointer.
pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn order_from_row(
        row: &SqliteRow,
        snapshots: Vec<OrderSnapshot>,
    ) -> Result<Order, RepositoryError> {
        let id: String = row.try_get("id")?;
        let status_raw: String = row.try_get("status")?;
        let current_version: i64 = row.try_get("current_version")?;
        let current_amount_text: String = row.try_get("current_amount")?;
        let client_info_json: String = row.try_get("client_info_json")?;
        let project_info_json: String = row.try_get("project_info_json")?;
        let created_at_text: String = row.try_get("created_at")?;
        let updated_at_text: String = row.try_get("updated_at")?;

        Ok(Order {
            order_no: row.try_get("order_no")?,
            client_info: decode_json(&id, "client_info_json", &client_info_json)?,
            project_info: decode_json(&id, "project_info_json", &project_info_json)?,
            status: parse_status(&id, &status_raw)?,
            current_version: parse_version(&id, current_version)?,
            current_amount: parse_decimal(&id, "current_amount", &current_amount_text)?,
            current_amount_rmb: row.try_get("current_amount_rmb")?,
            snapshots,
            created_at: parse_timestamp(&id, "created_at", &created_at_text)?,
            updated_at: parse_timestamp(&id, "updated_at", &updated_at_text)?,
            id: OrderId(id),
        })
    }

    fn snapshot_from_row(row: &SqliteRow) -> Result<OrderSnapshot, RepositoryError> {
        let order_id: String = row.try_get("order_id")?;
        let version_number: i64 = row.try_get("version_number")?;
        let created_at_text: String = row.try_get("created_at")?;
        let client_info_json: String = row.try_get("client_info_json")?;
        let project_info_json: String = row.try_get("project_info_json")?;
        let items_json: String = row.try_get("items_json")?;
        let total_amount_text: String = row.try_get("total_amount")?;
        let summary_json: String = row.try_get("calculation_summary_json")?;

        let items: Vec<OrderItemSnapshot> = decode_json(&order_id, "items_json", &items_json)?;
        let client_info: ClientInfo =
            decode_json(&order_id, "client_info_json", &client_info_json)?;
        let project_info: ProjectInfo =
            decode_json(&order_id, "project_info_json", &project_info_json)?;
        let calculation_summary: CalculationSummary =
            decode_json(&order_id, "calculation_summary_json", &summary_json)?;

        Ok(OrderSnapshot {
            version_number: parse_version(&order_id, version_number)?,
            created_at: parse_timestamp(&order_id, "snapshot created_at", &created_at_text)?,
            updated_by: row.try_get("updated_by")?,
            client_info,
            project_info,
            items,
            total_amount: parse_decimal(&order_id, "total_amount", &total_amount_text)?,
            total_amount_rmb: row.try_get("total_amount_rmb")?,
            calculation_summary,
        })
    }

    async fn insert_snapshot_row<'c, E>(
        executor: E,
        order_id: &OrderId,
        snapshot: &OrderSnapshot,
    ) -> Result<(), RepositoryError>
    where
        E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
    {
        let snapshot_id = format!("snap-{}", uuid::Uuid::new_v4());
        sqlx::query(
            r#"
            INSERT INTO order_snapshot (
                id, order_id, version_number, created_at, updated_by,
                client_info_json, project_info_json, items_json,
                total_amount, total_amount_rmb, calculation_summary_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot_id)
        .bind(&order_id.0)
        .bind(i64::from(snapshot.version_number))
        .bind(snapshot.created_at.to_rfc3339())
        .bind(&snapshot.updated_by)
        .bind(encode_json(&order_id.0, "client_info", &snapshot.client_info)?)
        .bind(encode_json(&order_id.0, "project_info", &snapshot.project_info)?)
        .bind(encode_json(&order_id.0, "items", &snapshot.items)?)
        .bind(snapshot.total_amount.to_string())
        .bind(&snapshot.total_amount_rmb)
        .bind(encode_json(&order_id.0, "calculation_summary", &snapshot.calculation_summary)?)
        .execute(executor)
        .await?;

        Ok(())
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    order_id: &str,
    field: &str,
    value: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid {field} on order `{order_id}`: {error}"))
    })
}

fn encode_json<T: serde::Serialize>(
    order_id: &str,
    field: &str,
    value: &T,
) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| {
        RepositoryError::Decode(format!("could not encode {field} for order `{order_id}`: {error}"))
    })
}

fn parse_decimal(order_id: &str, field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid {field} on order `{order_id}`: {error}"))
    })
}

fn parse_timestamp(
    order_id: &str,
    field: &str,
    value: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|parsed| parsed.with_timezone(&Utc)).map_err(|error| {
        RepositoryError::Decode(format!("invalid {field} on order `{order_id}`: {error}"))
    })
}

fn parse_version(order_id: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "version number `{value}` on order `{order_id}` does not fit in u32"
        ))
    })
}

fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Draft => "draft",
        OrderStatus::Normal => "normal",
        OrderStatus::Cancelled => "cancelled",
    }
}

fn parse_status(order_id: &str, value: &str) -> Result<OrderStatus, RepositoryError> {
    match value {
        "draft" => Ok(OrderStatus::Draft),
        "normal" => Ok(OrderStatus::Normal),
        "cancelled" => Ok(OrderStatus::Cancelled),
        other => Err(RepositoryError::Decode(format!(
            "unknown status `{other}` on order `{order_id}`"
        ))),
    }
}

#[async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, order_no, client_info_json, project_info_json, status,
                    current_version, current_amount, current_amount_rmb, created_at, updated_at
             FROM work_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let snapshot_rows = sqlx::query(
            "SELECT order_id, version_number, created_at, updated_by,
                    client_info_json, project_info_json, items_json,
                    total_amount, total_amount_rmb, calculation_summary_json
             FROM order_snapshot WHERE order_id = ? ORDER BY version_number ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let snapshots = snapshot_rows
            .iter()
            .map(Self::snapshot_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Self::order_from_row(&row, snapshots).map(Some)
    }

    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO work_order (
                id, order_no, client_info_json, project_info_json, status,
                current_version, current_amount, current_amount_rmb, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id.0)
        .bind(&order.order_no)
        .bind(encode_json(&order.id.0, "client_info", &order.client_info)?)
        .bind(encode_json(&order.id.0, "project_info", &order.project_info)?)
        .bind(status_label(order.status))
        .bind(i64::from(order.current_version))
        .bind(order.current_amount.to_string())
        .bind(&order.current_amount_rmb)
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for snapshot in &order.snapshots {
            Self::insert_snapshot_row(&mut *tx, &order.id, snapshot).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_snapshot(
        &self,
        id: &OrderId,
        expected_version: u32,
        snapshot: &OrderSnapshot,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // conditional write keyed on the previous version; a lost race (or a
        // concurrently deleted order) leaves zero rows touched
        let updated = sqlx::query(
            "UPDATE work_order
             SET current_version = ?, current_amount = ?, current_amount_rmb = ?, updated_at = ?
             WHERE id = ? AND current_version = ?",
        )
        .bind(i64::from(snapshot.version_number))
        .bind(snapshot.total_amount.to_string())
        .bind(&snapshot.total_amount_rmb)
        .bind(snapshot.created_at.to_rfc3339())
        .bind(&id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::VersionConflict {
                order_id: id.0.clone(),
                expected_version,
            });
        }

        Self::insert_snapshot_row(&mut *tx, id, snapshot).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query("UPDATE work_order SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status_label(status))
            .bind(updated_at.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(updated > 0)
    }

    async fn delete(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM work_order WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use atelier_core::domain::order::{Order, OrderId, OrderStatus};
    use atelier_core::domain::policy::{PolicyId, PolicyRule, PolicyStatus, PricingPolicy};
    use atelier_core::domain::snapshot::{ClientInfo, LineItem, ProjectInfo};

    use crate::repositories::{OrderRepository, RepositoryError, SqlOrderRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn policies() -> Vec<PricingPolicy> {
        vec![PricingPolicy {
            id: PolicyId("p-90".to_string()),
            name: "九折".to_string(),
            rule: PolicyRule::UniformDiscount { discount_ratio: Decimal::from(90) },
            status: PolicyStatus::Active,
        }]
    }

    fn line(unit_price: u32, quantity: u32) -> LineItem {
        LineItem {
            service_id: "svc-1".to_string(),
            service_name: "画册设计".to_string(),
            category: "设计".to_string(),
            unit_price: Decimal::from(unit_price),
            quantity,
            unit: "件".to_string(),
            policy_ids: vec![PolicyId("p-90".to_string())],
        }
    }

    fn order(id: &str) -> Order {
        Order::create(
            OrderId(id.to_string()),
            format!("ORD-{id}"),
            ClientInfo {
                client_id: "c-1".to_string(),
                client_name: "远景设计".to_string(),
                contact_name: Some("王敏".to_string()),
                contact_phone: None,
            },
            ProjectInfo { project_id: None, project_name: "品牌手册".to_string() },
            &[line(100, 3)],
            &policies(),
            "actor-1",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_and_find_round_trips_order_with_snapshots() {
        let pool = setup_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());

        let order = order("ord-rt-1");
        repo.insert(&order).await.expect("insert order");

        let found = repo.find_by_id(&order.id).await.expect("find order").expect("order exists");
        assert_eq!(found.order_no, order.order_no);
        assert_eq!(found.current_version, 1);
        assert_eq!(found.current_amount, Decimal::from(270));
        assert_eq!(found.snapshots.len(), 1);
        assert_eq!(found.snapshots[0], order.snapshots[0]);

        pool.close().await;
    }

    #[tokio::test]
    async fn append_snapshot_advances_cache_and_keeps_history_gapless() {
        let pool = setup_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());

        let mut order = order("ord-rev-1");
        repo.insert(&order).await.expect("insert order");
        let first_snapshot = order.snapshots[0].clone();

        for revision in 0..3u32 {
            let expected = order.current_version;
            order.revise(&[line(100, 4 + revision)], &policies(), "actor-2", Utc::now());
            let latest = order.latest_snapshot().expect("snapshot").clone();
            repo.append_snapshot(&order.id, expected, &latest).await.expect("append");
        }

        let found = repo.find_by_id(&order.id).await.expect("find").expect("exists");
        let versions: Vec<u32> =
            found.snapshots.iter().map(|snapshot| snapshot.version_number).collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
        assert_eq!(found.current_version, 4);
        assert_eq!(found.current_amount, found.snapshots[3].total_amount);
        // history rows are never rewritten by later appends
        assert_eq!(found.snapshots[0], first_snapshot);

        pool.close().await;
    }

    #[tokio::test]
    async fn append_snapshot_with_stale_version_is_a_conflict() {
        let pool = setup_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());

        let mut order = order("ord-cas-1");
        repo.insert(&order).await.expect("insert order");

        order.revise(&[line(100, 4)], &policies(), "actor-2", Utc::now());
        let latest = order.latest_snapshot().expect("snapshot").clone();
        repo.append_snapshot(&order.id, 1, &latest).await.expect("first append");

        // a second writer that also read version 1 must not win
        let error = repo
            .append_snapshot(&order.id, 1, &latest)
            .await
            .expect_err("stale append should conflict");
        assert!(matches!(
            error,
            RepositoryError::VersionConflict { ref order_id, expected_version: 1 }
                if order_id == "ord-cas-1"
        ));

        // the losing writer left no snapshot row behind
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_snapshot WHERE order_id = ?")
                .bind(&order.id.0)
                .fetch_one(&pool)
                .await
                .expect("count snapshots");
        assert_eq!(count, 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn update_status_round_trips_and_reports_missing_orders() {
        let pool = setup_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());

        let order = order("ord-st-1");
        repo.insert(&order).await.expect("insert order");

        let updated = repo
            .update_status(&order.id, OrderStatus::Cancelled, Utc::now())
            .await
            .expect("update status");
        assert!(updated);

        let found = repo.find_by_id(&order.id).await.expect("find").expect("exists");
        assert_eq!(found.status, OrderStatus::Cancelled);

        let missing = repo
            .update_status(&OrderId("ord-missing".to_string()), OrderStatus::Normal, Utc::now())
            .await
            .expect("update missing");
        assert!(!missing);

        pool.close().await;
    }

    #[tokio::test]
    async fn delete_cascades_into_snapshot_history() {
        let pool = setup_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());

        let mut order = order("ord-del-1");
        repo.insert(&order).await.expect("insert order");
        order.revise(&[line(100, 4)], &policies(), "actor-2", Utc::now());
        let latest = order.latest_snapshot().expect("snapshot").clone();
        repo.append_snapshot(&order.id, 1, &latest).await.expect("append");

        let deleted = repo.delete(&order.id).await.expect("delete");
        assert!(deleted);

        let found = repo.find_by_id(&order.id).await.expect("find");
        assert!(found.is_none());
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_snapshot WHERE order_id = ?")
                .bind(&order.id.0)
                .fetch_one(&pool)
                .await
                .expect("count snapshots");
        assert_eq!(count, 0);

        pool.close().await;
    }
}
