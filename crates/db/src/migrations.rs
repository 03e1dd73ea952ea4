use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const MANAGED_TABLES: &[&str] = &["pricing_policy", "work_order", "order_snapshot"];

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Names of managed tables absent from the connected database. Empty when
/// the schema is fully migrated.
pub async fn missing_tables(pool: &DbPool) -> Result<Vec<&'static str>, sqlx::Error> {
    let mut missing = Vec::new();
    for table in MANAGED_TABLES {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await?;
        if count == 0 {
            missing.push(*table);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "pricing_policy",
        "work_order",
        "order_snapshot",
        "idx_pricing_policy_status",
        "idx_work_order_status",
        "idx_work_order_created_at",
        "idx_order_snapshot_order_id",
    ];

    #[tokio::test]
    async fn migrations_create_all_managed_schema_objects() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = ? AND type IN ('table', 'index')",
            )
            .bind(object)
            .fetch_one(&pool)
            .await
            .expect("query sqlite_master");
            assert_eq!(count, 1, "expected schema object `{object}`");
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_tables_reports_unmigrated_databases() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");

        let missing = super::missing_tables(&pool).await.expect("probe schema");
        assert_eq!(missing, vec!["pricing_policy", "work_order", "order_snapshot"]);

        run_pending(&pool).await.expect("run migrations");
        let missing = super::missing_tables(&pool).await.expect("re-probe schema");
        assert!(missing.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
        pool.close().await;
    }
}
