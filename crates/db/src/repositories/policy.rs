use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use atelier_core::domain::policy::{
    PolicyId, PolicyRule, PolicyStatus, PricingPolicy, TierSetting,
};

use super::{PolicyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPolicyRepository {
    pool: DbPool,
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn policy_from_row(row: &SqliteRow) -> Result<PricingPolicy, RepositoryError> {
        let id: String = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let policy_type: String = row.try_get("policy_type")?;
        let status_raw: String = row.try_get("status")?;

        let rule = match policy_type.as_str() {
            "uniform_discount" => {
                let ratio_text: Option<String> = row.try_get("discount_ratio")?;
                let ratio_text = ratio_text.ok_or_else(|| {
                    RepositoryError::Decode(format!(
                        "uniform policy `{id}` is missing discount_ratio"
                    ))
                })?;
                PolicyRule::UniformDiscount { discount_ratio: parse_decimal(&id, &ratio_text)? }
            }
            "tiered_discount" => {
                let tiers_json: Option<String> = row.try_get("tier_settings_json")?;
                let tiers_json = tiers_json.ok_or_else(|| {
                    RepositoryError::Decode(format!(
                        "tiered policy `{id}` is missing tier_settings_json"
                    ))
                })?;
                let tier_settings: Vec<TierSetting> =
                    serde_json::from_str(&tiers_json).map_err(|error| {
                        RepositoryError::Decode(format!(
                            "invalid tier_settings_json on policy `{id}`: {error}"
                        ))
                    })?;
                PolicyRule::TieredDiscount { tier_settings }
            }
            other => {
                return Err(RepositoryError::Decode(format!(
                    "unknown policy_type `{other}` on policy `{id}`"
                )))
            }
        };

        let status = match status_raw.as_str() {
            "active" => PolicyStatus::Active,
            "inactive" => PolicyStatus::Inactive,
            other => {
                return Err(RepositoryError::Decode(format!(
                    "unknown status `{other}` on policy `{id}`"
                )))
            }
        };

        Ok(PricingPolicy { id: PolicyId(id), name, rule, status })
    }
}

fn parse_decimal(policy_id: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal on policy `{policy_id}`: {error}"))
    })
}

fn status_label(status: PolicyStatus) -> &'static str {
    match status {
        PolicyStatus::Active => "active",
        PolicyStatus::Inactive => "inactive",
    }
}

#[async_trait]
impl PolicyRepository for SqlPolicyRepository {
    async fn list(&self) -> Result<Vec<PricingPolicy>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, policy_type, discount_ratio, tier_settings_json, status
             FROM pricing_policy ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::policy_from_row).collect()
    }

    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<PricingPolicy>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, policy_type, discount_ratio, tier_settings_json, status
             FROM pricing_policy WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::policy_from_row).transpose()
    }

    async fn save(&self, policy: &PricingPolicy) -> Result<(), RepositoryError> {
        let (discount_ratio, tier_settings_json) = match &policy.rule {
            PolicyRule::UniformDiscount { discount_ratio } => {
                (Some(discount_ratio.to_string()), None)
            }
            PolicyRule::TieredDiscount { tier_settings } => {
                let json = serde_json::to_string(tier_settings).map_err(|error| {
                    RepositoryError::Decode(format!(
                        "could not encode tier settings for policy `{}`: {error}",
                        policy.id.0
                    ))
                })?;
                (None, Some(json))
            }
        };

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO pricing_policy (
                id, name, policy_type, discount_ratio, tier_settings_json, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                policy_type = excluded.policy_type,
                discount_ratio = excluded.discount_ratio,
                tier_settings_json = excluded.tier_settings_json,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&policy.id.0)
        .bind(&policy.name)
        .bind(policy.rule.type_label())
        .bind(discount_ratio)
        .bind(tier_settings_json)
        .bind(status_label(policy.status))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
