use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use atelier_core::domain::order::{Order, OrderId};
use atelier_core::domain::policy::{
    PolicyId, PolicyRule, PolicyStatus, PricingPolicy, TierSetting,
};
use atelier_core::domain::snapshot::{ClientInfo, LineItem, ProjectInfo};

use crate::connection::DbPool;
use crate::repositories::{
    OrderRepository, PolicyRepository, RepositoryError, SqlOrderRepository, SqlPolicyRepository,
};

const SEED_POLICY_IDS: &[&str] = &["policy-uniform-90", "policy-uniform-88", "policy-tiered-std"];

const SEED_ORDER_ID: &str = "order-demo-001";
const SEED_ORDER_NO: &str = "ORD-2026-0001";
const SEED_ACTOR: &str = "seed";

/// Deterministic fixtures for demos and end-to-end tests: the canonical
/// policy set plus one order that already carries a revision, so version
/// history is visible out of the box.
pub struct SeedDataset;

impl SeedDataset {
    pub fn policies() -> Vec<PricingPolicy> {
        vec![
            PricingPolicy {
                id: PolicyId("policy-uniform-90".to_string()),
                name: "九折优惠".to_string(),
                rule: PolicyRule::UniformDiscount { discount_ratio: Decimal::from(90) },
                status: PolicyStatus::Active,
            },
            PricingPolicy {
                id: PolicyId("policy-uniform-88".to_string()),
                name: "新客八八折".to_string(),
                rule: PolicyRule::UniformDiscount { discount_ratio: Decimal::from(88) },
                status: PolicyStatus::Inactive,
            },
            PricingPolicy {
                id: PolicyId("policy-tiered-std".to_string()),
                name: "批量阶梯计费".to_string(),
                rule: PolicyRule::TieredDiscount {
                    tier_settings: vec![
                        TierSetting {
                            start_quantity: 1,
                            end_quantity: Some(10),
                            discount_ratio: Decimal::from(100),
                        },
                        TierSetting {
                            start_quantity: 11,
                            end_quantity: Some(50),
                            discount_ratio: Decimal::from(90),
                        },
                        TierSetting {
                            start_quantity: 51,
                            end_quantity: None,
                            discount_ratio: Decimal::from(80),
                        },
                    ],
                },
                status: PolicyStatus::Active,
            },
        ]
    }

    fn seed_line(quantity: u32) -> LineItem {
        LineItem {
            service_id: "svc-brochure".to_string(),
            service_name: "画册设计".to_string(),
            category: "平面设计".to_string(),
            unit_price: Decimal::from(800),
            quantity,
            unit: "页".to_string(),
            policy_ids: vec![PolicyId("policy-tiered-std".to_string())],
        }
    }

    fn seed_timestamp(hour: u32) -> DateTime<Utc> {
        // fixed instants keep the dataset reproducible across runs
        Utc.with_ymd_and_hms(2026, 1, 15, hour, 0, 0).single().unwrap_or_else(Utc::now)
    }

    fn demo_order(policies: &[PricingPolicy]) -> Order {
        let mut order = Order::create(
            OrderId(SEED_ORDER_ID.to_string()),
            SEED_ORDER_NO.to_string(),
            ClientInfo {
                client_id: "client-yuanjing".to_string(),
                client_name: "远景文化传播有限公司".to_string(),
                contact_name: Some("王敏".to_string()),
                contact_phone: Some("13800000000".to_string()),
            },
            ProjectInfo {
                project_id: Some("proj-brand-book".to_string()),
                project_name: "品牌手册设计".to_string(),
            },
            &[Self::seed_line(20)],
            policies,
            SEED_ACTOR,
            Self::seed_timestamp(9),
        );
        order.revise(&[Self::seed_line(60)], policies, SEED_ACTOR, Self::seed_timestamp(14));
        order
    }

    /// Loads the dataset through the repositories. Safe to run repeatedly:
    /// policies upsert, and the demo order is only inserted when absent.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let policy_repo = SqlPolicyRepository::new(pool.clone());
        let order_repo = SqlOrderRepository::new(pool.clone());

        let policies = Self::policies();
        for policy in &policies {
            policy_repo.save(policy).await?;
        }

        let order_id = OrderId(SEED_ORDER_ID.to_string());
        let order_inserted = if order_repo.find_by_id(&order_id).await?.is_none() {
            order_repo.insert(&Self::demo_order(&policies)).await?;
            true
        } else {
            false
        };

        Ok(SeedResult { policies_seeded: policies.len(), order_inserted })
    }

    /// Checks the dataset against what the database actually holds.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let policy_repo = SqlPolicyRepository::new(pool.clone());
        let order_repo = SqlOrderRepository::new(pool.clone());

        let mut checks = Vec::new();
        for id in SEED_POLICY_IDS {
            let present = policy_repo.find_by_id(&PolicyId(id.to_string())).await?.is_some();
            checks.push((*id, present));
        }

        let order = order_repo.find_by_id(&OrderId(SEED_ORDER_ID.to_string())).await?;
        checks.push(("demo-order", order.is_some()));
        if let Some(order) = order {
            checks.push(("demo-order-current-version", order.current_version == 2));
            checks.push(("demo-order-snapshot-count", order.snapshots.len() == 2));
            let cache_mirrors_latest = order
                .latest_snapshot()
                .map(|snapshot| {
                    snapshot.total_amount == order.current_amount
                        && snapshot.total_amount_rmb == order.current_amount_rmb
                })
                .unwrap_or(false);
            checks.push(("demo-order-cache-mirrors-latest", cache_mirrors_latest));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub policies_seeded: usize,
    pub order_inserted: bool,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
