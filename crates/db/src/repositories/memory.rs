use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use atelier_core::domain::order::{Order, OrderId, OrderStatus};
use atelier_core::domain::policy::{PolicyId, PricingPolicy};
use atelier_core::domain::snapshot::OrderSnapshot;

use super::{OrderRepository, PolicyRepository, RepositoryError};

/// In-memory policy store for tests and ephemeral tooling. Listing preserves
/// insertion order, matching the created-at ordering of the SQL store.
#[derive(Default)]
pub struct InMemoryPolicyRepository {
    policies: RwLock<Vec<PricingPolicy>>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, policies: Vec<PricingPolicy>) {
        let mut guard = self.policies.write().await;
        for policy in policies {
            upsert(&mut guard, policy);
        }
    }
}

fn upsert(policies: &mut Vec<PricingPolicy>, policy: PricingPolicy) {
    match policies.iter_mut().find(|existing| existing.id == policy.id) {
        Some(existing) => *existing = policy,
        None => policies.push(policy),
    }
}

#[async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn list(&self) -> Result<Vec<PricingPolicy>, RepositoryError> {
        Ok(self.policies.read().await.clone())
    }

    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<PricingPolicy>, RepositoryError> {
        Ok(self.policies.read().await.iter().find(|policy| &policy.id == id).cloned())
    }

    async fn save(&self, policy: &PricingPolicy) -> Result<(), RepositoryError> {
        upsert(&mut *self.policies.write().await, policy.clone());
        Ok(())
    }
}

/// In-memory order store with the same compare-and-swap append contract as
/// the SQL store.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        self.orders.write().await.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn append_snapshot(
        &self,
        id: &OrderId,
        expected_version: u32,
        snapshot: &OrderSnapshot,
    ) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(id).ok_or_else(|| RepositoryError::VersionConflict {
            order_id: id.0.clone(),
            expected_version,
        })?;

        if order.current_version != expected_version {
            return Err(RepositoryError::VersionConflict {
                order_id: id.0.clone(),
                expected_version,
            });
        }

        order.current_version = snapshot.version_number;
        order.current_amount = snapshot.total_amount;
        order.current_amount_rmb = snapshot.total_amount_rmb.clone();
        order.updated_at = snapshot.created_at;
        order.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(id) {
            Some(order) => {
                order.status = status;
                order.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        Ok(self.orders.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use atelier_core::domain::order::{Order, OrderId, OrderStatus};
    use atelier_core::domain::policy::{PolicyId, PolicyRule, PolicyStatus, PricingPolicy};
    use atelier_core::domain::snapshot::{ClientInfo, LineItem, ProjectInfo};

    use super::{InMemoryOrderRepository, InMemoryPolicyRepository};
    use crate::repositories::{OrderRepository, PolicyRepository, RepositoryError};

    fn policy(id: &str, ratio: u32) -> PricingPolicy {
        PricingPolicy {
            id: PolicyId(id.to_string()),
            name: format!("按{ratio}%计费"),
            rule: PolicyRule::UniformDiscount { discount_ratio: Decimal::from(ratio) },
            status: PolicyStatus::Active,
        }
    }

    fn line(quantity: u32) -> LineItem {
        LineItem {
            service_id: "svc-1".to_string(),
            service_name: "画册设计".to_string(),
            category: "设计".to_string(),
            unit_price: Decimal::from(100),
            quantity,
            unit: "件".to_string(),
            policy_ids: vec![],
        }
    }

    fn order(id: &str) -> Order {
        Order::create(
            OrderId(id.to_string()),
            format!("ORD-{id}"),
            ClientInfo {
                client_id: "c-1".to_string(),
                client_name: "远景设计".to_string(),
                contact_name: None,
                contact_phone: None,
            },
            ProjectInfo { project_id: None, project_name: "品牌手册".to_string() },
            &[line(3)],
            &[],
            "actor-1",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn policy_seed_then_save_updates_in_place() {
        let repo = InMemoryPolicyRepository::new();
        repo.seed(vec![policy("p-1", 90), policy("p-2", 80)]).await;

        repo.save(&policy("p-1", 85)).await.expect("save");

        let all = repo.list().await.expect("list");
        assert_eq!(all.len(), 2);
        let found = repo.find_by_id(&PolicyId("p-1".to_string())).await.expect("find");
        assert_eq!(found, Some(policy("p-1", 85)));
    }

    #[tokio::test]
    async fn append_snapshot_enforces_compare_and_swap() {
        let repo = InMemoryOrderRepository::new();
        let mut order = order("ord-1");
        repo.insert(&order).await.expect("insert");

        order.revise(&[line(4)], &[], "actor-2", Utc::now());
        let latest = order.latest_snapshot().expect("snapshot").clone();
        repo.append_snapshot(&order.id, 1, &latest).await.expect("append");

        let error = repo
            .append_snapshot(&order.id, 1, &latest)
            .await
            .expect_err("stale append should conflict");
        assert!(matches!(error, RepositoryError::VersionConflict { expected_version: 1, .. }));

        let found = repo.find_by_id(&order.id).await.expect("find").expect("exists");
        assert_eq!(found.current_version, 2);
        assert_eq!(found.snapshots.len(), 2);
    }

    #[tokio::test]
    async fn update_status_and_delete_report_missing_orders() {
        let repo = InMemoryOrderRepository::new();
        let order = order("ord-2");
        repo.insert(&order).await.expect("insert");

        assert!(repo
            .update_status(&order.id, OrderStatus::Cancelled, Utc::now())
            .await
            .expect("update"));
        assert!(repo.delete(&order.id).await.expect("delete"));
        assert!(!repo.delete(&order.id).await.expect("second delete"));
        assert!(!repo
            .update_status(&order.id, OrderStatus::Normal, Utc::now())
            .await
            .expect("update missing"));
    }
}
