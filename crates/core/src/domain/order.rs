use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::policy::PricingPolicy;
use crate::domain::snapshot::{build_snapshot, ClientInfo, LineItem, OrderSnapshot, ProjectInfo};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Normal,
    Cancelled,
}

/// The mutable order aggregate. The snapshot list is the source of truth;
/// `current_version` and the cached amount fields mirror the latest snapshot
/// and only ever change together with an append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_no: String,
    pub client_info: ClientInfo,
    pub project_info: ProjectInfo,
    pub status: OrderStatus,
    pub current_version: u32,
    pub current_amount: Decimal,
    #[serde(rename = "currentAmountRMB")]
    pub current_amount_rmb: String,
    pub snapshots: Vec<OrderSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order with its version-1 snapshot already priced.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: OrderId,
        order_no: String,
        client_info: ClientInfo,
        project_info: ProjectInfo,
        line_items: &[LineItem],
        policies: &[PricingPolicy],
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let snapshot = build_snapshot(
            1,
            client_info.clone(),
            project_info.clone(),
            line_items,
            policies,
            created_by,
            now,
        );

        Self {
            id,
            order_no,
            client_info,
            project_info,
            status: OrderStatus::Normal,
            current_version: snapshot.version_number,
            current_amount: snapshot.total_amount,
            current_amount_rmb: snapshot.total_amount_rmb.clone(),
            snapshots: vec![snapshot],
            created_at: now,
            updated_at: now,
        }
    }

    /// Latest snapshot by version number. Computed as an explicit max rather
    /// than trusting append order of the backing list.
    pub fn latest_snapshot(&self) -> Option<&OrderSnapshot> {
        self.snapshots.iter().max_by_key(|snapshot| snapshot.version_number)
    }

    pub fn snapshot_at(&self, version_number: u32) -> Option<&OrderSnapshot> {
        self.snapshots.iter().find(|snapshot| snapshot.version_number == version_number)
    }

    /// Re-prices the given line items and appends the next snapshot, moving
    /// the cached current-version fields in the same call. Returns the new
    /// version number.
    pub fn revise(
        &mut self,
        line_items: &[LineItem],
        policies: &[PricingPolicy],
        updated_by: &str,
        now: DateTime<Utc>,
    ) -> u32 {
        let next_version =
            self.latest_snapshot().map(|snapshot| snapshot.version_number).unwrap_or(0) + 1;
        let snapshot = build_snapshot(
            next_version,
            self.client_info.clone(),
            self.project_info.clone(),
            line_items,
            policies,
            updated_by,
            now,
        );

        self.current_version = snapshot.version_number;
        self.current_amount = snapshot.total_amount;
        self.current_amount_rmb = snapshot.total_amount_rmb.clone();
        self.updated_at = now;
        self.snapshots.push(snapshot);
        next_version
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (&self.status, next),
            (OrderStatus::Draft, OrderStatus::Normal)
                | (OrderStatus::Draft, OrderStatus::Cancelled)
                | (OrderStatus::Normal, OrderStatus::Cancelled)
                | (OrderStatus::Cancelled, OrderStatus::Normal)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::policy::{PolicyId, PolicyRule, PolicyStatus, PricingPolicy};
    use crate::domain::snapshot::{ClientInfo, LineItem, ProjectInfo};
    use crate::errors::DomainError;

    use super::{Order, OrderId, OrderStatus};

    fn policies() -> Vec<PricingPolicy> {
        vec![PricingPolicy {
            id: PolicyId("p-90".to_string()),
            name: "九折".to_string(),
            rule: PolicyRule::UniformDiscount { discount_ratio: Decimal::from(90) },
            status: PolicyStatus::Active,
        }]
    }

    fn line(unit_price: u32, quantity: u32, policy: Option<&str>) -> LineItem {
        LineItem {
            service_id: "svc-1".to_string(),
            service_name: "画册设计".to_string(),
            category: "设计".to_string(),
            unit_price: Decimal::from(unit_price),
            quantity,
            unit: "件".to_string(),
            policy_ids: policy.map(|id| vec![PolicyId(id.to_string())]).unwrap_or_default(),
        }
    }

    fn order() -> Order {
        Order::create(
            OrderId("ord-1".to_string()),
            "ORD-2026-0001".to_string(),
            ClientInfo {
                client_id: "c-1".to_string(),
                client_name: "远景设计".to_string(),
                contact_name: None,
                contact_phone: None,
            },
            ProjectInfo { project_id: None, project_name: "品牌手册".to_string() },
            &[line(100, 3, Some("p-90"))],
            &policies(),
            "actor-1",
            Utc::now(),
        )
    }

    #[test]
    fn create_seeds_version_one_and_caches_totals() {
        let order = order();

        assert_eq!(order.status, OrderStatus::Normal);
        assert_eq!(order.current_version, 1);
        assert_eq!(order.current_amount, Decimal::from(270));
        assert_eq!(order.current_amount_rmb, "贰佰柒拾元整");
        assert_eq!(order.snapshots.len(), 1);
    }

    #[test]
    fn revise_appends_gapless_versions_without_touching_history() {
        let mut order = order();
        let first = order.snapshots[0].clone();

        for revision in 0..3u32 {
            let version =
                order.revise(&[line(100, 4 + revision, None)], &policies(), "actor-2", Utc::now());
            assert_eq!(version, revision + 2);
        }

        let versions: Vec<u32> =
            order.snapshots.iter().map(|snapshot| snapshot.version_number).collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);
        // the first snapshot is untouched by later revisions
        assert_eq!(order.snapshots[0], first);
    }

    #[test]
    fn revise_moves_cached_fields_with_the_append() {
        let mut order = order();
        order.revise(&[line(100, 5, None)], &policies(), "actor-2", Utc::now());

        let latest = order.latest_snapshot().expect("snapshot");
        assert_eq!(order.current_version, latest.version_number);
        assert_eq!(order.current_amount, latest.total_amount);
        assert_eq!(order.current_amount_rmb, latest.total_amount_rmb);
        assert_eq!(order.current_amount, Decimal::from(500));
    }

    #[test]
    fn latest_snapshot_uses_max_version_not_list_position() {
        let mut order = order();
        order.revise(&[line(100, 5, None)], &policies(), "actor-2", Utc::now());
        // simulate out-of-order persistence reads
        order.snapshots.reverse();

        assert_eq!(order.latest_snapshot().expect("snapshot").version_number, 2);
    }

    #[test]
    fn status_flips_between_normal_and_cancelled() {
        let mut order = order();
        order.transition_to(OrderStatus::Cancelled).expect("normal -> cancelled");
        order.transition_to(OrderStatus::Normal).expect("cancelled -> normal");
        assert_eq!(order.status, OrderStatus::Normal);
    }

    #[test]
    fn status_cannot_reenter_draft() {
        let mut order = order();
        let error =
            order.transition_to(OrderStatus::Draft).expect_err("normal -> draft should fail");
        assert!(matches!(error, DomainError::InvalidOrderTransition { .. }));
    }
}
