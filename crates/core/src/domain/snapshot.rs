//! Denormalized order snapshots.
//!
//! Every order edit materializes a full copy of the client, project, and
//! priced line items so historical quotations stay readable even after the
//! catalog or the policies change. Snapshots are built once and never
//! mutated; the order aggregate only ever appends.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::policy::{PolicyId, PricingPolicy};
use crate::pricing::{self, AppliedPolicy};
use crate::rmb::convert_to_rmb;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub client_id: String,
    pub client_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub project_name: String,
}

/// Raw line-item input as assembled by the order form. `policy_ids` is
/// array-shaped for wire compatibility; the UI enforces single selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub service_id: String,
    pub service_name: String,
    pub category: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub unit: String,
    #[serde(default)]
    pub policy_ids: Vec<PolicyId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemSnapshot {
    pub service_id: String,
    pub service_name: String,
    pub category: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub unit: String,
    pub original_price: Decimal,
    pub discounted_price: Decimal,
    pub discount_amount: Decimal,
    pub subtotal: Decimal,
    pub applied_policies: Vec<AppliedPolicy>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationSummary {
    pub total_items: u32,
    pub total_quantity: u32,
    /// Distinct applied policy names, in order of first appearance.
    pub applied_policies: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub version_number: u32,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub client_info: ClientInfo,
    pub project_info: ProjectInfo,
    pub items: Vec<OrderItemSnapshot>,
    pub total_amount: Decimal,
    #[serde(rename = "totalAmountRMB")]
    pub total_amount_rmb: String,
    pub calculation_summary: CalculationSummary,
}

/// Prices every line item against the catalog and assembles the immutable
/// snapshot record for one order version.
#[allow(clippy::too_many_arguments)]
pub fn build_snapshot(
    version_number: u32,
    client_info: ClientInfo,
    project_info: ProjectInfo,
    line_items: &[LineItem],
    policies: &[PricingPolicy],
    updated_by: &str,
    created_at: DateTime<Utc>,
) -> OrderSnapshot {
    let mut items = Vec::with_capacity(line_items.len());
    let mut total_amount = Decimal::ZERO;
    let mut total_quantity = 0u32;
    let mut applied_names: Vec<String> = Vec::new();

    for line in line_items {
        let original_price = line.unit_price * Decimal::from(line.quantity);
        let calculation = pricing::calculate_price_with_policies(
            original_price,
            line.quantity,
            policies,
            &line.policy_ids,
            &line.unit,
        );

        if let Some(applied) = &calculation.applied_policy {
            if !applied_names.iter().any(|name| name == &applied.name) {
                applied_names.push(applied.name.clone());
            }
        }

        total_amount += calculation.discounted_price;
        total_quantity += line.quantity;
        items.push(OrderItemSnapshot {
            service_id: line.service_id.clone(),
            service_name: line.service_name.clone(),
            category: line.category.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            unit: line.unit.clone(),
            original_price: calculation.original_price,
            discounted_price: calculation.discounted_price,
            discount_amount: calculation.discount_amount,
            subtotal: calculation.discounted_price,
            applied_policies: calculation.applied_policy.into_iter().collect(),
        });
    }

    OrderSnapshot {
        version_number,
        created_at,
        updated_by: updated_by.to_string(),
        client_info,
        project_info,
        items,
        total_amount,
        total_amount_rmb: convert_to_rmb(total_amount, false),
        calculation_summary: CalculationSummary {
            total_items: line_items.len() as u32,
            total_quantity,
            applied_policies: applied_names,
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::policy::{PolicyId, PolicyRule, PolicyStatus, PricingPolicy};

    use super::{build_snapshot, ClientInfo, LineItem, ProjectInfo};

    fn client() -> ClientInfo {
        ClientInfo {
            client_id: "c-1".to_string(),
            client_name: "远景设计".to_string(),
            contact_name: Some("王敏".to_string()),
            contact_phone: None,
        }
    }

    fn project() -> ProjectInfo {
        ProjectInfo { project_id: None, project_name: "品牌手册".to_string() }
    }

    fn uniform_policy(id: &str, name: &str, ratio: u32) -> PricingPolicy {
        PricingPolicy {
            id: PolicyId(id.to_string()),
            name: name.to_string(),
            rule: PolicyRule::UniformDiscount { discount_ratio: Decimal::from(ratio) },
            status: PolicyStatus::Active,
        }
    }

    fn line(service: &str, unit_price: u32, quantity: u32, policy: Option<&str>) -> LineItem {
        LineItem {
            service_id: format!("svc-{service}"),
            service_name: service.to_string(),
            category: "设计".to_string(),
            unit_price: Decimal::from(unit_price),
            quantity,
            unit: "件".to_string(),
            policy_ids: policy.map(|id| vec![PolicyId(id.to_string())]).unwrap_or_default(),
        }
    }

    #[test]
    fn snapshot_totals_sum_item_subtotals() {
        let policies = vec![uniform_policy("p-90", "九折", 90)];
        let lines = vec![line("画册", 100, 3, Some("p-90")), line("包装", 50, 2, None)];

        let snapshot =
            build_snapshot(1, client(), project(), &lines, &policies, "actor-1", Utc::now());

        // 300 × 90% + 100 at full price
        assert_eq!(snapshot.total_amount, Decimal::from(370));
        assert_eq!(snapshot.total_amount_rmb, "叁佰柒拾元整");
        assert_eq!(snapshot.items[0].subtotal, Decimal::from(270));
        assert_eq!(snapshot.items[0].discount_amount, Decimal::from(30));
        assert_eq!(snapshot.items[1].subtotal, Decimal::from(100));
        assert!(snapshot.items[1].applied_policies.is_empty());
    }

    #[test]
    fn summary_counts_items_quantity_and_distinct_policy_names() {
        let policies =
            vec![uniform_policy("p-90", "九折", 90), uniform_policy("p-80", "八折", 80)];
        let lines = vec![
            line("画册", 100, 3, Some("p-90")),
            line("包装", 50, 2, Some("p-90")),
            line("海报", 20, 5, Some("p-80")),
        ];

        let snapshot =
            build_snapshot(2, client(), project(), &lines, &policies, "actor-1", Utc::now());

        assert_eq!(snapshot.version_number, 2);
        assert_eq!(snapshot.calculation_summary.total_items, 3);
        assert_eq!(snapshot.calculation_summary.total_quantity, 10);
        assert_eq!(
            snapshot.calculation_summary.applied_policies,
            vec!["九折".to_string(), "八折".to_string()]
        );
    }

    #[test]
    fn unresolved_policy_leaves_item_at_full_price() {
        let lines = vec![line("画册", 100, 3, Some("missing"))];
        let snapshot = build_snapshot(1, client(), project(), &lines, &[], "actor-1", Utc::now());

        assert_eq!(snapshot.total_amount, Decimal::from(300));
        assert!(snapshot.items[0].applied_policies.is_empty());
        assert!(snapshot.calculation_summary.applied_policies.is_empty());
    }

    #[test]
    fn snapshot_serializes_with_wire_field_names() {
        let lines = vec![line("画册", 100, 1, None)];
        let snapshot = build_snapshot(1, client(), project(), &lines, &[], "actor-1", Utc::now());

        let json = serde_json::to_value(&snapshot).expect("serialize snapshot");
        assert_eq!(json["versionNumber"], 1);
        assert_eq!(json["totalAmountRMB"], "壹佰元整");
        assert_eq!(json["items"][0]["originalPrice"], "100");
        assert_eq!(json["calculationSummary"]["totalItems"], 1);
    }
}
