//! Discount evaluation for order line items.
//!
//! The engine is deliberately total: a bad policy selection or a malformed
//! tier table degrades to the original price with an explanatory narrative
//! instead of an error, because pricing display must never abort an order
//! form. The narrative strings end up on printed quotations, so they stay in
//! the wording the finance documents use.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::policy::{PolicyId, PolicyRule, PricingPolicy, TierSetting};

/// Narrative used when the caller selected no policy at all.
pub const NO_POLICY_SELECTED: &str = "未应用价格政策";
/// Narrative used when a selection was made but nothing resolved (missing
/// id, inactive policy). Distinct from [`NO_POLICY_SELECTED`] on purpose.
pub const NO_POLICY_APPLICABLE: &str = "未找到适用的价格政策";
/// Narrative for a tiered policy whose tier table is empty.
pub const INVALID_TIER_CONFIG: &str = "阶梯价格配置无效，按原价计费";
/// Narrative for a tiered calculation with a non-positive quantity.
pub const INVALID_QUANTITY: &str = "数量无效，按原价计费";

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Policy actually applied to a line item, denormalized for snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPolicy {
    pub id: PolicyId,
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    pub discount_ratio: Decimal,
    pub narrative: String,
}

/// Outcome of pricing one line item. `discount_ratio` is the effective
/// billing percentage: for tiered policies it is blended across tiers, not
/// any single tier's ratio.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceCalculation {
    pub original_price: Decimal,
    pub discounted_price: Decimal,
    pub discount_amount: Decimal,
    pub discount_ratio: Decimal,
    pub applied_policy: Option<AppliedPolicy>,
    pub calculation_details: String,
}

impl PriceCalculation {
    fn identity(original_price: Decimal, details: &str) -> Self {
        Self {
            original_price,
            discounted_price: original_price,
            discount_amount: Decimal::ZERO,
            discount_ratio: Decimal::ZERO,
            applied_policy: None,
            calculation_details: details.to_string(),
        }
    }
}

/// Prices one line item against the full policy catalog.
///
/// `original_price` is already quantity-scaled (unit price × quantity);
/// `quantity` only feeds the tiered math. `selected_policy_ids` is
/// array-shaped for wire compatibility even though callers select at most
/// one policy; when several ids are supplied the candidate with the lowest
/// discounted price wins.
pub fn calculate_price_with_policies(
    original_price: Decimal,
    quantity: u32,
    policies: &[PricingPolicy],
    selected_policy_ids: &[PolicyId],
    unit: &str,
) -> PriceCalculation {
    if selected_policy_ids.is_empty() {
        return PriceCalculation::identity(original_price, NO_POLICY_SELECTED);
    }

    let mut best: Option<PriceCalculation> = None;
    for policy_id in selected_policy_ids {
        let Some(policy) = policies.iter().find(|policy| &policy.id == policy_id) else {
            continue;
        };
        if !policy.is_active() {
            continue;
        }

        let candidate = match &policy.rule {
            PolicyRule::UniformDiscount { discount_ratio } => {
                apply_uniform(original_price, policy, *discount_ratio)
            }
            PolicyRule::TieredDiscount { tier_settings } => {
                apply_tiered(original_price, quantity, policy, tier_settings, unit)
            }
        };

        // cheapest-for-customer wins across multiple selected ids
        let replace = match &best {
            Some(current) => candidate.discounted_price < current.discounted_price,
            None => true,
        };
        if replace {
            best = Some(candidate);
        }
    }

    best.unwrap_or_else(|| PriceCalculation::identity(original_price, NO_POLICY_APPLICABLE))
}

fn apply_uniform(
    original_price: Decimal,
    policy: &PricingPolicy,
    discount_ratio: Decimal,
) -> PriceCalculation {
    let discounted_price = original_price * discount_ratio / HUNDRED;
    let narrative = format!("按{}%计费", discount_ratio.normalize());

    PriceCalculation {
        original_price,
        discounted_price,
        discount_amount: original_price - discounted_price,
        discount_ratio,
        applied_policy: Some(AppliedPolicy {
            id: policy.id.clone(),
            name: policy.name.clone(),
            policy_type: policy.rule.type_label().to_string(),
            discount_ratio,
            narrative: narrative.clone(),
        }),
        calculation_details: narrative,
    }
}

fn apply_tiered(
    original_price: Decimal,
    quantity: u32,
    policy: &PricingPolicy,
    tier_settings: &[TierSetting],
    unit: &str,
) -> PriceCalculation {
    if tier_settings.is_empty() {
        return PriceCalculation::identity(original_price, INVALID_TIER_CONFIG);
    }
    if quantity == 0 {
        return PriceCalculation::identity(original_price, INVALID_QUANTITY);
    }

    let unit_price = original_price / Decimal::from(quantity);

    // callers are not required to pre-sort tiers
    let mut tiers: Vec<&TierSetting> = tier_settings.iter().collect();
    tiers.sort_by_key(|tier| tier.start_quantity);

    let mut remaining = quantity;
    let mut total_discounted = Decimal::ZERO;
    let mut narrative_lines = Vec::new();

    for tier in tiers {
        if remaining == 0 {
            break;
        }

        let capacity = match tier.end_quantity {
            // open-ended tier absorbs everything that is left
            None => remaining,
            Some(end) => end.saturating_add(1).saturating_sub(tier.start_quantity),
        };
        let applicable = remaining.min(capacity);
        if applicable == 0 {
            continue;
        }

        let billed = unit_price * Decimal::from(applicable) * tier.discount_ratio / HUNDRED;
        total_discounted += billed;
        narrative_lines.push(format!(
            "{}按{}%计费：{}元",
            tier_range_label(tier, unit),
            tier.discount_ratio.normalize(),
            billed.normalize(),
        ));
        remaining -= applicable;
    }

    let discount_amount = original_price - total_discounted;
    // effective billing percentage blended across tiers
    let discount_ratio = if original_price.is_zero() {
        HUNDRED
    } else {
        HUNDRED - (discount_amount / original_price * HUNDRED)
    };

    let narrative = narrative_lines.join("；");
    PriceCalculation {
        original_price,
        discounted_price: total_discounted,
        discount_amount,
        discount_ratio,
        applied_policy: Some(AppliedPolicy {
            id: policy.id.clone(),
            name: policy.name.clone(),
            policy_type: policy.rule.type_label().to_string(),
            discount_ratio,
            narrative: narrative.clone(),
        }),
        calculation_details: narrative,
    }
}

fn tier_range_label(tier: &TierSetting, unit: &str) -> String {
    match tier.end_quantity {
        None => format!("{}{unit}以上", tier.start_quantity),
        Some(end) if end == tier.start_quantity => format!("第{}{unit}", tier.start_quantity),
        Some(end) => format!("第{}-{}{unit}", tier.start_quantity, end),
    }
}

/// Renders the full multi-line breakdown shown on quotations and printable
/// documents. Results without an applied policy pass their narrative through
/// unchanged.
pub fn format_calculation_details(result: &PriceCalculation) -> String {
    let Some(applied) = &result.applied_policy else {
        return result.calculation_details.clone();
    };

    format!(
        "原价：{}元\n价格政策：{}\n{}\n优惠金额：{}元\n折后价：{}元",
        result.original_price.normalize(),
        applied.name,
        result.calculation_details,
        result.discount_amount.normalize(),
        result.discounted_price.normalize(),
    )
}
