use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    Active,
    Inactive,
}

/// One quantity band of a tiered policy. `end_quantity` is inclusive;
/// `None` means the band is open-ended and absorbs all remaining quantity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSetting {
    #[serde(default)]
    pub start_quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_quantity: Option<u32>,
    pub discount_ratio: Decimal,
}

/// Discount rule attached to a policy. `discount_ratio` is the percentage of
/// the original price the customer is billed, not the percentage taken off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyRule {
    #[serde(rename_all = "camelCase")]
    UniformDiscount { discount_ratio: Decimal },
    #[serde(rename_all = "camelCase")]
    TieredDiscount { tier_settings: Vec<TierSetting> },
}

impl PolicyRule {
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::UniformDiscount { .. } => "uniform_discount",
            Self::TieredDiscount { .. } => "tiered_discount",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub id: PolicyId,
    pub name: String,
    #[serde(flatten)]
    pub rule: PolicyRule,
    pub status: PolicyStatus,
}

impl PricingPolicy {
    pub fn is_active(&self) -> bool {
        self.status == PolicyStatus::Active
    }
}
