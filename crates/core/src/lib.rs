pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod rmb;

pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::policy::{PolicyId, PolicyRule, PolicyStatus, PricingPolicy, TierSetting};
pub use domain::snapshot::{
    build_snapshot, CalculationSummary, ClientInfo, LineItem, OrderItemSnapshot, OrderSnapshot,
    ProjectInfo,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use pricing::{
    calculate_price_with_policies, format_calculation_details, AppliedPolicy, PriceCalculation,
};
pub use rmb::convert_to_rmb;
