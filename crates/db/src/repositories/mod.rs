use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use atelier_core::domain::order::{Order, OrderId, OrderStatus};
use atelier_core::domain::policy::{PolicyId, PricingPolicy};
use atelier_core::domain::snapshot::OrderSnapshot;
use atelier_core::errors::ApplicationError;

pub mod memory;
pub mod order;
pub mod policy;

pub use memory::{InMemoryOrderRepository, InMemoryPolicyRepository};
pub use order::SqlOrderRepository;
pub use policy::SqlPolicyRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("version conflict on order `{order_id}`: expected current version {expected_version}")]
    VersionConflict { order_id: String, expected_version: u32 },
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::VersionConflict { order_id, expected_version } => {
                ApplicationError::VersionConflict(format!(
                    "order `{order_id}` moved past version {expected_version}"
                ))
            }
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<PricingPolicy>, RepositoryError>;
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<PricingPolicy>, RepositoryError>;
    async fn save(&self, policy: &PricingPolicy) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Persists a freshly created order together with its version-1 snapshot.
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Appends one snapshot and advances the cached current-version fields in
    /// a single transaction, guarded by a compare-and-swap on
    /// `expected_version`. A concurrent writer that got there first surfaces
    /// as [`RepositoryError::VersionConflict`], which callers may retry.
    async fn append_snapshot(
        &self,
        id: &OrderId,
        expected_version: u32,
        snapshot: &OrderSnapshot,
    ) -> Result<(), RepositoryError>;

    /// Returns false when the order does not exist.
    async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Removes the order and all of its snapshots. Returns false when the
    /// order does not exist.
    async fn delete(&self, id: &OrderId) -> Result<bool, RepositoryError>;
}
