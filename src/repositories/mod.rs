use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::product;
use crate::errors::ServiceError;
use crate::models::{Coupon, NewOrder, Order};

pub mod coupon_repository;
pub mod order_repository;
pub mod product_repository;
pub mod sales_repository;

pub use coupon_repository::CouponRepository;
pub use order_repository::OrderRepository;
pub use product_repository::ProductRepository;
pub use sales_repository::SalesRepository;

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Read access to catalog products.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError>;
}

/// Durable per-user discount codes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Active, unexpired coupon with this code owned by `user_id`.
    async fn find_active(&self, code: &str, user_id: Uuid) -> Result<Option<Coupon>, ServiceError>;

    /// Flips `active` from true to false in one conditional update.
    /// Returns false when no active coupon matched.
    async fn deactivate(&self, code: &str, user_id: Uuid) -> Result<bool, ServiceError>;

    async fn create(
        &self,
        user_id: Uuid,
        discount_percent: u8,
        expires_at: DateTime<Utc>,
    ) -> Result<Coupon, ServiceError>;

    /// Newest active, unexpired coupon of `user_id`.
    async fn latest_active(&self, user_id: Uuid) -> Result<Option<Coupon>, ServiceError>;
}

/// Durable record of completed purchases.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<Order>, ServiceError>;

    /// Persists the order and its lines atomically.
    /// A second order for the same payment reference fails with
    /// `ServiceError::DuplicateConfirmation`.
    async fn insert(&self, order: NewOrder) -> Result<Order, ServiceError>;
}

/// Aggregate sales figures.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SalesTotals {
    pub users: u64,
    pub products: u64,
    pub total_sales: u64,
    pub total_revenue_minor_units: i64,
}

/// Read-only aggregates over orders and products.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SalesStore: Send + Sync {
    async fn totals(&self) -> Result<SalesTotals, ServiceError>;

    /// `(created_at, total_minor_units)` of every order created at or after `since`.
    async fn orders_since(&self, since: DateTime<Utc>)
        -> Result<Vec<(DateTime<Utc>, i64)>, ServiceError>;
}
