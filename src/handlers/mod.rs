pub mod analytics;
pub mod checkout;
pub mod common;
pub mod coupons;
pub mod payment_webhooks;

use std::sync::Arc;

use crate::config::CheckoutPolicy;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::repositories::{
    CatalogStore, CouponRepository, CouponStore, OrderRepository, OrderStore, ProductRepository,
    SalesRepository, SalesStore,
};
use crate::services::{
    analytics::AnalyticsService, cart::CartService, checkout::CheckoutSessionBuilder,
    coupons::CouponService, reconciler::OrderReconciler,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutSessionBuilder>,
    pub reconciler: Arc<OrderReconciler>,
    pub coupons: Arc<CouponService>,
    pub analytics: Arc<AnalyticsService>,
}

impl AppServices {
    /// Wire the services over the SeaORM repositories.
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        policy: CheckoutPolicy,
        event_sender: EventSender,
    ) -> Self {
        let catalog: Arc<dyn CatalogStore> = Arc::new(ProductRepository::new(db_pool.clone()));
        let coupons: Arc<dyn CouponStore> = Arc::new(CouponRepository::new(db_pool.clone()));
        let orders: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(db_pool.clone()));
        let sales: Arc<dyn SalesStore> = Arc::new(SalesRepository::new(db_pool));

        let reconciler = OrderReconciler::new(
            gateway.clone(),
            coupons.clone(),
            orders,
            policy.currency.clone(),
            event_sender.clone(),
        );
        let checkout =
            CheckoutSessionBuilder::new(coupons.clone(), gateway, policy, event_sender);

        Self {
            cart: Arc::new(CartService::new(catalog)),
            checkout: Arc::new(checkout),
            reconciler: Arc::new(reconciler),
            coupons: Arc::new(CouponService::new(coupons)),
            analytics: Arc::new(AnalyticsService::new(sales)),
        }
    }
}
