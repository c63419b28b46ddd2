// Checkout core
pub mod checkout;
pub mod pricing;
pub mod reconciler;

// Cart assembly
pub mod cart;

// Coupons and reporting
pub mod analytics;
pub mod coupons;
