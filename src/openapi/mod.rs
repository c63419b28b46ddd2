use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Checkout, order reconciliation, coupons and sales analytics for the storefront.

## Identity

Authentication happens upstream. Requests carry the caller as `x-user-id`
(UUID) and roles as a comma separated `x-user-roles` header.

## Money

All amounts are integers in minor currency units (cents).

## Idempotency

`POST /checkout/confirm` and the payment webhook may be repeated; a paid
session produces exactly one order. `POST /checkout/session` accepts an
`Idempotency-Key` header that is forwarded to the payment gateway.

## Error Handling

```json
{
  "error": "Bad Request",
  "message": "Invalid request: cart must contain at least one line",
  "request_id": "req-abc123xyz",
  "timestamp": "2025-03-01T10:30:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Checkout sessions and order confirmation"),
        (name = "Coupons", description = "Per-user discount codes"),
        (name = "Analytics", description = "Sales reporting (admin)"),
        (name = "Payments", description = "Payment gateway callbacks"),
    ),
    paths(
        crate::handlers::checkout::create_checkout_session,
        crate::handlers::checkout::confirm_checkout_session,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::validate_coupon,
        crate::handlers::analytics::get_analytics,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::ResponseMeta,
            crate::models::Order,
            crate::models::OrderLine,
            crate::models::Coupon,
            crate::services::cart::CartItemInput,
            crate::services::checkout::SessionHandle,
            crate::services::analytics::AnalyticsReport,
            crate::services::analytics::AnalyticsSummary,
            crate::services::analytics::DailySales,
            crate::handlers::checkout::CreateSessionRequest,
            crate::handlers::checkout::ConfirmSessionRequest,
            crate::handlers::checkout::ConfirmSessionResponse,
            crate::handlers::coupons::ValidateCouponRequest,
            crate::handlers::coupons::ValidCoupon,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
