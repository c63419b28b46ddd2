#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    middleware, Router,
};
use chrono::Utc;
use sea_orm::{ActiveValue::Set, DatabaseConnection};
use serde_json::Value;
use storefront_api::{
    auth::{USER_ID_HEADER, USER_ROLES_HEADER},
    config::{AppConfig, CheckoutPolicy},
    db,
    entities::product,
    errors::ServiceError,
    events,
    gateway::{
        CreateSessionRequest, CreatedSession, PaymentGateway, PaymentStatus, SessionMetadata,
        SessionStatus,
    },
    handlers::AppServices,
    repositories::{CouponRepository, ProductRepository},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

#[derive(Clone, Debug)]
struct FakeSession {
    status: PaymentStatus,
    amount_total: i64,
    currency: String,
    metadata: BTreeMap<String, String>,
}

/// In-process payment gateway. Sessions start unpaid; tests flip them with [`FakeGateway::mark_paid`].
#[derive(Default)]
pub struct FakeGateway {
    sessions: Mutex<HashMap<String, FakeSession>>,
    requests: Mutex<Vec<CreateSessionRequest>>,
    next_id: AtomicUsize,
    status_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn mark_paid(&self, session_id: &str) {
        self.set_status(session_id, PaymentStatus::Paid);
    }

    /// Registers a paid session created outside the storefront, e.g. by a payment link.
    pub fn insert_foreign_session(&self, session_id: &str, amount_total: i64) {
        let mut metadata = BTreeMap::new();
        metadata.insert("payment_link".to_string(), "plink_1".to_string());
        self.sessions.lock().unwrap().insert(
            session_id.to_string(),
            FakeSession {
                status: PaymentStatus::Paid,
                amount_total,
                currency: "usd".to_string(),
                metadata,
            },
        );
    }

    pub fn set_status(&self, session_id: &str, status: PaymentStatus) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .get_mut(session_id)
            .expect("unknown fake session")
            .status = status;
    }

    /// Last request passed to `create_session`.
    pub fn last_request(&self) -> Option<CreateSessionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn sessions_created(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreatedSession, ServiceError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("cs_test_{}", n);
        self.sessions.lock().unwrap().insert(
            session_id.clone(),
            FakeSession {
                status: PaymentStatus::Unpaid,
                amount_total: request.total_minor_units,
                currency: request.currency.clone(),
                metadata: request.metadata.to_map()?,
            },
        );
        self.requests.lock().unwrap().push(request);
        Ok(CreatedSession {
            redirect_url: format!("https://pay.example.test/{}", session_id),
            session_id,
        })
    }

    async fn get_session_status(&self, session_id: &str) -> Result<SessionStatus, ServiceError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let session = self
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("session {}", session_id)))?;
        let metadata: HashMap<String, String> = session.metadata.into_iter().collect();
        Ok(SessionStatus {
            session_id: session_id.to_string(),
            status: session.status,
            amount_paid_minor_units: if session.status.is_paid() {
                session.amount_total
            } else {
                0
            },
            currency: Some(session.currency),
            metadata: SessionMetadata::from_map(&metadata)?,
        })
    }
}

/// Application state over a fresh in-memory SQLite database and a [`FakeGateway`].
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<FakeGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(FakeGateway::default());
        let services = AppServices::new(
            db_arc.clone(),
            gateway.clone(),
            cfg.checkout_policy(),
            event_sender.clone(),
        );

        let state = AppState {
            db: db_arc.clone(),
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .layer(middleware::from_fn(
                storefront_api::middleware_helpers::request_id_middleware,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            db: db_arc,
            gateway,
            _event_task: event_task,
        }
    }

    pub fn policy(&self) -> CheckoutPolicy {
        self.state.config.checkout_policy()
    }

    pub fn coupons(&self) -> CouponRepository {
        CouponRepository::new(self.db.clone())
    }

    pub async fn seed_product(&self, name: &str, price_minor_units: i64) -> Uuid {
        let id = Uuid::new_v4();
        ProductRepository::new(self.db.clone())
            .create(product::ActiveModel {
                id: Set(id),
                name: Set(name.to_string()),
                description: Set(None),
                price_minor_units: Set(price_minor_units),
                image_url: Set(None),
                category: Set(None),
                is_featured: Set(false),
                created_at: Set(Utc::now()),
            })
            .await
            .expect("seed product");
        id
    }

    /// Send a request as `user` (if any) carrying `roles`.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        user: Option<Uuid>,
        roles: &[&str],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user {
            builder = builder.header(USER_ID_HEADER, user_id.to_string());
        }
        if !roles.is_empty() {
            builder = builder.header(USER_ROLES_HEADER, roles.join(","));
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).expect("build request")).await
    }

    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&body).expect("response is json")
}
