//! Application state and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::auth::{IdentityProvider, StaticTokenIdentity};
use crate::billing::{InMemorySubscriptionStore, PlanCatalog, SubscriptionStore};
use crate::config::AppConfig;
use crate::cors::cors_layer;
use crate::error::ApiError;
use crate::handlers::{auth, billing, projects, status};
use crate::projects::{InMemoryProjectStore, ProjectStore};
use crate::rate_limit::{FixedWindowLimiter, RateLimitDecision, DEFAULT_WINDOW};
use crate::stripe::{self, PaymentProvider, StripeClient, SubscriptionReconciler};

/// Everything a handler can reach; cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub reconciler: Arc<SubscriptionReconciler>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub payments: Arc<dyn PaymentProvider>,
    pub plans: Arc<PlanCatalog>,
    pub metrics: Arc<status::ServiceMetrics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the default in-memory stores, static-token identity and Stripe
    /// client from `config`
    pub fn from_config(config: AppConfig) -> Self {
        AppStateBuilder::new(config).build()
    }

    /// Consult the limiter for `key`, refusing the request when over budget
    pub fn throttle(
        &self,
        route: &'static str,
        key: &str,
        limit: u32,
    ) -> Result<RateLimitDecision, ApiError> {
        let decision = self.limiter.check(key, limit, DEFAULT_WINDOW);
        if decision.is_allowed() {
            return Ok(decision);
        }

        debug!(route, limit, "Request throttled");
        self.metrics.record_throttled(route);
        Err(ApiError::RateLimited {
            decision,
            now: self.limiter.now(),
        })
    }
}

/// Builder for swapping collaborators, mostly in tests
pub struct AppStateBuilder {
    config: AppConfig,
    limiter: Option<Arc<FixedWindowLimiter>>,
    subscriptions: Option<Arc<dyn SubscriptionStore>>,
    projects: Option<Arc<dyn ProjectStore>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    payments: Option<Arc<dyn PaymentProvider>>,
}

impl AppStateBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            limiter: None,
            subscriptions: None,
            projects: None,
            identity: None,
            payments: None,
        }
    }

    pub fn limiter(mut self, limiter: Arc<FixedWindowLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn subscriptions(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.subscriptions = Some(store);
        self
    }

    pub fn projects(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.projects = Some(store);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn payments(mut self, payments: Arc<dyn PaymentProvider>) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn build(self) -> AppState {
        let config = self.config;

        let subscriptions = self
            .subscriptions
            .unwrap_or_else(|| Arc::new(InMemorySubscriptionStore::new()));
        let identity = self.identity.unwrap_or_else(|| {
            Arc::new(StaticTokenIdentity::new(config.api_tokens.iter().cloned()))
        });
        let payments = self.payments.unwrap_or_else(|| {
            Arc::new(StripeClient::new(
                config.stripe_secret_key(),
                config.stripe_api_base.clone(),
            ))
        });

        AppState {
            limiter: self
                .limiter
                .unwrap_or_else(|| Arc::new(FixedWindowLimiter::new())),
            reconciler: Arc::new(SubscriptionReconciler::new(
                &config.webhook,
                subscriptions.clone(),
            )),
            subscriptions,
            projects: self
                .projects
                .unwrap_or_else(|| Arc::new(InMemoryProjectStore::new())),
            identity,
            payments,
            plans: Arc::new(config.plan_catalog()),
            metrics: Arc::new(status::ServiceMetrics::new()),
            config: Arc::new(config),
        }
    }
}

/// Every route, with CORS and request timing applied
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.app_url);
    let metrics = state.metrics.clone();

    Router::new()
        .route("/health", get(status::health_handler))
        .route("/ready", get(status::readiness_handler))
        .route("/status", get(status::status_handler))
        .route("/api/auth", get(auth::current_user_handler))
        .route("/api/plans", get(billing::list_plans_handler))
        .route("/api/billing/subscription", get(billing::subscription_handler))
        .route("/api/stripe/checkout", post(billing::checkout_handler))
        .route("/api/stripe/portal", post(billing::portal_handler))
        .route("/api/stripe/webhook", post(stripe::handler::stripe_webhook_handler))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .layer(cors)
        .layer(middleware::from_fn_with_state(metrics, status::track_latency))
        .with_state(state)
}

/// Start the limiter's background sweep; it stops once `state` is dropped
pub fn spawn_background_tasks(state: &AppState, sweep_every: Duration) -> JoinHandle<()> {
    FixedWindowLimiter::spawn_sweeper(&state.limiter, sweep_every)
}
