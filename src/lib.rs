//! SaaSKit Web - Server Core for Subscription Products
//!
//! This crate provides the server side of a subscription web product: a
//! per-identifier rate limiter guarding API routes and a Stripe webhook
//! reconciler that mirrors provider subscription state into local records,
//! plus the JSON API built on them.
//!
//! # Features
//!
//! - **Rate Limiting**: process-local fixed-window counters keyed by caller and route
//! - **Webhook Reconciliation**: signed, idempotent, last-write-wins subscription updates
//! - **Billing**: plan catalog, hosted checkout and billing-portal sessions
//! - **Projects API**: owner-scoped CRUD with validation
//!
//! # Architecture
//!
//! ```text
//! Browser ──▶ /api/* ──▶ FixedWindowLimiter ──▶ handler ──▶ ProjectStore
//!                                                  │
//!                                                  ▼
//! Stripe ──▶ /api/stripe/webhook ──▶ SubscriptionReconciler ──▶ SubscriptionStore
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use saaskit_web::app::{build_router, AppState};
//! use saaskit_web::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = AppState::from_config(AppConfig::from_env()?);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await?;
//!     axum::serve(listener, build_router(state)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

#[allow(missing_docs)]
pub mod app;
#[allow(missing_docs)]
pub mod auth;
pub mod billing;
#[allow(missing_docs)]
pub mod config;
pub mod cors;
pub mod error;
#[allow(missing_docs)]
pub mod handlers;
#[allow(missing_docs)]
pub mod projects;
pub mod rate_limit;
pub mod stripe;

// Re-exports for convenience
pub use app::{build_router, AppState, AppStateBuilder};
pub use error::ApiError;
pub use rate_limit::{FixedWindowLimiter, RateLimitDecision};
pub use stripe::{SubscriptionReconciler, WebhookAck};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
