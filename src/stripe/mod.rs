// Provider-facing wire types mirror Stripe's field names.
#![allow(missing_docs)]

//! Stripe Integration
//!
//! Inbound: signed webhook deliveries are verified, decoded into a closed set
//! of billing events and reconciled into the subscription store.
//!
//! Outbound: hosted checkout and billing-portal sessions through the REST API.
//!
//! # Architecture
//!
//! ```text
//! POST /api/stripe/webhook
//!        |
//!        v
//! SignatureVerifier --(400)--> reject, nothing written
//!        |
//!        v
//! StripeEvent -> BillingEvent --(400)--> reject
//!        |
//!        v
//! SubscriptionReconciler -> SubscriptionStore --(503)--> provider retries
//!        |
//!        v
//!  200 {"received": true}
//! ```
//!
//! # Security
//!
//! - Signing secret loaded from the environment, redacted from `Debug`
//! - Constant-time signature comparison
//! - Signature checked against the raw body before parsing

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod reconciler;
pub mod signature;

pub use client::{
    CheckoutSessionRequest, HostedSession, PaymentProvider, PortalSessionRequest, StripeClient,
};
pub use config::StripeWebhookConfig;
pub use error::{StripeWebhookError, StripeWebhookResult};
pub use events::{
    BillingEvent, CheckoutSessionObject, ObjectRef, StripeEvent, StripeEventType,
    SubscriptionObject,
};
pub use reconciler::{ReconcileOutcome, SubscriptionReconciler, WebhookAck};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
