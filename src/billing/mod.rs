// Field-level docs live on the provider-facing types in `stripe`.
#![allow(missing_docs)]

//! Billing Domain
//!
//! Plans, subscription records and the storage seam the webhook reconciler
//! writes through. Nothing here talks to the payment provider; provider
//! plumbing lives in [`crate::stripe`].

pub mod plans;
pub mod store;
pub mod subscription;

pub use plans::{Plan, PlanCatalog, PlanTier, UnknownPlan};
pub use store::{InMemorySubscriptionStore, SubscriptionStore};
pub use subscription::{
    SubscriptionPatch, SubscriptionRecord, SubscriptionStatus, SubscriptionUpsert,
};
