//! Subscription Reconciliation
//!
//! Turns verified provider deliveries into subscription store writes.
//!
//! ```text
//! raw body + stripe-signature
//!       |
//!       v
//! [Verify Signature] --> mismatch / stale --> Reject (400)
//!       |
//!       v
//! [Decode Event] --> unparseable --> Reject (400)
//!       |
//!       v
//! [Apply] --> store error --> Reject (503, provider retries)
//!       |
//!       v
//!      Ack (200)
//! ```
//!
//! Every write is keyed (user id for checkouts, subscription reference for
//! updates and deletions), so re-delivery of the same event converges on the
//! same record. Deliveries that arrive out of order resolve as last write wins.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::billing::{
    PlanTier, SubscriptionPatch, SubscriptionStatus, SubscriptionStore, SubscriptionUpsert,
};
use crate::stripe::config::StripeWebhookConfig;
use crate::stripe::error::{StripeWebhookError, StripeWebhookResult};
use crate::stripe::events::{
    BillingEvent, CheckoutSessionObject, ObjectRef, StripeEvent, SubscriptionObject,
};
use crate::stripe::signature::SignatureVerifier;

/// What applying an event did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Checkout wrote the user's record
    Upserted { user_id: String },
    /// Subscription record patched
    Updated { user_id: String },
    /// Subscription record moved to canceled/free
    Canceled { user_id: String },
    /// No record carries the subscription reference
    NotFound { subscription_ref: String },
    /// Event recognised but carried nothing to apply
    Skipped { reason: &'static str },
    /// Event type outside the handled set
    Unhandled { event_type: String },
}

impl ReconcileOutcome {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upserted { .. } => "upserted",
            Self::Updated { .. } => "updated",
            Self::Canceled { .. } => "canceled",
            Self::NotFound { .. } => "not_found",
            Self::Skipped { .. } => "skipped",
            Self::Unhandled { .. } => "unhandled",
        }
    }

    /// Whether the store was written
    pub fn mutated(&self) -> bool {
        matches!(
            self,
            Self::Upserted { .. } | Self::Updated { .. } | Self::Canceled { .. }
        )
    }
}

/// Acknowledgement for an accepted delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookAck {
    pub event_id: String,
    pub event_type: String,
    pub outcome: ReconcileOutcome,
}

/// Applies provider subscription events to a [`SubscriptionStore`]
pub struct SubscriptionReconciler {
    verifier: SignatureVerifier,
    store: Arc<dyn SubscriptionStore>,
}

impl std::fmt::Debug for SubscriptionReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionReconciler")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl SubscriptionReconciler {
    /// Create a reconciler writing through `store`
    pub fn new(config: &StripeWebhookConfig, store: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            verifier: SignatureVerifier::new(config),
            store,
        }
    }

    /// The signature verifier in use
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Verify, decode and apply one delivery.
    ///
    /// Nothing is written unless the signature verifies.
    pub async fn handle_provider_event(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> StripeWebhookResult<WebhookAck> {
        let signature = signature.ok_or(StripeWebhookError::MissingSignature)?;
        self.verifier.verify(payload, signature)?;
        self.dispatch(payload).await
    }

    /// [`handle_provider_event`](Self::handle_provider_event) with an explicit clock reading
    pub async fn handle_provider_event_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> StripeWebhookResult<WebhookAck> {
        let signature = signature.ok_or(StripeWebhookError::MissingSignature)?;
        self.verifier.verify_at(payload, signature, now)?;
        self.dispatch(payload).await
    }

    async fn dispatch(&self, payload: &[u8]) -> StripeWebhookResult<WebhookAck> {
        let event = StripeEvent::from_bytes(payload)?;
        let event_id = event.id.clone();
        let event_type = event.event_type.clone();

        let billing_event = event.into_billing_event()?;
        let kind = billing_event.kind();
        let outcome = self.apply(billing_event).await?;

        info!(
            event_id = %event_id,
            event_type = %event_type,
            kind,
            outcome = outcome.as_str(),
            "Webhook event reconciled"
        );

        Ok(WebhookAck {
            event_id,
            event_type,
            outcome,
        })
    }

    /// Apply an already verified event
    pub async fn apply(&self, event: BillingEvent) -> StripeWebhookResult<ReconcileOutcome> {
        match event {
            BillingEvent::CheckoutCompleted(session) => self.on_checkout_completed(session).await,
            BillingEvent::SubscriptionUpdated(sub) => self.on_subscription_updated(sub).await,
            BillingEvent::SubscriptionDeleted(sub) => self.on_subscription_deleted(sub).await,
            BillingEvent::Unhandled { event_type } => {
                info!(event_type = %event_type, "Unhandled event type");
                Ok(ReconcileOutcome::Unhandled { event_type })
            }
        }
    }

    async fn on_checkout_completed(
        &self,
        session: CheckoutSessionObject,
    ) -> StripeWebhookResult<ReconcileOutcome> {
        let (Some(user_id), Some(plan_id)) = (session.user_id(), session.plan_id()) else {
            debug!(session_id = %session.id, "Checkout session without user/plan metadata");
            return Ok(ReconcileOutcome::Skipped {
                reason: "missing_metadata",
            });
        };

        let plan = match plan_id.parse::<PlanTier>() {
            Ok(plan) => plan,
            Err(e) => {
                warn!(session_id = %session.id, user_id = %user_id, error = %e, "Checkout for unknown plan");
                return Ok(ReconcileOutcome::Skipped {
                    reason: "unknown_plan",
                });
            }
        };

        let upsert = SubscriptionUpsert {
            user_id: user_id.to_string(),
            external_customer_ref: session.customer.as_ref().map(|r| r.id().to_string()),
            external_subscription_ref: session.subscription.as_ref().map(|r| r.id().to_string()),
            plan,
            status: SubscriptionStatus::Active,
        };

        let record = self.store.upsert_by_user(upsert).await?;
        info!(user_id = %record.user_id, plan = %record.plan, "Subscription activated");

        Ok(ReconcileOutcome::Upserted {
            user_id: record.user_id,
        })
    }

    async fn on_subscription_updated(
        &self,
        sub: SubscriptionObject,
    ) -> StripeWebhookResult<ReconcileOutcome> {
        let status = match sub.status.as_deref() {
            Some(raw) => {
                let mapped = SubscriptionStatus::from_provider(raw);
                if mapped.is_none() {
                    debug!(subscription_id = %sub.id, status = raw, "Untracked provider status, keeping current");
                }
                mapped
            }
            None => None,
        };

        let patch = SubscriptionPatch {
            plan: None,
            status,
            current_period_end: sub.period_end(),
        };

        self.patch_by_ref(&sub.id, patch, customer_id(&sub.customer)).await
    }

    async fn on_subscription_deleted(
        &self,
        sub: SubscriptionObject,
    ) -> StripeWebhookResult<ReconcileOutcome> {
        let patch = SubscriptionPatch {
            plan: Some(PlanTier::Free),
            status: Some(SubscriptionStatus::Canceled),
            current_period_end: None,
        };

        self.patch_by_ref(&sub.id, patch, customer_id(&sub.customer)).await
    }

    async fn patch_by_ref(
        &self,
        subscription_ref: &str,
        patch: SubscriptionPatch,
        customer: Option<&str>,
    ) -> StripeWebhookResult<ReconcileOutcome> {
        match self
            .store
            .update_by_subscription_ref(subscription_ref, patch)
            .await?
        {
            Some(record) if record.status == SubscriptionStatus::Canceled => {
                info!(user_id = %record.user_id, subscription_id = subscription_ref, "Subscription canceled");
                Ok(ReconcileOutcome::Canceled {
                    user_id: record.user_id,
                })
            }
            Some(record) => {
                info!(
                    user_id = %record.user_id,
                    subscription_id = subscription_ref,
                    status = record.status.as_str(),
                    "Subscription updated"
                );
                Ok(ReconcileOutcome::Updated {
                    user_id: record.user_id,
                })
            }
            None => {
                warn!(
                    subscription_id = subscription_ref,
                    customer_id = customer.unwrap_or("-"),
                    "No subscription record for reference"
                );
                Ok(ReconcileOutcome::NotFound {
                    subscription_ref: subscription_ref.to_string(),
                })
            }
        }
    }
}

fn customer_id(customer: &Option<ObjectRef>) -> Option<&str> {
    customer.as_ref().map(ObjectRef::id)
}
