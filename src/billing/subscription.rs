//! Subscription records mirrored from the payment provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plans::PlanTier;

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    /// Map a provider status string onto the tracked set.
    ///
    /// Provider statuses outside the set (`incomplete`, `unpaid`, `paused`, ...)
    /// return `None`.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "active" => Some(Self::Active),
            "trialing" => Some(Self::Trialing),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }
}

/// One user's subscription.
///
/// Keyed by `user_id`. A canceled subscription always sits on the free tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    pub external_customer_ref: Option<String>,
    pub external_subscription_ref: Option<String>,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written when a checkout completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpsert {
    pub user_id: String,
    pub external_customer_ref: Option<String>,
    pub external_subscription_ref: Option<String>,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
}

/// Partial update applied to an existing record; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPatch {
    pub plan: Option<PlanTier>,
    pub status: Option<SubscriptionStatus>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    /// Build a new record from a checkout upsert
    pub fn from_upsert(upsert: SubscriptionUpsert, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            user_id: upsert.user_id,
            external_customer_ref: upsert.external_customer_ref,
            external_subscription_ref: upsert.external_subscription_ref,
            plan: upsert.plan,
            status: upsert.status,
            current_period_end: None,
            created_at: now,
            updated_at: now,
        };
        record.enforce_canceled_tier();
        record
    }

    /// Overwrite the checkout-owned fields, keeping history fields intact
    pub fn apply_upsert(&mut self, upsert: SubscriptionUpsert, now: DateTime<Utc>) {
        self.external_customer_ref = upsert.external_customer_ref;
        self.external_subscription_ref = upsert.external_subscription_ref;
        self.plan = upsert.plan;
        self.status = upsert.status;
        self.updated_at = now;
        self.enforce_canceled_tier();
    }

    /// Apply a partial update
    pub fn apply_patch(&mut self, patch: &SubscriptionPatch, now: DateTime<Utc>) {
        if let Some(plan) = patch.plan {
            self.plan = plan;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(period_end) = patch.current_period_end {
            self.current_period_end = Some(period_end);
        }
        self.updated_at = now;
        self.enforce_canceled_tier();
    }

    fn enforce_canceled_tier(&mut self) {
        if self.status == SubscriptionStatus::Canceled {
            self.plan = PlanTier::Free;
        }
    }
}
