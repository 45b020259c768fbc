//! Stripe Event Types
//!
//! The envelope Stripe posts to the webhook endpoint, and the closed set of
//! billing events the reconciler acts on. Every other event type collapses
//! into [`BillingEvent::Unhandled`].

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::stripe::error::{StripeWebhookError, StripeWebhookResult};

/// Stripe event types we handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StripeEventType {
    CheckoutSessionCompleted,
    SubscriptionUpdated,
    SubscriptionDeleted,
    Unknown,
}

impl FromStr for StripeEventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            _ => Self::Unknown,
        })
    }
}

impl StripeEventType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::Unknown => "unknown",
        }
    }
}

/// Generic Stripe event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeEvent {
    /// Unique identifier for the event
    pub id: String,

    /// Type of event
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time of event creation (Unix timestamp)
    #[serde(default)]
    pub created: i64,

    /// Whether this is a live mode event
    #[serde(default)]
    pub livemode: bool,

    /// Object containing event data
    pub data: EventData,
}

/// Event data container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// The object the event is about (checkout session, subscription, ...)
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Parse from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> StripeWebhookResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StripeWebhookError::InvalidPayload(e.to_string()))
    }

    /// Get the typed event type
    pub fn typed_event_type(&self) -> StripeEventType {
        match StripeEventType::from_str(&self.event_type) {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }

    /// Decode the data object into the billing event it carries
    pub fn into_billing_event(self) -> StripeWebhookResult<BillingEvent> {
        let event = match self.typed_event_type() {
            StripeEventType::CheckoutSessionCompleted => {
                BillingEvent::CheckoutCompleted(decode_object(self.data.object)?)
            }
            StripeEventType::SubscriptionUpdated => {
                BillingEvent::SubscriptionUpdated(decode_object(self.data.object)?)
            }
            StripeEventType::SubscriptionDeleted => {
                BillingEvent::SubscriptionDeleted(decode_object(self.data.object)?)
            }
            StripeEventType::Unknown => BillingEvent::Unhandled {
                event_type: self.event_type,
            },
        };
        Ok(event)
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> StripeWebhookResult<T> {
    serde_json::from_value(object).map_err(|e| StripeWebhookError::InvalidPayload(e.to_string()))
}

/// Billing events that drive subscription state
#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    /// `checkout.session.completed`
    CheckoutCompleted(CheckoutSessionObject),
    /// `customer.subscription.updated`
    SubscriptionUpdated(SubscriptionObject),
    /// `customer.subscription.deleted`
    SubscriptionDeleted(SubscriptionObject),
    /// Any other event type; acknowledged without effect
    Unhandled {
        /// Raw provider event type
        event_type: String,
    },
}

impl BillingEvent {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted(_) => "checkout_completed",
            Self::SubscriptionUpdated(_) => "subscription_updated",
            Self::SubscriptionDeleted(_) => "subscription_deleted",
            Self::Unhandled { .. } => "unhandled",
        }
    }
}

/// A reference Stripe may send either as a bare id or as an expanded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    Id(String),
    Object { id: String },
}

impl ObjectRef {
    /// The referenced id
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

/// Checkout session object (the fields reconciliation reads)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSessionObject {
    /// Session ID (cs_...)
    pub id: String,
    /// Customer created or reused by the session
    #[serde(default)]
    pub customer: Option<ObjectRef>,
    /// Subscription created by the session
    #[serde(default)]
    pub subscription: Option<ObjectRef>,
    /// Metadata attached when the session was created
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    /// `metadata.user_id`, if present and non-empty
    pub fn user_id(&self) -> Option<&str> {
        self.metadata_value("user_id")
    }

    /// `metadata.plan_id`, if present and non-empty
    pub fn plan_id(&self) -> Option<&str> {
        self.metadata_value("plan_id")
    }

    fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Stripe subscription object (the fields reconciliation reads)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionObject {
    /// Subscription ID (sub_...)
    pub id: String,
    /// Customer ID (cus_...)
    #[serde(default)]
    pub customer: Option<ObjectRef>,
    /// Provider status string
    #[serde(default)]
    pub status: Option<String>,
    /// Current billing period end (Unix timestamp)
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Billing cycle anchor (Unix timestamp)
    #[serde(default)]
    pub billing_cycle_anchor: Option<i64>,
    /// Subscription items
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

/// Subscription items container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// Individual subscription item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub id: Option<String>,
    /// Newer API versions report the period end per item
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

impl SubscriptionObject {
    /// End of the current billing period.
    ///
    /// Newer API versions moved `current_period_end` onto the items; when neither
    /// is present the billing cycle anchor stands in as an approximation.
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        let item_period_end = self
            .items
            .as_ref()
            .and_then(|items| items.data.first())
            .and_then(|item| item.current_period_end);

        self.current_period_end
            .or(item_period_end)
            .or(self.billing_cycle_anchor)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}
