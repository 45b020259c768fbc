//! Webhook configuration.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// Default allowed age of a signature timestamp (Stripe's own default)
pub const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

/// Settings for verifying inbound webhook deliveries.
///
/// The signing secret is loaded from the environment and never printed.
#[derive(Clone)]
pub struct StripeWebhookConfig {
    webhook_secret: String,
    /// Maximum accepted age of the signature timestamp; zero disables the check
    pub signature_tolerance: Duration,
}

impl StripeWebhookConfig {
    /// Build a config from an explicit secret
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            signature_tolerance: DEFAULT_SIGNATURE_TOLERANCE,
        }
    }

    /// Load from the environment
    ///
    /// # Environment Variables
    ///
    /// - `STRIPE_WEBHOOK_SECRET` (required): signing secret (`whsec_...`)
    /// - `STRIPE_WEBHOOK_TOLERANCE_SECS` (optional): timestamp tolerance (default: 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        let webhook_secret = env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| ConfigError::MissingVar("STRIPE_WEBHOOK_SECRET"))?;

        if webhook_secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "STRIPE_WEBHOOK_SECRET",
                message: "secret cannot be empty".to_string(),
            });
        }

        let signature_tolerance = match env::var("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue {
                    var: "STRIPE_WEBHOOK_TOLERANCE_SECS",
                    message: e.to_string(),
                }
            })?),
            Err(_) => DEFAULT_SIGNATURE_TOLERANCE,
        };

        Ok(Self {
            webhook_secret,
            signature_tolerance,
        })
    }

    /// Override the timestamp tolerance
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.signature_tolerance = tolerance;
        self
    }

    /// The signing secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }
}

impl fmt::Debug for StripeWebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeWebhookConfig")
            .field("webhook_secret", &"<redacted>")
            .field("signature_tolerance", &self.signature_tolerance)
            .finish()
    }
}
