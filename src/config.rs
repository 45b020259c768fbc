//! Application configuration.
//!
//! All settings come from environment variables; secrets are never logged and
//! are redacted from `Debug` output.
//!
//! # Environment Variables
//!
//! - `APP_URL`: public URL of the front end (default: `http://localhost:3000`)
//! - `STRIPE_SECRET_KEY`: API key for outbound calls (default: `sk_test_placeholder`)
//! - `STRIPE_WEBHOOK_SECRET` (required): webhook signing secret
//! - `STRIPE_WEBHOOK_TOLERANCE_SECS`: signature timestamp tolerance (default: 300)
//! - `STRIPE_API_BASE`: API endpoint (default: `https://api.stripe.com`)
//! - `STRIPE_PRO_PRICE_ID`, `STRIPE_ENTERPRISE_PRICE_ID`: checkout prices
//! - `SAASKIT_RATE_LIMIT_SWEEP_SECS`: limiter sweep period (default: 300)
//! - `SAASKIT_API_TOKENS`: `token:user_id:email[:role[:org_id]]`, comma-separated

use std::env;
use std::fmt;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::auth::{parse_token_grants, TokenGrant};
use crate::billing::plans::{ENTERPRISE_PRICE_PLACEHOLDER, PRO_PRICE_PLACEHOLDER};
use crate::billing::PlanCatalog;
use crate::error::ConfigError;
use crate::rate_limit::DEFAULT_SWEEP_INTERVAL;
use crate::stripe::client::DEFAULT_API_BASE;
use crate::stripe::StripeWebhookConfig;

/// Default front-end URL
pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

/// Secret key used when none is configured; outbound calls will be refused
pub const PLACEHOLDER_SECRET_KEY: &str = "sk_test_placeholder";

/// Everything the server needs at startup
#[derive(Clone)]
pub struct AppConfig {
    pub app_url: Url,
    stripe_secret_key: String,
    pub stripe_api_base: Url,
    pub pro_price_id: String,
    pub enterprise_price_id: String,
    pub webhook: StripeWebhookConfig,
    pub sweep_interval: Duration,
    pub api_tokens: Vec<TokenGrant>,
}

impl AppConfig {
    /// Defaults around an explicit webhook secret
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            app_url: default_url(DEFAULT_APP_URL),
            stripe_secret_key: PLACEHOLDER_SECRET_KEY.to_string(),
            stripe_api_base: default_url(DEFAULT_API_BASE),
            pro_price_id: PRO_PRICE_PLACEHOLDER.to_string(),
            enterprise_price_id: ENTERPRISE_PRICE_PLACEHOLDER.to_string(),
            webhook: StripeWebhookConfig::new(webhook_secret),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            api_tokens: Vec::new(),
        }
    }

    /// Load from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let webhook = StripeWebhookConfig::from_env()?;
        let mut config = Self::new(String::new());
        config.webhook = webhook;

        if let Some(raw) = optional_var("APP_URL") {
            config.app_url = parse_url("APP_URL", &raw)?;
        }
        if let Some(raw) = optional_var("STRIPE_API_BASE") {
            config.stripe_api_base = parse_url("STRIPE_API_BASE", &raw)?;
        }

        match optional_var("STRIPE_SECRET_KEY") {
            Some(key) => config.stripe_secret_key = key,
            None => warn!("STRIPE_SECRET_KEY not set; checkout and portal calls will fail"),
        }

        if let Some(price) = optional_var("STRIPE_PRO_PRICE_ID") {
            config.pro_price_id = price;
        }
        if let Some(price) = optional_var("STRIPE_ENTERPRISE_PRICE_ID") {
            config.enterprise_price_id = price;
        }

        if let Some(raw) = optional_var("SAASKIT_RATE_LIMIT_SWEEP_SECS") {
            let secs = raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                var: "SAASKIT_RATE_LIMIT_SWEEP_SECS",
                message: e.to_string(),
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "SAASKIT_RATE_LIMIT_SWEEP_SECS",
                    message: "sweep interval cannot be 0".to_string(),
                });
            }
            config.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(raw) = optional_var("SAASKIT_API_TOKENS") {
            config.api_tokens = parse_token_grants(&raw)?;
        }
        if config.api_tokens.is_empty() {
            warn!("SAASKIT_API_TOKENS not set; every API request will be unauthenticated");
        }

        info!(
            app_url = %config.app_url,
            api_tokens = config.api_tokens.len(),
            sweep_secs = config.sweep_interval.as_secs(),
            "Configuration loaded"
        );

        Ok(config)
    }

    pub fn with_app_url(mut self, app_url: Url) -> Self {
        self.app_url = app_url;
        self
    }

    pub fn with_token(mut self, grant: TokenGrant) -> Self {
        self.api_tokens.push(grant);
        self
    }

    /// Key for outbound provider calls
    pub fn stripe_secret_key(&self) -> &str {
        &self.stripe_secret_key
    }

    /// Plan catalog priced from this configuration
    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog::new(self.pro_price_id.clone(), self.enterprise_price_id.clone())
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_url", &self.app_url.as_str())
            .field("stripe_secret_key", &"<redacted>")
            .field("stripe_api_base", &self.stripe_api_base.as_str())
            .field("pro_price_id", &self.pro_price_id)
            .field("enterprise_price_id", &self.enterprise_price_id)
            .field("webhook", &self.webhook)
            .field("sweep_interval", &self.sweep_interval)
            .field("api_tokens", &self.api_tokens.len())
            .finish()
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        var,
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            var,
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

fn default_url(raw: &'static str) -> Url {
    // Compile-time constants above are valid absolute URLs.
    Url::parse(raw).unwrap_or_else(|e| unreachable!("invalid built-in URL {raw}: {e}"))
}
