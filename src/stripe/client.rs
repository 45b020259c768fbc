//! Stripe REST client for hosted checkout and billing-portal sessions.
//!
//! Stripe's API takes `application/x-www-form-urlencoded` bodies with
//! bracketed keys for nested fields (`line_items[0][price]=...`).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::billing::PlanTier;
use crate::error::ProviderError;

/// Default Stripe API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// A provider-hosted page the browser is redirected to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

/// Parameters for a subscription checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub price_id: String,
    pub user_id: String,
    pub plan: PlanTier,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSessionRequest {
    /// Build a request whose redirect URLs point back into the app at `app_url`
    pub fn new(
        app_url: &Url,
        user_id: impl Into<String>,
        customer_email: Option<String>,
        plan: PlanTier,
        price_id: impl Into<String>,
    ) -> Self {
        Self {
            price_id: price_id.into(),
            user_id: user_id.into(),
            plan,
            customer_email,
            success_url: app_link(
                app_url,
                "/checkout/success?session_id={CHECKOUT_SESSION_ID}",
            ),
            cancel_url: app_link(app_url, "/checkout/cancel"),
        }
    }

    /// Form body for `POST /v1/checkout/sessions`.
    ///
    /// `user_id` and `plan_id` go into both the session and the subscription
    /// metadata; the webhook reconciler reads them back from the session.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][price]".to_string(), self.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];
        if let Some(email) = self.customer_email.as_ref().filter(|e| !e.is_empty()) {
            form.push(("customer_email".to_string(), email.clone()));
        }
        for prefix in ["metadata", "subscription_data[metadata]"] {
            form.push((format!("{prefix}[user_id]"), self.user_id.clone()));
            form.push((format!("{prefix}[plan_id]"), self.plan.to_string()));
        }
        form
    }
}

/// Parameters for a billing-portal session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSessionRequest {
    pub customer_ref: String,
    pub return_url: String,
}

impl PortalSessionRequest {
    /// Portal session returning to the app's billing page
    pub fn new(app_url: &Url, customer_ref: impl Into<String>) -> Self {
        Self {
            customer_ref: customer_ref.into(),
            return_url: app_link(app_url, "/billing"),
        }
    }

    fn to_form(&self) -> Vec<(String, String)> {
        vec![
            ("customer".to_string(), self.customer_ref.clone()),
            ("return_url".to_string(), self.return_url.clone()),
        ]
    }
}

fn app_link(app_url: &Url, path: &str) -> String {
    format!("{}{}", app_url.as_str().trim_end_matches('/'), path)
}

/// Outbound payment provider operations
#[async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    /// Start a hosted checkout for a subscription
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<HostedSession, ProviderError>;

    /// Open the hosted billing portal for an existing customer
    async fn create_portal_session(
        &self,
        request: &PortalSessionRequest,
    ) -> Result<HostedSession, ProviderError>;
}

/// [`PaymentProvider`] backed by the Stripe REST API
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: Url,
    secret_key: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base.as_str())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl StripeClient {
    /// Create a client for `api_base` authenticating with `secret_key`
    pub fn new(secret_key: impl Into<String>, api_base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base,
            secret_key: secret_key.into(),
        }
    }

    /// Use a preconfigured HTTP client
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<HostedSession, ProviderError> {
        let endpoint = self
            .api_base
            .join(path)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad endpoint {path}: {e}")))?;

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let session: SessionBody = response.json().await?;
        let url = session
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("session has no url".to_string()))?;

        debug!(session_id = %session.id, "Hosted session created");
        Ok(HostedSession {
            id: session.id,
            url,
        })
    }
}

fn api_error(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|env| {
            let ErrorBody { message, kind } = env.error;
            message.or(kind)
        })
        .unwrap_or_else(|| format!("HTTP {status}"));
    ProviderError::Api { status, message }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip_all, fields(user_id = %request.user_id, plan = %request.plan))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<HostedSession, ProviderError> {
        self.post_form("/v1/checkout/sessions", &request.to_form())
            .await
    }

    #[instrument(skip_all)]
    async fn create_portal_session(
        &self,
        request: &PortalSessionRequest,
    ) -> Result<HostedSession, ProviderError> {
        self.post_form("/v1/billing_portal/sessions", &request.to_form())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_url() -> Url {
        Url::parse("http://localhost:3000/").unwrap()
    }

    fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_checkout_form_carries_metadata() {
        let request = CheckoutSessionRequest::new(
            &app_url(),
            "u1",
            Some("a@example.com".into()),
            PlanTier::Pro,
            "price_123",
        );
        let form = request.to_form();

        assert_eq!(field(&form, "mode"), Some("subscription"));
        assert_eq!(field(&form, "line_items[0][price]"), Some("price_123"));
        assert_eq!(field(&form, "customer_email"), Some("a@example.com"));
        assert_eq!(field(&form, "metadata[user_id]"), Some("u1"));
        assert_eq!(field(&form, "metadata[plan_id]"), Some("pro"));
        assert_eq!(field(&form, "subscription_data[metadata][plan_id]"), Some("pro"));
        assert_eq!(
            field(&form, "success_url"),
            Some("http://localhost:3000/checkout/success?session_id={CHECKOUT_SESSION_ID}")
        );
        assert_eq!(field(&form, "cancel_url"), Some("http://localhost:3000/checkout/cancel"));
    }

    #[test]
    fn test_checkout_form_omits_missing_email() {
        let request = CheckoutSessionRequest::new(&app_url(), "u1", None, PlanTier::Enterprise, "p");
        assert_eq!(field(&request.to_form(), "customer_email"), None);
    }

    #[test]
    fn test_portal_return_url() {
        let request = PortalSessionRequest::new(&Url::parse("https://app.example.com").unwrap(), "cus_1");
        assert_eq!(request.return_url, "https://app.example.com/billing");
        assert_eq!(field(&request.to_form(), "customer"), Some("cus_1"));
    }

    #[test]
    fn test_api_error_parsing() {
        let body = r#"{"error":{"message":"No such price: 'price_x'","type":"invalid_request_error"}}"#;
        match api_error(400, body) {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "No such price: 'price_x'");
            }
            other => panic!("unexpected: {other:?}"),
        }

        match api_error(502, "<html>bad gateway</html>") {
            ProviderError::Api { message, .. } => assert_eq!(message, "HTTP 502"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = StripeClient::new("sk_live_secret", Url::parse(DEFAULT_API_BASE).unwrap());
        assert!(!format!("{client:?}").contains("sk_live_secret"));
    }
}
