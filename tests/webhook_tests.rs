//! Webhook reconciliation end to end: signed deliveries in, subscription
//! records out.
//!
//! # Test Categories
//!
//! 1. **Delivery Semantics**: replay, ordering, unknown types
//! 2. **Rejection**: signatures and tolerance, nothing written
//! 3. **HTTP Surface**: status codes through the router, storage outages
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --package saaskit-web --test webhook_tests
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use saaskit_web::billing::{
    InMemorySubscriptionStore, PlanTier, SubscriptionPatch, SubscriptionRecord,
    SubscriptionStatus, SubscriptionStore, SubscriptionUpsert,
};
use saaskit_web::error::{StoreError, StoreResult};
use saaskit_web::stripe::{
    ReconcileOutcome, StripeWebhookConfig, StripeWebhookError, SubscriptionReconciler,
};
use serde_json::{json, Value};

const SECRET: &str = "whsec_integration";
const NOW: i64 = 1_772_000_000;

fn reconciler() -> (SubscriptionReconciler, Arc<InMemorySubscriptionStore>) {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let reconciler = SubscriptionReconciler::new(&StripeWebhookConfig::new(SECRET), store.clone());
    (reconciler, store)
}

fn checkout_completed(event_id: &str, user: &str, plan: &str) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": NOW,
        "livemode": false,
        "data": { "object": {
            "id": "cs_test_1",
            "object": "checkout.session",
            "customer": "cus_1",
            "subscription": "sub_1",
            "metadata": { "user_id": user, "plan_id": plan }
        }}
    })
}

fn subscription_event(event_id: &str, event_type: &str, status: &str, period_end: i64) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "created": NOW,
        "data": { "object": {
            "id": "sub_1",
            "object": "subscription",
            "customer": "cus_1",
            "status": status,
            "current_period_end": period_end
        }}
    })
}

async fn deliver(
    reconciler: &SubscriptionReconciler,
    event: &Value,
) -> Result<ReconcileOutcome, StripeWebhookError> {
    let payload = serde_json::to_vec(event).unwrap();
    let header = reconciler.verifier().sign(&payload, NOW);
    reconciler
        .handle_provider_event_at(&payload, Some(&header), NOW)
        .await
        .map(|ack| ack.outcome)
}

// ============================================================================
// MODULE: Delivery Semantics
// ============================================================================

mod delivery_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_replayed_checkout_leaves_one_record() {
        let (reconciler, store) = reconciler();
        let event = checkout_completed("evt_1", "u1", "pro");

        for _ in 0..3 {
            let outcome = deliver(&reconciler, &event).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Upserted { user_id: "u1".into() });
        }

        assert_eq!(store.len(), 1);
        let record = store.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(record.plan, PlanTier::Pro);
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(record.external_customer_ref.as_deref(), Some("cus_1"));
        assert_eq!(record.external_subscription_ref.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn test_checkout_then_delete_lands_on_free() {
        let (reconciler, store) = reconciler();

        deliver(&reconciler, &checkout_completed("evt_1", "u1", "pro"))
            .await
            .unwrap();
        let outcome = deliver(
            &reconciler,
            &subscription_event("evt_2", "customer.subscription.deleted", "canceled", NOW),
        )
        .await
        .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Canceled { user_id: "u1".into() });
        let record = store.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(record.plan, PlanTier::Free);
        assert_eq!(record.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn test_stale_update_after_delete_is_last_write_wins() {
        let (reconciler, store) = reconciler();

        deliver(&reconciler, &checkout_completed("evt_1", "u1", "pro"))
            .await
            .unwrap();
        deliver(
            &reconciler,
            &subscription_event("evt_3", "customer.subscription.deleted", "canceled", NOW),
        )
        .await
        .unwrap();
        // Generated earlier, delivered later
        deliver(
            &reconciler,
            &subscription_event("evt_2", "customer.subscription.updated", "active", NOW + 3600),
        )
        .await
        .unwrap();

        let record = store.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(record.plan, PlanTier::Free);
        assert_eq!(record.current_period_end.unwrap().timestamp(), NOW + 3600);
    }

    #[tokio::test]
    async fn test_update_without_record_is_acked() {
        let (reconciler, store) = reconciler();

        let outcome = deliver(
            &reconciler,
            &subscription_event("evt_9", "customer.subscription.updated", "active", NOW),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::NotFound {
                subscription_ref: "sub_1".into()
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_acked_without_writes() {
        let (reconciler, store) = reconciler();
        let event = json!({
            "id": "evt_inv",
            "type": "invoice.payment_succeeded",
            "data": { "object": { "id": "in_1" } }
        });

        let outcome = deliver(&reconciler, &event).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Unhandled {
                event_type: "invoice.payment_succeeded".into()
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_without_plan_metadata_is_skipped() {
        let (reconciler, store) = reconciler();
        let mut event = checkout_completed("evt_1", "u1", "pro");
        event["data"]["object"]["metadata"] = json!({ "user_id": "u1" });

        let outcome = deliver(&reconciler, &event).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Skipped { reason: "missing_metadata" });
        assert!(store.is_empty());
    }
}

// ============================================================================
// MODULE: Rejection
// ============================================================================

mod rejection_tests {
    use super::*;
    use tokio_test::assert_err;

    #[tokio::test]
    async fn test_wrong_secret_writes_nothing() {
        let (reconciler, store) = reconciler();
        let forger = SubscriptionReconciler::new(
            &StripeWebhookConfig::new("whsec_other"),
            Arc::new(InMemorySubscriptionStore::new()),
        );
        let payload = serde_json::to_vec(&checkout_completed("evt_1", "u1", "pro")).unwrap();
        let header = forger.verifier().sign(&payload, NOW);

        let err = assert_err!(
            reconciler
                .handle_provider_event_at(&payload, Some(&header), NOW)
                .await
        );

        assert!(matches!(err, StripeWebhookError::SignatureMismatch));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_tampered_body_is_rejected() {
        let (reconciler, store) = reconciler();
        let payload = serde_json::to_vec(&checkout_completed("evt_1", "u1", "pro")).unwrap();
        let header = reconciler.verifier().sign(&payload, NOW);
        let tampered = serde_json::to_vec(&checkout_completed("evt_1", "u1", "enterprise")).unwrap();

        let err = assert_err!(
            reconciler
                .handle_provider_event_at(&tampered, Some(&header), NOW)
                .await
        );

        assert!(err.is_signature_error());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stale_signature_is_rejected() {
        let (reconciler, store) = reconciler();
        let payload = serde_json::to_vec(&checkout_completed("evt_1", "u1", "pro")).unwrap();
        let header = reconciler.verifier().sign(&payload, NOW - 301);

        let err = assert_err!(
            reconciler
                .handle_provider_event_at(&payload, Some(&header), NOW)
                .await
        );

        assert!(matches!(err, StripeWebhookError::TimestampOutsideTolerance { .. }));
        assert!(store.is_empty());
    }
}

// ============================================================================
// MODULE: HTTP Surface
// ============================================================================

mod http_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use saaskit_web::app::{build_router, AppStateBuilder};
    use saaskit_web::config::AppConfig;
    use tower::ServiceExt;

    /// Store whose backend is down
    struct UnavailableStore;

    #[async_trait]
    impl SubscriptionStore for UnavailableStore {
        async fn upsert_by_user(&self, _: SubscriptionUpsert) -> StoreResult<SubscriptionRecord> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn update_by_subscription_ref(
            &self,
            _: &str,
            _: SubscriptionPatch,
        ) -> StoreResult<Option<SubscriptionRecord>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn find_by_user(&self, _: &str) -> StoreResult<Option<SubscriptionRecord>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn signed_request(payload: &[u8]) -> Request<Body> {
        let verifier = SubscriptionReconciler::new(
            &StripeWebhookConfig::new(SECRET),
            Arc::new(InMemorySubscriptionStore::new()),
        );
        let header = verifier.verifier().sign(payload, Utc::now().timestamp());

        Request::post("/api/stripe/webhook")
            .header("stripe-signature", header)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_vec()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_storage_outage_answers_503() {
        let state = AppStateBuilder::new(AppConfig::new(SECRET))
            .subscriptions(Arc::new(UnavailableStore))
            .build();
        let app = build_router(state);
        let payload = serde_json::to_vec(&checkout_completed("evt_1", "u1", "pro")).unwrap();

        let response = app.oneshot(signed_request(&payload)).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Temporarily unavailable");
    }

    #[tokio::test]
    async fn test_accepted_delivery_answers_received() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let state = AppStateBuilder::new(AppConfig::new(SECRET))
            .subscriptions(store.clone())
            .build();
        let app = build_router(state);
        let payload = serde_json::to_vec(&checkout_completed("evt_1", "u7", "enterprise")).unwrap();

        let response = app.oneshot(signed_request(&payload)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "received": true }));
        let record = store.find_by_user("u7").await.unwrap().unwrap();
        assert_eq!(record.plan, PlanTier::Enterprise);
    }

    #[tokio::test]
    async fn test_missing_signature_answers_400() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let state = AppStateBuilder::new(AppConfig::new(SECRET))
            .subscriptions(store.clone())
            .build();
        let app = build_router(state);
        let payload = serde_json::to_vec(&checkout_completed("evt_1", "u1", "pro")).unwrap();

        let request = Request::post("/api/stripe/webhook")
            .body(Body::from(payload))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Invalid signature");
        assert!(store.is_empty());
    }
}
