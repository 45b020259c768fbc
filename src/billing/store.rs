//! Subscription storage.
//!
//! [`SubscriptionStore`] is the seam to whatever backend holds subscription
//! rows. Every write is keyed (by user or by provider subscription reference),
//! so replaying the same write leaves the same end state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::subscription::{SubscriptionPatch, SubscriptionRecord, SubscriptionUpsert};
use crate::error::StoreResult;

/// Keyed access to subscription records
#[async_trait]
pub trait SubscriptionStore: Send + Sync + 'static {
    /// Insert or overwrite the record for `upsert.user_id`
    async fn upsert_by_user(&self, upsert: SubscriptionUpsert) -> StoreResult<SubscriptionRecord>;

    /// Patch the record with the given provider subscription reference.
    ///
    /// Returns `Ok(None)` when no record carries that reference.
    async fn update_by_subscription_ref(
        &self,
        subscription_ref: &str,
        patch: SubscriptionPatch,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Record owned by `user_id`
    async fn find_by_user(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>>;
}

/// Process-local subscription store
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    records: RwLock<HashMap<String, SubscriptionRecord>>,
}

impl InMemorySubscriptionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record, in no particular order
    pub fn snapshot(&self) -> Vec<SubscriptionRecord> {
        self.records.read().values().cloned().collect()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn upsert_by_user(&self, upsert: SubscriptionUpsert) -> StoreResult<SubscriptionRecord> {
        let now = Utc::now();
        let mut records = self.records.write();

        let record = match records.get_mut(&upsert.user_id) {
            Some(existing) => {
                existing.apply_upsert(upsert, now);
                existing.clone()
            }
            None => {
                let record = SubscriptionRecord::from_upsert(upsert, now);
                records.insert(record.user_id.clone(), record.clone());
                record
            }
        };

        Ok(record)
    }

    async fn update_by_subscription_ref(
        &self,
        subscription_ref: &str,
        patch: SubscriptionPatch,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let now = Utc::now();
        let mut records = self.records.write();

        let updated = records
            .values_mut()
            .find(|r| r.external_subscription_ref.as_deref() == Some(subscription_ref))
            .map(|record| {
                record.apply_patch(&patch, now);
                record.clone()
            });

        Ok(updated)
    }

    async fn find_by_user(&self, user_id: &str) -> StoreResult<Option<SubscriptionRecord>> {
        Ok(self.records.read().get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{PlanTier, SubscriptionStatus};

    fn checkout(user: &str, sub: &str, plan: PlanTier) -> SubscriptionUpsert {
        SubscriptionUpsert {
            user_id: user.to_string(),
            external_customer_ref: Some(format!("cus_{user}")),
            external_subscription_ref: Some(sub.to_string()),
            plan,
            status: SubscriptionStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_by_user() {
        let store = InMemorySubscriptionStore::new();

        store.upsert_by_user(checkout("u1", "sub_1", PlanTier::Pro)).await.unwrap();
        store
            .upsert_by_user(checkout("u1", "sub_2", PlanTier::Enterprise))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let record = store.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(record.plan, PlanTier::Enterprise);
        assert_eq!(record.external_subscription_ref.as_deref(), Some("sub_2"));
    }

    #[tokio::test]
    async fn test_update_by_ref_miss_returns_none() {
        let store = InMemorySubscriptionStore::new();
        let result = store
            .update_by_subscription_ref("sub_missing", SubscriptionPatch::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_update_by_ref_touches_only_matching_record() {
        let store = InMemorySubscriptionStore::new();
        store.upsert_by_user(checkout("u1", "sub_1", PlanTier::Pro)).await.unwrap();
        store.upsert_by_user(checkout("u2", "sub_2", PlanTier::Pro)).await.unwrap();

        let patch = SubscriptionPatch {
            status: Some(SubscriptionStatus::PastDue),
            ..Default::default()
        };
        let updated = store
            .update_by_subscription_ref("sub_2", patch)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.user_id, "u2");
        assert_eq!(updated.status, SubscriptionStatus::PastDue);
        let untouched = store.find_by_user("u1").await.unwrap().unwrap();
        assert_eq!(untouched.status, SubscriptionStatus::Active);
    }
}
