//! Plan Catalog
//!
//! The closed set of subscription tiers and the pricing catalog shown on the
//! pricing page and used to start checkout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Placeholder price ID used when `STRIPE_PRO_PRICE_ID` is not configured
pub const PRO_PRICE_PLACEHOLDER: &str = "price_pro_placeholder";

/// Placeholder price ID used when `STRIPE_ENTERPRISE_PRICE_ID` is not configured
pub const ENTERPRISE_PRICE_PLACEHOLDER: &str = "price_enterprise_placeholder";

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Baseline tier every account falls back to
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Whether this tier is billed
    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a plan identifier is not one of the known tiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown plan: {0}")]
pub struct UnknownPlan(pub String);

impl FromStr for PlanTier {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(UnknownPlan(other.to_string())),
        }
    }
}

/// A purchasable plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanTier,
    pub name: &'static str,
    /// Monthly price in whole currency units
    pub price: u32,
    /// Payment provider price ID; `None` for the free tier
    pub price_id: Option<String>,
    pub description: &'static str,
    pub features: Vec<&'static str>,
    pub highlighted: bool,
    pub cta: &'static str,
}

/// The plans on offer, cheapest first
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Build the standard free / pro / enterprise catalog
    pub fn new(pro_price_id: impl Into<String>, enterprise_price_id: impl Into<String>) -> Self {
        let plans = vec![
            Plan {
                id: PlanTier::Free,
                name: "Free",
                price: 0,
                price_id: None,
                description: "Perfect for trying out our platform",
                features: vec![
                    "5 projects",
                    "10GB storage",
                    "Basic analytics",
                    "Community support",
                    "API access (1k calls/mo)",
                ],
                highlighted: false,
                cta: "Get Started Free",
            },
            Plan {
                id: PlanTier::Pro,
                name: "Pro",
                price: 29,
                price_id: Some(pro_price_id.into()),
                description: "For professionals and growing teams",
                features: vec![
                    "Unlimited projects",
                    "100GB storage",
                    "Advanced analytics",
                    "Priority support",
                    "Custom domains",
                    "API access (100k calls/mo)",
                    "Webhooks",
                ],
                highlighted: true,
                cta: "Start Pro Trial",
            },
            Plan {
                id: PlanTier::Enterprise,
                name: "Enterprise",
                price: 99,
                price_id: Some(enterprise_price_id.into()),
                description: "For large organizations with advanced needs",
                features: vec![
                    "Everything in Pro",
                    "Unlimited storage",
                    "White-labeling",
                    "Dedicated support",
                    "SLA guarantee (99.9%)",
                    "Custom integrations",
                    "SSO / SAML",
                    "Audit logs",
                ],
                highlighted: false,
                cta: "Contact Sales",
            },
        ];

        Self { plans }
    }

    /// All plans, cheapest first
    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    /// Look up a plan by tier
    pub fn get(&self, tier: PlanTier) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.id == tier)
    }

    /// Look up a plan by its string identifier
    pub fn find(&self, id: &str) -> Option<&Plan> {
        id.parse().ok().and_then(|tier| self.get(tier))
    }

    /// Plan and price ID for a checkout request, or `None` if the plan cannot
    /// be bought (unknown, free, or missing a price)
    pub fn checkout_price(&self, id: &str) -> Option<(&Plan, &str)> {
        let plan = self.find(id)?;
        if !plan.id.is_paid() {
            return None;
        }
        let price_id = plan.price_id.as_deref().filter(|p| !p.is_empty())?;
        Some((plan, price_id))
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::new(PRO_PRICE_PLACEHOLDER, ENTERPRISE_PRICE_PLACEHOLDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_three_plans() {
        let catalog = PlanCatalog::default();
        let ids: Vec<_> = catalog.plans().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![PlanTier::Free, PlanTier::Pro, PlanTier::Enterprise]);
    }

    #[test]
    fn test_free_plan_has_no_price() {
        let catalog = PlanCatalog::default();
        let free = catalog.get(PlanTier::Free).unwrap();
        assert_eq!(free.price, 0);
        assert!(free.price_id.is_none());
    }

    #[test]
    fn test_pro_plan_is_highlighted() {
        let catalog = PlanCatalog::default();
        assert!(catalog.get(PlanTier::Pro).unwrap().highlighted);
        assert!(!catalog.get(PlanTier::Enterprise).unwrap().highlighted);
    }

    #[test]
    fn test_prices_increase() {
        let catalog = PlanCatalog::default();
        let prices: Vec<_> = catalog.plans().iter().map(|p| p.price).collect();
        assert!(prices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_every_plan_is_complete() {
        for plan in PlanCatalog::default().plans() {
            assert!(!plan.name.is_empty());
            assert!(!plan.description.is_empty());
            assert!(!plan.features.is_empty());
            assert!(!plan.cta.is_empty());
        }
    }

    #[test]
    fn test_checkout_price() {
        let catalog = PlanCatalog::new("price_pro_live", "price_ent_live");

        let (plan, price) = catalog.checkout_price("pro").unwrap();
        assert_eq!(plan.id, PlanTier::Pro);
        assert_eq!(price, "price_pro_live");

        assert!(catalog.checkout_price("free").is_none());
        assert!(catalog.checkout_price("platinum").is_none());
    }

    #[test]
    fn test_empty_price_id_is_not_purchasable() {
        let catalog = PlanCatalog::new("", "price_ent");
        assert!(catalog.checkout_price("pro").is_none());
        assert!(catalog.checkout_price("enterprise").is_some());
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("pro".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert_eq!(
            "gold".parse::<PlanTier>().unwrap_err(),
            UnknownPlan("gold".to_string())
        );
        assert_eq!(PlanTier::Enterprise.to_string(), "enterprise");
    }
}
