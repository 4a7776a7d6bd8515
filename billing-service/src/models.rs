//! Wire formats of the two billing providers.

use chrono::{DateTime, Utc};
use prescription_lifecycle::gateways::ExternalSubscription;
use prescription_lifecycle::SubscriptionStatus;
use serde::{Deserialize, Serialize};

fn from_unix(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::from_timestamp(s, 0))
}

// Plan-based provider

#[derive(Debug, Clone, Deserialize)]
pub struct PlanRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanSubscription {
    pub id: String,
    pub customer: String,
    pub plan: PlanRef,
    pub status: String,
    /// Unix seconds; the next charge happens when the period ends.
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl PlanSubscription {
    pub fn local_status(&self) -> SubscriptionStatus {
        match self.status.as_str() {
            "canceled" | "incomplete_expired" => SubscriptionStatus::Cancelled,
            "paused" => SubscriptionStatus::Paused,
            _ if self.cancel_at_period_end => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Active,
        }
    }
}

impl From<PlanSubscription> for ExternalSubscription {
    fn from(s: PlanSubscription) -> Self {
        let status = s.local_status();
        ExternalSubscription {
            external_id: s.id,
            customer_id: s.customer,
            price_id: s.plan.id,
            status,
            next_charge_at: from_unix(s.current_period_end),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanSubscriptionList {
    pub data: Vec<PlanSubscription>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanCancelRequest<'a> {
    pub cancellation_reason: &'a str,
    pub prorate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanUpdateRequest<'a> {
    pub plan: &'a str,
    pub proration_behavior: &'a str,
}

// Item-price-based provider

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub item_price_id: String,
    pub item_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub next_billing_at: Option<i64>,
    #[serde(default)]
    pub subscription_items: Vec<SubscriptionItem>,
}

impl ItemSubscription {
    pub fn local_status(&self) -> SubscriptionStatus {
        match self.status.as_str() {
            "cancelled" => SubscriptionStatus::Cancelled,
            // Will not renew again; no charge to validate.
            "paused" | "non_renewing" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Active,
        }
    }

    /// The charged price is the plan item's price.
    pub fn plan_price(&self) -> Option<&str> {
        self.subscription_items
            .iter()
            .find(|item| item.item_type == "plan")
            .map(|item| item.item_price_id.as_str())
    }
}

impl From<ItemSubscription> for ExternalSubscription {
    fn from(s: ItemSubscription) -> Self {
        let status = s.local_status();
        let price_id = s.plan_price().unwrap_or_default().to_string();
        ExternalSubscription {
            external_id: s.id,
            customer_id: s.customer_id,
            price_id,
            status,
            next_charge_at: from_unix(s.next_billing_at),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemSubscriptionEnvelope {
    pub subscription: ItemSubscription,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemSubscriptionPage {
    pub list: Vec<ItemSubscriptionEnvelope>,
    pub next_offset: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemCancelRequest<'a> {
    pub end_of_term: bool,
    pub cancel_reason_code: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemPriceLine<'a> {
    pub item_price_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemUpdateRequest<'a> {
    pub subscription_items: Vec<ItemPriceLine<'a>>,
    pub replace_items_list: bool,
}
