use async_trait::async_trait;
use chrono::Utc;
use prescription_lifecycle::gateways::{BillingGateway, ExternalSubscription};
use prescription_lifecycle::{BillingProvider, GatewayResult, SubscriptionStatus};
use reqwest::Method;
use tracing::{info, warn};

use crate::client::{Auth, BillingEndpoint, BillingHttpClient};
use crate::error::BillingResult;
use crate::models::{
    ItemCancelRequest, ItemPriceLine, ItemSubscriptionEnvelope, ItemSubscriptionPage, ItemUpdateRequest,
};

const GATEWAY: &str = "item_price_billing";

/// Billing provider that charges a subscription for a list of item prices.
#[derive(Debug, Clone)]
pub struct ItemPriceBillingGateway {
    client: BillingHttpClient,
}

impl ItemPriceBillingGateway {
    pub fn new(endpoint: &BillingEndpoint) -> BillingResult<Self> {
        Ok(Self {
            client: BillingHttpClient::new(endpoint, Auth::BasicKey)?,
        })
    }
}

#[async_trait]
impl BillingGateway for ItemPriceBillingGateway {
    fn provider(&self) -> BillingProvider {
        BillingProvider::ItemPriceBased
    }

    async fn cancel(&self, external_id: &str, reason: &str) -> GatewayResult<bool> {
        let request = self
            .client
            .request(
                Method::POST,
                &format!("api/v2/subscriptions/{external_id}/cancel_for_items"),
            )
            .json(&ItemCancelRequest {
                end_of_term: false,
                cancel_reason_code: reason,
            });
        let cancelled: Option<ItemSubscriptionEnvelope> =
            self.client.send(request).await.map_err(|e| e.into_gateway(GATEWAY))?;

        let status = cancelled.map(|env| env.subscription.local_status());
        if status == Some(SubscriptionStatus::Cancelled) {
            info!(external_id, "Item-price subscription cancelled");
            Ok(true)
        } else {
            warn!(external_id, status = ?status, "Cancellation not confirmed");
            Ok(false)
        }
    }

    async fn update_plan(&self, external_id: &str, price_id: &str) -> GatewayResult<bool> {
        let request = self
            .client
            .request(
                Method::POST,
                &format!("api/v2/subscriptions/{external_id}/update_for_items"),
            )
            .json(&ItemUpdateRequest {
                subscription_items: vec![ItemPriceLine {
                    item_price_id: price_id,
                }],
                replace_items_list: true,
            });
        let updated: Option<ItemSubscriptionEnvelope> =
            self.client.send(request).await.map_err(|e| e.into_gateway(GATEWAY))?;
        Ok(updated.is_some_and(|env| env.subscription.plan_price() == Some(price_id)))
    }

    async fn upcoming_renewals(&self, days_ahead: u32) -> GatewayResult<Vec<ExternalSubscription>> {
        let now = Utc::now().timestamp();
        let horizon = now + i64::from(days_ahead) * 86_400;
        let mut renewals = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self.client.request(Method::GET, "api/v2/subscriptions").query(&[
                ("status[is]", "active".to_string()),
                ("next_billing_at[between]", format!("[{now},{horizon}]")),
                ("limit", "100".to_string()),
            ]);
            if let Some(cursor) = &offset {
                request = request.query(&[("offset", cursor)]);
            }
            let page: ItemSubscriptionPage = self
                .client
                .send_required(request)
                .await
                .map_err(|e| e.into_gateway(GATEWAY))?;

            renewals.extend(
                page.list
                    .into_iter()
                    .map(|env| ExternalSubscription::from(env.subscription)),
            );
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(renewals)
    }

    async fn subscription(&self, external_id: &str) -> GatewayResult<Option<ExternalSubscription>> {
        let request = self
            .client
            .request(Method::GET, &format!("api/v2/subscriptions/{external_id}"));
        let found: Option<ItemSubscriptionEnvelope> =
            self.client.send(request).await.map_err(|e| e.into_gateway(GATEWAY))?;
        Ok(found.map(|env| ExternalSubscription::from(env.subscription)))
    }
}
