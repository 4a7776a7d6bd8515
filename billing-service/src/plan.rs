use async_trait::async_trait;
use prescription_lifecycle::gateways::{BillingGateway, ExternalSubscription};
use prescription_lifecycle::{BillingProvider, GatewayResult};
use reqwest::Method;
use tracing::{info, warn};

use crate::client::{Auth, BillingEndpoint, BillingHttpClient};
use crate::error::BillingResult;
use crate::models::{PlanCancelRequest, PlanSubscription, PlanSubscriptionList, PlanUpdateRequest};

const GATEWAY: &str = "plan_billing";

/// Billing provider that charges a subscription against a single plan.
#[derive(Debug, Clone)]
pub struct PlanBillingGateway {
    client: BillingHttpClient,
}

impl PlanBillingGateway {
    pub fn new(endpoint: &BillingEndpoint) -> BillingResult<Self> {
        Ok(Self {
            client: BillingHttpClient::new(endpoint, Auth::Bearer)?,
        })
    }

    async fn fetch(&self, external_id: &str) -> BillingResult<Option<PlanSubscription>> {
        let request = self
            .client
            .request(Method::GET, &format!("v1/subscriptions/{external_id}"));
        self.client.send(request).await
    }
}

#[async_trait]
impl BillingGateway for PlanBillingGateway {
    fn provider(&self) -> BillingProvider {
        BillingProvider::PlanBased
    }

    async fn cancel(&self, external_id: &str, reason: &str) -> GatewayResult<bool> {
        let request = self
            .client
            .request(Method::DELETE, &format!("v1/subscriptions/{external_id}"))
            .json(&PlanCancelRequest {
                cancellation_reason: reason,
                prorate: false,
            });
        let cancelled: Option<PlanSubscription> =
            self.client.send(request).await.map_err(|e| e.into_gateway(GATEWAY))?;

        match cancelled {
            Some(s) if s.status == "canceled" => {
                info!(external_id, "Plan subscription cancelled");
                Ok(true)
            }
            Some(s) => {
                warn!(external_id, status = %s.status, "Cancellation not confirmed");
                Ok(false)
            }
            None => {
                warn!(external_id, "Subscription unknown to provider");
                Ok(false)
            }
        }
    }

    async fn update_plan(&self, external_id: &str, price_id: &str) -> GatewayResult<bool> {
        let request = self
            .client
            .request(Method::POST, &format!("v1/subscriptions/{external_id}"))
            .json(&PlanUpdateRequest {
                plan: price_id,
                proration_behavior: "none",
            });
        let updated: Option<PlanSubscription> =
            self.client.send(request).await.map_err(|e| e.into_gateway(GATEWAY))?;
        Ok(updated.is_some_and(|s| s.plan.id == price_id))
    }

    async fn upcoming_renewals(&self, days_ahead: u32) -> GatewayResult<Vec<ExternalSubscription>> {
        let mut renewals = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut request = self
                .client
                .request(Method::GET, "v1/subscriptions/upcoming")
                .query(&[("days_ahead", days_ahead.to_string()), ("limit", "100".to_string())]);
            if let Some(cursor) = &starting_after {
                request = request.query(&[("starting_after", cursor)]);
            }
            let page: PlanSubscriptionList = self
                .client
                .send_required(request)
                .await
                .map_err(|e| e.into_gateway(GATEWAY))?;

            starting_after = page.data.last().map(|s| s.id.clone());
            let has_more = page.has_more;
            renewals.extend(page.data.into_iter().map(ExternalSubscription::from));
            if !has_more || starting_after.is_none() {
                break;
            }
        }
        Ok(renewals)
    }

    async fn subscription(&self, external_id: &str) -> GatewayResult<Option<ExternalSubscription>> {
        self.fetch(external_id)
            .await
            .map(|found| found.map(ExternalSubscription::from))
            .map_err(|e| e.into_gateway(GATEWAY))
    }
}
