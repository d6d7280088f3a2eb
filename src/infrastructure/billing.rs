use crate::domain::BillingSubscription;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingCustomer {
    pub id: String,
}

/// What the reconciliation pass needs from the billing provider.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<BillingCustomer>, BillingError>;

    async fn active_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<BillingSubscription>, BillingError>;
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503)
}

pub struct StripeClient {
    client: Client,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, base_url: impl Into<String>) -> Result<Self, BillingError> {
        let mut headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", secret_key))
            .map_err(|e| BillingError::InvalidConfig(format!("Invalid API key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                BillingError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_with_retry(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, BillingError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut last_error: Option<String> = None;

        for attempt in 0..MAX_RETRIES {
            match self.client.get(&url).query(query).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 429 {
                        return Err(BillingError::RateLimited);
                    }

                    if is_retryable_status(status) && attempt < MAX_RETRIES - 1 {
                        sleep(Duration::from_millis(INITIAL_BACKOFF_MS * 2_u64.pow(attempt))).await;
                        continue;
                    }

                    if !resp.status().is_success() {
                        let error_text = resp
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(BillingError::RequestFailed(format!(
                            "{} returned {}: {}",
                            path, status, error_text
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt < MAX_RETRIES - 1 {
                        sleep(Duration::from_millis(INITIAL_BACKOFF_MS * 2_u64.pow(attempt))).await;
                    }
                }
            }
        }

        Err(BillingError::RequestFailed(
            last_error.unwrap_or_else(|| "Max retries exceeded".to_string()),
        ))
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<BillingCustomer>, BillingError> {
        let resp = self
            .get_with_retry("customers", &[("email", email), ("limit", "1")])
            .await?;

        let list: StripeList<StripeCustomer> = resp
            .json()
            .await
            .map_err(|e| BillingError::InvalidResponse(e.to_string()))?;

        Ok(list
            .data
            .into_iter()
            .next()
            .map(|c| BillingCustomer { id: c.id }))
    }

    async fn active_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<BillingSubscription>, BillingError> {
        let resp = self
            .get_with_retry(
                "subscriptions",
                &[("customer", customer_id), ("status", "active"), ("limit", "1")],
            )
            .await?;

        let list: StripeList<StripeSubscription> = resp
            .json()
            .await
            .map_err(|e| BillingError::InvalidResponse(e.to_string()))?;

        Ok(list.data.into_iter().next().map(Into::into))
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    items: Option<StripeList<StripeSubscriptionItem>>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    price: Option<StripePrice>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    // Either the product id or the expanded product object.
    product: Option<serde_json::Value>,
}

impl From<StripeSubscription> for BillingSubscription {
    fn from(sub: StripeSubscription) -> Self {
        let first_item = sub.items.and_then(|items| items.data.into_iter().next());

        // Newer API versions only report the period on the items.
        let (item_start, item_end, price) = match first_item {
            Some(item) => (item.current_period_start, item.current_period_end, item.price),
            None => (None, None, None),
        };

        let product_id = price.and_then(|p| p.product).and_then(|product| match product {
            serde_json::Value::String(id) => Some(id),
            serde_json::Value::Object(obj) => {
                obj.get("id").and_then(|id| id.as_str()).map(str::to_string)
            }
            _ => None,
        });

        BillingSubscription {
            id: sub.id,
            product_id,
            current_period_start: sub.current_period_start.or(item_start).and_then(from_unix),
            current_period_end: sub.current_period_end.or(item_end).and_then(from_unix),
        }
    }
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> BillingSubscription {
        let sub: StripeSubscription = serde_json::from_value(json).unwrap();
        sub.into()
    }

    #[test]
    fn reads_period_from_subscription() {
        let sub = parse(serde_json::json!({
            "id": "sub_1",
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "items": { "data": [ { "price": { "product": "prod_pro" } } ] }
        }));

        assert_eq!(sub.id, "sub_1");
        assert_eq!(sub.product_id.as_deref(), Some("prod_pro"));
        assert_eq!(sub.current_period_end.unwrap().timestamp(), 1_702_592_000);
    }

    #[test]
    fn falls_back_to_item_period_and_expanded_product() {
        let sub = parse(serde_json::json!({
            "id": "sub_2",
            "items": { "data": [ {
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000,
                "price": { "product": { "id": "prod_expanded", "name": "Pro" } }
            } ] }
        }));

        assert_eq!(sub.product_id.as_deref(), Some("prod_expanded"));
        assert_eq!(sub.current_period_start.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn tolerates_missing_items() {
        let sub = parse(serde_json::json!({ "id": "sub_3" }));
        assert!(sub.product_id.is_none());
        assert!(sub.current_period_end.is_none());
    }

    #[test]
    fn rejects_malformed_key() {
        assert!(matches!(
            StripeClient::new("sk_test\n123", "https://api.stripe.com/v1"),
            Err(BillingError::InvalidConfig(_))
        ));
    }
}
