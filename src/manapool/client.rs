//! HTTP client for the ManaPool seller API
//!
//! Transient failures (transport errors, 429/5xx) are retried with
//! exponential backoff; every other non-2xx status is returned to the
//! caller immediately.

use super::model::{OrderEnvelope, OrderList, OrderSummary};
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::time::sleep;

const USER_AGENT: &str = "picklist/1.0";
const PAGE_SIZE: usize = 100;

/// Status codes worth another attempt
const RETRYABLE: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct ManapoolConfig {
    pub base_url: String,
    pub email: Option<String>,
    pub access_token: Option<String>,
    pub max_retries: u32,
    pub timeout_seconds: u64,
}

impl Default for ManapoolConfig {
    fn default() -> Self {
        Self {
            base_url: "https://manapool.com/api/v1".to_string(),
            email: None,
            access_token: None,
            max_retries: 3,
            timeout_seconds: 20,
        }
    }
}

impl ManapoolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("MANAPOOL_BASE_URL").unwrap_or(defaults.base_url),
            email: std::env::var("MANAPOOL_EMAIL").ok().filter(|v| !v.is_empty()),
            access_token: std::env::var("MANAPOOL_ACCESS_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
            max_retries: std::env::var("MANAPOOL_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            timeout_seconds: std::env::var("MANAPOOL_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }
}

/// A fetched order detail plus the raw payload text for the order cache
#[derive(Debug)]
pub struct FetchedOrder {
    pub envelope: OrderEnvelope,
    pub raw_json: String,
}

pub struct ManapoolClient {
    config: ManapoolConfig,
    http: reqwest::Client,
}

impl ManapoolClient {
    pub fn new(config: ManapoolConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Both static credentials must be present before any call is made
    pub fn is_configured(&self) -> bool {
        self.config.email.is_some() && self.config.access_token.is_some()
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(500 * (1 << attempt))
    }

    /// GET a path with retries. Exhausting retries yields the last transport
    /// error, or a generic message when only retryable statuses were seen.
    async fn request(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut last_err: Option<String> = None;
        for attempt in 0..self.config.max_retries {
            let result = self
                .http
                .get(&url)
                .query(query)
                .header("X-ManaPool-Email", self.config.email.as_deref().unwrap_or(""))
                .header(
                    "X-ManaPool-Access-Token",
                    self.config.access_token.as_deref().unwrap_or(""),
                )
                .header("Content-Type", "application/json")
                .header("User-Agent", USER_AGENT)
                .timeout(Duration::from_secs(self.config.timeout_seconds))
                .send()
                .await;
            match result {
                Err(e) => {
                    log::warn!("ManaPool request to {path} failed: {e}");
                    last_err = Some(e.to_string());
                    sleep(Self::backoff(attempt)).await;
                }
                Ok(resp) if RETRYABLE.contains(&resp.status().as_u16()) => {
                    log::warn!(
                        "ManaPool returned {} for {path}, attempt {}",
                        resp.status(),
                        attempt + 1
                    );
                    sleep(Self::backoff(attempt)).await;
                }
                Ok(resp) => return Ok(resp),
            }
        }
        Err(Error::Upstream(
            last_err.unwrap_or_else(|| "ManaPool request failed".to_string()),
        ))
    }

    /// Page through the unfulfilled-orders listing until a short or empty page
    pub async fn list_unfulfilled_orders(&self) -> Result<Vec<OrderSummary>> {
        if !self.is_configured() {
            return Err(Error::NotConfigured);
        }
        let mut orders = Vec::new();
        let mut offset = 0usize;
        loop {
            let query = [
                ("is_fulfilled", "false".to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            let resp = self.request("/seller/orders", &query).await?;
            if resp.status().as_u16() != 200 {
                return Err(Error::Upstream(format!(
                    "ManaPool error: {}",
                    resp.status().as_u16()
                )));
            }
            let page: OrderList = resp.json().await?;
            let count = page.orders.len();
            orders.extend(page.orders);
            if count < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        log::info!("Listed {} unfulfilled ManaPool orders", orders.len());
        Ok(orders)
    }

    /// Fetch one order's full detail, keeping the raw text for the cache
    pub async fn fetch_order(&self, order_id: &str) -> Result<FetchedOrder> {
        let resp = self
            .request(&format!("/seller/orders/{order_id}"), &[])
            .await?;
        if resp.status().as_u16() != 200 {
            return Err(Error::Upstream(format!(
                "ManaPool error: {}",
                resp.status().as_u16()
            )));
        }
        let raw_json = resp.text().await?;
        let envelope: OrderEnvelope = serde_json::from_str(&raw_json)?;
        Ok(FetchedOrder { envelope, raw_json })
    }
}
