//! Exchange collaborators: order/market/price lookups and order submission.
//!
//! All API payloads are parsed into typed structs here, at the boundary.
//! Gamma encodes several array fields as JSON strings ("[\"Yes\", \"No\"]");
//! those are normalized before anything leaves this module. The core never
//! sees raw JSON.

use crate::config::Config;
use crate::types::{Fill, OrderState, Resolution, Side};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// Order-status lookup by exchange order id.
///
/// `Ok(None)` means the exchange has no record of the order; that is a
/// first-class outcome, not an error.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn order_status(&self, order_id: &str) -> Result<Option<OrderState>>;
}

/// Market-resolution lookup by market/condition id
#[async_trait]
pub trait MarketLookup: Send + Sync {
    async fn resolution(&self, market_id: &str) -> Result<Resolution>;
}

/// Current-price lookup by outcome token id
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn price(&self, token_id: &str) -> Result<Option<Decimal>>;
}

/// A tradeable market as returned by search
#[derive(Debug, Clone, Serialize)]
pub struct Market {
    pub condition_id: String,
    pub question: String,
    pub outcomes: Vec<String>,
    pub outcome_prices: Vec<Decimal>,
    pub token_ids: Vec<String>,
    pub closed: bool,
}

/// Raw market payload from the Gamma API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    #[serde(default)]
    condition_id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    description: String,
    /// JSON-string-encoded array
    #[serde(default)]
    outcomes: Option<String>,
    /// JSON-string-encoded array
    #[serde(default)]
    outcome_prices: Option<String>,
    /// JSON-string-encoded array
    #[serde(default)]
    clob_token_ids: Option<String>,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    resolved_outcome: Option<String>,
}

/// Raw order payload from the CLOB API
#[derive(Debug, Deserialize)]
struct ClobOrder {
    #[serde(default, alias = "asset_id")]
    token_id: Option<String>,
    #[serde(default, alias = "condition_id")]
    market: Option<String>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    token_id: &'a str,
    side: &'a str,
    price: Decimal,
    size: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderAck {
    #[serde(default)]
    success: bool,
    #[serde(default, alias = "orderID")]
    order_id: Option<String>,
    #[serde(default, alias = "errorMsg")]
    error: Option<String>,
}

/// HTTP client for the Polymarket CLOB and Gamma APIs
pub struct ExchangeClient {
    client: Client,
    clob_url: String,
    gamma_url: String,
}

impl ExchangeClient {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            clob_url: config.clob_base_url.clone(),
            gamma_url: config.gamma_base_url.clone(),
        }
    }

    /// Search open markets whose question or description matches any keyword
    pub async fn search_markets(&self, query: &str) -> Result<Vec<Market>> {
        let url = format!("{}/markets?limit=200&closed=false", self.gamma_url);
        let markets: Vec<GammaMarket> = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch markets")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse market response")?;

        let keywords: Vec<String> = query.to_lowercase().split_whitespace().map(String::from).collect();

        let matched = markets
            .into_iter()
            .filter(|m| {
                let question = m.question.to_lowercase();
                let description = m.description.to_lowercase();
                keywords
                    .iter()
                    .any(|kw| question.contains(kw) || description.contains(kw))
            })
            .map(|m| self.normalize_market(m))
            .collect();

        Ok(matched)
    }

    /// Fetch a single market by condition id
    async fn fetch_market(&self, market_id: &str) -> Result<GammaMarket> {
        let url = format!("{}/markets?condition_id={}", self.gamma_url, market_id);
        let markets: Vec<GammaMarket> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        markets
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Market not found: {}", market_id))
    }

    /// The caller's raw fills, optionally scoped to one market
    pub async fn user_fills(&self, market_id: Option<&str>) -> Result<Vec<Fill>> {
        let url = format!("{}/orders", self.clob_url);
        let orders: Vec<ClobOrder> = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch orders")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse orders response")?;

        let fills = orders
            .into_iter()
            .filter_map(|o| {
                let token_id = o.token_id?;
                let market = o.market;
                if let Some(wanted) = market_id {
                    if market.as_deref() != Some(wanted) {
                        return None;
                    }
                }
                Some(Fill {
                    token_id,
                    market_id: market,
                    outcome: o.outcome.unwrap_or_else(|| "Unknown".to_string()),
                    side: Side::parse(o.side.as_deref().unwrap_or("BUY")),
                    size: o.size.as_deref().and_then(|s| Decimal::from_str(s).ok())?,
                    price: o.price.as_deref().and_then(|s| Decimal::from_str(s).ok())?,
                    status: o.status.unwrap_or_default(),
                })
            })
            .collect();

        Ok(fills)
    }

    /// Submit an order; returns the exchange order id on acceptance.
    ///
    /// Signing and custody are the relay's concern, not ours.
    pub async fn submit_order(
        &self,
        token_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<String> {
        let url = format!("{}/order", self.clob_url);
        let request = OrderRequest {
            token_id,
            side: side.as_str(),
            price,
            size,
        };

        let ack: OrderAck = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to submit order")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse order ack")?;

        if !ack.success {
            anyhow::bail!(
                "Order rejected: {}",
                ack.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        ack.order_id
            .ok_or_else(|| anyhow::anyhow!("Order accepted but no order id returned"))
    }

    fn normalize_market(&self, gm: GammaMarket) -> Market {
        Market {
            condition_id: gm.condition_id,
            question: gm.question,
            outcomes: parse_string_array(&gm.outcomes),
            outcome_prices: parse_string_array(&gm.outcome_prices)
                .iter()
                .filter_map(|p| Decimal::from_str(p).ok())
                .collect(),
            token_ids: parse_string_array(&gm.clob_token_ids),
            closed: gm.closed,
        }
    }
}

#[async_trait]
impl OrderLookup for ExchangeClient {
    async fn order_status(&self, order_id: &str) -> Result<Option<OrderState>> {
        let url = format!("{}/data/order/{}", self.clob_url, order_id);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        #[derive(Deserialize)]
        struct OrderStatusResponse {
            #[serde(default)]
            status: Option<String>,
        }

        let order: OrderStatusResponse = response.error_for_status()?.json().await?;
        Ok(order.status.map(|s| OrderState::parse(&s)))
    }
}

#[async_trait]
impl MarketLookup for ExchangeClient {
    async fn resolution(&self, market_id: &str) -> Result<Resolution> {
        let market = self.fetch_market(market_id).await?;

        match (market.closed, market.resolved_outcome) {
            (true, Some(outcome)) if !outcome.is_empty() => {
                let price = if outcome == "YES" {
                    Decimal::ONE
                } else {
                    Decimal::ZERO
                };
                Ok(Resolution::Resolved(price))
            }
            _ => Ok(Resolution::Pending),
        }
    }
}

#[async_trait]
impl PriceLookup for ExchangeClient {
    async fn price(&self, token_id: &str) -> Result<Option<Decimal>> {
        let url = format!("{}/prices?token_ids={}", self.clob_url, token_id);
        let prices: HashMap<String, Option<String>> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price = prices
            .get(token_id)
            .and_then(|p| p.as_deref())
            .and_then(|p| Decimal::from_str(p).ok())
            .filter(|p| *p > Decimal::ZERO);

        if price.is_none() {
            debug!("No price available for token {}", token_id);
        }
        Ok(price)
    }
}

/// Exchange minimum for a marketable order, in dollars
const MIN_ORDER_TOTAL: Decimal = dec!(1.0);

/// Derive an order size from either an explicit share count or a total spend.
///
/// Price must lie within the exchange's valid band [0.01, 0.99]. Orders whose
/// total falls below the $1 exchange minimum are bumped up to it.
pub fn order_size(
    price: Decimal,
    size: Option<Decimal>,
    total_amount: Option<Decimal>,
) -> Result<Decimal> {
    if price < dec!(0.01) || price > dec!(0.99) {
        anyhow::bail!("Price must be between 0.01 and 0.99, got {}", price);
    }

    let mut size = match (size, total_amount) {
        (_, Some(total)) => total / price,
        (Some(size), None) => size,
        (None, None) => anyhow::bail!("Either size or total amount is required"),
    };

    if price * size < MIN_ORDER_TOTAL {
        size = MIN_ORDER_TOTAL / price;
    }

    Ok(size)
}


/// Parse one of Gamma's JSON-string-encoded arrays; malformed input yields
/// an empty vec rather than an error
fn parse_string_array(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .unwrap_or_default()
}
