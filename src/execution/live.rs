//! Live Binance order gateway
//!
//! Signs order requests with HMAC-SHA256 and posts them to the spot or
//! COIN-M order endpoint depending on the symbol. Limit slices are
//! immediate-or-cancel so nothing rests on the book past its slice.

use super::{OrderOutcome, OrderPort, OrderRequest, OrderStatus, OrderType};
use crate::config::Credentials;
use crate::feed::{is_coin_margined, BinanceConfig};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: Value,
    status: String,
    #[serde(default)]
    executed_qty: Option<String>,
}

/// Signed REST order gateway
pub struct BinanceOrderGateway {
    config: BinanceConfig,
    credentials: Credentials,
    recv_window_ms: u64,
    client: Client,
}

impl BinanceOrderGateway {
    pub fn new(
        config: BinanceConfig,
        credentials: Credentials,
        recv_window_ms: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            credentials,
            recv_window_ms,
            client,
        })
    }

    fn query_string(&self, order: &OrderRequest, timestamp_ms: i64) -> anyhow::Result<String> {
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", order.order_type.as_str().to_string()),
            ("quantity", order.quantity.normalize().to_string()),
        ];
        if order.order_type == OrderType::Limit {
            let price = order
                .price
                .ok_or_else(|| anyhow::anyhow!("Limit order for {} without a price", order.symbol))?;
            params.push(("timeInForce", "IOC".to_string()));
            params.push(("price", price.normalize().to_string()));
        }
        params.push(("newClientOrderId", order.client_order_id.simple().to_string()));
        params.push(("newOrderRespType", "RESULT".to_string()));
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", timestamp_ms.to_string()));

        Ok(params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&"))
    }

    /// Query string with its signature appended
    fn signed_query(&self, order: &OrderRequest, timestamp_ms: i64) -> anyhow::Result<String> {
        let query = self.query_string(order, timestamp_ms)?;
        let signature = sign(&self.credentials.api_secret, &query)?;
        Ok(format!("{}&signature={}", query, signature))
    }
}

/// Hex HMAC-SHA256 of a query string
pub fn sign(secret: &str, payload: &str) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid signing key: {}", e))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Map an exchange order status to a terminal outcome
///
/// Resting orders (`NEW`, `PARTIALLY_FILLED`) count as partial with
/// whatever has executed so far.
pub fn map_status(status: &str) -> anyhow::Result<OrderStatus> {
    match status {
        "FILLED" => Ok(OrderStatus::Filled),
        "PARTIALLY_FILLED" | "NEW" => Ok(OrderStatus::Partial),
        "CANCELED" | "EXPIRED" | "REJECTED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Canceled),
        other => anyhow::bail!("Unknown order status {}", other),
    }
}

/// An IOC order that traded before expiring is a partial fill
fn settle_status(status: OrderStatus, executed: Decimal) -> OrderStatus {
    match status {
        OrderStatus::Canceled if executed > Decimal::ZERO => OrderStatus::Partial,
        other => other,
    }
}

#[async_trait]
impl OrderPort for BinanceOrderGateway {
    async fn place_order(&self, order: OrderRequest) -> anyhow::Result<OrderOutcome> {
        let query = self.signed_query(&order, Utc::now().timestamp_millis())?;
        let url = format!(
            "{}?{}",
            self.config
                .endpoint(&order.symbol, "/api/v3/order", "/dapi/v1/order"),
            query
        );

        tracing::debug!(
            symbol = %order.symbol,
            coin_margined = is_coin_margined(&order.symbol),
            "Submitting signed order"
        );

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance order rejected: {} - {}", status, body);
        }

        let body: OrderResponse = response.json().await?;
        let reported = map_status(&body.status)?;
        let executed_quantity = match reported {
            OrderStatus::Filled => order.quantity,
            _ => body
                .executed_qty
                .as_deref()
                .map(Decimal::from_str)
                .transpose()?
                .unwrap_or(Decimal::ZERO),
        };
        let status = settle_status(reported, executed_quantity);
        let order_id = match body.order_id {
            Value::String(s) => s,
            other => other.to_string(),
        };

        tracing::info!(
            %order_id,
            symbol = %order.symbol,
            side = order.side.as_str(),
            ?status,
            executed = %executed_quantity,
            "Live order"
        );

        Ok(OrderOutcome {
            order_id,
            status,
            executed_quantity,
            timestamp: Utc::now(),
        })
    }

    fn name(&self) -> &'static str {
        "live"
    }
}
