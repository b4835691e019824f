//! Binance REST market data (spot + coin-margined futures)
//!
//! Only public endpoints are used here: book ticker, daily klines and
//! exchange info. Symbols are routed to the spot or COIN-M venue by name.

use super::{is_coin_margined, DeliveryContract, Kline, MarketDataPort, Quote};
use crate::instrument::InstrumentSpec;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

/// Binance spot REST base URL
pub const SPOT_API_URL: &str = "https://api.binance.com";

/// Binance COIN-M futures REST base URL
pub const COIN_M_API_URL: &str = "https://dapi.binance.com";

/// Largest kline window requested at once (COIN-M caps 1d ranges at 200 days)
const KLINE_CHUNK_DAYS: i64 = 200;

/// Configuration for the Binance REST clients
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// Spot REST base URL
    pub spot_base_url: String,
    /// COIN-M futures REST base URL
    pub futures_base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            spot_base_url: SPOT_API_URL.to_string(),
            futures_base_url: COIN_M_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl BinanceConfig {
    /// REST path prefix for a symbol's venue
    pub fn endpoint(&self, symbol: &str, spot_path: &str, futures_path: &str) -> String {
        if is_coin_margined(symbol) {
            format!("{}{}", self.futures_base_url, futures_path)
        } else {
            format!("{}{}", self.spot_base_url, spot_path)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    symbol: String,
    bid_price: String,
    ask_price: String,
}

/// Spot returns a single object, COIN-M returns a list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BookTickerPayload {
    One(BookTicker),
    Many(Vec<BookTicker>),
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    #[serde(default)]
    pair: Option<String>,
    #[serde(default)]
    contract_type: Option<String>,
    #[serde(default)]
    delivery_date: Option<i64>,
    #[serde(default)]
    contract_status: Option<String>,
    #[serde(default)]
    contract_size: Option<Decimal>,
    #[serde(default)]
    filters: Vec<Value>,
}

/// Binance REST market data client
pub struct BinanceFeed {
    config: BinanceConfig,
    client: Client,
}

impl BinanceFeed {
    /// Create a client with the default endpoints
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(BinanceConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: BinanceConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<T> {
        tracing::debug!(url = %url, ?query, "Binance request");

        let response = self.client.get(url).query(query).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error: {} - {}", status, body);
        }
        Ok(response.json().await?)
    }

    async fn exchange_info(&self, symbol: &str, with_symbol_filter: bool) -> anyhow::Result<ExchangeInfo> {
        let url = self
            .config
            .endpoint(symbol, "/api/v3/exchangeInfo", "/dapi/v1/exchangeInfo");
        let query = if with_symbol_filter && !is_coin_margined(symbol) {
            vec![("symbol", symbol.to_string())]
        } else {
            vec![]
        };
        self.get_json(&url, &query).await
    }
}

#[async_trait]
impl MarketDataPort for BinanceFeed {
    async fn get_quote(&self, symbol: &str) -> anyhow::Result<Quote> {
        let url = self
            .config
            .endpoint(symbol, "/api/v3/ticker/bookTicker", "/dapi/v1/ticker/bookTicker");
        let payload: BookTickerPayload = self.get_json(&url, &[("symbol", symbol.to_string())]).await?;

        let ticker = match payload {
            BookTickerPayload::One(t) => t,
            BookTickerPayload::Many(list) => list
                .into_iter()
                .find(|t| t.symbol == symbol)
                .ok_or_else(|| anyhow::anyhow!("No book ticker data for {}", symbol))?,
        };

        Ok(Quote::new(
            ticker.symbol,
            Decimal::from_str(&ticker.bid_price)?,
            Decimal::from_str(&ticker.ask_price)?,
        ))
    }

    async fn get_daily_klines(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Kline>> {
        let url = self.config.endpoint(symbol, "/api/v3/klines", "/dapi/v1/klines");
        let mut klines: Vec<Kline> = Vec::new();

        let mut chunk_start = start;
        while chunk_start <= end {
            let chunk_end = (chunk_start + ChronoDuration::days(KLINE_CHUNK_DAYS - 1)).min(end);
            let query = [
                ("symbol", symbol.to_string()),
                ("interval", "1d".to_string()),
                ("startTime", day_start_millis(chunk_start).to_string()),
                ("endTime", (day_start_millis(chunk_end + ChronoDuration::days(1)) - 1).to_string()),
                ("limit", "1000".to_string()),
            ];
            let rows: Vec<Vec<Value>> = self.get_json(&url, &query).await?;
            klines.extend(rows.iter().filter_map(|row| parse_kline(row)));
            chunk_start = chunk_end + ChronoDuration::days(1);
        }

        klines.retain(|k| k.date >= start && k.date <= end);
        klines.sort_by_key(|k| k.date);
        klines.dedup_by_key(|k| k.date);

        tracing::debug!(symbol, count = klines.len(), "Fetched daily klines");
        Ok(klines)
    }

    async fn get_instrument(&self, symbol: &str) -> anyhow::Result<InstrumentSpec> {
        let info = self.exchange_info(symbol, true).await?;
        let entry = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| anyhow::anyhow!("Symbol {} missing in exchange info", symbol))?;
        instrument_from_info(&entry)
    }

    async fn delivery_contracts(&self, pair: &str) -> anyhow::Result<Vec<DeliveryContract>> {
        // Any underscored symbol routes to COIN-M
        let info = self.exchange_info(&format!("{}_PERP", pair), false).await?;

        let contracts = info
            .symbols
            .into_iter()
            .filter(|s| s.pair.as_deref() == Some(pair))
            .filter(|s| s.contract_type.as_deref() != Some("PERPETUAL"))
            .filter_map(|s| {
                let delivery = Utc.timestamp_millis_opt(s.delivery_date?).single()?;
                Some(DeliveryContract {
                    trading: s.contract_status.as_deref() == Some("TRADING"),
                    contract_size: s.contract_size?,
                    pair: pair.to_string(),
                    symbol: s.symbol,
                    delivery,
                })
            })
            .collect();
        Ok(contracts)
    }
}

/// Milliseconds at 00:00 UTC of `day`
fn day_start_millis(day: NaiveDate) -> i64 {
    NaiveDateTime::new(day, NaiveTime::default())
        .and_utc()
        .timestamp_millis()
}

/// Parse a kline row `[openTime, open, high, low, close, ...]`
fn parse_kline(row: &[Value]) -> Option<Kline> {
    let open_time = row.first()?.as_i64()?;
    let date = Utc.timestamp_millis_opt(open_time).single()?.date_naive();
    let field = |i: usize| -> Option<Decimal> { Decimal::from_str(row.get(i)?.as_str()?).ok() };

    Some(Kline {
        date,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
    })
}

/// Decimal field of the first filter with the given `filterType`
fn filter_value(filters: &[Value], filter_type: &str, key: &str) -> Option<Decimal> {
    filters
        .iter()
        .find(|f| f.get("filterType").and_then(Value::as_str) == Some(filter_type))
        .and_then(|f| f.get(key))
        .and_then(|v| match v {
            Value::String(s) => Decimal::from_str(s).ok(),
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        })
}

fn instrument_from_info(info: &SymbolInfo) -> anyhow::Result<InstrumentSpec> {
    let tick = filter_value(&info.filters, "PRICE_FILTER", "tickSize").unwrap_or(Decimal::ZERO);
    let step = filter_value(&info.filters, "LOT_SIZE", "stepSize");
    let min_qty = filter_value(&info.filters, "LOT_SIZE", "minQty");

    if is_coin_margined(&info.symbol) {
        let face_value = info
            .contract_size
            .ok_or_else(|| anyhow::anyhow!("No contractSize for {}", info.symbol))?;
        let mut spec = InstrumentSpec::inverse_future(info.symbol.clone(), face_value, tick);
        if let Some(step) = step {
            spec.step_size = step;
        }
        if let Some(min_qty) = min_qty {
            spec.min_qty = min_qty;
            spec.min_notional = face_value * min_qty;
        }
        return Ok(spec);
    }

    let min_notional = filter_value(&info.filters, "NOTIONAL", "minNotional")
        .or_else(|| filter_value(&info.filters, "MIN_NOTIONAL", "minNotional"))
        .unwrap_or(Decimal::ZERO);

    Ok(InstrumentSpec::spot(
        info.symbol.clone(),
        step.ok_or_else(|| anyhow::anyhow!("No LOT_SIZE filter for {}", info.symbol))?,
        min_qty.unwrap_or(Decimal::ZERO),
        min_notional,
        tick,
    ))
}
