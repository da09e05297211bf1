use crate::supply;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ironmaker_core::{
    ApiConfig, Candle, ExchangeClient, ExchangeError, ExchangeResult, LiveOrder, Market, MarketId,
    OrderRequest, Side, SupplyMetric, Ticker, TradeFill, WalletSnapshot,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// One hour in the exchange's nanosecond timeframe encoding.
const TIMEFRAME_1H_NS: i64 = 3_600_000_000_000;

/// Page size for order/trade listing.
const PAGE_LIMIT: u32 = 50;

/// Raw REST client for the Blocky exchange.
///
/// Every response is wrapped in a `{success, error_code, error_message}`
/// envelope; envelope failures become `ExchangeError::Business` and
/// connection or 5xx failures become `ExchangeError::Transport`. This
/// client does no throttling of its own; production traffic goes through
/// `ExchangeGateway`.
pub struct BlockyClient {
    http: Client,
    endpoint: String,
}

impl BlockyClient {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> ExchangeResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = config.api_key.as_deref() {
            let value = reqwest::header::HeaderValue::from_str(key)
                .map_err(|_| ExchangeError::Transport("api key is not a valid header".into()))?;
            headers.insert("x-api-key", value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(50)
            .build()
            .map_err(ExchangeError::transport)?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> ExchangeResult<Value> {
        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        let mut req = self.http.request(method, &url).query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(ExchangeError::transport)?;
        let status = response.status();
        let text = response.text().await.map_err(ExchangeError::transport)?;

        if status.is_server_error() {
            return Err(ExchangeError::Transport(format!("{status} from {path}")));
        }

        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) if status.is_success() => {
                return Err(ExchangeError::Transport(format!(
                    "non-JSON response from {path}"
                )))
            }
            Err(_) => {
                return Err(Self::business_from_status(status, &text));
            }
        };

        if let Some(obj) = value.as_object() {
            let success = obj
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(status.is_success());
            if !success || !status.is_success() {
                let code = obj
                    .get("error_code")
                    .and_then(Value::as_i64)
                    .unwrap_or_else(|| i64::from(status.as_u16()));
                let message = obj
                    .get("error_message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(ExchangeError::Business { code, message });
            }
        } else if !status.is_success() {
            return Err(Self::business_from_status(status, &text));
        }

        Ok(value)
    }

    fn business_from_status(status: StatusCode, text: &str) -> ExchangeError {
        ExchangeError::Business {
            code: i64::from(status.as_u16()),
            message: text.chars().take(200).collect(),
        }
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> ExchangeResult<Value> {
        self.request(Method::GET, path, query, None).await
    }

    fn parse_order(value: &Value) -> Option<LiveOrder> {
        let order_id = num(value, &["id", "order_id"])? as u64;
        let market = MarketId::new(value.get("market")?.as_str()?);
        let side = parse_side(value.get("side")?.as_str()?)?;
        Some(LiveOrder {
            market,
            side,
            price: num(value, &["price"])?,
            quantity: num(value, &["quantity"])?,
            order_id,
        })
    }
}

/// Reads a numeric field that the exchange may encode as a number or a
/// decimal string. The first matching key wins.
fn num(value: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match value.get(key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => return s.parse().ok(),
            _ => {}
        }
    }
    None
}

fn parse_side(s: &str) -> Option<Side> {
    match s {
        "buy" => Some(Side::Buy),
        "sell" => Some(Side::Sell),
        _ => None,
    }
}

fn timestamp_from_nanos(nanos: Option<f64>) -> DateTime<Utc> {
    nanos.map_or_else(Utc::now, |ns| DateTime::from_timestamp_nanos(ns as i64))
}

#[async_trait]
impl ExchangeClient for BlockyClient {
    async fn list_markets(&self) -> ExchangeResult<Vec<Market>> {
        let value = self.get("/markets", &[]).await?;
        let markets = value
            .get("markets")
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::Transport("malformed /markets response".into()))?;

        Ok(markets
            .iter()
            .filter_map(|m| m.get("market").and_then(Value::as_str))
            .map(|name| Market::new(MarketId::new(name)))
            .collect())
    }

    async fn wallet_balances(&self) -> ExchangeResult<WalletSnapshot> {
        let value = self.get("/wallets", &[]).await?;
        let wallets = value
            .get("wallets")
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::Transport("malformed /wallets response".into()))?;

        let balances = wallets
            .iter()
            .filter_map(|w| {
                let currency = w
                    .get("currency")
                    .or_else(|| w.get("instrument"))?
                    .as_str()?;
                Some((currency.to_string(), num(w, &["balance"])?))
            })
            .collect();

        Ok(WalletSnapshot {
            balances,
            fetched_at: Utc::now(),
        })
    }

    async fn ticker(&self, market: &MarketId) -> ExchangeResult<Ticker> {
        let value = self.get(&format!("/markets/{market}/ticker"), &[]).await?;
        Ok(Ticker {
            bid: num(&value, &["bid"]).filter(|p| *p > 0.0),
            ask: num(&value, &["ask"]).filter(|p| *p > 0.0),
            last: num(&value, &["close", "last"]).filter(|p| *p > 0.0),
        })
    }

    async fn supply_metric(&self, market: &MarketId) -> ExchangeResult<SupplyMetric> {
        let ids = supply::item_ids(market)
            .ok_or_else(|| ExchangeError::Stale(format!("no supply mapping for {market}")))?;
        let total = supply::world_supply(market)
            .ok_or_else(|| ExchangeError::Stale(format!("no supply estimate for {market}")))?;

        let query = [
            ("time_range".to_string(), "24h".to_string()),
            ("interval".to_string(), "1h".to_string()),
        ];
        let value = self.get("/supply-metrics", &query).await?;
        let samples = value
            .as_array()
            .ok_or_else(|| ExchangeError::Transport("malformed /supply-metrics response".into()))?;
        let latest = samples
            .last()
            .ok_or_else(|| ExchangeError::Stale("supply metrics are empty".into()))?;

        let circulating: f64 = ids.iter().filter_map(|id| num(latest, &[id])).sum();

        Ok(SupplyMetric {
            total,
            remaining: total - circulating,
        })
    }

    async fn candles(&self, market: &MarketId, hours: u32) -> ExchangeResult<Vec<Candle>> {
        let query = [("timeframe".to_string(), TIMEFRAME_1H_NS.to_string())];
        let value = self
            .get(&format!("/markets/{market}/ohlcv"), &query)
            .await?;
        let rows = value
            .get("candles")
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::Transport("malformed ohlcv response".into()))?;

        let candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| {
                Some(Candle {
                    timestamp: timestamp_from_nanos(num(row, &["timestamp", "t"])),
                    open: num(row, &["open", "o"])?,
                    high: num(row, &["high", "h"])?,
                    low: num(row, &["low", "l"])?,
                    close: num(row, &["close", "c"])?,
                    volume: num(row, &["volume", "v"]).unwrap_or(0.0),
                })
            })
            .collect();

        let keep = hours as usize;
        let skip = candles.len().saturating_sub(keep);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<u64> {
        let body = serde_json::json!({
            "market": order.market.as_str(),
            "side": order.side.as_str(),
            "type": "limit",
            "price": format!("{:.2}", order.price),
            "quantity": format!("{:.2}", order.quantity),
            "sub_wallet_id": 0,
        });
        let value = self
            .request(Method::POST, "/orders", &[], Some(&body))
            .await?;

        let id = num(&value, &["id", "order_id"])
            .or_else(|| value.get("order").and_then(|o| num(o, &["id", "order_id"])))
            .ok_or_else(|| ExchangeError::Transport("order id missing from response".into()))?;
        Ok(id as u64)
    }

    async fn cancel_order(&self, order_id: u64) -> ExchangeResult<()> {
        self.request(Method::DELETE, &format!("/orders/{order_id}"), &[], None)
            .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self) -> ExchangeResult<()> {
        self.request(Method::DELETE, "/orders", &[], None).await?;
        Ok(())
    }

    async fn open_orders(&self, market: Option<&MarketId>) -> ExchangeResult<Vec<LiveOrder>> {
        let mut orders = Vec::new();
        let mut cursor: Option<u64> = None;

        loop {
            let mut query = vec![
                ("limit".to_string(), PAGE_LIMIT.to_string()),
                ("sort_order".to_string(), "desc".to_string()),
                ("statuses".to_string(), "open".to_string()),
            ];
            if let Some(market) = market {
                query.push(("markets".to_string(), market.to_string()));
            }
            if let Some(cursor) = cursor {
                query.push(("cursor".to_string(), cursor.to_string()));
            }

            let value = self.get("/orders", &query).await?;
            let page = value
                .get("orders")
                .and_then(Value::as_array)
                .ok_or_else(|| ExchangeError::Transport("malformed /orders response".into()))?;

            let page_len = page.len();
            orders.extend(page.iter().filter_map(BlockyClient::parse_order));

            if page_len < PAGE_LIMIT as usize {
                break;
            }
            cursor = num(&value, &["next_cursor", "cursor"])
                .map(|c| c as u64)
                .or_else(|| orders.last().map(|o| o.order_id));
            if cursor.is_none() {
                break;
            }
        }

        Ok(orders)
    }

    async fn recent_trades(&self, limit: u32) -> ExchangeResult<Vec<TradeFill>> {
        let query = [
            ("limit".to_string(), limit.to_string()),
            ("sort_order".to_string(), "desc".to_string()),
        ];
        let value = self.get("/trades", &query).await?;
        let trades = value
            .get("trades")
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::Transport("malformed /trades response".into()))?;

        Ok(trades
            .iter()
            .filter_map(|t| {
                Some(TradeFill {
                    trade_id: num(t, &["id", "trade_id"])? as u64,
                    market: MarketId::new(t.get("market")?.as_str()?),
                    side: parse_side(t.get("side")?.as_str()?)?,
                    price: num(t, &["price"])?,
                    quantity: num(t, &["quantity"])?,
                    timestamp: timestamp_from_nanos(num(t, &["timestamp", "created_at"])),
                })
            })
            .collect())
    }
}
