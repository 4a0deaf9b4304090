//! Korea Investment & Securities open-API adapter.
//!
//! Only the three calls the trader needs: current quote, intraday minute chart
//! and cash market order. Credentials come in ready-made; token issuance and
//! refresh belong to the auth collaborator.

use async_trait::async_trait;
use chrono::NaiveTime;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{Account, AccountMode, Bar, OrderAck, Side};
use crate::error::{Result, TraderError};
use crate::gateway::OrderGateway;
use crate::source::PriceSource;
use crate::throttle::Throttle;
use crate::time::{format_hhmmss, parse_hhmmss};

const PRICE_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-price";
const CHART_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice";
const ORDER_PATH: &str = "/uapi/domestic-stock/v1/trading/order-cash";

const TR_PRICE: &str = "FHKST01010100";
const TR_CHART: &str = "FHKST03010200";

/// KRX stock market division code.
const MARKET_DIV: &str = "J";
/// Market order; the unit price must be sent as "0".
const ORD_DVSN_MARKET: &str = "01";

fn order_tr_id(mode: AccountMode, side: Side) -> &'static str {
    match (mode, side) {
        (AccountMode::Real, Side::Buy) => "TTTC0012U",
        (AccountMode::Real, Side::Sell) => "TTTC0011U",
        (AccountMode::Demo, Side::Buy) => "VTTC0012U",
        (AccountMode::Demo, Side::Sell) => "VTTC0011U",
    }
}

#[derive(Clone)]
pub struct KisClient {
    base_url: String,
    http: Client,
    app_key: String,
    app_secret: String,
    access_token: String,
    mode: AccountMode,
    throttle: Throttle,
    call_timeout: Duration,
}

impl KisClient {
    pub fn new(cfg: &Config, throttle: Throttle) -> Self {
        Self {
            base_url: cfg.kis_base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
            app_key: cfg.app_key.clone(),
            app_secret: cfg.app_secret.clone(),
            access_token: cfg.access_token.clone(),
            mode: cfg.account_mode,
            throttle,
            call_timeout: cfg.call_timeout,
        }
    }

    fn authed(&self, req: RequestBuilder, tr_id: &str) -> RequestBuilder {
        req.header("authorization", format!("Bearer {}", self.access_token))
            .header("appkey", &self.app_key)
            .header("appsecret", &self.app_secret)
            .header("tr_id", tr_id)
            .header("custtype", "P")
    }

    /// Throttled, time-boxed call.
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.throttle.acquire().await;
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(TraderError::Timeout {
                operation,
                elapsed_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, tr_id: &str, query: &[(&str, &str)]) -> Result<Envelope<T>> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .authed(self.http.get(url), tr_id)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        let env: Envelope<T> = resp.json().await?;
        env.check()?;
        Ok(env)
    }

    pub async fn inquire_price(&self, code: &str) -> Result<Option<u64>> {
        let query = [("FID_COND_MRKT_DIV_CODE", MARKET_DIV), ("FID_INPUT_ISCD", code)];
        let env: Envelope<PriceOutput> = self
            .call("inquire_price", self.get(PRICE_PATH, TR_PRICE, &query))
            .await?;
        Ok(env.output.and_then(|o| parse_price(&o.stck_prpr)))
    }

    pub async fn inquire_minute_chart(&self, code: &str, end: NaiveTime) -> Result<Vec<Bar>> {
        let hour = format_hhmmss(end);
        let query = [
            ("FID_ETC_CLS_CODE", ""),
            ("FID_COND_MRKT_DIV_CODE", MARKET_DIV),
            ("FID_INPUT_ISCD", code),
            ("FID_INPUT_HOUR_1", hour.as_str()),
            ("FID_PW_DATA_INCU_YN", "Y"),
        ];
        let env: Envelope<serde_json::Value> = self
            .call("inquire_minute_chart", self.get(CHART_PATH, TR_CHART, &query))
            .await?;
        Ok(bars_from_chart(code, env.output2.unwrap_or_default()))
    }

    pub async fn order_cash(&self, account: &Account, side: Side, code: &str, quantity: u64) -> Result<OrderAck> {
        let body = OrderCashRequest {
            cano: account.number.clone(),
            acnt_prdt_cd: account.product_code.clone(),
            pdno: code.to_string(),
            ord_dvsn: ORD_DVSN_MARKET.to_string(),
            ord_qty: quantity.to_string(),
            ord_unpr: "0".to_string(),
            excg_id_dvsn_cd: "KRX".to_string(),
        };
        let tr_id = order_tr_id(self.mode, side);
        let url = format!("{}{}", self.base_url, ORDER_PATH);

        let send = async {
            let resp = self
                .authed(self.http.post(url), tr_id)
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            let env: Envelope<OrderCashOutput> = resp.json().await?;
            env.check()?;
            let order_id = env
                .output
                .map(|o| o.odno)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| TraderError::Broker {
                    code: env.msg_cd.clone(),
                    message: "order accepted without an order number".into(),
                })?;
            Ok::<_, TraderError>(OrderAck { order_id })
        };
        self.call("order_cash", send).await
    }
}

#[async_trait]
impl PriceSource for KisClient {
    async fn current_price(&self, code: &str, _step: u64) -> Result<Option<u64>> {
        self.inquire_price(code).await
    }

    async fn historical_page(&self, code: &str, end: NaiveTime) -> Result<Vec<Bar>> {
        self.inquire_minute_chart(code, end).await
    }
}

#[async_trait]
impl OrderGateway for KisClient {
    fn is_dry_run(&self) -> bool {
        false
    }

    async fn submit_market_order(
        &self,
        account: &Account,
        side: Side,
        code: &str,
        quantity: u64,
    ) -> Result<OrderAck> {
        debug!(%side, code, quantity, mode = %self.mode, "kis.order_cash");
        self.order_cash(account, side, code, quantity).await
    }
}

/// Common response shape: `rt_cd == "0"` means success.
#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    rt_cd: String,
    #[serde(default)]
    msg_cd: String,
    #[serde(default)]
    msg1: String,
    output: Option<T>,
    /// Chart rows; only present on the minute chart call.
    output2: Option<Vec<serde_json::Value>>,
}

impl<T> Envelope<T> {
    fn check(&self) -> Result<()> {
        if self.rt_cd == "0" {
            Ok(())
        } else {
            Err(TraderError::Broker {
                code: self.msg_cd.clone(),
                message: self.msg1.trim().to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PriceOutput {
    #[serde(default)]
    stck_prpr: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartRow {
    #[serde(default)]
    stck_cntg_hour: String,
    #[serde(default)]
    stck_prpr: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct OrderCashRequest {
    cano: String,
    acnt_prdt_cd: String,
    pdno: String,
    ord_dvsn: String,
    ord_qty: String,
    ord_unpr: String,
    excg_id_dvsn_cd: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OrderCashOutput {
    #[serde(rename = "ODNO", default)]
    odno: String,
}

/// Positive whole-unit price, or `None`.
pub fn parse_price(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|p| *p > 0)
}

fn bars_from_chart(code: &str, rows: Vec<serde_json::Value>) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(rows.len());
    for raw in rows {
        let row: ChartRow = match serde_json::from_value(raw) {
            Ok(row) => row,
            Err(e) => {
                warn!(code, error = %e, "kis.chart_row_undecodable");
                continue;
            }
        };
        match (parse_hhmmss(&row.stck_cntg_hour), parse_price(&row.stck_prpr)) {
            (Some(time), Some(price)) => bars.push(Bar { code: code.to_string(), time, price }),
            _ => warn!(
                code,
                hour = %row.stck_cntg_hour,
                price = %row.stck_prpr,
                "kis.chart_row_dropped"
            ),
        }
    }
    bars
}
