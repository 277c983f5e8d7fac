// =============================================================================
// Sina Finance REST client: daily K-lines and the A-share listing
// =============================================================================
//
// Endpoints (public, unauthenticated):
//   CN_MarketData.getKLineData   ?symbol=sz000001&scale=240&datalen=N&end_date=YYYYMMDD
//   Market_Center.getHQNodeData  ?page=P&num=100&node=hs_a&sort=code&asc=1
//
// Quirks:
//   - An unknown symbol returns the literal body `null`.
//   - Numeric fields arrive as JSON strings on some days and numbers on others.
//   - Early bars omit the moving-average fields the provider cannot yet compute.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument, warn};

use super::MarketDataSource;
use crate::symbol;
use crate::types::Bar;

const KLINE_URL: &str =
    "https://money.finance.sina.com.cn/quotes_service/api/json_v2.php/CN_MarketData.getKLineData";
const NODE_URL: &str =
    "https://vip.stock.finance.sina.com.cn/quotes_service/api/json_v2.php/Market_Center.getHQNodeData";

/// `scale=240` minutes is one trading day.
const DAILY_SCALE: u32 = 240;
const LISTING_PAGE_SIZE: usize = 100;
const LISTING_PAGE_DELAY: Duration = Duration::from_millis(50);
/// Hard stop for the listing walk in case the provider never returns an empty
/// page.
const LISTING_MAX_PAGES: u32 = 200;

#[derive(Clone)]
pub struct SinaClient {
    kline_url: String,
    node_url: String,
    client: reqwest::Client,
}

impl SinaClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(REFERER, HeaderValue::from_static("https://finance.sina.com.cn/"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        debug!("SinaClient initialised");

        Ok(Self {
            kline_url: KLINE_URL.to_string(),
            node_url: NODE_URL.to_string(),
            client,
        })
    }

    async fn get_text(&self, url: &str, what: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {what} request failed"))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("failed to read {what} response"))?;

        if !status.is_success() {
            anyhow::bail!("Sina GET {what} returned {status}: {body}");
        }
        Ok(body)
    }

    /// One page of the A-share listing. Empty when past the last page.
    #[instrument(skip(self), name = "sina::listing_page")]
    pub async fn listing_page(&self, page: u32) -> Result<Vec<String>> {
        let url = format!(
            "{}?page={page}&num={LISTING_PAGE_SIZE}&node=hs_a&sort=code&asc=1",
            self.node_url
        );
        let body = self.get_text(&url, "getHQNodeData").await?;
        parse_listing(&body)
    }
}

impl std::fmt::Debug for SinaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinaClient")
            .field("kline_url", &self.kline_url)
            .field("node_url", &self.node_url)
            .finish()
    }
}

#[async_trait]
impl MarketDataSource for SinaClient {
    #[instrument(skip(self), name = "sina::fetch_history")]
    async fn fetch_history(&self, symbol: &str, max_bars: usize) -> Result<Vec<Bar>> {
        let end_date = Local::now().date_naive().format("%Y%m%d");
        let url = format!(
            "{}?symbol={symbol}&scale={DAILY_SCALE}&datalen={max_bars}&end_date={end_date}",
            self.kline_url
        );
        let body = self.get_text(&url, "getKLineData").await?;
        let bars = parse_klines(symbol, &body)?;
        debug!(symbol, count = bars.len(), "klines fetched");
        Ok(bars)
    }

    async fn list_symbols(&self) -> Result<Vec<String>> {
        let mut symbols = Vec::new();
        for page in 1..=LISTING_MAX_PAGES {
            let batch = self.listing_page(page).await?;
            if batch.is_empty() {
                break;
            }
            symbols.extend(batch);
            tokio::time::sleep(LISTING_PAGE_DELAY).await;
        }
        if symbols.is_empty() {
            anyhow::bail!("Sina listing returned no symbols");
        }
        debug!(count = symbols.len(), "listing fetched");
        Ok(symbols)
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct SinaKline {
    day: String,
    #[serde(deserialize_with = "lenient_f64")]
    open: f64,
    #[serde(deserialize_with = "lenient_f64")]
    high: f64,
    #[serde(deserialize_with = "lenient_f64")]
    low: f64,
    #[serde(deserialize_with = "lenient_f64")]
    close: f64,
    #[serde(deserialize_with = "lenient_f64")]
    volume: f64,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    ma_price5: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    ma_price10: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    ma_price30: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    ma_volume5: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    ma_volume10: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    ma_volume30: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SinaListing {
    symbol: String,
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn value_to_f64(val: &serde_json::Value) -> std::result::Result<f64, String> {
    if let Some(s) = val.as_str() {
        s.trim()
            .parse::<f64>()
            .map_err(|e| format!("failed to parse '{s}' as f64: {e}"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        Err(format!("expected string or number, got: {val}"))
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    let val = serde_json::Value::deserialize(d)?;
    value_to_f64(&val).map_err(serde::de::Error::custom)
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    let val = serde_json::Value::deserialize(d)?;
    match val {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(ref s) if s.trim().is_empty() => Ok(None),
        other => value_to_f64(&other).map(Some).map_err(serde::de::Error::custom),
    }
}

fn to_u64(v: f64) -> u64 {
    if v.is_finite() && v > 0.0 {
        v.round() as u64
    } else {
        0
    }
}

/// Decode a `getKLineData` body into raw bars for `symbol`.
fn parse_klines(symbol: &str, body: &str) -> Result<Vec<Bar>> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }

    let rows: Vec<SinaKline> = serde_json::from_str(trimmed)
        .with_context(|| format!("failed to parse klines for {symbol}"))?;

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let Ok(date) = NaiveDate::parse_from_str(row.day.get(..10).unwrap_or(&row.day), "%Y-%m-%d") else {
            warn!(symbol, day = %row.day, "skipping kline with unparseable date");
            continue;
        };
        let mut bar = Bar::new(symbol, date, row.open, row.high, row.low, row.close, to_u64(row.volume));
        bar.ma_price5 = row.ma_price5.unwrap_or(0.0);
        bar.ma_price10 = row.ma_price10.unwrap_or(0.0);
        bar.ma_price30 = row.ma_price30.unwrap_or(0.0);
        bar.ma_volume5 = row.ma_volume5.map(to_u64).unwrap_or(0);
        bar.ma_volume10 = row.ma_volume10.map(to_u64).unwrap_or(0);
        bar.ma_volume30 = row.ma_volume30.map(to_u64).unwrap_or(0);
        bars.push(bar);
    }
    Ok(bars)
}

/// Decode a `getHQNodeData` page into tradable symbols.
fn parse_listing(body: &str) -> Result<Vec<String>> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let rows: Vec<SinaListing> =
        serde_json::from_str(trimmed).context("failed to parse getHQNodeData response")?;

    Ok(rows
        .into_iter()
        .map(|r| r.symbol)
        .filter(|s| s.len() == 8 && s.get(2..).and_then(symbol::classify).is_some())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_body_is_empty() {
        assert!(parse_klines("sz999999", "null").unwrap().is_empty());
        assert!(parse_klines("sz999999", "  null\n").unwrap().is_empty());
        assert!(parse_listing("null").unwrap().is_empty());
    }

    #[test]
    fn parses_string_and_number_fields() {
        let body = r#"[
            {"day":"2024-06-06","open":"10.50","high":"10.80","low":"10.40","close":"10.70",
             "volume":"12345600","ma_price5":10.55,"ma_volume5":"11000000"},
            {"day":"2024-06-07","open":10.7,"high":11.0,"low":10.6,"close":10.9,
             "volume":9876543,"ma_price5":"10.62","ma_price10":"10.40","ma_price30":"10.10",
             "ma_volume5":10500000,"ma_volume10":"9900000","ma_volume30":9500000}
        ]"#;
        let bars = parse_klines("sz000001", body).unwrap();
        assert_eq!(bars.len(), 2);

        let first = &bars[0];
        assert_eq!(first.code, "000001");
        assert_eq!(first.trade_date, NaiveDate::from_ymd_opt(2024, 6, 6).unwrap());
        assert_eq!(first.open, 10.5);
        assert_eq!(first.volume, 12_345_600);
        assert_eq!(first.ma_price5, 10.55);
        assert_eq!(first.ma_price10, 0.0);
        assert_eq!(first.ma_volume5, 11_000_000);

        let second = &bars[1];
        assert_eq!(second.close, 10.9);
        assert_eq!(second.ma_price30, 10.10);
        assert_eq!(second.ma_volume10, 9_900_000);
        assert!(second.indicators.macd_dif.is_none());
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(parse_klines("sz000001", "<html>busy</html>").is_err());
    }

    #[test]
    fn bad_date_rows_are_skipped() {
        let body = r#"[{"day":"yesterday","open":"1","high":"1","low":"1","close":"1","volume":"1"}]"#;
        assert!(parse_klines("sz000001", body).unwrap().is_empty());
    }

    #[test]
    fn listing_keeps_tradable_symbols() {
        let body = r#"[
            {"symbol":"sh600000","code":"600000","name":"A"},
            {"symbol":"sz000001","code":"000001","name":"B"},
            {"symbol":"sz200011","code":"200011","name":"B-share"}
        ]"#;
        assert_eq!(parse_listing(body).unwrap(), vec!["sh600000", "sz000001"]);
    }
}
