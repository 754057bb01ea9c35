// src/market.rs
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use log::{debug, info, warn};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time;

const CHART_POINTS: i64 = 100;
const FALLBACK_BASE_PRICE: f64 = 100.0;
const ALPHAVANTAGE_URL: &str = "https://www.alphavantage.co/query";
const MIN_PRICE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub market_cap: f64,
    pub high_52_week: f64,
    pub low_52_week: f64,
    pub pe_ratio: f64,
    pub dividend: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

pub type Snapshot = Arc<Vec<Asset>>;

#[allow(clippy::too_many_arguments)]
fn asset(
    symbol: &str,
    name: &str,
    price: f64,
    change: f64,
    change_percent: f64,
    volume: u64,
    market_cap: f64,
    range_52_week: (f64, f64),
    pe_ratio: f64,
    dividend: f64,
    beta: f64,
) -> Asset {
    Asset {
        symbol: symbol.to_string(),
        name: name.to_string(),
        price,
        change,
        change_percent,
        volume,
        market_cap,
        high_52_week: range_52_week.0,
        low_52_week: range_52_week.1,
        pe_ratio,
        dividend,
        beta,
    }
}

pub fn seed_assets() -> Vec<Asset> {
    vec![
        asset("AAPL", "Apple Inc.", 175.84, 2.34, 1.35, 45_678_901, 2.75e12, (198.23, 124.17), 28.5, 0.24, 1.2),
        asset("GOOGL", "Alphabet Inc.", 142.56, -1.23, -0.85, 23_456_789, 1.8e12, (151.55, 83.34), 25.3, 0.0, 1.1),
        asset("MSFT", "Microsoft Corporation", 378.91, 4.67, 1.25, 34_567_890, 2.82e12, (384.30, 213.43), 32.1, 0.68, 0.9),
        asset("TSLA", "Tesla, Inc.", 248.42, -5.78, -2.28, 67_890_123, 7.9e11, (414.50, 101.81), 75.4, 0.0, 2.0),
        asset("AMZN", "Amazon.com, Inc.", 145.78, 1.89, 1.31, 56_789_012, 1.52e12, (188.11, 81.43), 58.7, 0.0, 1.3),
    ]
}

/// One random-walk step. Price never drops below one cent.
pub fn random_walk<R: Rng + ?Sized>(asset: &Asset, rng: &mut R) -> Asset {
    let mut next = asset.clone();
    next.price = (asset.price + (rng.gen::<f64>() - 0.5) * 2.0).max(MIN_PRICE);
    next.change = asset.change + (rng.gen::<f64>() - 0.5) * 0.5;
    next.change_percent = asset.change_percent + (rng.gen::<f64>() - 0.5) * 0.2;
    next
}

pub fn search<'a>(assets: &'a [Asset], term: &str) -> Vec<&'a Asset> {
    let term = term.to_lowercase();
    assets
        .iter()
        .filter(|a| a.symbol.to_lowercase().contains(&term) || a.name.to_lowercase().contains(&term))
        .collect()
}

pub fn find<'a>(assets: &'a [Asset], symbol: &str) -> Option<&'a Asset> {
    assets.iter().find(|a| a.symbol.eq_ignore_ascii_case(symbol))
}

/// One-minute candles ending at `now`, scattered around `base_price`.
pub fn chart_data<R: Rng + ?Sized>(base_price: f64, now: DateTime<Utc>, rng: &mut R) -> Vec<Candle> {
    (0..CHART_POINTS)
        .map(|i| {
            let open = (base_price + (rng.gen::<f64>() - 0.5) * 10.0).max(MIN_PRICE);
            let close = (open + (rng.gen::<f64>() - 0.5)).max(MIN_PRICE);
            let high = open.max(close) + rng.gen::<f64>() * 2.0;
            let low = (open.min(close) - rng.gen::<f64>() * 2.0).max(MIN_PRICE);
            Candle {
                time: now - Duration::minutes(CHART_POINTS - 1 - i),
                open,
                high,
                low,
                close,
                volume: rng.gen_range(0..1_000_000),
            }
        })
        .collect()
}

/// Publishes the latest snapshot to any number of readers.
#[derive(Clone)]
pub struct MarketFeed {
    rx: watch::Receiver<Snapshot>,
}

impl MarketFeed {
    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.rx.clone()
    }

    /// Fixed feed that never ticks.
    pub fn fixed(assets: Vec<Asset>) -> (MarketFeed, watch::Sender<Snapshot>) {
        let (tx, rx) = watch::channel(Arc::new(assets));
        (MarketFeed { rx }, tx)
    }

    /// Starts the ticker task stepping every asset once per `tick`.
    pub fn start(assets: Vec<Asset>, tick: std::time::Duration) -> MarketFeed {
        let (feed, tx) = MarketFeed::fixed(assets);
        tokio::spawn(async move {
            let mut interval = time::interval(tick);
            interval.tick().await;
            loop {
                interval.tick().await;
                let next: Vec<Asset> = {
                    let current = tx.borrow().clone();
                    let mut rng = rand::thread_rng();
                    current.iter().map(|a| random_walk(a, &mut rng)).collect()
                };
                if tx.send(Arc::new(next)).is_err() {
                    info!("Market feed has no readers left, stopping ticker");
                    break;
                }
            }
        });
        feed
    }
}

#[derive(Deserialize)]
struct TimeSeriesData {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

#[derive(Deserialize)]
struct AlphaVantageResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: HashMap<String, TimeSeriesData>,
}

fn parse_daily_series(response: AlphaVantageResponse) -> Vec<Candle> {
    let mut candles: Vec<Candle> = response
        .time_series
        .into_iter()
        .filter_map(|(date_str, data)| {
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").ok()?;
            let time = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
            Some(Candle {
                time,
                open: data.open.parse().ok()?,
                high: data.high.parse().ok()?,
                low: data.low.parse().ok()?,
                close: data.close.parse().ok()?,
                volume: data.volume.parse().unwrap_or(0),
            })
        })
        .collect();
    candles.sort_by_key(|c| c.time);
    candles
}

fn history_request(
    client: &Client,
    api_key: &str,
    symbol: &str,
) -> reqwest::Result<reqwest::Request> {
    client
        .get(ALPHAVANTAGE_URL)
        .query(&[
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("apikey", api_key),
        ])
        .build()
}

/// Daily history from Alpha Vantage, oldest first.
pub async fn fetch_daily_history(
    client: &Client,
    api_key: &str,
    symbol: &str,
) -> Result<Vec<Candle>, Box<dyn std::error::Error + Send + Sync>> {
    let request = history_request(client, api_key, symbol)?;
    let response = client.execute(request).await?;
    if !response.status().is_success() {
        return Err(format!("Failed to fetch data: HTTP {}", response.status()).into());
    }
    let candles = parse_daily_series(response.json::<AlphaVantageResponse>().await?);
    debug!("Fetched {} daily candles for {}", candles.len(), symbol);
    Ok(candles)
}

/// Real history when a provider key is configured, synthetic otherwise.
pub async fn chart_for(
    client: &Client,
    api_key: Option<&str>,
    snapshot: &[Asset],
    symbol: &str,
) -> Vec<Candle> {
    if let Some(key) = api_key {
        match fetch_daily_history(client, key, symbol).await {
            Ok(candles) if !candles.is_empty() => return candles,
            Ok(_) => warn!("Provider returned no history for {}", symbol),
            Err(e) => warn!("History fetch for {} failed, using synthetic data: {}", symbol, e),
        }
    }
    let base = find(snapshot, symbol).map_or(FALLBACK_BASE_PRICE, |a| a.price);
    chart_data(base, Utc::now(), &mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_walk_moves_price_by_at_most_one() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut asset = seed_assets().remove(0);
        for _ in 0..1000 {
            let next = random_walk(&asset, &mut rng);
            assert!((next.price - asset.price).abs() <= 1.0 + 1e-9);
            assert!((next.change - asset.change).abs() <= 0.25 + 1e-9);
            assert_eq!(next.symbol, asset.symbol);
            assert_eq!(next.volume, asset.volume);
            asset = next;
        }
    }

    #[test]
    fn random_walk_never_goes_below_a_cent() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut asset = seed_assets().remove(0);
        asset.price = 0.02;
        for _ in 0..200 {
            asset = random_walk(&asset, &mut rng);
            assert!(asset.price >= MIN_PRICE);
        }
    }

    #[test]
    fn search_matches_symbol_or_name() {
        let assets = seed_assets();
        let symbols: Vec<&str> = search(&assets, "micro")
            .into_iter()
            .map(|a| a.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["MSFT"]);
        assert_eq!(search(&assets, "tsla").len(), 1);
        assert_eq!(search(&assets, "").len(), assets.len());
        assert!(find(&assets, "googl").is_some());
    }

    #[test]
    fn chart_has_one_minute_spacing() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let candles = chart_data(150.0, now, &mut rng);
        assert_eq!(candles.len(), 100);
        assert_eq!(candles.last().map(|c| c.time), Some(now));
        assert_eq!(candles[1].time - candles[0].time, Duration::minutes(1));
        for c in &candles {
            assert!(c.low <= c.open.min(c.close));
            assert!(c.high >= c.open.max(c.close));
        }
    }

    #[test]
    fn daily_series_is_sorted_and_skips_bad_rows() {
        let body = r#"{
            "Time Series (Daily)": {
                "2024-05-02": {"1. open": "2", "2. high": "3", "3. low": "1", "4. close": "2.5", "5. volume": "10"},
                "2024-05-01": {"1. open": "1", "2. high": "2", "3. low": "0.5", "4. close": "1.5", "5. volume": "20"},
                "garbage": {"1. open": "1", "2. high": "2", "3. low": "0.5", "4. close": "1.5", "5. volume": "20"}
            }
        }"#;
        let response: AlphaVantageResponse = serde_json::from_str(body).unwrap();
        let candles = parse_daily_series(response);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 1.5);
        assert_eq!(candles[1].volume, 10);
    }

    #[tokio::test]
    async fn feed_publishes_new_snapshots() {
        let feed = MarketFeed::start(seed_assets(), std::time::Duration::from_millis(10));
        let mut rx = feed.subscribe();
        let before = feed.snapshot();
        rx.changed().await.unwrap();
        let after = rx.borrow().clone();
        assert_eq!(before.len(), after.len());
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn history_request_encodes_symbol() {
        let request = history_request(&Client::new(), "demo", "IBM&apikey=other").unwrap();
        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("function".to_string(), "TIME_SERIES_DAILY".to_string()),
                ("symbol".to_string(), "IBM&apikey=other".to_string()),
                ("apikey".to_string(), "demo".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn synthetic_chart_without_api_key() {
        let assets = seed_assets();
        let candles = chart_for(&Client::new(), None, &assets, "UNKNOWN").await;
        assert_eq!(candles.len(), 100);
    }
}
