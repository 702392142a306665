//! Remote chart-API data provider.
//!
//! Fetches OHLCV bars from a v8-style chart endpoint over blocking HTTP,
//! with retry and exponential backoff. The endpoint has no official API
//! contract, so parse failures surface as `ResponseFormatChanged` and the
//! cache or a fixture provider is the fallback.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::data::provider::{DataError, DataProvider, DataSource, FetchResult};
use crate::domain::{Bar, BarInterval};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

pub struct ChartApiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl ChartApiProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(
        &self,
        symbol: &str,
        interval: BarInterval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> String {
        let p1 = start.and_utc().timestamp();
        let p2 = end.and_utc().timestamp();
        format!(
            "{}/{symbol}?period1={p1}&period2={p2}&interval={interval}",
            self.base_url
        )
    }

    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<Bar>, DataError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => DataError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;
        let timestamps = data
            .timestamp
            .ok_or_else(|| DataError::ResponseFormatChanged("no timestamps".into()))?;
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &epoch) in timestamps.iter().enumerate() {
            let ts = chrono::DateTime::from_timestamp(epoch, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {epoch}"))
                })?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // Rows with no quote at all are non-trading slots.
            if open.is_none() && high.is_none() && low.is_none() && close.is_none() {
                continue;
            }

            bars.push(Bar {
                ts,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0.0),
            });
        }

        if bars.is_empty() {
            return Err(DataError::EmptyRange {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }

    fn fetch_with_retry(
        &self,
        symbol: &str,
        interval: BarInterval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, DataError> {
        let url = self.chart_url(symbol, interval, start, end);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(DataError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }
                    if !status.is_success() {
                        last_error =
                            Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }
                    let chart: ChartResponse = resp.json().map_err(|e| {
                        DataError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;
                    return Self::parse_response(symbol, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl DataProvider for ChartApiProvider {
    fn name(&self) -> &str {
        "chart_api"
    }

    fn fetch(
        &self,
        symbol: &str,
        interval: BarInterval,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<FetchResult, DataError> {
        let bars = self.fetch_with_retry(symbol, interval, start, end)?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            interval,
            bars,
            source: DataSource::Remote,
        })
    }
}
