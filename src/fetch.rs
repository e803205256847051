use crate::http::{Backoff, HttpsClient, build_client, send_with_retry};
use crate::model::ReadingRecord;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use http::Request;
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://www.hebcal.com";

#[derive(Deserialize, Debug)]
struct LeyningResponse {
    #[serde(default)]
    items: Vec<ReadingRecord>,
}

/// Parse and validate the requested range before any network call.
pub fn validate_range(start: &str, end: &str) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("invalid start date '{}', expected YYYY-MM-DD", start))?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
        .with_context(|| format!("invalid end date '{}', expected YYYY-MM-DD", end))?;
    if start > end {
        bail!("start date {} is after end date {}", start, end);
    }
    Ok((start, end))
}

/// Client for the HebCal leyning feed.
pub struct CalendarClient {
    client: HttpsClient,
    base_url: String,
    backoff: Backoff,
    test_mode: bool,
}

impl CalendarClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            backoff: Backoff::default(),
            test_mode: false,
        })
    }

    /// Point at a different server (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Truncate results to the first record, for fast iteration.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Fetch all readings in [start, end], ascending by date. Transient
    /// failures are retried on the backoff schedule before surfacing.
    pub async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ReadingRecord>> {
        let url = format!(
            "{}/leyning?cfg=json&start={}&end={}",
            self.base_url,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        debug!("fetching leyning data from {}", url);

        let (parts, body) = send_with_retry(&self.client, self.backoff.clone(), "leyning fetch", || {
            Request::builder()
                .method("GET")
                .uri(&url)
                .header(http::header::ACCEPT, "application/json")
                .body(String::new())
                .context("building leyning request")
        })
        .await?;

        if !parts.status.is_success() {
            bail!("leyning fetch returned HTTP {}", parts.status);
        }

        let response: LeyningResponse =
            serde_json::from_slice(&body).context("decoding leyning response")?;

        let mut items = response.items;
        items.sort_by_key(|r| r.date);
        info!("fetched {} readings for {}..{}", items.len(), start, end);

        if self.test_mode {
            items.truncate(1);
            debug!("test mode: truncated to first reading");
        }
        Ok(items)
    }
}
