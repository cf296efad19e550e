//! HTTP client for the OHLC feed and the zone service

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::types::{FeedError, OhlcRequest, RawCandle, ZonePage};
use super::{OhlcFeed, ZoneSource};
use crate::market_data::Granularity;
use crate::zones::Zone;

/// Zones requested per page from `/zones/all-zones`.
const ZONE_PAGE_LIMIT: u32 = 100;

/// REST client for the charting backend
pub struct OhlcRestClient {
    base_url: String,
    client: reqwest::Client,
}

impl OhlcRestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        // The feed has no request timeout; slow ranges are allowed to finish.
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FeedError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status(status, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))
    }
}

#[async_trait]
impl OhlcFeed for OhlcRestClient {
    async fn fetch_ohlc(&self, request: &OhlcRequest) -> Result<Vec<RawCandle>, FeedError> {
        let query = [
            ("ticker", request.ticker.clone()),
            ("start_date", request.range.start.format("%Y-%m-%d").to_string()),
            ("end_date", request.range.end.format("%Y-%m-%d").to_string()),
            ("interval", request.granularity.label().to_string()),
        ];

        let records: Vec<RawCandle> = self.get_json("/ohlc-data", &query).await?;

        info!(
            "Fetched {} raw records for {} ({}) {} → {}",
            records.len(),
            request.ticker,
            request.granularity,
            request.range.start,
            request.range.end
        );

        Ok(records)
    }
}

#[async_trait]
impl ZoneSource for OhlcRestClient {
    async fn fetch_zones(
        &self,
        ticker: &str,
        _granularity: Granularity,
    ) -> Result<Vec<Zone>, FeedError> {
        let ticker = super::normalize_ticker(ticker);
        let query = [
            ("ticker", ticker.clone()),
            ("page", "1".to_string()),
            ("limit", ZONE_PAGE_LIMIT.to_string()),
        ];

        let page: ZonePage = self.get_json("/zones/all-zones", &query).await?;
        let (page_no, total_pages, total) = (page.page, page.total_pages, page.total);
        let (zones, skipped) = page.into_zones();

        if skipped > 0 {
            warn!("Skipped {} unreadable zones for {}", skipped, ticker);
        }
        info!(
            "Fetched {} zones for {} (page {}/{}, {} total)",
            zones.len(),
            ticker,
            page_no,
            total_pages,
            total
        );

        Ok(zones)
    }
}
