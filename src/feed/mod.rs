//! Data feed integration module
//!
//! The OHLC feed and the zone-detection service are external collaborators.
//! This module defines the traits the engine consumes them through, the raw
//! record shapes, an HTTP client and an in-memory mock.

pub mod mock;
pub mod rest;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;

use crate::market_data::Granularity;
use crate::zones::Zone;

// Re-export commonly used types
pub use mock::MockFeed;
pub use rest::OhlcRestClient;
pub use types::*;

/// Source of raw OHLC records.
#[async_trait]
pub trait OhlcFeed: Send + Sync {
    async fn fetch_ohlc(&self, request: &OhlcRequest) -> Result<Vec<RawCandle>, FeedError>;
}

/// Source of scored zones for a ticker.
#[async_trait]
pub trait ZoneSource: Send + Sync {
    async fn fetch_zones(&self, ticker: &str, granularity: Granularity)
    -> Result<Vec<Zone>, FeedError>;
}

#[async_trait]
impl<T: OhlcFeed + ?Sized> OhlcFeed for Arc<T> {
    async fn fetch_ohlc(&self, request: &OhlcRequest) -> Result<Vec<RawCandle>, FeedError> {
        (**self).fetch_ohlc(request).await
    }
}

#[async_trait]
impl<T: ZoneSource + ?Sized> ZoneSource for Arc<T> {
    async fn fetch_zones(
        &self,
        ticker: &str,
        granularity: Granularity,
    ) -> Result<Vec<Zone>, FeedError> {
        (**self).fetch_zones(ticker, granularity).await
    }
}
