use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core::prices::DayPrices;

/// Day-ahead price source.
#[async_trait]
pub trait PriceProvider: Sync {
    /// Fetch the prices for the calendar date, once. Implementations must not sleep or retry.
    async fn get_prices(&self, on: NaiveDate) -> Result<DayPrices, FetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The auction results for the date are not published yet.
    #[error("no data is published yet")]
    NoDataYet,

    #[error("transient failure: {0}")]
    Transient(String),
}
