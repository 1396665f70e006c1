//! [Nord Pool](https://data.nordpoolgroup.com) day-ahead prices.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bon::bon;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::{
    core::{
        prices::{DayPrices, PriceSlot},
        provider::{FetchError, PriceProvider},
    },
    prelude::*,
    quantity::rate::MegawattHourRate,
};

pub struct Api {
    client: reqwest::Client,
    base_url: Url,
    delivery_area: String,
    currency: String,
    timezone: Tz,
}

#[bon]
impl Api {
    #[builder]
    pub fn new(
        base_url: Url,
        #[builder(into)] delivery_area: String,
        #[builder(into)] currency: String,
        timezone: Tz,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, base_url, delivery_area, currency, timezone })
    }
}

impl Api {
    pub const DEFAULT_BASE_URL: &str = "https://dataportal-api.nordpoolgroup.com/api/";

    fn url(&self, on: NaiveDate) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join("DayAheadPrices")
            .map_err(|error| FetchError::Transient(format!("invalid base URL: {error}")))?;
        url.query_pairs_mut()
            .append_pair("date", &on.to_string())
            .append_pair("market", "DayAhead")
            .append_pair("deliveryArea", &self.delivery_area)
            .append_pair("currency", &self.currency);
        Ok(url)
    }
}

#[async_trait]
impl PriceProvider for Api {
    #[instrument(skip_all, fields(on = %on, area = %self.delivery_area))]
    async fn get_prices(&self, on: NaiveDate) -> Result<DayPrices, FetchError> {
        info!("fetching…");
        let response = self
            .client
            .get(self.url(on)?)
            .send()
            .await
            .map_err(|error| FetchError::Transient(format!("failed to call: {error}")))?;
        let status = response.status();
        info!(%status, "received");

        if status == StatusCode::NO_CONTENT {
            return Err(FetchError::NoDataYet);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(FetchError::Transient(format!("{status}: {excerpt}")));
        }

        let prices = response
            .json::<Response>()
            .await
            .map_err(|error| {
                FetchError::Transient(format!("failed to deserialize the response: {error}"))
            })?
            .into_day_prices(on, &self.delivery_area, self.timezone);
        if prices.is_empty() {
            info!("no entries yet");
            return Err(FetchError::NoDataYet);
        }
        info!(n_slots = prices.len(), "fetched");
        Ok(prices)
    }
}

#[derive(Deserialize)]
struct Response {
    #[serde(rename = "multiAreaEntries", default)]
    entries: Vec<Entry>,
}

impl Response {
    fn into_day_prices(self, on: NaiveDate, delivery_area: &str, timezone: Tz) -> DayPrices {
        let slots = self
            .entries
            .into_iter()
            .map(|entry| {
                let price = entry.entry_per_area.get(delivery_area).copied().map_or_else(
                    || {
                        warn!(start = %entry.delivery_start, delivery_area, "no area price, using zero");
                        MegawattHourRate::ZERO
                    },
                    MegawattHourRate,
                );
                PriceSlot {
                    start_time: entry.delivery_start.with_timezone(&timezone).time(),
                    end_time: entry.delivery_end.with_timezone(&timezone).time(),
                    price: price.round_to_cents(),
                }
            })
            .collect();
        DayPrices::new(on, slots)
    }
}

#[derive(Deserialize)]
struct Entry {
    #[serde(rename = "deliveryStart")]
    delivery_start: DateTime<Utc>,

    #[serde(rename = "deliveryEnd")]
    delivery_end: DateTime<Utc>,

    #[serde(rename = "entryPerArea")]
    entry_per_area: HashMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use chrono::{NaiveTime, TimeDelta, TimeZone, Timelike};
    use chrono_tz::Europe::Riga;
    use itertools::Itertools;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::store::PriceStore;

    // language=json
    const BODY: &str = r#"{
        "deliveryDateCET": "2025-12-01",
        "version": 1,
        "updatedAt": "2025-11-30T12:43:39.5787654Z",
        "deliveryAreas": ["LV"],
        "market": "DayAhead",
        "multiAreaEntries": [
            {
                "deliveryStart": "2025-11-30T23:00:00Z",
                "deliveryEnd": "2025-11-30T23:15:00Z",
                "entryPerArea": { "LV": 95.126 }
            },
            {
                "deliveryStart": "2025-11-30T23:15:00Z",
                "deliveryEnd": "2025-11-30T23:30:00Z",
                "entryPerArea": { "LV": -1.004 }
            },
            {
                "deliveryStart": "2025-11-30T23:30:00Z",
                "deliveryEnd": "2025-11-30T23:45:00Z",
                "entryPerArea": { "EE": 80.0 }
            }
        ],
        "currency": "EUR"
    }"#;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn api(server: &Server) -> Result<Api> {
        Api::builder()
            .base_url(Url::parse(&format!("{}/api/", server.url()))?)
            .delivery_area("LV")
            .currency("EUR")
            .timezone(Riga)
            .build()
    }

    fn mock_request(server: &mut Server) -> mockito::Mock {
        server.mock("GET", "/api/DayAheadPrices").match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("date".into(), "2025-12-01".into()),
            Matcher::UrlEncoded("market".into(), "DayAhead".into()),
            Matcher::UrlEncoded("deliveryArea".into(), "LV".into()),
            Matcher::UrlEncoded("currency".into(), "EUR".into()),
        ]))
    }

    #[test]
    fn into_day_prices_ok() -> Result {
        let prices = serde_json::from_str::<Response>(BODY)?.into_day_prices(date(), "LV", Riga);
        assert_eq!(prices.date, date());
        assert_eq!(
            prices.slots,
            [
                PriceSlot {
                    start_time: time(1, 0),
                    end_time: time(1, 15),
                    price: MegawattHourRate(95.13),
                },
                PriceSlot {
                    start_time: time(1, 15),
                    end_time: time(1, 30),
                    price: MegawattHourRate(-1.0),
                },
                PriceSlot {
                    start_time: time(1, 30),
                    end_time: time(1, 45),
                    price: MegawattHourRate::ZERO,
                },
            ],
        );
        Ok(())
    }

    #[test]
    fn summer_time_ok() -> Result {
        // language=json
        let body = r#"{
            "multiAreaEntries": [
                {
                    "deliveryStart": "2025-06-30T22:00:00Z",
                    "deliveryEnd": "2025-06-30T22:15:00Z",
                    "entryPerArea": { "LV": 12.0 }
                },
                {
                    "deliveryStart": "2025-07-01T20:45:00Z",
                    "deliveryEnd": "2025-07-01T21:00:00Z",
                    "entryPerArea": { "LV": 13.0 }
                }
            ]
        }"#;
        let on = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let prices = serde_json::from_str::<Response>(body)?.into_day_prices(on, "LV", Riga);
        assert_eq!(prices.slots[0].start_time, time(1, 0));
        assert_eq!(prices.slots[1].start_time, time(23, 45));
        assert_eq!(prices.slots[1].end_time, time(0, 0));
        Ok(())
    }

    #[tokio::test]
    async fn get_prices_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = mock_request(&mut server)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(BODY)
            .create_async()
            .await;

        let prices = api(&server)?.get_prices(date()).await?;

        assert_eq!(prices.len(), 3);
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn no_content_is_no_data_yet() -> Result {
        let mut server = Server::new_async().await;
        let mock = mock_request(&mut server).with_status(204).create_async().await;

        let result = api(&server)?.get_prices(date()).await;

        assert!(matches!(result, Err(FetchError::NoDataYet)));
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn empty_entries_are_no_data_yet() -> Result {
        let mut server = Server::new_async().await;
        let _mock = mock_request(&mut server)
            .with_status(200)
            .with_body(r#"{"multiAreaEntries": []}"#)
            .create_async()
            .await;

        let result = api(&server)?.get_prices(date()).await;

        assert!(matches!(result, Err(FetchError::NoDataYet)));
        Ok(())
    }

    #[tokio::test]
    async fn server_error_is_transient() -> Result {
        let mut server = Server::new_async().await;
        let _mock = mock_request(&mut server)
            .with_status(503)
            .with_body("service temporarily unavailable")
            .create_async()
            .await;

        let result = api(&server)?.get_prices(date()).await;

        let Err(FetchError::Transient(message)) = result else {
            bail!("expected a transient error, got {result:?}");
        };
        assert!(message.contains("503"));
        assert!(message.contains("service temporarily unavailable"));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_body_is_transient() -> Result {
        let mut server = Server::new_async().await;
        let _mock = mock_request(&mut server).with_status(200).with_body("<html>").create_async().await;

        let result = api(&server)?.get_prices(date()).await;

        assert!(matches!(result, Err(FetchError::Transient(_))));
        Ok(())
    }

    /// Consecutive quarter-hour entries from the UTC start.
    fn market_day(start: DateTime<Utc>, n_slots: i32) -> Result<Response> {
        let entries = (0..n_slots)
            .map(|i| {
                let start = start + TimeDelta::minutes(15 * i64::from(i));
                json!({
                    "deliveryStart": start,
                    "deliveryEnd": start + TimeDelta::minutes(15),
                    "entryPerArea": { "LV": f64::from(i) / 3.0 - 10.0 },
                })
            })
            .collect_vec();
        Ok(serde_json::from_value(json!({ "multiAreaEntries": entries }))?)
    }

    /// Local wall-clock length of the slot, across midnight too.
    fn wall_clock_minutes(slot: &PriceSlot) -> i64 {
        match (slot.end_time - slot.start_time).num_minutes() {
            minutes if minutes <= -720 => minutes + 1440,
            minutes => minutes,
        }
    }

    /// Store and read back the prices, which must survive unchanged.
    fn assert_stored(prices: &DayPrices) -> Result {
        let root = TempDir::new()?;
        let store = PriceStore::builder()
            .root(root.path())
            .prefix("lv_prices")
            .max_files(NonZeroUsize::MIN)
            .build();
        store.write(prices)?;
        assert_eq!(store.read(prices.date)?.as_ref(), Some(prices));
        Ok(())
    }

    #[test]
    fn full_day_ok() -> Result {
        let start = Utc.with_ymd_and_hms(2025, 11, 30, 23, 0, 0).unwrap();
        let prices = market_day(start, 96)?.into_day_prices(date(), "LV", Riga);
        assert_eq!(prices.len(), 96);
        assert!(prices.slots.iter().all(|slot| wall_clock_minutes(slot) == 15));
        assert_eq!(prices.slots[0].start_time, time(1, 0));
        assert_eq!(prices.slots[95].start_time, time(0, 45));
        assert_eq!(prices.slots[1].price, MegawattHourRate(-9.67));
        assert_stored(&prices)
    }

    #[test]
    fn spring_forward_day_ok() -> Result {
        let on = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 29, 23, 0, 0).unwrap();
        let prices = market_day(start, 92)?.into_day_prices(on, "LV", Riga);
        assert_eq!(prices.len(), 92);
        let lengths = prices.slots.iter().map(wall_clock_minutes).counts();
        assert_eq!(lengths.len(), 2);
        assert_eq!(lengths[&15], 91);
        assert_eq!(lengths[&75], 1);
        assert!(prices.slots.iter().all(|slot| slot.start_time.hour() != 3));
        assert_stored(&prices)
    }

    #[test]
    fn fall_back_day_ok() -> Result {
        let on = NaiveDate::from_ymd_opt(2025, 10, 26).unwrap();
        let start = Utc.with_ymd_and_hms(2025, 10, 25, 22, 0, 0).unwrap();
        let prices = market_day(start, 100)?.into_day_prices(on, "LV", Riga);
        assert_eq!(prices.len(), 100);
        let lengths = prices.slots.iter().map(wall_clock_minutes).counts();
        assert_eq!(lengths.len(), 2);
        assert_eq!(lengths[&15], 99);
        assert_eq!(lengths[&-45], 1);
        assert_eq!(prices.slots.iter().filter(|slot| slot.start_time.hour() == 3).count(), 8);
        assert_stored(&prices)
    }

    #[tokio::test]
    #[ignore = "makes the API request"]
    async fn get_prices_live_ok() -> Result {
        let api = Api::builder()
            .base_url(Url::parse(Api::DEFAULT_BASE_URL)?)
            .delivery_area("LV")
            .currency("EUR")
            .timezone(Riga)
            .build()?;
        let prices = api.get_prices(Utc::now().with_timezone(&Riga).date_naive()).await?;
        assert!(!prices.is_empty());
        assert!(prices.len() <= 100);
        Ok(())
    }
}
