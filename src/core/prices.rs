use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::quantity::rate::MegawattHourRate;

/// One delivery interval of a trading day, in local wall-clock time.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PriceSlot {
    #[serde(rename = "StartTime", with = "hh_mm")]
    pub start_time: NaiveTime,

    /// Equals the start time plus the slot duration, modulo midnight.
    #[serde(rename = "EndTime", with = "hh_mm")]
    pub end_time: NaiveTime,

    #[serde(rename = "Price")]
    pub price: MegawattHourRate,
}

/// All the slots of one calendar date, in the order the market published them.
#[must_use]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DayPrices {
    pub date: NaiveDate,
    pub slots: Vec<PriceSlot>,
}

impl DayPrices {
    pub const fn new(date: NaiveDate, slots: Vec<PriceSlot>) -> Self {
        Self { date, slots }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// `HH:MM` wall-clock time, as it appears in the price files.
pub mod hh_mm {
    use super::*;

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&text, FORMAT)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&text), &"`HH:MM` time"))
    }
}
