use crate::{
    core::prices::{DayPrices, PriceSlot},
    prelude::*,
    quantity::rate::MegawattHourRate,
};

/// Select the highest-priced slot priced at or above the threshold.
///
/// Among equally priced maxima, the earliest slot wins. `None` means there is nothing worth
/// discharging for.
#[instrument(skip_all, fields(date = %prices.date, threshold = %threshold))]
pub fn select_peak(prices: &DayPrices, threshold: MegawattHourRate) -> Option<PriceSlot> {
    let peak = prices
        .slots
        .iter()
        .filter(|slot| slot.price >= threshold)
        .copied()
        .reduce(|peak, slot| if slot.price > peak.price { slot } else { peak });
    match peak {
        Some(slot) => {
            info!(start = %slot.start_time, end = %slot.end_time, price = %slot.price, "peak slot");
        }
        None => {
            info!(n_slots = prices.len(), "no slots at or above the threshold");
        }
    }
    peak
}
