use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    core::prices::{DayPrices, PriceSlot},
    quantity::rate::MegawattHourRate,
};

pub fn build_prices_table(
    prices: &DayPrices,
    peak: Option<&PriceSlot>,
    threshold: MegawattHourRate,
) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table.set_header(vec!["Date", "Start", "End", "Price", ""]);
    for slot in &prices.slots {
        let is_peak = peak == Some(slot);
        let mut price = Cell::new(slot.price).set_alignment(CellAlignment::Right).fg(
            if is_peak {
                Color::Red
            } else if slot.price >= threshold {
                Color::DarkYellow
            } else {
                Color::Green
            },
        );
        if is_peak {
            price = price.add_attribute(Attribute::Bold);
        }
        table.add_row(vec![
            Cell::new(prices.date.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(slot.start_time.format("%H:%M")),
            Cell::new(slot.end_time.format("%H:%M")).add_attribute(Attribute::Dim),
            price,
            Cell::new(if is_peak { "peak" } else { "" }),
        ]);
    }
    table
}
