use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use itertools::Itertools;

use crate::{
    api::modbus,
    cli::{CommonArgs, nordpool::NordPoolArgs},
    core::{
        clock::{Clock, SystemClock},
        discharge::{Inverter as _, InverterConnection as _},
        peak::select_peak,
        provider::PriceProvider as _,
    },
    prelude::*,
    quantity::rate::MegawattHourRate,
    tables::build_prices_table,
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[command(subcommand)]
    command: BurrowCommand,
}

impl BurrowArgs {
    pub async fn run(self, common: &CommonArgs) -> Result {
        match self.command {
            BurrowCommand::Prices(args) => args.run(common).await,
            BurrowCommand::Peak(args) => args.run(common),
            BurrowCommand::Inverter(args) => args.run().await,
        }
    }
}

#[derive(Subcommand)]
enum BurrowCommand {
    /// Fetch the prices once and print them without saving.
    Prices(BurrowPricesArgs),

    /// Print the saved prices and their peak.
    Peak(BurrowPeakArgs),

    /// Test the inverter connection by reading a holding register.
    Inverter(BurrowInverterArgs),
}

#[derive(Parser)]
struct BurrowPricesArgs {
    /// Delivery date, today by default.
    #[clap(long)]
    date: Option<NaiveDate>,

    #[clap(long, env = "MIN_PRICE_THRESHOLD", default_value = "20")]
    min_price_threshold: MegawattHourRate,

    #[clap(flatten)]
    nordpool: NordPoolArgs,
}

impl BurrowPricesArgs {
    #[instrument(skip_all)]
    async fn run(self, common: &CommonArgs) -> Result {
        let date = self.date.unwrap_or_else(|| SystemClock(common.timezone).now().date_naive());
        let prices = self.nordpool.new_api(common)?.get_prices(date).await?;
        let peak = select_peak(&prices, self.min_price_threshold);
        println!("{}", build_prices_table(&prices, peak.as_ref(), self.min_price_threshold));
        Ok(())
    }
}

#[derive(Parser)]
struct BurrowPeakArgs {
    /// Delivery date, today by default.
    #[clap(long)]
    date: Option<NaiveDate>,

    #[clap(long, env = "MIN_PRICE_THRESHOLD", default_value = "20")]
    min_price_threshold: MegawattHourRate,
}

impl BurrowPeakArgs {
    #[instrument(skip_all)]
    fn run(self, common: &CommonArgs) -> Result {
        let date = self.date.unwrap_or_else(|| SystemClock(common.timezone).now().date_naive());
        let store = common.new_store();
        let Some(prices) = store.read(date)? else {
            let saved = store.list_dates()?.into_iter().join(", ");
            bail!("no saved prices for {date}, saved dates: [{saved}]");
        };
        let peak = select_peak(&prices, self.min_price_threshold);
        println!("{}", build_prices_table(&prices, peak.as_ref(), self.min_price_threshold));
        Ok(())
    }
}

#[derive(Parser)]
struct BurrowInverterArgs {
    /// Inverter Modbus URL, `modbus+tcp://` or `modbus+rtu://`.
    #[clap(long, env = "INVERTER_URL")]
    inverter_url: modbus::Endpoint,

    /// Holding register to read.
    #[clap(long, default_value = "0")]
    register: u16,
}

impl BurrowInverterArgs {
    #[instrument(skip_all, fields(endpoint = %self.inverter_url, register = self.register))]
    async fn run(self) -> Result {
        let mut connection = modbus::Inverter::from(self.inverter_url).connect().await?;
        let result = connection.read_holding_register(self.register).await;
        connection.close().await;
        let value = result?;
        info!(value, "the inverter is reachable");
        Ok(())
    }
}
