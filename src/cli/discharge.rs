use chrono::NaiveDate;
use clap::Parser;

use crate::{
    api::modbus,
    cli::CommonArgs,
    core::{
        clock::{Clock, SystemClock},
        discharge::{DeviceError, DischargeCommand, DischargeController},
        peak::select_peak,
        prices::DayPrices,
    },
    prelude::*,
    quantity::rate::MegawattHourRate,
};

#[derive(Parser)]
pub struct DischargeArgs {
    /// Minimal price worth discharging for, per megawatt-hour.
    #[clap(long, env = "MIN_PRICE_THRESHOLD", default_value = "20")]
    pub min_price_threshold: MegawattHourRate,

    #[clap(long, env = "DISCHARGE_DURATION_MINUTES", default_value = "15")]
    pub discharge_duration_minutes: u16,

    /// Inverter rated power, only used to estimate the gain.
    #[clap(long, env = "RATED_POWER_KILOWATTS", default_value = "100")]
    pub rated_power_kilowatts: f64,

    /// Inverter Modbus URL: `modbus+tcp://host[:port][/unit-id]`
    /// or `modbus+rtu:///dev/ttyUSB0[?baud=9600&unit=1]`.
    #[clap(long, env = "INVERTER_URL", required_unless_present = "scout")]
    pub inverter_url: Option<modbus::Endpoint>,

    /// Do not touch the inverter, only log the intended command.
    #[clap(long)]
    pub scout: bool,
}

impl DischargeArgs {
    /// Discharge at the peak of the prices, if there is any worth it.
    ///
    /// Returns the command that has been sent to the inverter.
    #[instrument(skip_all, fields(date = %prices.date))]
    pub async fn run(&self, prices: &DayPrices) -> Result<Option<DischargeCommand>, DeviceError> {
        let Some(peak) = select_peak(prices, self.min_price_threshold) else {
            info!("nothing worth discharging for");
            return Ok(None);
        };
        if self.scout {
            let command = DischargeCommand::new(peak.start_time, self.discharge_duration_minutes);
            info!(writes = ?command.register_writes(), "scouting, leaving the inverter untouched");
            return Ok(None);
        }
        let endpoint = self
            .inverter_url
            .clone()
            .ok_or_else(|| DeviceError::Connect("the inverter URL is not set".to_string()))?;
        let command = DischargeController::builder()
            .inverter(modbus::Inverter::from(endpoint))
            .duration_minutes(self.discharge_duration_minutes)
            .build()
            .discharge(&peak)
            .await?;
        let estimated_gain =
            estimated_gain(peak.price, self.discharge_duration_minutes, self.rated_power_kilowatts);
        info!("done, estimated gain: {estimated_gain:.2}");
        Ok(Some(command))
    }
}

/// Price × duration × power, with the price per megawatt-hour and the power in kilowatts.
fn estimated_gain(price: MegawattHourRate, duration_minutes: u16, rated_power_kilowatts: f64) -> f64 {
    price.0 * f64::from(duration_minutes) / 60.0 * rated_power_kilowatts / 1000.0
}

#[derive(Parser)]
pub struct StoredDischargeArgs {
    /// Date of the saved prices, tomorrow by default.
    #[clap(long)]
    date: Option<NaiveDate>,

    /// Use today's prices when the date's ones are not saved.
    #[clap(long)]
    fallback_to_today: bool,

    #[clap(flatten)]
    discharge: DischargeArgs,
}

impl StoredDischargeArgs {
    #[instrument(skip_all)]
    pub async fn run(self, common: &CommonArgs) -> Result {
        let store = common.new_store();
        let today = SystemClock(common.timezone).now().date_naive();
        let date = match self.date {
            Some(date) => date,
            None => today.succ_opt().context("there is no tomorrow")?,
        };
        let prices = match store.read(date)? {
            Some(prices) => prices,
            None if self.fallback_to_today && date != today => {
                warn!(%date, "no saved prices, falling back to today's");
                store.read(today)?.with_context(|| format!("no saved prices for {today}"))?
            }
            None => bail!("no saved prices for {date}"),
        };
        self.discharge.run(&prices).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::NaiveTime;

    use super::*;
    use crate::core::prices::PriceSlot;

    #[test]
    fn estimated_gain_ok() {
        assert_relative_eq!(estimated_gain(MegawattHourRate(143.21), 15, 100.0), 3.58025, epsilon = 1e-9);
        assert_relative_eq!(estimated_gain(MegawattHourRate(20.0), 60, 10.0), 0.2, epsilon = 1e-9);
    }

    #[derive(Parser)]
    struct Args {
        #[clap(flatten)]
        discharge: DischargeArgs,
    }

    #[test]
    fn parse_ok() -> Result {
        let args = Args::try_parse_from([
            "test",
            "--inverter-url",
            "modbus+tcp://192.168.1.100/1",
            "--min-price-threshold",
            "35.5",
        ])?
        .discharge;
        assert_eq!(args.min_price_threshold, MegawattHourRate(35.5));
        assert_eq!(args.discharge_duration_minutes, 15);
        assert!(matches!(args.inverter_url, Some(modbus::Endpoint::Tcp { port: 502, .. })));
        assert!(!args.scout);
        Ok(())
    }

    #[test]
    fn parse_serial_url_ok() -> Result {
        let args =
            Args::try_parse_from(["test", "--inverter-url", "modbus+rtu:///dev/ttyUSB0?baud=19200"])?
                .discharge;
        assert!(matches!(
            args.inverter_url,
            Some(modbus::Endpoint::Rtu { baud_rate: 19200, slave_id: 1, .. }),
        ));
        Ok(())
    }

    #[tokio::test]
    async fn scouting_leaves_inverter_alone() -> Result {
        let args = Args::try_parse_from(["test", "--scout"])?.discharge;
        let prices = DayPrices::new(
            NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            vec![PriceSlot {
                start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(18, 15, 0).unwrap(),
                price: MegawattHourRate(143.21),
            }],
        );
        assert_eq!(args.run(&prices).await?, None);
        Ok(())
    }
}
