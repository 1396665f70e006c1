mod burrow;
mod discharge;
mod hunt;
mod nordpool;
mod window;

use std::{num::NonZeroUsize, path::PathBuf};

use chrono_tz::Tz;
use clap::{Parser, Subcommand};

use crate::{
    cli::{burrow::BurrowArgs, discharge::StoredDischargeArgs, hunt::HuntArgs},
    prelude::*,
    store::PriceStore,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: discharge at today's peak, then wait for tomorrow's prices and discharge at
    /// tomorrow's peak.
    Hunt(Box<HuntArgs>),

    /// Discharge at the peak of the already saved prices.
    Discharge(Box<StoredDischargeArgs>),

    /// Development tools.
    Burrow(BurrowArgs),
}

impl Command {
    pub async fn run(self, common: &CommonArgs) -> Result {
        match self {
            Self::Hunt(args) => args.run(common).await,
            Self::Discharge(args) => args.run(common).await,
            Self::Burrow(args) => args.run(common).await,
        }
    }
}

#[derive(Parser)]
pub struct CommonArgs {
    /// Local time zone of the price slots, the retry window, and the log timestamps.
    #[clap(long, env = "TIMEZONE", default_value = "Europe/Riga", global = true)]
    pub timezone: Tz,

    /// Nord Pool delivery area, also used in the price file names.
    #[clap(long, env = "DELIVERY_AREA", default_value = "LV", global = true)]
    pub delivery_area: String,

    /// Folder for the price files and the logs.
    #[clap(long, env = "SAVES_FOLDER", default_value = "saves", global = true)]
    pub saves_folder: PathBuf,

    /// Maximum number of kept price files, and of kept files per log.
    #[clap(long, env = "MAX_FILES", default_value = "10", global = true)]
    pub max_files: NonZeroUsize,
}

impl CommonArgs {
    pub fn new_store(&self) -> PriceStore {
        PriceStore::builder()
            .root(&self.saves_folder)
            .prefix(format!("{}_prices", self.delivery_area.to_lowercase()))
            .max_files(self.max_files)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use clap::CommandFactory;

    use super::*;
    use crate::core::prices::DayPrices;

    #[test]
    fn verify_args() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_hunt_defaults_ok() -> Result {
        let args = Args::try_parse_from(["nordpeak", "hunt", "--scout"])?;
        assert_eq!(args.common.timezone, Tz::Europe__Riga);
        assert_eq!(args.common.max_files.get(), 10);
        assert!(matches!(args.command, Command::Hunt(_)));
        Ok(())
    }

    #[test]
    fn inverter_url_is_required_without_scouting() {
        assert!(Args::try_parse_from(["nordpeak", "hunt"]).is_err());
    }

    #[test]
    fn new_store_prefix_ok() -> Result {
        let root = tempfile::TempDir::new()?;
        let args = Args::try_parse_from([
            "nordpeak",
            "--saves-folder",
            root.path().to_str().context("non-UTF-8 temporary path")?,
            "--delivery-area",
            "EE",
            "burrow",
            "peak",
        ])?;
        let store = args.common.new_store();
        store.write(&DayPrices::new(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(), Vec::new()))?;
        assert!(root.path().join("ee_prices_2025-12-01.csv").is_file());
        Ok(())
    }
}
