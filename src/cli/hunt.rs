use clap::Parser;

use crate::{
    cli::{CommonArgs, discharge::DischargeArgs, nordpool::NordPoolArgs, window::RetryWindowArgs},
    core::{
        clock::{Clock, SystemClock},
        discharge::{DeviceError, DischargeCommand},
        prices::DayPrices,
        scheduler::{FetchScheduler, Outcome},
    },
    prelude::*,
};

#[derive(Parser)]
pub struct HuntArgs {
    /// Only discharge at today's peak, do not wait for tomorrow's prices.
    #[clap(long)]
    today_only: bool,

    #[clap(flatten)]
    nordpool: NordPoolArgs,

    #[clap(flatten)]
    window: RetryWindowArgs,

    #[clap(flatten)]
    discharge: DischargeArgs,
}

impl HuntArgs {
    #[instrument(skip_all)]
    pub async fn run(self, common: &CommonArgs) -> Result {
        let clock = SystemClock(common.timezone);
        let api = self.nordpool.new_api(common)?;
        let store = common.new_store();
        let scheduler = FetchScheduler::builder()
            .provider(&api)
            .store(&store)
            .clock(&clock)
            .window(self.window.window()?)
            .build();

        let today = clock.now().date_naive();
        info!(%today, "hunting…");

        // A device failure stops any further writes in this run, but tomorrow's prices are still
        // worth saving:
        let (mut device_error, mut pending) = (None, None);
        if let Some(prices) = scheduler.fetch_once(today).await? {
            match self.discharge.run(&prices).await {
                Ok(command) => pending = command,
                Err(error) => device_error = Some(error),
            }
        }
        if self.today_only {
            return device_error.map_or(Ok(()), |error| Err(error.into()));
        }

        let tomorrow = today.succ_opt().context("there is no tomorrow")?;
        match scheduler.monitor(tomorrow).await? {
            Outcome::Succeeded { prices, n_attempts } => {
                info!(n_attempts, "tomorrow's prices are in");
                if device_error.is_none() {
                    discharge_after(&self.discharge, &clock, pending, &prices).await?;
                } else {
                    warn!("skipping tomorrow's discharge after the device failure");
                }
            }
            Outcome::GaveUp { n_attempts } => {
                warn!(n_attempts, "tomorrow's prices have not been published in time");
            }
        }

        device_error.map_or(Ok(()), |error| Err(error.into()))
    }
}

/// Discharge at the peak of the prices once the pending discharge, if any, has run.
async fn discharge_after(
    discharge: &DischargeArgs,
    clock: &impl Clock,
    pending: Option<DischargeCommand>,
    prices: &DayPrices,
) -> Result<Option<DischargeCommand>, DeviceError> {
    if let Some(pending) = pending {
        pending.wait_until_over(clock).await;
    }
    discharge.run(prices).await
}
