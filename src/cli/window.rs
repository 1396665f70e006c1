use chrono::TimeDelta;
use clap::Parser;

use crate::{core::window::RetryWindow, prelude::*};

#[derive(Parser)]
pub struct RetryWindowArgs {
    /// Local hour when polling for the next day's prices starts.
    #[clap(long = "retry-start-hour", env = "RETRY_START_HOUR", default_value = "13")]
    pub start_hour: u32,

    /// Local hour when polling for the next day's prices stops.
    #[clap(long = "retry-end-hour", env = "RETRY_END_HOUR", default_value = "18")]
    pub end_hour: u32,

    /// Minute past the hour of the window bounds and of every attempt.
    #[clap(long = "retry-minutes", env = "RETRY_MINUTES", default_value = "30")]
    pub minutes: u32,

    /// Pause between failed attempts.
    #[clap(long = "retry-interval", env = "RETRY_INTERVAL", default_value = "1h")]
    pub interval: humantime::Duration,
}

impl RetryWindowArgs {
    pub fn window(&self) -> Result<RetryWindow> {
        let retry_interval = TimeDelta::from_std(self.interval.into())
            .with_context(|| format!("the retry interval `{}` is too long", self.interval))?;
        RetryWindow::try_new(self.start_hour, self.end_hour, self.minutes, retry_interval)
    }
}
