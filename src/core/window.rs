use chrono::{DateTime, DurationRound, NaiveTime, TimeDelta, Timelike};
use chrono_tz::Tz;

use crate::{core::clock::at, prelude::*};

/// Daily wall-clock window in which the next day's prices are polled for.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct RetryWindow {
    /// Inclusive.
    pub start: NaiveTime,

    /// Exclusive.
    pub end: NaiveTime,

    pub retry_interval: TimeDelta,
}

#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    Attempt,
    WaitUntil(DateTime<Tz>),
    GiveUp,
}

impl RetryWindow {
    /// Both ends sit at the same minute past the hour, which is also the minute attempts are aligned to.
    pub fn try_new(
        start_hour: u32,
        end_hour: u32,
        minutes: u32,
        retry_interval: TimeDelta,
    ) -> Result<Self> {
        let start = NaiveTime::from_hms_opt(start_hour, minutes, 0)
            .with_context(|| format!("invalid window start: {start_hour}:{minutes}"))?;
        let end = NaiveTime::from_hms_opt(end_hour, minutes, 0)
            .with_context(|| format!("invalid window end: {end_hour}:{minutes}"))?;
        ensure!(start < end, "the retry window must start before it ends");
        ensure!(retry_interval > TimeDelta::zero(), "the retry interval must be positive");
        Ok(Self { start, end, retry_interval })
    }

    pub fn decide(&self, now: DateTime<Tz>) -> Decision {
        let time = now.time();
        if time < self.start {
            Decision::WaitUntil(at(now, self.start))
        } else if time >= self.end {
            Decision::GiveUp
        } else {
            Decision::Attempt
        }
    }

    /// Next attempt after a failed one: the aligned minute of the hour following the retry interval,
    /// but never later than the window end.
    pub fn next_attempt_after(&self, now: DateTime<Tz>) -> DateTime<Tz> {
        let hour_start = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);
        let next =
            hour_start + self.retry_interval + TimeDelta::minutes(i64::from(self.start.minute()));
        let next = if next <= now { now + self.retry_interval } else { next };
        next.min(at(now, self.end))
    }
}
