use async_trait::async_trait;
use chrono::{DateTime, MappedLocalTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::prelude::*;

/// Wall-clock time source with the ability to suspend until a given instant.
#[async_trait]
pub trait Clock: Sync {
    fn now(&self) -> DateTime<Tz>;

    async fn sleep_until(&self, until: DateTime<Tz>);
}

pub struct SystemClock(pub Tz);

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.0)
    }

    async fn sleep_until(&self, until: DateTime<Tz>) {
        // Negative durations mean the instant has already passed:
        let duration = (until - self.now()).to_std().unwrap_or_default();
        debug!(%until, ?duration, "sleeping…");
        tokio::time::sleep(duration).await;
    }
}

/// The given wall-clock time on the same date as `now`.
///
/// A time skipped by the daylight saving transition moves an hour forward, an ambiguous one takes
/// the earlier instant.
pub fn at(now: DateTime<Tz>, time: NaiveTime) -> DateTime<Tz> {
    let timezone = now.timezone();
    let local = now.date_naive().and_time(time);
    match timezone.from_local_datetime(&local) {
        MappedLocalTime::Single(instant) | MappedLocalTime::Ambiguous(instant, _) => instant,
        MappedLocalTime::None => {
            timezone.from_local_datetime(&(local + TimeDelta::hours(1))).earliest().unwrap_or(now)
        }
    }
}
