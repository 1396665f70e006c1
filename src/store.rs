//! Per-date price files with a retention cap.

use std::{
    collections::BTreeSet,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use bon::Builder;
use chrono::NaiveDate;

use crate::{
    core::prices::{DayPrices, PriceSlot},
    prelude::*,
};

#[derive(Debug, thiserror::Error)]
#[error("failed to persist the prices for {date}")]
pub struct PersistenceError {
    pub date: NaiveDate,

    #[source]
    pub source: csv::Error,
}

/// One CSV file per date: `<root>/<prefix>_<YYYY-MM-DD>.csv`.
#[must_use]
#[derive(Builder)]
pub struct PriceStore {
    #[builder(into)]
    root: PathBuf,

    #[builder(into)]
    prefix: String,

    max_files: NonZeroUsize,
}

impl PriceStore {
    /// Persist the prices, overwriting the file for the same date, and evict the oldest files beyond the cap.
    #[instrument(skip_all, fields(date = %prices.date, n_slots = prices.len()))]
    pub fn write(&self, prices: &DayPrices) -> Result<(), PersistenceError> {
        let path = self.write_file(prices).map_err(|source| {
            error!("failed to persist the prices: {source}");
            PersistenceError { date: prices.date, source }
        })?;
        info!(path = %path.display(), "saved");
        if let Err(error) = self.evict(prices.date) {
            warn!("failed to evict old price files: {error:#}");
        }
        Ok(())
    }

    /// Read the prices for the date, if stored.
    #[instrument(skip_all, fields(on = %on))]
    pub fn read(&self, on: NaiveDate) -> Result<Option<DayPrices>> {
        let path = self.path(on);
        if !path.is_file() {
            debug!(path = %path.display(), "not stored");
            return Ok(None);
        }
        let slots = csv::Reader::from_path(&path)
            .with_context(|| format!("failed to open `{}`", path.display()))?
            .deserialize::<PriceSlot>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        debug!(n_slots = slots.len(), "read");
        Ok(Some(DayPrices::new(on, slots)))
    }

    /// Stored dates, oldest first.
    pub fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        Ok(self.retention_set()?.dates.into_iter().collect())
    }

    fn retention_set(&self) -> Result<RetentionSet> {
        if !self.root.is_dir() {
            return Ok(RetentionSet::new([], self.max_files));
        }
        let mut dates = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("failed to list `{}`", self.root.display()))?
        {
            if let Some(date) = self.parse_date(&entry?.path()) {
                dates.push(date);
            }
        }
        Ok(RetentionSet::new(dates, self.max_files))
    }

    fn write_file(&self, prices: &DayPrices) -> Result<PathBuf, csv::Error> {
        fs::create_dir_all(&self.root)?;
        let path = self.path(prices.date);

        // Write aside and rename, so that a reader never sees a half-written file:
        let temporary_path = path.with_extension("csv.tmp");
        Self::write_aside(prices, &temporary_path, &path).inspect_err(|_| {
            if let Err(error) = fs::remove_file(&temporary_path) {
                debug!(path = %temporary_path.display(), "failed to remove the temporary file: {error}");
            }
        })?;

        Ok(path)
    }

    fn write_aside(
        prices: &DayPrices,
        temporary_path: &Path,
        path: &Path,
    ) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(temporary_path)?;
        for slot in &prices.slots {
            writer.serialize(slot)?;
        }
        writer.flush()?;
        drop(writer);
        fs::rename(temporary_path, path)?;
        Ok(())
    }

    fn evict(&self, just_written: NaiveDate) -> Result {
        for date in self.retention_set()?.evictions(just_written) {
            let path = self.path(date);
            fs::remove_file(&path)
                .with_context(|| format!("failed to delete `{}`", path.display()))?;
            info!(path = %path.display(), "deleted old price file");
        }
        Ok(())
    }

    fn path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("{}_{date}.csv", self.prefix))
    }

    fn parse_date(&self, path: &Path) -> Option<NaiveDate> {
        path.file_name()?
            .to_str()?
            .strip_prefix(&self.prefix)?
            .strip_prefix('_')?
            .strip_suffix(".csv")?
            .parse()
            .ok()
    }
}

/// Stored dates bounded by the maximum count, ordered chronologically.
#[must_use]
pub struct RetentionSet {
    dates: BTreeSet<NaiveDate>,
    capacity: NonZeroUsize,
}

impl RetentionSet {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>, capacity: NonZeroUsize) -> Self {
        Self { dates: dates.into_iter().collect(), capacity }
    }

    /// Oldest dates that exceed the capacity. The just-written date is never evicted.
    #[must_use]
    pub fn evictions(&self, just_written: NaiveDate) -> Vec<NaiveDate> {
        let n_excess = self.dates.len().saturating_sub(self.capacity.get());
        self.dates.iter().copied().filter(|date| *date != just_written).take(n_excess).collect()
    }
}
