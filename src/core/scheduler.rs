//! Polling for the next day's prices.

use bon::Builder;
use chrono::NaiveDate;

use crate::{
    core::{
        clock::Clock,
        prices::DayPrices,
        provider::{FetchError, PriceProvider},
        window::{Decision, RetryWindow},
    },
    prelude::*,
    store::{PersistenceError, PriceStore},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    Idle,
    WindowClosed,
    Attempting,
    Succeeded,
    GaveUp,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptResult {
    Success,
    NoData,
    Error,
}

impl From<&FetchError> for AttemptResult {
    fn from(error: &FetchError) -> Self {
        match error {
            FetchError::NoDataYet => Self::NoData,
            FetchError::Transient(_) => Self::Error,
        }
    }
}

/// Lives for one monitoring cycle of one target date.
#[must_use]
#[derive(Debug)]
pub struct FetchAttemptState {
    pub target_date: NaiveDate,
    pub state: State,
    pub n_attempts: u32,
    pub window_open: bool,
    pub last_result: Option<AttemptResult>,
}

impl FetchAttemptState {
    pub const fn new(target_date: NaiveDate) -> Self {
        Self {
            target_date,
            state: State::Idle,
            n_attempts: 0,
            window_open: false,
            last_result: None,
        }
    }

    fn transition(&mut self, to: State) {
        if self.state != to {
            debug!(
                from = ?self.state,
                ?to,
                window_open = self.window_open,
                last_result = ?self.last_result,
                "transition",
            );
            self.state = to;
        }
    }
}

#[must_use]
#[derive(Debug)]
pub enum Outcome {
    Succeeded { prices: DayPrices, n_attempts: u32 },
    GaveUp { n_attempts: u32 },
}

#[must_use]
#[derive(Builder)]
pub struct FetchScheduler<'a, P, C> {
    provider: &'a P,
    store: &'a PriceStore,
    clock: &'a C,
    window: RetryWindow,
}

impl<P: PriceProvider, C: Clock> FetchScheduler<'_, P, C> {
    /// Poll for the date's prices within the retry window and persist them once published.
    ///
    /// Giving up when the window closes is not an error. Failing to persist is, and it is not retried.
    #[instrument(skip_all, fields(target_date = %target_date))]
    pub async fn monitor(&self, target_date: NaiveDate) -> Result<Outcome, PersistenceError> {
        let mut state = FetchAttemptState::new(target_date);
        info!("monitoring…");

        loop {
            let now = self.clock.now();
            match self.window.decide(now) {
                Decision::GiveUp => {
                    state.window_open = false;
                    state.transition(State::GaveUp);
                    warn!(n_attempts = state.n_attempts, %now, "the window is over, giving up");
                    return Ok(Outcome::GaveUp { n_attempts: state.n_attempts });
                }

                Decision::WaitUntil(until) => {
                    state.window_open = false;
                    state.transition(State::WindowClosed);
                    info!(%until, "the retry window is not open yet, waiting…");
                    self.clock.sleep_until(until).await;
                }

                Decision::Attempt => {
                    state.window_open = true;
                    state.transition(State::Attempting);
                    state.n_attempts += 1;

                    match self.provider.get_prices(target_date).await {
                        Ok(prices) => {
                            state.last_result = Some(AttemptResult::Success);
                            self.store.write(&prices)?;
                            state.transition(State::Succeeded);
                            info!(
                                n_attempts = state.n_attempts,
                                n_slots = prices.len(),
                                "fetched and saved",
                            );
                            let n_attempts = state.n_attempts;
                            return Ok(Outcome::Succeeded { prices, n_attempts });
                        }
                        Err(error) => {
                            state.last_result = Some(AttemptResult::from(&error));
                            log_failure(&error, state.n_attempts);
                            let next_attempt = self.window.next_attempt_after(self.clock.now());
                            info!(%next_attempt, "retrying later…");
                            self.clock.sleep_until(next_attempt).await;
                        }
                    }
                }
            }
        }
    }

    /// Fetch and persist the date's prices exactly once, regardless of the window.
    ///
    /// `None` means the fetch failed, which ends the invocation.
    #[instrument(skip_all, fields(on = %on))]
    pub async fn fetch_once(&self, on: NaiveDate) -> Result<Option<DayPrices>, PersistenceError> {
        match self.provider.get_prices(on).await {
            Ok(prices) => {
                self.store.write(&prices)?;
                info!(n_slots = prices.len(), "fetched and saved");
                Ok(Some(prices))
            }
            Err(error) => {
                log_failure(&error, 1);
                Ok(None)
            }
        }
    }
}

fn log_failure(error: &FetchError, n_attempts: u32) {
    match error {
        FetchError::NoDataYet => info!(n_attempts, "not published yet"),
        FetchError::Transient(_) => warn!(n_attempts, "fetch failed: {error}"),
    }
}
