//! Timed discharge of the inverter at the selected slot.

use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, NaiveTime, TimeDelta, Timelike};
use chrono_tz::Tz;

use crate::{
    core::{
        clock::{Clock, at},
        prices::PriceSlot,
    },
    prelude::*,
};

/// Register map of the SolaX-compatible inverter.
pub mod registers {
    pub const WORK_MODE: u16 = 0x0100;
    pub const DISCHARGE_START_HOUR: u16 = 0x011A;
    pub const DISCHARGE_START_MINUTE: u16 = 0x011B;
    pub const DISCHARGE_DURATION_MINUTES: u16 = 0x011C;
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to connect to the inverter: {0}")]
    Connect(String),

    #[error("failed to write {value} into register {address:#06X}: {message}")]
    Write { address: u16, value: u16, message: String },

    #[error("failed to read register {address:#06X}: {message}")]
    Read { address: u16, message: String },
}

/// Field-bus link to the inverter.
#[async_trait]
pub trait Inverter: Sync {
    type Connection: InverterConnection;

    async fn connect(&self) -> Result<Self::Connection, DeviceError>;
}

#[async_trait]
pub trait InverterConnection: Send {
    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), DeviceError>;

    /// Close the connection. Errors are only worth a log line at this point.
    async fn close(&mut self);
}

#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WorkMode {
    TimedDischarge,
}

impl WorkMode {
    pub const fn register_value(self) -> u16 {
        match self {
            Self::TimedDischarge => 35,
        }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DischargeCommand {
    pub start_time: NaiveTime,
    pub duration_minutes: u16,
    pub mode: WorkMode,
}

impl DischargeCommand {
    pub const fn new(start_time: NaiveTime, duration_minutes: u16) -> Self {
        Self { start_time, duration_minutes, mode: WorkMode::TimedDischarge }
    }

    /// Register writes in the order they must be issued: the mode goes last to arm the schedule.
    #[must_use]
    pub fn register_writes(&self) -> [(u16, u16); 4] {
        #[expect(clippy::cast_possible_truncation)]
        let (hour, minute) = (self.start_time.hour() as u16, self.start_time.minute() as u16);
        [
            (registers::DISCHARGE_START_HOUR, hour),
            (registers::DISCHARGE_START_MINUTE, minute),
            (registers::DISCHARGE_DURATION_MINUTES, self.duration_minutes),
            (registers::WORK_MODE, self.mode.register_value()),
        ]
    }

    /// End of the discharge on the date of `now`.
    pub fn ends_at(&self, now: DateTime<Tz>) -> DateTime<Tz> {
        at(now, self.start_time) + TimeDelta::minutes(i64::from(self.duration_minutes))
    }

    /// The registers hold a single undated schedule, so the next command must not land before this
    /// one has run.
    pub async fn wait_until_over(&self, clock: &impl Clock) {
        let end = self.ends_at(clock.now());
        if clock.now() < end {
            info!(%end, "waiting for the programmed discharge to end…");
            clock.sleep_until(end).await;
        }
    }
}

#[must_use]
#[derive(Builder)]
pub struct DischargeController<I> {
    inverter: I,
    duration_minutes: u16,
}

impl<I: Inverter> DischargeController<I> {
    /// Program the inverter to discharge at the slot start. Never retries.
    #[instrument(
        skip_all,
        fields(start = %slot.start_time, duration_minutes = self.duration_minutes),
    )]
    pub async fn discharge(&self, slot: &PriceSlot) -> Result<DischargeCommand, DeviceError> {
        let command = DischargeCommand::new(slot.start_time, self.duration_minutes);
        info!("connecting…");
        let mut connection = self.inverter.connect().await?;
        let result = Self::send(&mut connection, &command).await;
        connection.close().await;
        match &result {
            Ok(()) => info!("discharge scheduled"),
            Err(error) => error!("discharge failed: {error}"),
        }
        result.map(|()| command)
    }

    async fn send(
        connection: &mut I::Connection,
        command: &DischargeCommand,
    ) -> Result<(), DeviceError> {
        for (address, value) in command.register_writes() {
            debug!(address, value, "writing…");
            connection.write_register(address, value).await?;
        }
        Ok(())
    }
}
