//! Modbus link to the inverter, over TCP or an RS485 serial line.

use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use itertools::Itertools;
use reqwest::Url;
use tokio::{
    net::{TcpStream, lookup_host},
    time::timeout,
};
use tokio_modbus::{
    Address,
    Slave,
    SlaveId,
    client::{Client, Context as ModbusContext, Reader, Writer, rtu, tcp},
};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::{
    core::discharge::{self, DeviceError, InverterConnection},
    prelude::*,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Inverter endpoint, one of:
///
/// - `modbus+tcp://host[:port][/unit-id]`
/// - `modbus+rtu:///dev/ttyUSB0[?baud=9600&unit=1]`, 8 data bits, no parity, 1 stop bit
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Endpoint {
    Tcp { host: String, port: u16, slave_id: SlaveId },
    Rtu { path: String, baud_rate: u32, slave_id: SlaveId },
}

impl Endpoint {
    const DEFAULT_PORT: u16 = 502;
    const DEFAULT_BAUD_RATE: u32 = 9600;
    const DEFAULT_SLAVE_ID: SlaveId = 1;

    pub const fn slave_id(&self) -> SlaveId {
        match self {
            Self::Tcp { slave_id, .. } | Self::Rtu { slave_id, .. } => *slave_id,
        }
    }

    fn parse_tcp(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .context("the URL must contain host")?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned();
        let port = url.port().unwrap_or(Self::DEFAULT_PORT);
        let slave_id = match url.path_segments().into_iter().flatten().find(|it| !it.is_empty()) {
            Some(segment) => segment.parse().context("incorrect unit ID")?,
            None => Self::DEFAULT_SLAVE_ID,
        };
        Ok(Self::Tcp { host, port, slave_id })
    }

    fn parse_rtu(url: &Url) -> Result<Self> {
        ensure!(url.host_str().is_none_or(str::is_empty), "serial URL must not contain host");
        let path = url.path().to_owned();
        ensure!(path.len() > 1, "the URL must contain the serial device path");
        let (mut baud_rate, mut slave_id) = (Self::DEFAULT_BAUD_RATE, Self::DEFAULT_SLAVE_ID);
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "baud" => baud_rate = value.parse().context("incorrect baud rate")?,
                "unit" => slave_id = value.parse().context("incorrect unit ID")?,
                _ => bail!("unknown serial option `{key}`"),
            }
        }
        Ok(Self::Rtu { path, baud_rate, slave_id })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port, slave_id } => write!(f, "{host}:{port}/{slave_id}"),
            Self::Rtu { path, baud_rate, slave_id } => write!(f, "{path}@{baud_rate}/{slave_id}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let url = Url::from_str(url).with_context(|| format!("`{url}` is an invalid URL"))?;
        match url.scheme() {
            "modbus+tcp" => Self::parse_tcp(&url),
            "modbus+rtu" => Self::parse_rtu(&url),
            scheme => bail!("`{scheme}` scheme is not supported, use `modbus+tcp` or `modbus+rtu`"),
        }
    }
}

#[must_use]
#[derive(derive_more::From)]
pub struct Inverter(Endpoint);

impl Inverter {
    async fn new_context(&self) -> Result<ModbusContext> {
        let slave = Slave(self.0.slave_id());
        match &self.0 {
            Endpoint::Tcp { host, port, .. } => {
                Ok(tcp::attach_slave(new_tcp_stream(host, *port).await?, slave))
            }
            Endpoint::Rtu { path, baud_rate, .. } => {
                Ok(rtu::attach_slave(new_serial_stream(path, *baud_rate)?, slave))
            }
        }
    }
}

async fn new_tcp_stream(host: &str, port: u16) -> Result<TcpStream> {
    info!("connecting…");
    let addresses = lookup_host((host, port)).await?.collect_vec();
    let tcp_stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&*addresses))
        .await
        .context("timed out while connecting to the inverter")?
        .context("failed to connect to the inverter")?;
    tcp_stream.set_nodelay(true)?;
    info!("connected");
    Ok(tcp_stream)
}

fn new_serial_stream(path: &str, baud_rate: u32) -> Result<SerialStream> {
    info!("opening…");
    let serial_stream = tokio_serial::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(REQUEST_TIMEOUT)
        .open_native_async()
        .with_context(|| format!("failed to open `{path}`"))?;
    info!("opened");
    Ok(serial_stream)
}

#[async_trait]
impl discharge::Inverter for Inverter {
    type Connection = Connection;

    #[instrument(skip_all, fields(endpoint = %self.0))]
    async fn connect(&self) -> Result<Connection, DeviceError> {
        let context =
            self.new_context().await.map_err(|error| DeviceError::Connect(format!("{error:#}")))?;
        Ok(Connection(context))
    }
}

pub struct Connection(ModbusContext);

impl Connection {
    #[instrument(skip_all, fields(address = address))]
    pub async fn read_holding_register(&mut self, address: Address) -> Result<u16, DeviceError> {
        let error = |message: String| DeviceError::Read { address, message };
        let words = timeout(REQUEST_TIMEOUT, self.0.read_holding_registers(address, 1))
            .await
            .map_err(|_| error("timed out".to_string()))?
            .map_err(|modbus_error| error(modbus_error.to_string()))?
            .map_err(|exception| error(exception.to_string()))?;
        words.first().copied().ok_or_else(|| error("empty response".to_string()))
    }
}

#[async_trait]
impl InverterConnection for Connection {
    #[instrument(skip_all, fields(address = address, value = value))]
    async fn write_register(&mut self, address: Address, value: u16) -> Result<(), DeviceError> {
        let error = |message: String| DeviceError::Write { address, value, message };
        timeout(REQUEST_TIMEOUT, self.0.write_single_register(address, value))
            .await
            .map_err(|_| error("timed out".to_string()))?
            .map_err(|modbus_error| error(modbus_error.to_string()))?
            .map_err(|exception| error(exception.to_string()))
    }

    async fn close(&mut self) {
        match self.0.disconnect().await {
            Ok(()) => debug!("disconnected"),
            Err(error) => warn!("failed to disconnect: {error:#}"),
        }
    }
}
