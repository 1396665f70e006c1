pub mod modbus;
pub mod nordpool;
