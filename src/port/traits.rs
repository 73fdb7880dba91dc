//! Core traits for serial port abstraction.
//!
//! The worker only ever talks to a [`SerialTransport`] produced by a
//! [`TransportFactory`], so real hardware and the in-memory mock are
//! interchangeable. Port listing goes through [`PortEnumerator`].

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration parameters for a serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Read timeout; the worker polls its stop flag at this cadence.
    pub timeout: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// An open duplex byte stream.
///
/// Owned by exactly one worker thread; never shared.
pub trait SerialTransport: Send + std::fmt::Debug {
    /// Write bytes to the port.
    ///
    /// Returns the number of bytes actually written, which may be fewer
    /// than `data.len()`.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read whatever is available into `buffer`, waiting at most the
    /// configured timeout.
    ///
    /// An empty cycle is reported either as `Ok(0)` or as an error for which
    /// [`PortError::is_timeout`] is true.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Set the read timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Release the underlying handle. Further I/O is undefined.
    fn close(&mut self) -> Result<(), PortError> {
        Ok(())
    }
}

/// Opens transports by port name.
pub trait TransportFactory: Send + Sync + std::fmt::Debug {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialTransport>, PortError>;
}

/// Lists the ports currently present on the system.
#[cfg_attr(test, mockall::automock)]
pub trait PortEnumerator: Send + Sync {
    /// Port names in a stable order.
    fn list_available_ports(&self) -> Result<Vec<String>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = PortConfiguration::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.flow_control, FlowControl::None);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_data_bits_conversion() {
        let serialport_bits: serialport::DataBits = DataBits::Seven.into();
        assert_eq!(serialport_bits, serialport::DataBits::Seven);
    }

    #[test]
    fn test_flow_control_conversion() {
        let serialport_flow: serialport::FlowControl = FlowControl::Hardware.into();
        assert_eq!(serialport_flow, serialport::FlowControl::Hardware);
    }

    #[test]
    fn test_parity_conversion() {
        let serialport_parity: serialport::Parity = Parity::Even.into();
        assert_eq!(serialport_parity, serialport::Parity::Even);
    }

    #[test]
    fn test_stop_bits_conversion() {
        let serialport_stop_bits: serialport::StopBits = StopBits::Two.into();
        assert_eq!(serialport_stop_bits, serialport::StopBits::Two);
    }

    #[test]
    fn test_enum_names_in_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            parity: Parity,
            data_bits: DataBits,
        }
        let parsed: Wrapper = toml::from_str("parity = \"odd\"\ndata_bits = \"seven\"").unwrap();
        assert_eq!(parsed.parity, Parity::Odd);
        assert_eq!(parsed.data_bits, DataBits::Seven);
    }
}
