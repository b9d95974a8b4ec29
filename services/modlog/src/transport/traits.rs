//! Transport abstraction for blocking Modbus clients
//!
//! A transport is single-owner and not internally synchronized. Poll
//! strategies share one through [`SharedTransport`], which serializes every
//! call behind a mutex.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Transport-level failure (the request never produced a device answer)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Not connected and reconnecting is not possible
    #[error("Not connected")]
    NotConnected,

    /// Connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No answer within the configured timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Socket or device I/O failure
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Answer to a read request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResponse {
    /// Holding/input register words
    Registers(Vec<u16>),
    /// Coil/discrete input states
    Bits(Vec<bool>),
    /// Modbus exception code returned by the device
    Exception(u8),
}

impl ReadResponse {
    /// Device answered with an exception
    pub fn is_error(&self) -> bool {
        matches!(self, ReadResponse::Exception(_))
    }

    pub fn registers(&self) -> Option<&[u16]> {
        match self {
            ReadResponse::Registers(words) => Some(words),
            _ => None,
        }
    }

    pub fn bits(&self) -> Option<&[bool]> {
        match self {
            ReadResponse::Bits(bits) => Some(bits),
            _ => None,
        }
    }
}

/// Answer to a write request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResponse {
    Ack,
    Exception(u8),
}

impl WriteResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, WriteResponse::Exception(_))
    }
}

/// Human-readable Modbus exception code
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Server Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Server Device Busy",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

/// Blocking Modbus client
///
/// Every call may block up to the transport's configured timeout.
pub trait ModbusTransport: Send + fmt::Debug {
    /// FC03
    fn read_holding(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError>;

    /// FC04
    fn read_input(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError>;

    /// FC01
    fn read_coils(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError>;

    /// FC02
    fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError>;

    /// FC16
    fn write_registers(
        &mut self,
        address: u16,
        words: &[u16],
        device_id: u8,
    ) -> Result<WriteResponse, TransportError>;

    /// FC05
    fn write_coil(
        &mut self,
        address: u16,
        value: bool,
        device_id: u8,
    ) -> Result<WriteResponse, TransportError>;

    fn connect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Release the underlying connection; safe to call more than once
    fn close(&mut self);

    /// Short description such as `TCP 127.0.0.1:502`
    fn connection_info(&self) -> String;

    /// Probe the device by reading holding register 0 on unit 1
    ///
    /// Any device answer, including an exception, counts as reachable.
    fn test_connection(&mut self) -> bool {
        self.read_holding(0, 1, 1).is_ok()
    }
}

/// Transport shared between a poll strategy, writers and the lifecycle manager
pub type SharedTransport = Arc<Mutex<Box<dyn ModbusTransport>>>;

/// Wrap a transport for sharing
pub fn shared<T: ModbusTransport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(Box::new(transport)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_accessors() {
        let words = ReadResponse::Registers(vec![1, 2]);
        assert!(!words.is_error());
        assert_eq!(words.registers(), Some(&[1u16, 2][..]));
        assert!(words.bits().is_none());

        let exc = ReadResponse::Exception(0x02);
        assert!(exc.is_error());
        assert!(WriteResponse::Exception(0x04).is_error());
        assert!(!WriteResponse::Ack.is_error());
    }

    #[test]
    fn test_exception_description() {
        assert_eq!(exception_description(0x02), "Illegal Data Address");
        assert_eq!(exception_description(0x7F), "Unknown Exception");
    }
}
