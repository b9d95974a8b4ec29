//! Blocking Modbus TCP client
//!
//! MBAP framing over `std::net::TcpStream`. I/O failures drop the socket;
//! the next request reconnects.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, warn};

use super::traits::{
    exception_description, ModbusTransport, ReadResponse, TransportError, WriteResponse,
};

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Transaction ID(2) + Protocol ID(2) + Length(2)
pub const MBAP_HEADER_LEN: usize = 6;

/// Maximum PDU size per Modbus specification
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// FC03/FC04 register limit: 1 + 1 + N*2 <= 253
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

/// FC16 register limit: 1 + 2 + 2 + 1 + N*2 <= 253
pub const MODBUS_MAX_WRITE_REGISTERS: u16 = 123;

/// FC01/FC02 bit limit
pub const MODBUS_MAX_READ_BITS: u16 = 2000;

const FC_READ_COILS: u8 = 0x01;
const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
const FC_READ_INPUT_REGISTERS: u8 = 0x04;
const FC_WRITE_SINGLE_COIL: u8 = 0x05;
const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Modbus TCP client
#[derive(Debug)]
pub struct ModbusTcpTransport {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<TcpStream>,
    transaction_id: u16,
}

impl ModbusTcpTransport {
    /// Create a disconnected client; the first request connects
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            stream: None,
            transaction_id: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn resolve(&self) -> Result<SocketAddr, TransportError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", self.endpoint(), e)))?
            .next()
            .ok_or_else(|| {
                TransportError::ConnectionFailed(format!("{}: no address resolved", self.endpoint()))
            })
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn open_stream(&self) -> Result<TcpStream, TransportError> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        let setup = stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .and_then(|_| stream.set_nodelay(true));
        setup.map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(stream)
    }

    fn next_transaction_id(&mut self) -> u16 {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.transaction_id
    }

    fn map_io(&self, err: std::io::Error) -> TransportError {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                TransportError::Timeout(format!("{} after {:?}", self.endpoint(), self.timeout))
            },
            _ => TransportError::Io(err.to_string()),
        }
    }

    /// Send one PDU and return the response PDU
    fn request(&mut self, device_id: u8, pdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        if pdu.len() > MAX_PDU_SIZE {
            return Err(TransportError::Protocol(format!(
                "PDU too large: {} bytes (max {})",
                pdu.len(),
                MAX_PDU_SIZE
            )));
        }
        if self.stream.is_none() {
            self.connect()?;
        }

        let tid = self.next_transaction_id();
        let frame = encode_frame(tid, device_id, pdu);

        let result = match self.stream.as_mut() {
            Some(stream) => exchange(stream, &frame),
            None => return Err(TransportError::NotConnected),
        };

        match result {
            Ok((resp_tid, resp_unit, resp_pdu)) => {
                if resp_tid != tid {
                    self.stream = None;
                    return Err(TransportError::Protocol(format!(
                        "transaction id mismatch: sent {}, got {}",
                        tid, resp_tid
                    )));
                }
                if resp_unit != device_id {
                    return Err(TransportError::Protocol(format!(
                        "unit id mismatch: sent {}, got {}",
                        device_id, resp_unit
                    )));
                }
                Ok(resp_pdu)
            },
            Err(FrameError::Io(e)) => {
                warn!("Modbus TCP {} I/O failure, dropping connection: {}", self.endpoint(), e);
                self.stream = None;
                Err(self.map_io(e))
            },
            Err(FrameError::Protocol(msg)) => {
                self.stream = None;
                Err(TransportError::Protocol(msg))
            },
        }
    }

    fn read_words(
        &mut self,
        fc: u8,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        if count == 0 || count > MODBUS_MAX_READ_REGISTERS {
            return Err(TransportError::Protocol(format!(
                "register count {} outside 1..={}",
                count, MODBUS_MAX_READ_REGISTERS
            )));
        }
        let pdu = read_request(fc, address, count);
        let resp = self.request(device_id, &pdu)?;
        if let Some(code) = exception_code(fc, &resp)? {
            return Ok(ReadResponse::Exception(code));
        }
        parse_words(&resp, count).map(ReadResponse::Registers)
    }

    fn read_bits(
        &mut self,
        fc: u8,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        if count == 0 || count > MODBUS_MAX_READ_BITS {
            return Err(TransportError::Protocol(format!(
                "bit count {} outside 1..={}",
                count, MODBUS_MAX_READ_BITS
            )));
        }
        let pdu = read_request(fc, address, count);
        let resp = self.request(device_id, &pdu)?;
        if let Some(code) = exception_code(fc, &resp)? {
            return Ok(ReadResponse::Exception(code));
        }
        parse_bits(&resp, count).map(ReadResponse::Bits)
    }
}

// ============================================================================
// Frame encoding / decoding
// ============================================================================

enum FrameError {
    Io(std::io::Error),
    Protocol(String),
}

fn encode_frame(tid: u16, unit_id: u8, pdu: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
    frame.put_u16(tid);
    frame.put_u16(0);
    frame.put_u16((pdu.len() + 1) as u16);
    frame.put_u8(unit_id);
    frame.put_slice(pdu);
    frame
}

/// Write the request frame and read one response: (tid, unit, pdu)
fn exchange(stream: &mut TcpStream, frame: &[u8]) -> Result<(u16, u8, Vec<u8>), FrameError> {
    stream.write_all(frame).map_err(FrameError::Io)?;

    let mut header = [0u8; MBAP_HEADER_LEN];
    stream.read_exact(&mut header).map_err(FrameError::Io)?;

    let tid = u16::from_be_bytes([header[0], header[1]]);
    let protocol = u16::from_be_bytes([header[2], header[3]]);
    let length = u16::from_be_bytes([header[4], header[5]]) as usize;

    if protocol != 0 {
        return Err(FrameError::Protocol(format!("invalid protocol id {}", protocol)));
    }
    if !(2..=MAX_MBAP_LENGTH).contains(&length) {
        return Err(FrameError::Protocol(format!("invalid MBAP length {}", length)));
    }

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).map_err(FrameError::Io)?;
    let unit = body[0];
    body.remove(0);
    Ok((tid, unit, body))
}

fn read_request(fc: u8, address: u16, count: u16) -> BytesMut {
    let mut pdu = BytesMut::with_capacity(5);
    pdu.put_u8(fc);
    pdu.put_u16(address);
    pdu.put_u16(count);
    pdu
}

/// `Some(code)` for an exception response to `fc`
fn exception_code(fc: u8, pdu: &[u8]) -> Result<Option<u8>, TransportError> {
    match pdu.first() {
        Some(&got) if got == fc | 0x80 => {
            let code = pdu.get(1).copied().unwrap_or(0);
            debug!(
                "Modbus exception FC={:02X} code={:02X} ({})",
                fc,
                code,
                exception_description(code)
            );
            Ok(Some(code))
        },
        Some(&got) if got == fc => Ok(None),
        Some(&got) => Err(TransportError::Protocol(format!(
            "unexpected function code {:02X} (expected {:02X})",
            got, fc
        ))),
        None => Err(TransportError::Protocol("empty response PDU".to_string())),
    }
}

fn parse_words(pdu: &[u8], count: u16) -> Result<Vec<u16>, TransportError> {
    let expected = count as usize * 2;
    let byte_count = pdu.get(1).copied().unwrap_or(0) as usize;
    if byte_count != expected || pdu.len() < 2 + expected {
        return Err(TransportError::Protocol(format!(
            "register response carries {} bytes, expected {}",
            byte_count, expected
        )));
    }
    Ok(pdu[2..2 + expected]
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

fn parse_bits(pdu: &[u8], count: u16) -> Result<Vec<bool>, TransportError> {
    let expected = (count as usize).div_ceil(8);
    let byte_count = pdu.get(1).copied().unwrap_or(0) as usize;
    if byte_count != expected || pdu.len() < 2 + expected {
        return Err(TransportError::Protocol(format!(
            "bit response carries {} bytes, expected {}",
            byte_count, expected
        )));
    }
    let data = &pdu[2..2 + expected];
    Ok((0..count as usize)
        .map(|i| data[i / 8] & (1 << (i % 8)) != 0)
        .collect())
}

fn check_write_echo(fc: u8, pdu: &[u8], address: u16) -> Result<WriteResponse, TransportError> {
    if let Some(code) = exception_code(fc, pdu)? {
        return Ok(WriteResponse::Exception(code));
    }
    if pdu.len() < 5 {
        return Err(TransportError::Protocol(format!(
            "write response too short: {} bytes",
            pdu.len()
        )));
    }
    let echoed = u16::from_be_bytes([pdu[1], pdu[2]]);
    if echoed != address {
        return Err(TransportError::Protocol(format!(
            "write echo address {} does not match {}",
            echoed, address
        )));
    }
    Ok(WriteResponse::Ack)
}

impl ModbusTransport for ModbusTcpTransport {
    fn read_holding(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.read_words(FC_READ_HOLDING_REGISTERS, address, count, device_id)
    }

    fn read_input(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.read_words(FC_READ_INPUT_REGISTERS, address, count, device_id)
    }

    fn read_coils(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.read_bits(FC_READ_COILS, address, count, device_id)
    }

    fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.read_bits(FC_READ_DISCRETE_INPUTS, address, count, device_id)
    }

    fn write_registers(
        &mut self,
        address: u16,
        words: &[u16],
        device_id: u8,
    ) -> Result<WriteResponse, TransportError> {
        let count = words.len() as u16;
        if count == 0 || count > MODBUS_MAX_WRITE_REGISTERS {
            return Err(TransportError::Protocol(format!(
                "write count {} outside 1..={}",
                count, MODBUS_MAX_WRITE_REGISTERS
            )));
        }

        let mut pdu = BytesMut::with_capacity(6 + words.len() * 2);
        pdu.put_u8(FC_WRITE_MULTIPLE_REGISTERS);
        pdu.put_u16(address);
        pdu.put_u16(count);
        pdu.put_u8((count * 2) as u8);
        for word in words {
            pdu.put_u16(*word);
        }

        let resp = self.request(device_id, &pdu)?;
        check_write_echo(FC_WRITE_MULTIPLE_REGISTERS, &resp, address)
    }

    fn write_coil(
        &mut self,
        address: u16,
        value: bool,
        device_id: u8,
    ) -> Result<WriteResponse, TransportError> {
        let mut pdu = BytesMut::with_capacity(5);
        pdu.put_u8(FC_WRITE_SINGLE_COIL);
        pdu.put_u16(address);
        pdu.put_u16(if value { 0xFF00 } else { 0x0000 });

        let resp = self.request(device_id, &pdu)?;
        check_write_echo(FC_WRITE_SINGLE_COIL, &resp, address)
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = self.open_stream()?;
        info!("Modbus TCP connected: {}", self.endpoint());
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            info!("Modbus TCP disconnected: {}", self.endpoint());
        }
    }

    fn connection_info(&self) -> String {
        format!("TCP {}", self.endpoint())
    }
}

impl Drop for ModbusTcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(0x0102, 5, &[0x03, 0x00, 0x64, 0x00, 0x02]);
        assert_eq!(
            &frame[..],
            &[0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x05, 0x03, 0x00, 0x64, 0x00, 0x02]
        );
    }

    #[test]
    fn test_exception_code_detection() {
        assert_eq!(exception_code(0x03, &[0x83, 0x02]).unwrap(), Some(0x02));
        assert_eq!(exception_code(0x03, &[0x03, 0x02, 0, 1]).unwrap(), None);
        assert!(exception_code(0x03, &[0x04, 0x02]).is_err());
        assert!(exception_code(0x03, &[]).is_err());
    }

    #[test]
    fn test_parse_words() {
        assert_eq!(parse_words(&[0x03, 4, 0x3F, 0x80, 0, 0], 2).unwrap(), vec![16256, 0]);
        assert!(parse_words(&[0x03, 2, 0x3F, 0x80], 2).is_err());
    }

    #[test]
    fn test_parse_bits_lsb_first() {
        let bits = parse_bits(&[0x01, 2, 0b0000_0101, 0b0000_0001], 9).unwrap();
        assert_eq!(
            bits,
            vec![true, false, true, false, false, false, false, false, true]
        );
    }

    #[test]
    fn test_write_echo() {
        assert_eq!(
            check_write_echo(0x10, &[0x10, 0x00, 0x64, 0x00, 0x02], 100).unwrap(),
            WriteResponse::Ack
        );
        assert_eq!(
            check_write_echo(0x05, &[0x85, 0x02], 7).unwrap(),
            WriteResponse::Exception(0x02)
        );
        assert!(check_write_echo(0x10, &[0x10, 0x00, 0x65, 0x00, 0x02], 100).is_err());
    }

    #[test]
    fn test_invalid_counts_rejected_before_io() {
        let mut client = ModbusTcpTransport::new("127.0.0.1", 1, Duration::from_millis(50));
        assert!(matches!(client.read_holding(0, 0, 1), Err(TransportError::Protocol(_))));
        assert!(matches!(client.read_coils(0, 2001, 1), Err(TransportError::Protocol(_))));
        assert!(matches!(
            client.write_registers(0, &[0; 124], 1),
            Err(TransportError::Protocol(_))
        ));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_connection_info() {
        let client = ModbusTcpTransport::new("127.0.0.1", 502, Duration::from_secs(1));
        assert_eq!(client.connection_info(), "TCP 127.0.0.1:502");
    }
}
