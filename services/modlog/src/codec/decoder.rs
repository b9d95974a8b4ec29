//! Response to sample decoding
//!
//! | kind                   | words | value                                  |
//! |------------------------|-------|----------------------------------------|
//! | Holding/Input Float32  | 2     | IEEE-754 f32 from two words            |
//! | Holding/Input Int32    | 2     | signed 32-bit integer                  |
//! | any numeric kind       | 1     | the raw word                           |
//! | Coil / DiscreteInput   | 1 bit | 0.0 or 1.0 from the first returned bit |

use tracing::debug;

use super::words::{regs_to_f32, regs_to_i32, WordOrder};
use crate::error::DecodeError;
use crate::register::{RegisterKind, RegisterSpec};
use crate::transport::{exception_description, ModbusTransport, ReadResponse, TransportError};

/// Turns transport responses into samples
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleDecoder {
    order: WordOrder,
}

impl SampleDecoder {
    pub fn new(order: WordOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> WordOrder {
        self.order
    }

    /// Decode a response already fetched for `spec`
    pub fn decode(&self, spec: &RegisterSpec, response: &ReadResponse) -> Result<f64, DecodeError> {
        if let ReadResponse::Exception(code) = response {
            return Err(DecodeError::TransportFailure(format!(
                "exception 0x{:02X} ({})",
                code,
                exception_description(*code)
            )));
        }

        let kind = spec.kind();
        if kind.is_bit() {
            let bit = response.bits().and_then(|b| b.first()).ok_or_else(|| {
                DecodeError::MalformedResponse(format!("'{}': no bits in response", spec.name()))
            })?;
            return Ok(if *bit { 1.0 } else { 0.0 });
        }

        let words = response.registers().ok_or_else(|| {
            DecodeError::MalformedResponse(format!("'{}': expected register words", spec.name()))
        })?;

        if spec.word_count() == 1 {
            return words.first().map(|w| f64::from(*w)).ok_or_else(|| {
                DecodeError::MalformedResponse(format!("'{}': empty register response", spec.name()))
            });
        }

        let pair: [u16; 2] = match words {
            [hi, lo, ..] => [*hi, *lo],
            _ => {
                return Err(DecodeError::MalformedResponse(format!(
                    "'{}': expected 2 words, got {}",
                    spec.name(),
                    words.len()
                )))
            },
        };

        let value = if kind.is_float() {
            f64::from(regs_to_f32(&pair, self.order))
        } else {
            f64::from(regs_to_i32(&pair, self.order))
        };
        Ok(value)
    }

    /// Read `spec` through the transport and decode the answer
    pub fn read(
        &self,
        spec: &RegisterSpec,
        transport: &mut dyn ModbusTransport,
    ) -> Result<f64, DecodeError> {
        let (address, device_id) = (spec.address(), spec.device_id());
        let response = match spec.kind() {
            RegisterKind::HoldingFloat32 | RegisterKind::HoldingInt32 => {
                transport.read_holding(address, spec.word_count(), device_id)
            },
            RegisterKind::InputFloat32 | RegisterKind::InputInt32 => {
                transport.read_input(address, spec.word_count(), device_id)
            },
            RegisterKind::Coil => transport.read_coils(address, 1, device_id),
            RegisterKind::DiscreteInput => transport.read_discrete_inputs(address, 1, device_id),
        }
        .map_err(|e| match e {
            TransportError::NotConnected => DecodeError::TransportUnavailable,
            other => DecodeError::TransportFailure(other.to_string()),
        })?;

        let value = self.decode(spec, &response)?;
        debug!(
            "Read {} FC={:02X} dev={} addr={} -> {}",
            spec.name(),
            spec.kind().function_code(),
            device_id,
            address,
            value
        );
        Ok(value)
    }
}
