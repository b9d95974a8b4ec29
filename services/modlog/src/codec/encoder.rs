//! Write request encoding
//!
//! Float32/Int32 values become two words written with FC16; coils become a
//! single FC05 write. No retries happen here.

use serde::Serialize;
use tracing::{info, warn};

use super::words::{f32_to_regs, i32_to_regs, WordOrder};
use crate::error::EncodeError;
use crate::register::{WriteKind, WriteSpec};
use crate::transport::{exception_description, ModbusTransport, WriteResponse};

/// A write ready to be handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedRequest {
    WriteRegisters {
        device_id: u8,
        address: u16,
        words: Vec<u16>,
        kind: WriteKind,
        /// Value actually encoded (after Int32 rounding)
        value: f64,
    },
    WriteCoil {
        device_id: u8,
        address: u16,
        value: bool,
    },
}

impl EncodedRequest {
    pub fn address(&self) -> u16 {
        match self {
            EncodedRequest::WriteRegisters { address, .. } | EncodedRequest::WriteCoil { address, .. } => {
                *address
            },
        }
    }

    /// Value as shown in outcome messages
    pub fn display_value(&self) -> String {
        match self {
            EncodedRequest::WriteRegisters {
                kind: WriteKind::HoldingInt32Write,
                value,
                ..
            } => format!("{}", *value as i64),
            EncodedRequest::WriteRegisters { value, .. } => format!("{}", *value as f32),
            EncodedRequest::WriteCoil { value, .. } => value.to_string(),
        }
    }

    fn target(&self) -> &'static str {
        match self {
            EncodedRequest::WriteRegisters {
                kind: WriteKind::HoldingInt32Write,
                ..
            } => "Holding_Int register",
            EncodedRequest::WriteRegisters { .. } => "Holding_Float register",
            EncodedRequest::WriteCoil { .. } => "Coil",
        }
    }
}

/// Result of one write attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub success: bool,
    pub message: String,
}

impl WriteOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Turns write specs into transport requests
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleEncoder {
    order: WordOrder,
}

impl SampleEncoder {
    pub fn new(order: WordOrder) -> Self {
        Self { order }
    }

    pub fn encode(&self, spec: &WriteSpec) -> Result<EncodedRequest, EncodeError> {
        let (device_id, address, value) = (spec.device_id, spec.address, spec.value);
        match spec.kind {
            WriteKind::HoldingFloat32Write => {
                if value.is_finite() && value.abs() > f64::from(f32::MAX) {
                    return Err(EncodeError::ValueOutOfRange(format!(
                        "'{}': {} does not fit in a 32-bit float",
                        spec.name, value
                    )));
                }
                Ok(EncodedRequest::WriteRegisters {
                    device_id,
                    address,
                    words: f32_to_regs(value as f32, self.order).to_vec(),
                    kind: spec.kind,
                    value,
                })
            },
            WriteKind::HoldingInt32Write => {
                let rounded = value.round();
                if !rounded.is_finite()
                    || rounded < f64::from(i32::MIN)
                    || rounded > f64::from(i32::MAX)
                {
                    return Err(EncodeError::ValueOutOfRange(format!(
                        "'{}': {} does not fit in a 32-bit integer",
                        spec.name, value
                    )));
                }
                Ok(EncodedRequest::WriteRegisters {
                    device_id,
                    address,
                    words: i32_to_regs(rounded as i32, self.order).to_vec(),
                    kind: spec.kind,
                    value: rounded,
                })
            },
            WriteKind::CoilWrite => Ok(EncodedRequest::WriteCoil {
                device_id,
                address,
                value: value != 0.0,
            }),
        }
    }

    /// Send an encoded request; transport failures become `success == false`
    pub fn apply(
        &self,
        request: &EncodedRequest,
        transport: &mut dyn ModbusTransport,
    ) -> WriteOutcome {
        let result = match request {
            EncodedRequest::WriteRegisters {
                device_id,
                address,
                words,
                ..
            } => transport.write_registers(*address, words, *device_id),
            EncodedRequest::WriteCoil {
                device_id,
                address,
                value,
            } => transport.write_coil(*address, *value, *device_id),
        };

        match result {
            Ok(WriteResponse::Ack) => {
                let message = format!(
                    "Wrote {} to {} {}",
                    request.display_value(),
                    request.target(),
                    request.address()
                );
                info!("{}", message);
                WriteOutcome::ok(message)
            },
            Ok(WriteResponse::Exception(code)) => {
                let message = format!(
                    "Write to {} {} rejected: exception 0x{:02X} ({})",
                    request.target(),
                    request.address(),
                    code,
                    exception_description(code)
                );
                warn!("{}", message);
                WriteOutcome::failed(message)
            },
            Err(e) => {
                let message = format!(
                    "Write to {} {} failed: {}",
                    request.target(),
                    request.address(),
                    e
                );
                warn!("{}", message);
                WriteOutcome::failed(message)
            },
        }
    }

    /// Encode and apply in one step
    pub fn write(&self, spec: &WriteSpec, transport: &mut dyn ModbusTransport) -> WriteOutcome {
        match self.encode(spec) {
            Ok(request) => self.apply(&request, transport),
            Err(e) => WriteOutcome::failed(format!("Write '{}' not sent: {}", spec.name, e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::transport::{MockTransport, RecordedWrite};

    #[test]
    fn test_int32_write_42() {
        let encoder = SampleEncoder::default();
        let spec = WriteSpec::new("w", 5, 100, WriteKind::HoldingInt32Write, 42.0);
        let request = encoder.encode(&spec).unwrap();
        assert_eq!(
            request,
            EncodedRequest::WriteRegisters {
                device_id: 5,
                address: 100,
                words: vec![0, 42],
                kind: WriteKind::HoldingInt32Write,
                value: 42.0,
            }
        );

        let mock = MockTransport::new();
        let mut transport = mock.clone();
        let outcome = encoder.apply(&request, &mut transport);
        assert!(outcome.success);
        assert!(outcome.message.contains("42"));
        assert_eq!(mock.holding(5, 100, 2), vec![0, 42]);
    }

    #[test]
    fn test_int32_rounding_and_range() {
        let encoder = SampleEncoder::default();
        let spec = WriteSpec::new("w", 1, 0, WriteKind::HoldingInt32Write, 2.6);
        match encoder.encode(&spec).unwrap() {
            EncodedRequest::WriteRegisters { words, .. } => assert_eq!(words, vec![0, 3]),
            other => panic!("unexpected request {:?}", other),
        }

        for bad in [f64::NAN, f64::INFINITY, 3.0e9, -3.0e9] {
            let spec = WriteSpec::new("w", 1, 0, WriteKind::HoldingInt32Write, bad);
            assert!(matches!(encoder.encode(&spec), Err(EncodeError::ValueOutOfRange(_))));
        }
    }

    #[test]
    fn test_float32_write() {
        let encoder = SampleEncoder::default();
        let spec = WriteSpec::new("sp", 10, 1539, WriteKind::HoldingFloat32Write, 1.0);
        match encoder.encode(&spec).unwrap() {
            EncodedRequest::WriteRegisters { words, .. } => assert_eq!(words, vec![16256, 0]),
            other => panic!("unexpected request {:?}", other),
        }

        let spec = WriteSpec::new("sp", 10, 1539, WriteKind::HoldingFloat32Write, 1.0e300);
        assert!(matches!(encoder.encode(&spec), Err(EncodeError::ValueOutOfRange(_))));
    }

    #[test]
    fn test_coil_write() {
        let encoder = SampleEncoder::default();
        let mock = MockTransport::new();
        let mut transport = mock.clone();

        let spec = WriteSpec::new("enable_output", 10, 2000, WriteKind::CoilWrite, 1.0);
        let outcome = encoder.write(&spec, &mut transport);
        assert!(outcome.success);
        assert!(outcome.message.contains("true"));
        assert_eq!(
            mock.writes(),
            vec![RecordedWrite::Coil {
                device_id: 10,
                address: 2000,
                value: true
            }]
        );
    }

    #[test]
    fn test_transport_failure_is_reported() {
        let encoder = SampleEncoder::default();
        let mock = MockTransport::new();
        let mut transport = mock.clone();
        let spec = WriteSpec::new("sp", 10, 1539, WriteKind::HoldingFloat32Write, 25.0);

        mock.set_offline(true);
        let outcome = encoder.write(&spec, &mut transport);
        assert!(!outcome.success);
        assert!(outcome.message.contains("Not connected"));

        mock.set_offline(false);
        mock.exception_at(1539, 0x03);
        let outcome = encoder.write(&spec, &mut transport);
        assert!(!outcome.success);
        assert!(outcome.message.contains("0x03"));
    }

    #[test]
    fn test_out_of_range_not_sent() {
        let encoder = SampleEncoder::default();
        let mock = MockTransport::new();
        let mut transport = mock.clone();
        let spec = WriteSpec::new("w", 1, 0, WriteKind::HoldingInt32Write, f64::NAN);

        let outcome = encoder.write(&spec, &mut transport);
        assert!(!outcome.success);
        assert_eq!(mock.call_count(), 0);
    }
}
