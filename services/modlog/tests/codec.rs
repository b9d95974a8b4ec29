//! Decode and encode rules through the public API

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use modlog::codec::{EncodedRequest, SampleDecoder, SampleEncoder};
use modlog::error::{DecodeError, EncodeError};
use modlog::register::{RegisterKind, RegisterSpec, WriteKind, WriteSpec};
use modlog::transport::{MockTransport, ReadResponse, RecordedWrite};

#[test]
fn test_single_word_numeric_is_raw_value() {
    let decoder = SampleDecoder::default();
    for kind in [
        RegisterKind::HoldingFloat32,
        RegisterKind::HoldingInt32,
        RegisterKind::InputFloat32,
        RegisterKind::InputInt32,
    ] {
        let spec = RegisterSpec::new("raw", 1, 0, 1, kind).unwrap();
        for word in [0u16, 1, 16256, 65535] {
            let value = decoder
                .decode(&spec, &ReadResponse::Registers(vec![word]))
                .unwrap();
            assert_eq!(value, f64::from(word), "{} word {}", kind, word);
        }
    }
}

#[test]
fn test_int32_is_signed() {
    let spec = RegisterSpec::new("i", 1, 0, 2, RegisterKind::InputInt32).unwrap();
    let value = SampleDecoder::default()
        .decode(&spec, &ReadResponse::Registers(vec![0xFFFF, 0xFFFE]))
        .unwrap();
    assert_eq!(value, -2.0);
}

#[test]
fn test_exception_response_is_transport_failure() {
    let spec = RegisterSpec::new("pv", 1, 0, 2, RegisterKind::HoldingFloat32).unwrap();
    let err = SampleDecoder::default()
        .decode(&spec, &ReadResponse::Exception(0x02))
        .unwrap_err();
    assert!(matches!(err, DecodeError::TransportFailure(_)));
}

#[test]
fn test_int32_write_of_42() {
    let spec = WriteSpec::new("count", 5, 100, WriteKind::HoldingInt32Write, 42.0);
    let encoder = SampleEncoder::default();

    match encoder.encode(&spec).unwrap() {
        EncodedRequest::WriteRegisters {
            device_id,
            address,
            words,
            ..
        } => {
            assert_eq!((device_id, address), (5, 100));
            assert_eq!(words, vec![0x0000, 0x002A]);
        },
        other => panic!("unexpected {:?}", other),
    }

    let device = MockTransport::new();
    let outcome = encoder.write(&spec, &mut device.clone());
    assert!(outcome.success);
    assert!(outcome.message.contains("42"));
    assert_eq!(
        device.writes(),
        vec![RecordedWrite::Registers {
            device_id: 5,
            address: 100,
            words: vec![0, 42],
        }]
    );
}

#[test]
fn test_write_from_read_only_register_rejected() {
    let input = RegisterSpec::new("ai", 1, 0, 2, RegisterKind::InputFloat32).unwrap();
    let err = WriteSpec::from_register(&input, 1.0).unwrap_err();
    assert!(matches!(err, EncodeError::UnsupportedOperation(_)));

    let holding = RegisterSpec::new("sp", 1, 0, 2, RegisterKind::HoldingFloat32).unwrap();
    let write = WriteSpec::from_register(&holding, 1.0).unwrap();
    assert_eq!(write.kind, WriteKind::HoldingFloat32Write);
}

#[test]
fn test_write_failure_reported_not_raised() {
    let device = MockTransport::new();
    device.set_offline(true);
    let spec = WriteSpec::new("coil", 1, 3, WriteKind::CoilWrite, 1.0);

    let outcome = SampleEncoder::default().write(&spec, &mut device.clone());
    assert!(!outcome.success);
    assert!(outcome.message.contains("failed"));
}
