//! Modbus transports
//!
//! - `traits`: the blocking transport interface and response types
//! - `tcp`: Modbus TCP client
//! - `mock`: in-memory device used by the simulator mode and tests

pub mod mock;
pub mod tcp;
pub mod traits;

pub use mock::{MockTransport, MockTransportConfig, RecordedWrite};
pub use tcp::ModbusTcpTransport;
pub use traits::{
    exception_description, shared, ModbusTransport, ReadResponse, SharedTransport, TransportError,
    WriteResponse,
};

use crate::codec;
use crate::config::{ConnectionConfig, ConnectionKind};
use crate::register::{RegisterKind, RegisterStore};

/// Build the transport described by the connection config
///
/// TCP clients connect lazily on the first request. The simulator is seeded
/// with one plausible value per configured register.
pub fn from_config(config: &ConnectionConfig, store: &RegisterStore) -> Box<dyn ModbusTransport> {
    match config.kind {
        ConnectionKind::Tcp => Box::new(ModbusTcpTransport::new(
            config.host.clone(),
            config.port,
            config.timeout(),
        )),
        ConnectionKind::Simulator => Box::new(seeded_simulator(store)),
    }
}

/// In-memory device holding a value for every register in `store`
pub fn seeded_simulator(store: &RegisterStore) -> MockTransport {
    let mock = MockTransport::new();
    for (idx, spec) in store.iter().enumerate() {
        let (dev, addr) = (spec.device_id(), spec.address());
        let seed = 10.0 * (idx + 1) as f32;
        match (spec.kind(), spec.word_count()) {
            (RegisterKind::Coil, _) => mock.set_coil(dev, addr, true),
            (RegisterKind::DiscreteInput, _) => mock.set_discrete(dev, addr, true),
            (RegisterKind::InputFloat32 | RegisterKind::InputInt32, 1) => {
                mock.set_input(dev, addr, &[seed as u16])
            },
            (RegisterKind::InputFloat32, _) => {
                mock.set_input(dev, addr, &codec::f32_to_regs(seed, codec::WordOrder::BigEndian))
            },
            (RegisterKind::InputInt32, _) => mock.set_input(
                dev,
                addr,
                &codec::i32_to_regs(seed as i32, codec::WordOrder::BigEndian),
            ),
            (_, 1) => mock.set_holding(dev, addr, &[seed as u16]),
            (RegisterKind::HoldingFloat32, _) => mock.set_holding_f32(dev, addr, seed),
            (RegisterKind::HoldingInt32, _) => mock.set_holding_i32(dev, addr, seed as i32),
        }
    }
    mock
}
