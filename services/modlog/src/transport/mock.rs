//! In-memory Modbus device
//!
//! Backs the `simulator` connection kind and the test suite. Clones share the
//! same device memory, so a test can keep one handle while a poll strategy
//! owns another.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::traits::{ModbusTransport, ReadResponse, TransportError, WriteResponse};
use crate::codec::words::{f32_to_regs, i32_to_regs, WordOrder};

/// Configuration for the mock transport
#[derive(Debug, Clone)]
pub struct MockTransportConfig {
    /// Simulated latency per call
    pub latency: Duration,
    /// Unset addresses answer with exception 0x02 instead of zero
    pub strict: bool,
    /// Whether `connect` succeeds
    pub connect_success: bool,
}

impl Default for MockTransportConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            strict: false,
            connect_success: true,
        }
    }
}

/// A write the mock has accepted
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedWrite {
    Registers {
        device_id: u8,
        address: u16,
        words: Vec<u16>,
    },
    Coil {
        device_id: u8,
        address: u16,
        value: bool,
    },
}

#[derive(Debug, Default)]
struct DeviceMemory {
    holding: HashMap<u16, u16>,
    input: HashMap<u16, u16>,
    coils: HashMap<u16, bool>,
    discrete: HashMap<u16, bool>,
}

#[derive(Debug, Default)]
struct MockState {
    devices: HashMap<u8, DeviceMemory>,
    failing: HashSet<u16>,
    exceptions: HashMap<u16, u8>,
    offline: bool,
    connected: bool,
    calls: usize,
    writes: Vec<RecordedWrite>,
}

impl MockState {
    fn device(&mut self, device_id: u8) -> &mut DeviceMemory {
        self.devices.entry(device_id).or_default()
    }

    /// Injected failure covering any address in the request
    fn check_injected(&self, address: u16, count: u16) -> Result<Option<u8>, TransportError> {
        let end = address.saturating_add(count.max(1));
        for addr in address..end {
            if self.failing.contains(&addr) {
                return Err(TransportError::Io(format!("injected failure at address {}", addr)));
            }
            if let Some(code) = self.exceptions.get(&addr) {
                return Ok(Some(*code));
            }
        }
        Ok(None)
    }
}

#[derive(Clone, Copy)]
enum Table {
    Holding,
    Input,
    Coils,
    Discrete,
}

/// Mock transport implementation
#[derive(Debug, Clone)]
pub struct MockTransport {
    config: MockTransportConfig,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Connected mock with default configuration
    pub fn new() -> Self {
        Self::with_config(MockTransportConfig::default())
    }

    pub fn with_config(config: MockTransportConfig) -> Self {
        let state = MockState {
            connected: config.connect_success,
            ..MockState::default()
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    // ========================================================================
    // Device memory setup
    // ========================================================================

    pub fn set_holding(&self, device_id: u8, address: u16, words: &[u16]) {
        let mut state = self.state.lock();
        let device = state.device(device_id);
        for (offset, word) in words.iter().enumerate() {
            device.holding.insert(address.wrapping_add(offset as u16), *word);
        }
    }

    pub fn set_input(&self, device_id: u8, address: u16, words: &[u16]) {
        let mut state = self.state.lock();
        let device = state.device(device_id);
        for (offset, word) in words.iter().enumerate() {
            device.input.insert(address.wrapping_add(offset as u16), *word);
        }
    }

    pub fn set_holding_f32(&self, device_id: u8, address: u16, value: f32) {
        self.set_holding(device_id, address, &f32_to_regs(value, WordOrder::BigEndian));
    }

    pub fn set_holding_i32(&self, device_id: u8, address: u16, value: i32) {
        self.set_holding(device_id, address, &i32_to_regs(value, WordOrder::BigEndian));
    }

    pub fn set_coil(&self, device_id: u8, address: u16, value: bool) {
        self.state.lock().device(device_id).coils.insert(address, value);
    }

    pub fn set_discrete(&self, device_id: u8, address: u16, value: bool) {
        self.state.lock().device(device_id).discrete.insert(address, value);
    }

    /// Current holding words (unset addresses read as 0)
    pub fn holding(&self, device_id: u8, address: u16, count: u16) -> Vec<u16> {
        let mut state = self.state.lock();
        let device = state.device(device_id);
        (0..count)
            .map(|i| device.holding.get(&address.wrapping_add(i)).copied().unwrap_or(0))
            .collect()
    }

    pub fn coil(&self, device_id: u8, address: u16) -> Option<bool> {
        self.state.lock().device(device_id).coils.get(&address).copied()
    }

    // ========================================================================
    // Failure injection
    // ========================================================================

    /// Requests touching `address` fail at the transport level
    pub fn fail_address(&self, address: u16) {
        self.state.lock().failing.insert(address);
    }

    /// Requests touching `address` answer with a Modbus exception
    pub fn exception_at(&self, address: u16, code: u8) {
        self.state.lock().exceptions.insert(address, code);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.exceptions.clear();
    }

    /// Simulate an unreachable device: every call fails with `NotConnected`
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Number of read/write calls issued
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().writes.clone()
    }

    // ========================================================================
    // Request handling
    // ========================================================================

    fn begin_call(&self) -> Result<(), TransportError> {
        if !self.config.latency.is_zero() {
            std::thread::sleep(self.config.latency);
        }
        let mut state = self.state.lock();
        state.calls += 1;
        if state.offline || !state.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(())
    }

    fn read(
        &self,
        table: Table,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.begin_call()?;
        let mut state = self.state.lock();
        if let Some(code) = state.check_injected(address, count)? {
            return Ok(ReadResponse::Exception(code));
        }

        let strict = self.config.strict;
        let device = state.device(device_id);
        let addresses = (0..count).map(|i| address.wrapping_add(i));

        let response = match table {
            Table::Holding | Table::Input => {
                let map = if matches!(table, Table::Holding) {
                    &device.holding
                } else {
                    &device.input
                };
                let words: Option<Vec<u16>> = addresses
                    .map(|a| map.get(&a).copied().or(if strict { None } else { Some(0) }))
                    .collect();
                words.map(ReadResponse::Registers)
            },
            Table::Coils | Table::Discrete => {
                let map = if matches!(table, Table::Coils) {
                    &device.coils
                } else {
                    &device.discrete
                };
                let bits: Option<Vec<bool>> = addresses
                    .map(|a| map.get(&a).copied().or(if strict { None } else { Some(false) }))
                    .collect();
                bits.map(ReadResponse::Bits)
            },
        };

        debug!("Mock read dev={} addr={} count={}", device_id, address, count);
        Ok(response.unwrap_or(ReadResponse::Exception(0x02)))
    }
}

impl ModbusTransport for MockTransport {
    fn read_holding(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.read(Table::Holding, address, count, device_id)
    }

    fn read_input(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.read(Table::Input, address, count, device_id)
    }

    fn read_coils(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.read(Table::Coils, address, count, device_id)
    }

    fn read_discrete_inputs(
        &mut self,
        address: u16,
        count: u16,
        device_id: u8,
    ) -> Result<ReadResponse, TransportError> {
        self.read(Table::Discrete, address, count, device_id)
    }

    fn write_registers(
        &mut self,
        address: u16,
        words: &[u16],
        device_id: u8,
    ) -> Result<WriteResponse, TransportError> {
        self.begin_call()?;
        let mut state = self.state.lock();
        if let Some(code) = state.check_injected(address, words.len() as u16)? {
            return Ok(WriteResponse::Exception(code));
        }

        let device = state.device(device_id);
        for (offset, word) in words.iter().enumerate() {
            device.holding.insert(address.wrapping_add(offset as u16), *word);
        }
        state.writes.push(RecordedWrite::Registers {
            device_id,
            address,
            words: words.to_vec(),
        });
        Ok(WriteResponse::Ack)
    }

    fn write_coil(
        &mut self,
        address: u16,
        value: bool,
        device_id: u8,
    ) -> Result<WriteResponse, TransportError> {
        self.begin_call()?;
        let mut state = self.state.lock();
        if let Some(code) = state.check_injected(address, 1)? {
            return Ok(WriteResponse::Exception(code));
        }

        state.device(device_id).coils.insert(address, value);
        state.writes.push(RecordedWrite::Coil {
            device_id,
            address,
            value,
        });
        Ok(WriteResponse::Ack)
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        if !self.config.connect_success {
            return Err(TransportError::ConnectionFailed("mock connect refused".to_string()));
        }
        self.state.lock().connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.state.lock();
        state.connected && !state.offline
    }

    fn close(&mut self) {
        self.state.lock().connected = false;
    }

    fn connection_info(&self) -> String {
        "SIMULATOR".to_string()
    }
}
