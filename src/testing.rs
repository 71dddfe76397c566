//! Host-side stand-ins for the pod hardware used by the unit tests

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation};

use crate::analog::{AdcMode, AdcPeripheral, Channel};
use crate::sensors::cozir::SoftSerial;
use crate::sensors::sound::SampleTimer;
use crate::time::Clock;

/// Clock whose delays advance time instantly.
#[derive(Clone, Default)]
pub struct FakeTime {
    now_ns: Rc<Cell<u64>>,
}

impl FakeTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ns.set(self.now_ns.get() + ms * 1_000_000);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.now_ns.get() / 1_000_000
    }
}

impl Clock for FakeTime {
    fn now_ms(&self) -> u64 {
        self.elapsed_ms()
    }
}

impl DelayNs for FakeTime {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ns.set(self.now_ns.get() + u64::from(ns));
    }
}

#[derive(Debug)]
struct AdcState {
    enabled: bool,
    mode: AdcMode,
    channel_values: [u16; 8],
    busy_polls: u32,
    complete: bool,
    result: u16,
    conversion_polls: u32,
    pending: Option<(u16, u32)>,
    conversions: Vec<Channel>,
}

/// Simulated 10-bit converter.
///
/// Single conversions complete immediately with the value configured for
/// the channel, unless [`SimAdc::set_conversion_polls`] slows them down.
/// Free-running results are injected by the test.
#[derive(Clone)]
pub struct SimAdc {
    state: Rc<RefCell<AdcState>>,
}

impl SimAdc {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(AdcState {
                enabled: false,
                mode: AdcMode::SingleShot,
                channel_values: [0; 8],
                busy_polls: 0,
                complete: false,
                result: 0,
                conversion_polls: 0,
                pending: None,
                conversions: Vec::new(),
            })),
        }
    }

    pub fn set_channel_value(&self, channel: Channel, value: u16) {
        self.state.borrow_mut().channel_values[usize::from(channel)] = value;
    }

    /// Make the next `polls` busy checks report a conversion in flight.
    pub fn set_busy_polls(&self, polls: u32) {
        self.state.borrow_mut().busy_polls = polls;
    }

    /// Single conversions finish only after `polls` completion checks.
    pub fn set_conversion_polls(&self, polls: u32) {
        self.state.borrow_mut().conversion_polls = polls;
    }

    pub fn busy_polls_remaining(&self) -> u32 {
        self.state.borrow().busy_polls
    }

    /// A free-running conversion finished with `value`.
    pub fn push_free_running_result(&self, value: u16) {
        let mut state = self.state.borrow_mut();
        state.result = value;
        state.complete = true;
    }

    /// Reprogram the mode without going through the sampler.
    pub fn force_hardware_mode(&self, mode: AdcMode) {
        self.state.borrow_mut().mode = mode;
    }

    pub fn hardware_mode(&self) -> AdcMode {
        self.state.borrow().mode
    }

    pub fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    pub fn conversions(&self) -> Vec<Channel> {
        self.state.borrow().conversions.clone()
    }
}

impl AdcPeripheral for SimAdc {
    fn enable(&mut self) {
        self.state.borrow_mut().enabled = true;
    }

    fn set_mode(&mut self, mode: AdcMode) {
        self.state.borrow_mut().mode = mode;
    }

    fn mode(&self) -> AdcMode {
        self.state.borrow().mode
    }

    fn start_conversion(&mut self, channel: Channel) {
        let mut state = self.state.borrow_mut();
        let value = state.channel_values[usize::from(channel)];
        state.conversions.push(channel);
        if state.conversion_polls > 0 {
            state.pending = Some((value, state.conversion_polls));
        } else {
            state.result = value;
            state.complete = true;
        }
    }

    fn is_busy(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.busy_polls > 0 {
            state.busy_polls -= 1;
            true
        } else {
            false
        }
    }

    fn conversion_complete(&self) -> bool {
        let mut state = self.state.borrow_mut();
        match state.pending {
            Some((value, 0)) => {
                state.pending = None;
                state.result = value;
                state.complete = true;
            }
            Some((value, polls)) => state.pending = Some((value, polls - 1)),
            None => {}
        }
        state.complete
    }

    fn read_result(&mut self) -> u16 {
        let mut state = self.state.borrow_mut();
        state.complete = false;
        state.result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cEvent {
    Write(u8, Vec<u8>),
    Read(u8, usize),
}

#[derive(Default)]
struct I2cState {
    reads: HashMap<u8, VecDeque<Vec<u8>>>,
    absent: HashSet<u8>,
    log: Vec<I2cEvent>,
}

/// I2C bus with canned read responses per device address.
///
/// Reads pop the next queued response for the address; a read with nothing
/// queued or a transfer to an absent device fails with a NACK.
#[derive(Clone, Default)]
pub struct ScriptedI2c {
    state: Rc<RefCell<I2cState>>,
}

impl ScriptedI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_read(&self, address: u8, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .reads
            .entry(address)
            .or_default()
            .push_back(bytes.to_vec());
    }

    pub fn set_absent(&self, address: u8) {
        self.state.borrow_mut().absent.insert(address);
    }

    pub fn set_present(&self, address: u8) {
        self.state.borrow_mut().absent.remove(&address);
    }

    pub fn log(&self) -> Vec<I2cEvent> {
        self.state.borrow().log.clone()
    }

    pub fn writes_to(&self, address: u8) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .log
            .iter()
            .filter_map(|event| match event {
                I2cEvent::Write(a, bytes) if *a == address => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }
}

impl i2c::ErrorType for ScriptedI2c {
    type Error = ErrorKind;
}

impl i2c::I2c for ScriptedI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.absent.contains(&address) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    state.log.push(I2cEvent::Write(address, bytes.to_vec()));
                }
                Operation::Read(buffer) => {
                    state.log.push(I2cEvent::Read(address, buffer.len()));
                    let response = state
                        .reads
                        .get_mut(&address)
                        .and_then(VecDeque::pop_front)
                        .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data))?;
                    buffer.fill(0);
                    let n = response.len().min(buffer.len());
                    buffer[..n].copy_from_slice(&response[..n]);
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct SerialState {
    baud: Option<u32>,
    listening: bool,
    rx: VecDeque<u8>,
    line: Vec<u8>,
    commands: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
}

/// Software serial port answering each written line with the next scripted
/// reply, but only while listening.
#[derive(Clone, Default)]
pub struct ScriptedSerial {
    state: Rc<RefCell<SerialState>>,
}

impl ScriptedSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(&self, reply: &[u8]) {
        self.state.borrow_mut().replies.push_back(reply.to_vec());
    }

    /// Bytes waiting in the receive buffer before any command is sent.
    pub fn inject_rx(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes.iter().copied());
    }

    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.state.borrow().commands.clone()
    }

    pub fn baud(&self) -> Option<u32> {
        self.state.borrow().baud
    }

    pub fn is_listening(&self) -> bool {
        self.state.borrow().listening
    }

    pub fn pending_rx(&self) -> usize {
        self.state.borrow().rx.len()
    }
}

impl embedded_io::ErrorType for ScriptedSerial {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Read for ScriptedSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            let Some(byte) = state.rx.pop_front() else {
                break;
            };
            buf[n] = byte;
            n += 1;
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for ScriptedSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.state.borrow().rx.is_empty())
    }
}

impl embedded_io::Write for ScriptedSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        for &byte in buf {
            state.line.push(byte);
            if state.line.ends_with(b"\r\n") {
                let line = core::mem::take(&mut state.line);
                state.commands.push(line);
                if state.listening {
                    if let Some(reply) = state.replies.pop_front() {
                        state.rx.extend(reply);
                    }
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl SoftSerial for ScriptedSerial {
    fn begin(&mut self, baud: u32) {
        self.state.borrow_mut().baud = Some(baud);
    }

    fn listen(&mut self) {
        self.state.borrow_mut().listening = true;
    }

    fn ignore(&mut self) {
        self.state.borrow_mut().listening = false;
    }
}

/// Output pin remembering every level it was driven to.
#[derive(Clone, Default)]
pub struct RecordingPin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl RecordingPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(false)
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }
}

impl digital::ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}

#[derive(Default)]
struct TimerState {
    period_us: Option<u32>,
    starts: u32,
}

/// Periodic timer that only records how it was programmed.
#[derive(Clone, Default)]
pub struct FakeTimer {
    state: Rc<RefCell<TimerState>>,
}

impl FakeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period_us(&self) -> Option<u32> {
        self.state.borrow().period_us
    }

    pub fn starts(&self) -> u32 {
        self.state.borrow().starts
    }
}

impl SampleTimer for FakeTimer {
    fn start(&mut self, period_us: u32) {
        let mut state = self.state.borrow_mut();
        state.period_us = Some(period_us);
        state.starts += 1;
    }

    fn stop(&mut self) {
        self.state.borrow_mut().period_us = None;
    }
}
