//! GSS CozIR-A CO2 sensor
//!
//! The sensor speaks a line-based ASCII protocol: a command letter, an
//! optional integer argument and CR LF. It answers by echoing the letter
//! followed by zero or more space separated integers. The link is a software
//! serial port that only receives while listening, so every exchange is
//! bracketed by `listen`/`ignore`.
//!
//! Bit errors on the software port are expected now and then. A corrupted
//! answer fails to parse and the read reports no value; the caller's polling
//! cadence takes care of retrying.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use heapless::{String, Vec};
use log::{debug, error, info, warn};

use crate::config::Co2Config;
use crate::error::SensorError;

const SENSOR: &str = "CozIR";

/// Echo must arrive within this many polls. Spaces count as a poll; an
/// empty poll waits 1 ms.
const ECHO_TIMEOUT_MS: u32 = 15;
/// The answer is complete once the port stays quiet this long.
const QUIET_GAP_MS: u32 = 2;
/// The sensor ignores commands that follow another within ~10 ms.
const COMMAND_SETTLE_MS: u32 = 12;

/// Holds the first value of an answer. Longer answers are truncated.
const ANSWER_CAPACITY: usize = 11;

const CMD_OPERATING_MODE: u8 = b'K';
const CMD_DIGITAL_FILTER: u8 = b'A';
const CMD_CO2: u8 = b'Z';
const CMD_CALIBRATE_KNOWN_GAS: u8 = b'X';
const CMD_INFO: u8 = b'a';

const MODE_POLLING: u32 = 2;

/// Accepted range for known-gas calibration, in ppm.
pub const CALIBRATION_RANGE: core::ops::RangeInclusive<u32> = 1..=10_000;

/// Software serial port control on top of the byte stream.
pub trait SoftSerial: Read + Write + ReadReady {
    fn begin(&mut self, baud: u32);

    /// Start receiving. Only one software port can listen at a time.
    fn listen(&mut self);

    /// Stop receiving and release the pin interrupt.
    fn ignore(&mut self);
}

/// Parse the first integer of an answer, with the echoed letter already
/// removed.
///
/// Leading spaces are skipped, then only digits are allowed up to a space,
/// CR, LF or the end of the buffer. Anything else is line corruption.
pub fn parse_value(answer: &[u8]) -> Result<u32, SensorError> {
    let malformed = |details: &'static str| SensorError::Protocol {
        sensor: SENSOR,
        operation: "parse value",
        details,
    };

    if answer.len() < 2 {
        return Err(malformed("answer too short"));
    }
    let token = answer.iter().skip_while(|&&b| b == b' ');

    let mut value: u32 = 0;
    let mut digits = 0;
    for &b in token {
        match b {
            b'0'..=b'9' => {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(u32::from(b - b'0')))
                    .ok_or(malformed("value overflows"))?;
                digits += 1;
            }
            b' ' | b'\r' | b'\n' => break,
            _ => return Err(malformed("non-digit in token")),
        }
    }
    if digits == 0 {
        return Err(malformed("no digits"));
    }
    Ok(value)
}

pub struct CozIr<S, D> {
    serial: S,
    delay: D,
    config: Co2Config,
}

impl<S, D> CozIr<S, D>
where
    S: SoftSerial,
    D: DelayNs,
{
    pub fn new(serial: S, delay: D, config: Co2Config) -> Self {
        Self {
            serial,
            delay,
            config,
        }
    }

    /// Put the sensor in polling mode and set its averaging filter.
    ///
    /// Both commands are always sent; the first failure is returned.
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.serial.begin(self.config.baud_rate);
        let filter_depth = u32::from(self.config.filter_depth);
        let (mode, filter) = self.listening(|this| {
            let mode = this.send_command(CMD_OPERATING_MODE, Some(MODE_POLLING));
            if let Err(e) = &mode {
                warn!("{}", e);
            }
            this.delay.delay_ms(COMMAND_SETTLE_MS);
            let filter = this.send_command(CMD_DIGITAL_FILTER, Some(filter_depth));
            if let Err(e) = &filter {
                warn!("{}", e);
            }
            (mode, filter)
        });
        mode.and(filter)?;
        info!(
            "CozIR: polling mode, {}-sample filter at {} baud",
            filter_depth, self.config.baud_rate
        );
        Ok(())
    }

    /// Issue the harmless info command and check for the echo.
    pub fn probe(&mut self) -> bool {
        self.listening(|this| this.send_command(CMD_INFO, None)).is_ok()
    }

    /// CO2 concentration in ppm.
    pub fn read(&mut self) -> Option<u32> {
        self.query(CMD_CO2, None)
    }

    /// Tell the sensor the current concentration is `ppm`.
    ///
    /// Values outside [`CALIBRATION_RANGE`] are dropped.
    pub fn calibrate(&mut self, ppm: u32) -> bool {
        if !CALIBRATION_RANGE.contains(&ppm) {
            warn!("CozIR: ignoring calibration to {} ppm", ppm);
            return false;
        }
        match self.listening(|this| this.send_command(CMD_CALIBRATE_KNOWN_GAS, Some(ppm))) {
            Ok(()) => {
                info!("CozIR: calibrated to {} ppm", ppm);
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Send `command` and return the first integer of the answer.
    pub fn query(&mut self, command: u8, value: Option<u32>) -> Option<u32> {
        let result = self.listening(|this| {
            this.send_command(command, value)?;
            let answer = this.fetch_answer()?;
            parse_value(&answer)
        });
        match result {
            Ok(value) => {
                debug!("CozIR: {} -> {}", command as char, value);
                Some(value)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn listening<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.serial.listen();
        let result = f(self);
        self.serial.ignore();
        result
    }

    fn read_byte(&mut self) -> Result<Option<u8>, SensorError> {
        let ready = self.serial.read_ready().map_err(|_| Self::bus("poll"))?;
        if !ready {
            return Ok(None);
        }
        let mut byte = [0u8];
        match self.serial.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(_) => Err(Self::bus("read")),
        }
    }

    fn discard_input(&mut self) -> Result<(), SensorError> {
        while self.read_byte()?.is_some() {}
        Ok(())
    }

    /// Send `<letter>[ <value>]\r\n` and wait for the echoed letter.
    ///
    /// Whatever follows the echo stays in the receive buffer.
    fn send_command(&mut self, command: u8, value: Option<u32>) -> Result<(), SensorError> {
        self.discard_input()?;

        let mut line: String<16> = String::new();
        let formatted = match value {
            Some(v) => write!(line, "{} {}\r\n", command as char, v.min(u32::from(u16::MAX))),
            None => write!(line, "{}\r\n", command as char),
        };
        formatted.map_err(|_| Self::bus("format command"))?;
        self.serial
            .write_all(line.as_bytes())
            .map_err(|_| Self::bus("write command"))?;

        let mut polls = 0;
        while polls < ECHO_TIMEOUT_MS {
            match self.read_byte()? {
                Some(b' ') => polls += 1,
                Some(echo) if echo == command => return Ok(()),
                Some(_) => {
                    return Err(SensorError::Protocol {
                        sensor: SENSOR,
                        operation: "command echo",
                        details: "echo does not match command",
                    });
                }
                None => {
                    self.delay.delay_ms(1);
                    polls += 1;
                }
            }
        }
        Err(SensorError::Timeout {
            sensor: SENSOR,
            operation: "command echo",
        })
    }

    /// Drain the rest of an answer until the port has been quiet for
    /// [`QUIET_GAP_MS`].
    fn fetch_answer(&mut self) -> Result<Vec<u8, ANSWER_CAPACITY>, SensorError> {
        let mut answer = Vec::new();
        let mut dropped = 0usize;
        self.delay.delay_ms(QUIET_GAP_MS);
        while self.serial.read_ready().map_err(|_| Self::bus("poll"))? {
            while let Some(byte) = self.read_byte()? {
                if answer.push(byte).is_err() {
                    dropped += 1;
                }
            }
            self.delay.delay_ms(QUIET_GAP_MS);
        }
        if dropped > 0 {
            // Only the first field is guaranteed to fit.
            warn!("CozIR: answer truncated, {} bytes dropped", dropped);
        }
        Ok(answer)
    }

    fn bus(operation: &'static str) -> SensorError {
        SensorError::Bus {
            sensor: SENSOR,
            operation,
        }
    }
}
