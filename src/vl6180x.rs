//! Register-level driver for VL6180X-family ranging chips.
//!
//! This is the raw fallback protocol: 16-bit register index, 8-bit values,
//! single-shot ranging triggered per measurement and completed by polling the
//! interrupt status register. Generic over the blocking `embedded-hal` I2C
//! traits so the protocol is testable against a scripted bus.

use std::fmt::Debug;
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::blocking::i2c::{Write, WriteRead};

use crate::error::{Error, Result};

/// Factory-default bus address for the VL6180X.
pub const DEFAULT_ADDRESS: u8 = 0x29;

/// Default single-shot timing budget.
pub const DEFAULT_TIMEOUT_MS: u64 = 350;

/// Budget for the single permitted retry after a timeout.
pub const RETRY_TIMEOUT_MS: u64 = 500;

const REG_MODEL_ID: u16 = 0x0000;
const REG_INTERRUPT_CLEAR: u16 = 0x0015;
const REG_FRESH_OUT_OF_RESET: u16 = 0x0016;
const REG_SYSRANGE_START: u16 = 0x0018;
const REG_INTERRUPT_STATUS: u16 = 0x004F;
const REG_RANGE_VAL: u16 = 0x0062;

const MODEL_ID: u8 = 0xB4;
const INT_STATUS_MASK: u8 = 0x07;
const INT_RANGE_READY: u8 = 0x04;
const POLL_INTERVAL_MS: u64 = 3;

/// Vendor calibration data applied once after reset. Opaque, and
/// order-sensitive: the chip expects exactly this sequence (ST application
/// note AN4545, SR03 settings). Never reorder or skip entries.
const TUNING: &[(u16, u8)] = &[
    (0x0207, 0x01),
    (0x0208, 0x01),
    (0x0096, 0x00),
    (0x0097, 0xfd),
    (0x00e3, 0x00),
    (0x00e4, 0x04),
    (0x00e5, 0x02),
    (0x00e6, 0x01),
    (0x00e7, 0x03),
    (0x00f5, 0x02),
    (0x00d9, 0x05),
    (0x00db, 0xce),
    (0x00dc, 0x03),
    (0x00dd, 0xf8),
    (0x009f, 0x00),
    (0x00a3, 0x3c),
    (0x00b7, 0x00),
    (0x00bb, 0x3c),
    (0x00b2, 0x09),
    (0x00ca, 0x09),
    (0x0198, 0x01),
    (0x01b0, 0x17),
    (0x01ad, 0x00),
    (0x00ff, 0x05),
    (0x0100, 0x05),
    (0x0199, 0x05),
    (0x01a6, 0x1b),
    (0x01ac, 0x3e),
    (0x01a7, 0x1f),
    (0x0030, 0x00),
];

/// Raw register driver for one chip at one bus address.
pub struct Vl6180x<I2C> {
    i2c: I2C,
    address: u8,
    // Backend label reported in errors: the same driver serves both the
    // low-range candidate and the raw fallback.
    backend: &'static str,
    // Per-instance, never process-wide: two readers on two buses must not
    // share tuning state.
    tuned: bool,
}

impl<I2C, E> Vl6180x<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: Debug,
{
    pub fn new(i2c: I2C, address: u8, backend: &'static str) -> Self {
        Vl6180x {
            i2c,
            address,
            backend,
            tuned: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn write_register(&mut self, reg: u16, value: u8) -> Result<()> {
        let reg = reg.to_be_bytes();
        self.i2c
            .write(self.address, &[reg[0], reg[1], value])
            .map_err(|e| Error::Transaction(format!("{e:?}")))
    }

    fn read_register(&mut self, reg: u16) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &reg.to_be_bytes(), &mut buf)
            .map_err(|e| Error::Transaction(format!("{e:?}")))?;
        Ok(buf[0])
    }

    /// Confirm a VL6180X-family chip answers at this address.
    pub fn probe(&mut self) -> Result<()> {
        let id = self.read_register(REG_MODEL_ID)?;
        if id != MODEL_ID {
            return Err(Error::Probe {
                backend: self.backend,
                reason: format!("unexpected model id {id:#04x}"),
            });
        }
        Ok(())
    }

    /// Apply the one-time tuning sequence if the chip is fresh out of reset.
    ///
    /// A failure partway through leaves the instance untuned, so the next
    /// call restarts the whole sequence from the top.
    pub fn ensure_tuned(&mut self) -> Result<()> {
        if self.tuned {
            return Ok(());
        }
        self.probe()?;
        if self.read_register(REG_FRESH_OUT_OF_RESET)? & 0x01 != 0 {
            for &(reg, value) in TUNING {
                self.write_register(reg, value)?;
            }
            self.write_register(REG_FRESH_OUT_OF_RESET, 0x00)?;
        }
        self.tuned = true;
        Ok(())
    }

    /// Trigger one measurement and poll until completion or `timeout_ms`.
    ///
    /// Returns the raw 8-bit range register value; the caller maps sentinel
    /// codes. On timeout the range-value register is never read, so no
    /// garbage data can escape.
    pub fn single_shot_range(&mut self, timeout_ms: u64) -> Result<u8> {
        self.write_register(REG_SYSRANGE_START, 0x01)?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        // Iteration cap bounds the loop even if the clock misbehaves.
        let max_polls = timeout_ms / POLL_INTERVAL_MS + 8;
        for _ in 0..max_polls {
            let status = self.read_register(REG_INTERRUPT_STATUS)? & INT_STATUS_MASK;
            if status == INT_RANGE_READY {
                let raw = self.read_register(REG_RANGE_VAL)?;
                self.write_register(REG_INTERRUPT_CLEAR, 0x07)?;
                return Ok(raw);
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        }
        Err(Error::Timeout {
            budget_ms: timeout_ms,
        })
    }
}
