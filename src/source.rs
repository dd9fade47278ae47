//! Range sample sources and the backend variants behind them.
//!
//! Every chip is reduced to the same capability: acquire one native reading,
//! convert it to millimeters, and know its own "no target" sentinel set. The
//! sampling loop only ever talks to [`RangeSource`], so smoothing and
//! publication behave identically no matter which chip answered the probe.

use std::thread;
use std::time::{Duration, Instant};

use linux_embedded_hal::I2cdev;
use vl53l1x_uld::{IOVoltage, VL53L1X};

use crate::error::{Error, Result};
use crate::vl6180x::{self, Vl6180x};

/// One acquisition per tick, plus the per-backend normalization rules.
pub trait RangeSource: Send {
    /// Backend name for diagnostics and logs.
    fn name(&self) -> &'static str;

    /// Inter-tick cadence of the sampling loop for this backend.
    fn tick_interval(&self) -> Duration;

    /// Acquire one raw reading in the chip's native unit.
    fn acquire_native(&mut self) -> Result<u16>;

    /// Native unit to millimeters.
    fn to_millimeters(&self, native: u16) -> u16;

    /// Whether a native value is a reserved "no target" code.
    fn is_no_target(&self, native: u16) -> bool;

    /// Acquire one normalized millimeter reading, mapping sentinel codes to
    /// [`Error::InvalidReading`].
    fn acquire_mm(&mut self) -> Result<u16> {
        let native = self.acquire_native()?;
        if self.is_no_target(native) {
            return Err(Error::InvalidReading(native));
        }
        Ok(self.to_millimeters(native))
    }
}

/// The backend selected by the probe, owning its driver handle. Selection is
/// immutable for the life of the reader.
pub enum SensorBackend {
    /// VL53L1X, up to ~4 m.
    HighRes(Vl53l1xSource),
    /// VL53L0X, up to ~2 m.
    MidRange(Vl53l0xSource),
    /// VL6180X at its factory address, up to ~200 mm.
    LowRange(Vl6180x<I2cdev>),
    /// Raw register protocol at the configured fallback address, selected
    /// purely by a model-id probe.
    RawFallback(Vl6180x<I2cdev>),
}

impl RangeSource for SensorBackend {
    fn name(&self) -> &'static str {
        match self {
            SensorBackend::HighRes(_) => "vl53l1x",
            SensorBackend::MidRange(_) => "vl53l0x",
            SensorBackend::LowRange(_) => "vl6180x",
            SensorBackend::RawFallback(_) => "vl6180x-raw",
        }
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(match self {
            SensorBackend::HighRes(_) => 100,
            SensorBackend::MidRange(_) => 150,
            SensorBackend::LowRange(_) | SensorBackend::RawFallback(_) => 200,
        })
    }

    fn acquire_native(&mut self) -> Result<u16> {
        match self {
            SensorBackend::HighRes(s) => s.acquire(),
            SensorBackend::MidRange(s) => s.acquire(),
            SensorBackend::LowRange(d) | SensorBackend::RawFallback(d) => {
                single_shot_with_retry(d).map(u16::from)
            }
        }
    }

    // Canonical conversion table. Every supported chip reports millimeters
    // natively; a centimeter-native backend would scale here and nowhere else.
    fn to_millimeters(&self, native: u16) -> u16 {
        match self {
            SensorBackend::HighRes(_) => native,
            SensorBackend::MidRange(_) => native,
            SensorBackend::LowRange(_) | SensorBackend::RawFallback(_) => native,
        }
    }

    fn is_no_target(&self, native: u16) -> bool {
        match self {
            SensorBackend::HighRes(_) => native == 0,
            // The VL53L0X reports 8190/8191 when nothing is in range.
            SensorBackend::MidRange(_) => native == 0 || native >= 8190,
            // 8-bit range register: 0x00 and 0xFF are reserved codes.
            SensorBackend::LowRange(_) | SensorBackend::RawFallback(_) => {
                native == 0x00 || native == 0xFF
            }
        }
    }
}

/// One single-shot measurement with the single permitted longer-budget retry.
fn single_shot_with_retry(driver: &mut Vl6180x<I2cdev>) -> Result<u8> {
    driver.ensure_tuned()?;
    match driver.single_shot_range(vl6180x::DEFAULT_TIMEOUT_MS) {
        Err(Error::Timeout { .. }) => driver.single_shot_range(vl6180x::RETRY_TIMEOUT_MS),
        result => result,
    }
}

fn open_bus(bus: u8, backend: &'static str) -> Result<I2cdev> {
    I2cdev::new(format!("/dev/i2c-{bus}")).map_err(|e| Error::Probe {
        backend,
        reason: format!("failed to open I2C bus: {e}"),
    })
}

/// VL53L1X in continuous ranging mode; each tick waits for data-ready, reads
/// the distance and status, and clears the interrupt.
pub struct Vl53l1xSource {
    sensor: VL53L1X<I2cdev>,
}

impl Vl53l1xSource {
    const NAME: &'static str = "vl53l1x";
    const ADDRESS: u8 = 0x29;
    const DATA_READY_BUDGET_MS: u64 = 150;

    pub fn open(bus: u8) -> Result<Self> {
        let probe_err = |reason: String| Error::Probe {
            backend: Self::NAME,
            reason,
        };
        let i2c = open_bus(bus, Self::NAME)?;
        let mut sensor = VL53L1X::new(i2c, Self::ADDRESS);
        sensor
            .init(IOVoltage::Volt2_8)
            .map_err(|e| probe_err(format!("init failed: {e:?}")))?;
        sensor
            .set_timing_budget_ms(100)
            .map_err(|e| probe_err(format!("timing budget rejected: {e:?}")))?;
        sensor
            .set_inter_measurement_period_ms(100)
            .map_err(|e| probe_err(format!("measurement period rejected: {e:?}")))?;
        sensor
            .start_ranging()
            .map_err(|e| probe_err(format!("start ranging failed: {e:?}")))?;
        Ok(Vl53l1xSource { sensor })
    }

    fn acquire(&mut self) -> Result<u16> {
        let deadline = Instant::now() + Duration::from_millis(Self::DATA_READY_BUDGET_MS);
        loop {
            let ready = self
                .sensor
                .is_data_ready()
                .map_err(|e| Error::Transaction(format!("{e:?}")))?;
            if ready {
                break;
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    budget_ms: Self::DATA_READY_BUDGET_MS,
                });
            }
            thread::sleep(Duration::from_millis(4));
        }

        let distance = self
            .sensor
            .get_distance()
            .map_err(|e| Error::Transaction(format!("{e:?}")))?;
        let status = self
            .sensor
            .get_range_status()
            .map_err(|e| Error::Transaction(format!("{e:?}")))? as u8;
        let _ = self.sensor.clear_interrupt();

        if status != 0 {
            return Err(Error::InvalidReading(status as u16));
        }
        Ok(distance)
    }
}

impl Drop for Vl53l1xSource {
    fn drop(&mut self) {
        let _ = self.sensor.stop_ranging();
    }
}

/// VL53L0X in single-shot mode; the driver crate blocks for one measurement.
pub struct Vl53l0xSource {
    sensor: vl53l0x::VL53L0x<I2cdev>,
}

impl Vl53l0xSource {
    const NAME: &'static str = "vl53l0x";

    pub fn open(bus: u8) -> Result<Self> {
        let i2c = open_bus(bus, Self::NAME)?;
        let sensor = vl53l0x::VL53L0x::new(i2c).map_err(|e| Error::Probe {
            backend: Self::NAME,
            reason: format!("init failed: {e:?}"),
        })?;
        Ok(Vl53l0xSource { sensor })
    }

    fn acquire(&mut self) -> Result<u16> {
        self.sensor
            .read_range_single_millimeters_blocking()
            .map_err(|e| Error::Transaction(format!("{e:?}")))
    }
}

/// Open and verify a VL6180X-family chip. The low-range candidate is tuned
/// eagerly so probe failures surface during selection; the raw fallback is
/// selected on the model-id check alone and tunes on first acquisition.
pub fn open_vl6180x(bus: u8, address: u8, eager_tune: bool) -> Result<Vl6180x<I2cdev>> {
    let backend = if eager_tune { "vl6180x" } else { "vl6180x-raw" };
    let i2c = open_bus(bus, backend)?;
    let mut driver = Vl6180x::new(i2c, address, backend);
    driver.probe()?;
    if eager_tune {
        driver.ensure_tuned()?;
    }
    Ok(driver)
}
