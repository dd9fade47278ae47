//! Distance sensing with interchangeable time-of-flight backends.
//!
//! A [`DistanceReader`] probes a fixed priority list of ranging chips on one
//! I2C bus (VL53L1X, VL53L0X, VL6180X, then a raw register-protocol fallback),
//! starts a background sampling thread for the first chip that answers, and
//! exposes the latest median-filtered reading in millimeters. Reads never
//! block on bus I/O; every hardware failure degrades to "no reading" plus a
//! diagnostic string rather than an error escaping to the caller.
//!
//! ```no_run
//! use range_reader::{DistanceConfig, DistanceReader};
//!
//! let reader = DistanceReader::new(&DistanceConfig::default());
//! if let Some(mm) = reader.read_mm() {
//!     println!("{} mm via {:?}", mm, reader.backend_name());
//! }
//! ```

mod config;
mod error;
mod filter;
mod probe;
mod sampler;
mod source;
mod vl6180x;

pub use config::DistanceConfig;
pub use error::{Error, Result};
pub use probe::{default_candidates, select, Candidate};
pub use source::{RangeSource, SensorBackend, Vl53l0xSource, Vl53l1xSource};
pub use vl6180x::Vl6180x;

use std::sync::Arc;

use serde::Serialize;

use crate::sampler::{SamplerHandle, Shared};

/// Diagnostic snapshot served by the debug endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ReaderState {
    pub mm: Option<u16>,
    pub cm: Option<f64>,
    pub m: Option<f64>,
    pub backend: Option<&'static str>,
    pub address: u8,
    pub enabled: bool,
    pub last_error: Option<String>,
}

/// Thread-safe, read-only facade over the distance subsystem.
///
/// Backend selection happens once at construction and is immutable; getting a
/// fresh probe means constructing a new reader. Dropping the reader stops its
/// sampling thread.
pub struct DistanceReader {
    shared: Arc<Shared>,
    backend: Option<&'static str>,
    address: u8,
    enabled: bool,
    _sampler: Option<SamplerHandle>,
}

impl DistanceReader {
    /// Probe the default candidate list and start sampling. Never fails: a
    /// disabled config or an empty probe result produce an inert reader
    /// whose `read_mm()` is always `None`.
    pub fn new(config: &DistanceConfig) -> Self {
        Self::with_candidates(config, default_candidates(config.bus, config.address))
    }

    /// Like [`new`](Self::new), but probing a caller-supplied candidate
    /// list. The list is consumed in priority order by a single probe pass.
    pub fn with_candidates<S>(config: &DistanceConfig, candidates: Vec<Candidate<S>>) -> Self
    where
        S: RangeSource + 'static,
    {
        let shared = Arc::new(Shared::default());

        if !config.enabled {
            log::info!("distance sensing disabled by config");
            return DistanceReader {
                shared,
                backend: None,
                address: config.address,
                enabled: false,
                _sampler: None,
            };
        }

        let Some((name, backend)) = select(candidates) else {
            shared.set_error(Error::NoBackend.to_string());
            return DistanceReader {
                shared,
                backend: None,
                address: config.address,
                enabled: true,
                _sampler: None,
            };
        };

        let sampler = match sampler::spawn(backend, shared.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("failed to start sampling thread: {e}");
                shared.set_error(format!("sampler start failed: {e}"));
                None
            }
        };

        DistanceReader {
            shared,
            backend: Some(name),
            address: config.address,
            enabled: true,
            _sampler: sampler,
        }
    }

    /// Latest filtered reading in millimeters, or `None` when the last tick
    /// produced no valid measurement. Non-blocking.
    pub fn read_mm(&self) -> Option<u16> {
        self.shared.snapshot().mm
    }

    /// Latest reading in centimeters.
    pub fn read_cm(&self) -> Option<f64> {
        self.read_mm().map(|mm| mm as f64 / 10.0)
    }

    /// Latest reading in meters.
    pub fn read_m(&self) -> Option<f64> {
        self.read_mm().map(|mm| mm as f64 / 1000.0)
    }

    /// Name of the selected backend, or `None` if probing found nothing.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend
    }

    /// Most recent failure description, if any tick has failed.
    pub fn last_error(&self) -> Option<String> {
        self.shared.snapshot().last_error
    }

    /// Full diagnostic snapshot.
    pub fn state(&self) -> ReaderState {
        let snap = self.shared.snapshot();
        ReaderState {
            mm: snap.mm,
            cm: snap.mm.map(|mm| mm as f64 / 10.0),
            m: snap.mm.map(|mm| mm as f64 / 1000.0),
            backend: self.backend,
            address: self.address,
            enabled: self.enabled,
            last_error: snap.last_error,
        }
    }
}
