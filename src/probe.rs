//! Backend auto-selection.
//!
//! Candidates are tried once each, in fixed priority order (highest
//! measurement fidelity first, raw register protocol last). Every failure is
//! non-fatal and logged; the first successful initializer wins.

use crate::error::Result;
use crate::source::{self, SensorBackend, Vl53l0xSource, Vl53l1xSource};
use crate::vl6180x;

/// A named backend initializer. The closure is consumed by the attempt, so a
/// candidate can never be retried within one probe pass.
pub struct Candidate<S> {
    pub name: &'static str,
    pub init: Box<dyn FnOnce() -> Result<S>>,
}

/// Try each candidate in order and return the first that initializes,
/// together with the candidate name that won (the name diagnostics report).
pub fn select<S>(candidates: Vec<Candidate<S>>) -> Option<(&'static str, S)> {
    for candidate in candidates {
        match (candidate.init)() {
            Ok(source) => {
                log::info!("selected ranging backend {}", candidate.name);
                return Some((candidate.name, source));
            }
            Err(e) => log::warn!("ranging backend {} unavailable: {e}", candidate.name),
        }
    }
    log::warn!("no ranging backend detected");
    None
}

/// The fixed priority list: VL53L1X, then VL53L0X, then a tuned VL6180X at
/// the factory address, then a bare model-id probe at `fallback_address`.
pub fn default_candidates(bus: u8, fallback_address: u8) -> Vec<Candidate<SensorBackend>> {
    vec![
        Candidate {
            name: "vl53l1x",
            init: Box::new(move || Vl53l1xSource::open(bus).map(SensorBackend::HighRes)),
        },
        Candidate {
            name: "vl53l0x",
            init: Box::new(move || Vl53l0xSource::open(bus).map(SensorBackend::MidRange)),
        },
        Candidate {
            name: "vl6180x",
            init: Box::new(move || {
                source::open_vl6180x(bus, vl6180x::DEFAULT_ADDRESS, true).map(SensorBackend::LowRange)
            }),
        },
        Candidate {
            name: "vl6180x-raw",
            init: Box::new(move || {
                source::open_vl6180x(bus, fallback_address, false).map(SensorBackend::RawFallback)
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;
    use std::rc::Rc;

    fn failing(name: &'static str) -> Candidate<&'static str> {
        Candidate {
            name,
            init: Box::new(move || {
                Err(Error::Probe {
                    backend: name,
                    reason: "not present".into(),
                })
            }),
        }
    }

    fn succeeding(name: &'static str) -> Candidate<&'static str> {
        Candidate {
            name,
            init: Box::new(move || Ok(name)),
        }
    }

    #[test]
    fn first_success_wins_in_priority_order() {
        let selected = select(vec![failing("high"), succeeding("mid"), succeeding("low")]);
        assert_eq!(selected, Some(("mid", "mid")));
    }

    #[test]
    fn reported_name_is_the_candidate_name_not_the_source_name() {
        // The winning initializer may hand back a source whose own name
        // differs (e.g. the raw fallback wraps the same chip driver as the
        // low-range candidate); diagnostics must use the candidate label.
        let candidate = Candidate {
            name: "vl6180x-raw",
            init: Box::new(|| Ok("vl6180x")),
        };
        let selected = select(vec![candidate]);
        assert_eq!(selected, Some(("vl6180x-raw", "vl6180x")));
    }

    #[test]
    fn later_candidates_are_never_touched_after_a_success() {
        let touched = Rc::new(Cell::new(false));
        let flag = touched.clone();
        let tail = Candidate {
            name: "low",
            init: Box::new(move || {
                flag.set(true);
                Ok("low")
            }),
        };
        let selected = select(vec![succeeding("high"), tail]);
        assert_eq!(selected.map(|(name, _)| name), Some("high"));
        assert!(!touched.get());
    }

    #[test]
    fn all_failures_yield_none() {
        let selected = select(vec![failing("high"), failing("mid"), failing("low")]);
        assert!(selected.is_none());
    }

    #[test]
    fn selection_is_deterministic() {
        for _ in 0..10 {
            let selected = select(vec![failing("high"), failing("mid"), succeeding("raw")]);
            assert_eq!(selected.map(|(name, _)| name), Some("raw"));
        }
    }

    #[test]
    fn default_candidate_order_is_fixed() {
        let names: Vec<&str> = default_candidates(1, 0x52)
            .iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["vl53l1x", "vl53l0x", "vl6180x", "vl6180x-raw"]);
    }
}
