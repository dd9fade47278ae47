//! Median smoothing over a short window of valid samples.

use std::collections::VecDeque;

/// Number of valid samples kept for the median.
const WINDOW: usize = 3;

/// Fixed-capacity history of recent valid readings. Single-sample glitches
/// (a hand passing through the beam, one noisy return) cannot move the
/// median, so the published value stays steady.
#[derive(Debug)]
pub struct MedianFilter {
    window: VecDeque<u16>,
}

impl MedianFilter {
    pub fn new() -> Self {
        MedianFilter {
            window: VecDeque::with_capacity(WINDOW),
        }
    }

    /// Push one valid millimeter sample and return the integer median of the
    /// current window; an even-sized window (only while the history is still
    /// filling) averages the middle pair. Invalid ticks must not be pushed;
    /// the caller clears the published value instead.
    pub fn push(&mut self, mm: u16) -> u16 {
        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(mm);

        let mut sorted: Vec<u16> = self.window.iter().copied().collect();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            ((sorted[mid - 1] as u32 + sorted[mid] as u32) / 2) as u16
        } else {
            sorted[mid]
        }
    }
}

impl Default for MedianFilter {
    fn default() -> Self {
        Self::new()
    }
}
