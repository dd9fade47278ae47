//! Background sampling loop.
//!
//! One dedicated thread per reader performs all bus I/O. Each tick acquires
//! one normalized reading, runs it through the median filter, and publishes
//! the result as a whole; the foreground side only ever copies the published
//! cell. The stop channel doubles as the inter-tick sleep, so cancellation is
//! observed at every tick boundary.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use thread_priority::{ThreadBuilder, ThreadPriority};

use crate::filter::MedianFilter;
use crate::source::RangeSource;

/// The cell shared between the sampler thread and readers. Written only by
/// the sampler (and once by the facade when no backend exists); replaced
/// wholesale under the lock so readers never see a partial update.
#[derive(Default)]
pub(crate) struct Shared {
    published: Mutex<Published>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Published {
    pub mm: Option<u16>,
    pub last_error: Option<String>,
}

impl Shared {
    pub(crate) fn snapshot(&self) -> Published {
        self.published.lock().unwrap().clone()
    }

    pub(crate) fn set_error(&self, message: String) {
        let mut cell = self.published.lock().unwrap();
        cell.mm = None;
        cell.last_error = Some(message);
    }
}

/// Handle owning the sampler thread; dropping it stops the loop and joins.
pub(crate) struct SamplerHandle {
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

/// Spawn the sampling thread for `source`, publishing into `shared`.
pub(crate) fn spawn<S>(source: S, shared: Arc<Shared>) -> std::io::Result<SamplerHandle>
where
    S: RangeSource + 'static,
{
    let (stop_tx, stop_rx) = bounded(1);
    let handle = ThreadBuilder::default()
        .name("range-sampler".to_string())
        .priority(ThreadPriority::Max)
        .spawn(move |_| run(source, shared, stop_rx))?;
    Ok(SamplerHandle {
        stop_tx,
        handle: Some(handle),
    })
}

fn run<S: RangeSource>(mut source: S, shared: Arc<Shared>, stop_rx: Receiver<()>) {
    let tick = source.tick_interval();
    let mut filter = MedianFilter::new();
    let mut last_published: Option<u16> = None;

    loop {
        match source.acquire_mm() {
            Ok(mm) => {
                let filtered = filter.push(mm);
                shared.published.lock().unwrap().mm = Some(filtered);
                // Log transitions only; a steady value would flood the log.
                if last_published != Some(filtered) {
                    log::debug!("{}: distance {filtered} mm", source.name());
                    last_published = Some(filtered);
                }
            }
            Err(e) => {
                shared.set_error(e.to_string());
                if last_published.is_some() {
                    log::warn!("{}: no reading: {e}", source.name());
                    last_published = None;
                }
            }
        }

        match stop_rx.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => continue,
            // Stop requested or the handle is gone.
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::time::{Duration, Instant};

    #[derive(Clone, Copy)]
    enum Step {
        Value(u16),
        NoTarget,
        BusError,
    }

    /// Scripted source; once the script is exhausted the last step repeats.
    struct FakeSource {
        steps: Vec<Step>,
        idx: usize,
    }

    impl FakeSource {
        fn new(steps: Vec<Step>) -> Self {
            FakeSource { steps, idx: 0 }
        }
    }

    impl RangeSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn tick_interval(&self) -> Duration {
            Duration::from_millis(1)
        }

        fn acquire_native(&mut self) -> Result<u16> {
            let step = self.steps[self.idx.min(self.steps.len() - 1)];
            self.idx += 1;
            match step {
                Step::Value(v) => Ok(v),
                Step::NoTarget => Ok(0xFF),
                Step::BusError => Err(Error::Transaction("scripted failure".into())),
            }
        }

        fn to_millimeters(&self, native: u16) -> u16 {
            native
        }

        fn is_no_target(&self, native: u16) -> bool {
            native == 0xFF
        }
    }

    fn wait_for<F: Fn(&Published) -> bool>(shared: &Shared, pred: F) -> Published {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let snap = shared.snapshot();
            if pred(&snap) {
                return snap;
            }
            assert!(Instant::now() < deadline, "condition not reached: {snap:?}");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn publishes_filtered_value() {
        let _ = env_logger::builder().is_test(true).try_init();
        let shared = Arc::new(Shared::default());
        let handle = spawn(
            FakeSource::new(vec![Step::Value(120)]),
            shared.clone(),
        )
        .unwrap();
        let snap = wait_for(&shared, |s| s.mm.is_some());
        assert_eq!(snap.mm, Some(120));
        drop(handle);
    }

    #[test]
    fn converges_to_median_of_recent_samples() {
        // Window settles on {480, 500, 500} once 500 repeats.
        let shared = Arc::new(Shared::default());
        let handle = spawn(
            FakeSource::new(vec![Step::Value(10), Step::Value(480), Step::Value(500)]),
            shared.clone(),
        )
        .unwrap();
        wait_for(&shared, |s| s.mm == Some(500));
        drop(handle);
    }

    #[test]
    fn sentinel_clears_published_value() {
        let shared = Arc::new(Shared::default());
        let handle = spawn(
            FakeSource::new(vec![Step::Value(300), Step::NoTarget]),
            shared.clone(),
        )
        .unwrap();
        let snap = wait_for(&shared, |s| s.mm.is_none() && s.last_error.is_some());
        assert!(snap.last_error.unwrap().contains("no valid target"));
        drop(handle);
    }

    #[test]
    fn bus_error_publishes_none_with_message() {
        let shared = Arc::new(Shared::default());
        let handle = spawn(
            FakeSource::new(vec![Step::Value(300), Step::BusError]),
            shared.clone(),
        )
        .unwrap();
        let snap = wait_for(&shared, |s| s.mm.is_none() && s.last_error.is_some());
        assert!(snap.last_error.unwrap().contains("scripted failure"));
        drop(handle);
    }

    #[test]
    fn recovers_after_invalid_ticks() {
        let shared = Arc::new(Shared::default());
        let handle = spawn(
            FakeSource::new(vec![Step::NoTarget, Step::Value(250)]),
            shared.clone(),
        )
        .unwrap();
        let snap = wait_for(&shared, |s| s.mm.is_some());
        assert_eq!(snap.mm, Some(250));
        drop(handle);
    }

    #[test]
    fn drop_stops_the_thread_promptly() {
        let shared = Arc::new(Shared::default());
        let handle = spawn(FakeSource::new(vec![Step::Value(100)]), shared.clone()).unwrap();
        wait_for(&shared, |s| s.mm.is_some());

        let started = Instant::now();
        drop(handle);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
