use std::thread;
use std::time::Duration;

use log::debug;
use rand::Rng;

/// Something the runner waits on after every written result.
pub trait Pacing {
    fn wait(&self);
}

/// Pause between submissions so the shared service is not hammered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    delay: Duration,
    jitter: Duration,
}

impl Throttle {
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        Throttle { delay, jitter }
    }

    /// No pause at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn next_pause(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let mut rng = rand::thread_rng();
        let extra_ms = rng.gen_range(0..=jitter_ms);
        self.delay.saturating_add(Duration::from_millis(extra_ms))
    }
}

impl Pacing for Throttle {
    fn wait(&self) {
        let pause = self.next_pause();
        if pause.is_zero() {
            return;
        }
        debug!("Waiting for {:.1} seconds before the next submission", pause.as_secs_f64());
        thread::sleep(pause);
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::ZERO)
    }
}
