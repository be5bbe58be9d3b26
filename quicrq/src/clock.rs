use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Node-scoped monotonic clock, in microseconds.
///
/// Production nodes use [Clock::wall]; tests inject a caller-controlled
/// source with [Clock::from_fn] so runs are deterministic.
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> u64 + Send + Sync>);

impl Clock {
    /// Microseconds elapsed since the clock was created.
    pub fn wall() -> Self {
        let start = Instant::now();
        Self(Arc::new(move || start.elapsed().as_micros() as u64))
    }

    pub fn from_fn<F: Fn() -> u64 + Send + Sync + 'static>(f: F) -> Self {
        Self(Arc::new(f))
    }

    pub fn now(&self) -> u64 {
        (self.0)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::wall()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Clock({}us)", self.now())
    }
}
