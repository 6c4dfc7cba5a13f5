use std::fmt;
use std::time::{Duration, Instant};

use super::{GpuBackend, ProbeError, WaitPolicy};

/// Device time spent on the timed draw.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Measurement {
    elapsed_ns: u64,
}

impl Measurement {
    pub fn from_nanos(elapsed_ns: u64) -> Self {
        Self { elapsed_ns }
    }

    pub fn nanos(&self) -> u64 {
        self.elapsed_ns
    }

    pub fn millis(&self) -> f64 {
        self.elapsed_ns as f64 / 1_000_000.0
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPU rendering time: {:.3} ms", self.millis())
    }
}

/// Polls `query` until its result is available or the policy's timeout expires.
///
/// Returns the time spent waiting. The CPU sleeps for `poll_interval` between
/// checks; the final sleep is shortened so the deadline is not overshot by more
/// than one check.
pub fn wait_until_available<B: GpuBackend>(
    backend: &B,
    query: &B::TimerQuery,
    policy: WaitPolicy,
) -> Result<Duration, ProbeError> {
    let start = Instant::now();
    let mut polls: u64 = 0;

    loop {
        polls += 1;
        if backend.query_available(query)? {
            let waited = start.elapsed();
            log::debug!("timer query available after {polls} poll(s), {waited:?}");
            return Ok(waited);
        }

        let waited = start.elapsed();
        if waited >= policy.timeout {
            log::error!("timer query still pending after {polls} poll(s)");
            return Err(ProbeError::Timeout {
                waited,
                timeout: policy.timeout,
            });
        }

        std::thread::sleep(policy.poll_interval.min(policy.timeout - waited));
    }
}
