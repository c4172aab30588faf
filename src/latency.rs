use std::{ops::AddAssign, time::Duration};

use hdrhistogram::{sync::Recorder, Histogram, SyncHistogram};
use quanta::Clock;

/// Latency distribution shared by several worker threads, each of which
/// records through its own [`LocalLatency`].
pub struct Latency(SyncHistogram<u64>);

pub struct LocalLatency {
    recorder: Recorder<u64>,
    clock: Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub samples: u64,
    pub mean: Duration,
    pub p99: Duration,
}

impl Default for Latency {
    fn default() -> Self {
        // 2 significant figures is always a valid precision
        Self(Histogram::new(2).expect("valid histogram precision").into())
    }
}

impl Latency {
    pub fn local(&self) -> LocalLatency {
        LocalLatency {
            recorder: self.0.recorder(),
            clock: Clock::new(),
        }
    }

    /// Collect what workers have recorded so far. Recorders that stay silent
    /// for longer than a second are not waited for.
    pub fn summary(&mut self) -> Summary {
        self.0.refresh_timeout(Duration::from_secs(1));
        Summary {
            samples: self.0.len(),
            mean: Duration::from_nanos(self.0.mean() as u64),
            p99: Duration::from_nanos(self.0.value_at_quantile(0.99)),
        }
    }
}

pub struct Measure(u64);
impl LocalLatency {
    pub fn measure(&self) -> Measure {
        Measure(self.clock.start())
    }
}

impl AddAssign<Measure> for LocalLatency {
    fn add_assign(&mut self, measure: Measure) {
        self.recorder += self.clock.delta(measure.0, self.clock.end()).as_nanos() as u64;
    }
}
