use std::time::Duration;

pub const FLOOR_UNITS: u32 = 1;
pub const CEILING_UNITS: u32 = 30;

/// Reconnect delay generator: 1, 2, 4, 8, 16, 30, 30, ... units, no jitter.
///
/// The multiplier is kept for the life of the session; a connection that
/// reaches READY and later drops resumes from where it had climbed to.
#[derive(Debug, Clone)]
pub struct Backoff {
    unit: Duration,
    units: u32,
}

impl Backoff {
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            units: FLOOR_UNITS,
        }
    }

    pub fn current(&self) -> Duration {
        self.unit * self.units
    }

    /// Return the delay to wait now and advance to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current();
        self.units = (self.units * 2).min(CEILING_UNITS);
        delay
    }
}
