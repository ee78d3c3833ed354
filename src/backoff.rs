use std::time::{Duration, Instant};

/// When the driver may next try to reach the broker. The wait doubles after
/// every attempt up to `ceiling` and drops back to `floor` once connected.
#[derive(Debug)]
pub struct ReconnectSchedule {
    floor: Duration,
    ceiling: Duration,
    delay: Duration,
    not_before: Instant,
}

impl ReconnectSchedule {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self::starting_at(floor, ceiling, Instant::now())
    }

    /// First attempt is due at `now`. A zero floor is raised to 1 ms and a
    /// ceiling below the floor is raised to the floor.
    pub fn starting_at(floor: Duration, ceiling: Duration, now: Instant) -> Self {
        let floor = floor.max(Duration::from_millis(1));
        Self {
            floor,
            ceiling: ceiling.max(floor),
            delay: floor,
            not_before: now,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.not_before
    }

    pub fn attempted(&mut self, now: Instant) {
        self.not_before = now + self.delay;
        self.delay = self.delay.saturating_mul(2).min(self.ceiling);
    }

    pub fn connected(&mut self, now: Instant) {
        self.delay = self.floor;
        self.not_before = now;
    }

    /// Wait that the next `attempted` call will impose.
    pub fn next_delay(&self) -> Duration {
        self.delay
    }
}
