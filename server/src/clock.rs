use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Source of "now" for sale windows, booking windows and sweeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        if let Ok(mut guard) = self.time.lock() {
            *guard = time;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.time.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.time.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(45));
        assert_eq!(clock.now(), start + Duration::minutes(45));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
