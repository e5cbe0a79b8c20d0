use std::time::{Duration, Instant};

/// Time source for the scheduler; the only way the acquisition loop waits.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Hours, minutes and seconds of a duration, rounded to whole seconds.
pub fn hms(duration: Duration) -> (u64, u64, u64) {
    let total = duration.as_secs_f64().round() as u64;
    (total / 3600, (total % 3600) / 60, total % 60)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hms_rounds_to_seconds() {
        assert_eq!(hms(Duration::from_secs_f64(3725.6)), (1, 2, 6));
        assert_eq!(hms(Duration::ZERO), (0, 0, 0));
    }
}
