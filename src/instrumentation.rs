//! timing helpers for wall clock bounds and run statistics

use std::time::Instant;

///monotonic stopwatch, started on construction
pub struct Timer {
    t_start: Instant,
}

impl Default for Timer {
    fn default() -> Timer {
        Timer {
            t_start: Instant::now(),
        }
    }
}

impl Timer {
    ///milliseconds elapsed since construction
    pub fn dur_ms(&mut self) -> f64 {
        self.t_start.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_monotonic() {
        let mut timer = Timer::default();
        let a = timer.dur_ms();
        let b = timer.dur_ms();
        assert!(a >= 0.0);
        assert!(b >= a);
    }
}
