use std::time::{Duration, Instant};

/// Fixed-period wall-clock timer polled from the event loop.
///
/// Polling reports how many whole periods elapsed since the last poll, so a
/// stalled loop catches up instead of silently dropping ticks.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period: Duration,
    next_due: Option<Instant>,
}

impl IntervalTimer {
    pub fn new(period: Duration, now: Instant) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self {
            period,
            next_due: Some(now + period),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn is_cancelled(&self) -> bool {
        self.next_due.is_none()
    }

    pub fn poll(&mut self, now: Instant) -> u32 {
        let Some(due) = self.next_due else {
            return 0;
        };
        if now < due {
            return 0;
        }
        let behind = now.duration_since(due).as_nanos() / self.period.as_nanos();
        let fired = u32::try_from(behind).unwrap_or(u32::MAX - 1) + 1;
        self.next_due = Some(due + self.period * fired);
        fired
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_elapsed_period() {
        let start = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_secs(1), start);
        assert_eq!(timer.poll(start + Duration::from_millis(999)), 0);
        assert_eq!(timer.poll(start + Duration::from_millis(1000)), 1);
        assert_eq!(timer.poll(start + Duration::from_millis(1500)), 0);
        assert_eq!(
            timer.next_due(),
            Some(start + Duration::from_secs(2))
        );
    }

    #[test]
    fn catches_up_after_stall() {
        let start = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_secs(1), start);
        assert_eq!(timer.poll(start + Duration::from_millis(3500)), 3);
        assert_eq!(timer.next_due(), Some(start + Duration::from_secs(4)));
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let start = Instant::now();
        let mut timer = IntervalTimer::new(Duration::from_secs(1), start);
        timer.cancel();
        assert!(timer.is_cancelled());
        assert_eq!(timer.poll(start + Duration::from_secs(10)), 0);
        assert_eq!(timer.next_due(), None);
    }
}
