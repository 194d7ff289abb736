use std::time::Duration;

/// Why a sync pass should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First observation after start-up, and we are already online.
    Startup,
    /// We were offline and now we are not.
    Reconnected,
}

/// Turns a stream of online/offline samples into sync triggers.
#[derive(Debug, Default)]
pub struct Monitor {
    last: Option<bool>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, online: bool) -> Option<Trigger> {
        let previous = self.last.replace(online);
        match (previous, online) {
            (None, true) => Some(Trigger::Startup),
            (Some(false), true) => Some(Trigger::Reconnected),
            _ => None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.last.unwrap_or(false)
    }
}

/// Capped exponential delay between retries of a pass that left drafts behind.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: None,
        }
    }

    /// Delay before the next attempt. Doubles each call up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(d) => (d * 2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_online_triggers() {
        let mut monitor = Monitor::new();
        assert_eq!(monitor.observe(true), Some(Trigger::Startup));
        assert_eq!(monitor.observe(true), None);
    }

    #[test]
    fn test_startup_offline_then_reconnect() {
        let mut monitor = Monitor::new();
        assert_eq!(monitor.observe(false), None);
        assert!(!monitor.is_online());
        assert_eq!(monitor.observe(false), None);
        assert_eq!(monitor.observe(true), Some(Trigger::Reconnected));
        assert!(monitor.is_online());
    }

    #[test]
    fn test_every_reconnect_triggers() {
        let mut monitor = Monitor::new();
        let samples = [true, false, true, true, false, false, true];
        let triggers: Vec<_> = samples.iter().filter_map(|s| monitor.observe(*s)).collect();
        assert_eq!(
            triggers,
            vec![Trigger::Startup, Trigger::Reconnected, Trigger::Reconnected]
        );
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(30));
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30, 30]);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_cap_below_initial() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
    }
}
