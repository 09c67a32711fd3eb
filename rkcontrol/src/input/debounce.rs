use std::time::{Duration, Instant};

/// Accepts a new level only once it has been stable for `window`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    stable: bool,
    candidate: bool,
    since: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration, initial: bool) -> Self {
        Self {
            window,
            stable: initial,
            candidate: initial,
            since: None,
        }
    }

    pub fn state(&self) -> bool {
        self.stable
    }

    /// Feeds a sample taken at `now`. Returns the new state when a change
    /// is accepted.
    pub fn update(&mut self, raw: bool, now: Instant) -> Option<bool> {
        if raw != self.candidate || self.since.is_none() {
            self.candidate = raw;
            self.since = Some(now);
        }
        let since = self.since?;
        if self.candidate != self.stable && now.saturating_duration_since(since) >= self.window {
            self.stable = self.candidate;
            return Some(self.stable);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounce_is_ignored() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        let mut debouncer = Debouncer::new(ms(30), false);

        assert_eq!(debouncer.update(true, t0), None);
        assert_eq!(debouncer.update(false, t0 + ms(5)), None);
        assert_eq!(debouncer.update(true, t0 + ms(10)), None);
        assert_eq!(debouncer.update(true, t0 + ms(25)), None);
        assert!(!debouncer.state());

        assert_eq!(debouncer.update(true, t0 + ms(40)), Some(true));
        assert_eq!(debouncer.update(true, t0 + ms(80)), None);
        assert!(debouncer.state());
    }

    #[test]
    fn test_release_needs_the_window_too() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        let mut debouncer = Debouncer::new(ms(30), true);

        assert_eq!(debouncer.update(false, t0), None);
        assert_eq!(debouncer.update(false, t0 + ms(29)), None);
        assert_eq!(debouncer.update(false, t0 + ms(30)), Some(false));
    }
}
