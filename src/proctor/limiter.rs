use std::time::Duration;

/// Cooldown-based emission limiter shared by the warning sources.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    last_fired_ms: Option<i64>,
    cooldown_ms: i64,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_fired_ms: None,
            cooldown_ms: cooldown.as_millis() as i64,
        }
    }

    /// Fires unless the previous emission was inside the cooldown window.
    pub fn try_fire(&mut self, now_ms: i64) -> bool {
        if let Some(last) = self.last_fired_ms {
            if now_ms - last < self.cooldown_ms {
                return false;
            }
        }
        self.last_fired_ms = Some(now_ms);
        true
    }
}

/// Persistence gate: the condition must hold continuously for `persist`
/// before the limiter is even consulted. An ok reading resets the streak;
/// the cooldown deliberately survives resets so a flapping condition cannot
/// re-warn early.
#[derive(Debug, Clone, Copy)]
pub struct StreakGate {
    since_ms: Option<i64>,
    persist_ms: i64,
    limiter: RateLimiter,
}

impl StreakGate {
    pub fn new(persist: Duration, cooldown: Duration) -> Self {
        Self {
            since_ms: None,
            persist_ms: persist.as_millis() as i64,
            limiter: RateLimiter::new(cooldown),
        }
    }

    /// Records a bad reading; returns true when a warning should fire now.
    pub fn observe_bad(&mut self, now_ms: i64) -> bool {
        let since = *self.since_ms.get_or_insert(now_ms);
        if now_ms - since < self.persist_ms {
            return false;
        }
        // restart the persistence window either way
        self.since_ms = Some(now_ms);
        self.limiter.try_fire(now_ms)
    }

    pub fn reset(&mut self) {
        self.since_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_enforces_cooldown() {
        let mut rl = RateLimiter::new(Duration::from_millis(800));
        assert!(rl.try_fire(1_000));
        assert!(!rl.try_fire(1_500));
        assert!(!rl.try_fire(1_799));
        assert!(rl.try_fire(1_800));
    }

    #[test]
    fn streak_fires_only_after_persistence() {
        let mut gate = StreakGate::new(Duration::from_millis(2000), Duration::from_millis(15000));
        assert!(!gate.observe_bad(0));
        assert!(!gate.observe_bad(1_000));
        assert!(!gate.observe_bad(1_999));
        assert!(gate.observe_bad(2_000));
    }

    #[test]
    fn ok_reading_restarts_persistence() {
        let mut gate = StreakGate::new(Duration::from_millis(2000), Duration::from_millis(15000));
        assert!(!gate.observe_bad(0));
        gate.reset();
        // streak starts over from 3_000
        assert!(!gate.observe_bad(3_000));
        assert!(!gate.observe_bad(4_500));
        assert!(gate.observe_bad(5_000));
    }

    #[test]
    fn repeat_warnings_respect_cooldown() {
        let mut gate = StreakGate::new(Duration::from_millis(2000), Duration::from_millis(15000));
        gate.observe_bad(0);
        assert!(gate.observe_bad(2_000));
        // condition keeps persisting, but cooldown blocks re-warning
        assert!(!gate.observe_bad(4_000));
        assert!(!gate.observe_bad(16_000));
        assert!(gate.observe_bad(18_000));
    }

    #[test]
    fn cooldown_survives_streak_resets() {
        let mut gate = StreakGate::new(Duration::from_millis(2000), Duration::from_millis(15000));
        gate.observe_bad(0);
        assert!(gate.observe_bad(2_000));
        gate.reset();
        // new streak persists, but we are still inside the cooldown
        assert!(!gate.observe_bad(5_000));
        assert!(!gate.observe_bad(7_000));
    }
}
