use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;

/// Source of "now" for every lifecycle decision. Injected so the checker and
/// the attempt guards can be driven deterministically.
pub(crate) trait Clock: Send + Sync {
    fn now(&self) -> PrimitiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> PrimitiveDateTime {
        primitive_now_utc()
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;


#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(datetime!(2025-03-01 09:00:00));
        assert_eq!(clock.now(), datetime!(2025-03-01 09:00:00));

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), datetime!(2025-03-01 10:30:00));

        clock.set(datetime!(2025-03-02 00:00:00));
        assert_eq!(clock.now(), datetime!(2025-03-02 00:00:00));
    }
}
