use std::time::{Duration, Instant};

mod time_tricks;
pub(crate) use time_tricks::already_happened;

pub(crate) trait Soonest {
    fn soonest(self, other: Self) -> Self;
}

impl Soonest for Option<Instant> {
    fn soonest(self, other: Self) -> Self {
        match (self, other) {
            (Some(v1), Some(v2)) => Some(v1.min(v2)),
            (None, v) | (v, None) => v,
        }
    }
}

/// Half of the given duration, used as the sweep interval for a time-to-live.
pub(crate) fn half(d: Duration) -> Duration {
    d / 2
}
