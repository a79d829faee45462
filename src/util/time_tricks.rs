use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

// A fixed point up to an hour in the past. Used as the "last seen time" before
// the receiver has been driven with any real time.
static BEGINNING_OF_TIME: Lazy<Instant> = Lazy::new(|| {
    let now = Instant::now();
    let mut secs = 3600;
    loop {
        if let Some(v) = now.checked_sub(Duration::from_secs(secs)) {
            break v;
        }
        secs -= 1;
        if secs == 0 {
            break now;
        }
    }
});

pub(crate) fn already_happened() -> Instant {
    *BEGINNING_OF_TIME
}
