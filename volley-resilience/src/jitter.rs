//! Randomised pauses

use rand::Rng;
use std::time::Duration;

/// Uniformly random duration in `min..=max`. Returns `min` when the range is
/// empty or inverted.
pub fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let nanos = rng.gen_range(min.as_nanos()..=max.as_nanos());
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
