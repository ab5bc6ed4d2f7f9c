//! Timing for periodic alive re-announcements.
//!
//! Devices are re-announced at a random 1-50% of half the smallest non-zero
//! cache lifetime among published devices. When the schedule changes while a
//! broadcast is pending, the remaining wait carries over, capped at the new
//! interval.

use crate::device::SsdpDevice;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Lower bound so a tiny cache lifetime cannot spin the timer.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Smallest non-zero cache lifetime, or zero when no device is cacheable.
pub fn min_nonzero_cache_lifetime<'a, I>(devices: I) -> Duration
where
    I: IntoIterator<Item = &'a Arc<SsdpDevice>>,
{
    devices
        .into_iter()
        .map(|d| d.cache_lifetime())
        .filter(|lifetime| !lifetime.is_zero())
        .min()
        .unwrap_or(Duration::ZERO)
}

pub fn rebroadcast_interval(min_cache_lifetime: Duration) -> Duration {
    let percent: u32 = rand::rng().random_range(1..=50);
    ((min_cache_lifetime / 2) * percent / 100).max(MIN_INTERVAL)
}

/// Delay before the first broadcast of a new schedule, given the deadline
/// of the broadcast that was pending under the old one.
pub fn first_delay(interval: Duration, pending: Option<Instant>, now: Instant) -> Duration {
    match pending {
        None => interval,
        Some(deadline) => deadline.saturating_duration_since(now).min(interval),
    }
}
