// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::SnapshotCache;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Tick period that keeps a snapshot younger than `ttl`: half of it, at least 1s.
pub fn refresh_period(ttl: Duration) -> Duration {
    (ttl / 2).max(MIN_PERIOD)
}

/// Keep the cache warm so request-path reads rarely pay for a cycle.
///
/// Every tick forces a cycle. Ticks are scheduled from the loop start, not
/// from the end of the previous cycle, so the stored snapshot is never older
/// than one period plus one cycle. The first tick fires immediately.
pub fn spawn_refresh_loop(cache: Arc<SnapshotCache>, ttl: Duration) -> JoinHandle<()> {
    let period = refresh_period(ttl);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let snapshot = cache.refresh().await;
            tracing::info!(
                target: "scheduler",
                services = snapshot.len(),
                captured_at = %snapshot.captured_at,
                period_ms = period.as_millis() as u64,
                "refresh tick"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_is_half_the_ttl_with_a_floor() {
        assert_eq!(refresh_period(Duration::from_secs(60)), Duration::from_secs(30));
        assert_eq!(refresh_period(Duration::from_secs(1)), MIN_PERIOD);
        assert_eq!(refresh_period(Duration::ZERO), MIN_PERIOD);
    }
}
