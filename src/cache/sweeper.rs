use std::time::Duration;

use crate::background::PeriodicTask;

use super::CacheManager;

/// Owns the background job that calls [`CacheManager::cleanup`] on a fixed
/// interval. Created by [`CacheManager::start_sweeper`].
///
/// Dropping the sweeper stops it; [`shutdown`](Self::shutdown) also waits for
/// the job to exit.
#[derive(Debug)]
pub struct CacheSweeper {
    task: PeriodicTask,
    interval: Duration,
}

impl CacheSweeper {
    pub(super) fn start(cache: CacheManager, interval: Duration) -> Self {
        let task = PeriodicTask::spawn("cache-sweeper", interval, move || {
            cache.cleanup();
        });
        Self { task, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the sweep and waits for the background job to finish.
    pub async fn shutdown(self) {
        self.task.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_expired_entries_on_interval() {
        let cache = CacheManager::new();
        cache.set_with_ttl("gone", &1, Duration::from_secs(30)).unwrap();
        cache.set_with_ttl("kept", &2, Duration::from_secs(3600)).unwrap();

        let sweeper = cache.start_sweeper(Duration::from_secs(60));
        assert_eq!(sweeper.interval(), Duration::from_secs(60));

        sleep(Duration::from_secs(59)).await;
        settle().await;
        assert_eq!(cache.size(), 2);

        sleep(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(cache.keys(), vec!["kept".to_string()]);
        assert_eq!(cache.metrics().evictions, 1);

        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_sweeper_leaves_entries_alone() {
        let cache = CacheManager::new();
        cache.set_with_ttl("stale", &1, Duration::from_secs(1)).unwrap();

        let sweeper = cache.start_sweeper(Duration::from_secs(5));
        assert!(sweeper.is_running());
        sweeper.shutdown().await;

        sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(cache.stats().expired, 1);
    }
}
