use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::registry::QuotaLimiter;

struct Window {
    started_at: Instant,
    count: u32,
}

/// A fixed-window per-tenant execution quota. Each tenant gets up to
/// `max_per_window` admissions per `window`; the window resets the first
/// time a request lands after it has elapsed, rather than on a wall-clock
/// boundary, so a tenant's window starts from its own first request.
pub struct WindowedQuota {
    max_per_window: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl WindowedQuota {
    #[must_use]
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self { max_per_window, window, windows: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl QuotaLimiter for WindowedQuota {
    async fn check_and_reserve(&self, tenant_id: &str) -> Result<(), OrchestratorError> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = windows.entry(tenant_id.to_string()).or_insert_with(|| Window { started_at: now, count: 0 });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.max_per_window {
            return Err(OrchestratorError::QuotaExceeded(tenant_id.to_string()));
        }

        entry.count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denies_once_the_window_is_exhausted() {
        let quota = WindowedQuota::new(2, Duration::from_secs(60));
        quota.check_and_reserve("tenant-1").await.unwrap();
        quota.check_and_reserve("tenant-1").await.unwrap();
        assert!(matches!(
            quota.check_and_reserve("tenant-1").await,
            Err(OrchestratorError::QuotaExceeded(_))
        ));
    }

    #[tokio::test]
    async fn tenants_do_not_share_a_window() {
        let quota = WindowedQuota::new(1, Duration::from_secs(60));
        quota.check_and_reserve("tenant-1").await.unwrap();
        quota.check_and_reserve("tenant-2").await.unwrap();
    }

    #[tokio::test]
    async fn resets_after_the_window_elapses() {
        let quota = WindowedQuota::new(1, Duration::from_millis(20));
        quota.check_and_reserve("tenant-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        quota.check_and_reserve("tenant-1").await.unwrap();
    }
}
