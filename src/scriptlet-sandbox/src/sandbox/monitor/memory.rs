//! Memory usage based execution monitor.
//!
//! Unlike [`WallClockMonitor`](super::WallClockMonitor) and
//! [`CpuTimeMonitor`](super::CpuTimeMonitor), memory cannot be read from a generic OS
//! handle — the only thing that knows how much guest memory is in use is the sandbox
//! itself. So this monitor is constructed with a sampling closure supplied by the
//! sandbox, rather than discovering a handle on its own.
//!
//! Per the platform's resolved design question on memory limits: the
//! `resource_usage.memory_used` figure reported in an execution log is advisory, but the
//! host **must** abort an execution that sustains usage over its configured limit. This
//! monitor is how that abort is enforced — the accounting itself happens in the sandbox.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyperlight_host::{HyperlightError, Result};

use super::ExecutionMonitor;

/// Minimum time a sample must remain over the limit before the monitor fires. A single
/// sample over budget can be a transient allocation spike; two consecutive samples a poll
/// interval apart is a sustained overrun.
const CONSECUTIVE_SAMPLES_REQUIRED: u32 = 2;

/// Monitors handler execution by periodically sampling guest memory usage.
///
/// Terminates execution if a sample taken by `sample_bytes` exceeds `limit_bytes` for
/// `CONSECUTIVE_SAMPLES_REQUIRED` consecutive polls in a row.
#[derive(Clone)]
pub struct MemoryMonitor {
    limit_bytes: usize,
    poll_interval: Duration,
    sample_bytes: Arc<dyn Fn() -> Option<usize> + Send + Sync>,
}

impl MemoryMonitor {
    /// Create a new memory monitor.
    ///
    /// `sample_bytes` is called on the monitor runtime at `poll_interval` and should
    /// return the sandbox's current guest memory usage in bytes, or `None` if usage
    /// could not be determined (treated as a fail-closed termination signal).
    ///
    /// # Errors
    ///
    /// Returns an error if `limit_bytes` or `poll_interval` is zero.
    pub fn new(
        limit_bytes: usize,
        poll_interval: Duration,
        sample_bytes: impl Fn() -> Option<usize> + Send + Sync + 'static,
    ) -> Result<Self> {
        if limit_bytes == 0 {
            return Err(HyperlightError::Error(
                "limit_bytes must be non-zero".to_string(),
            ));
        }
        if poll_interval.is_zero() {
            return Err(HyperlightError::Error(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            limit_bytes,
            poll_interval,
            sample_bytes: Arc::new(sample_bytes),
        })
    }
}

impl ExecutionMonitor for MemoryMonitor {
    fn get_monitor(&self) -> Result<impl Future<Output = ()> + Send + 'static> {
        let limit_bytes = self.limit_bytes;
        let poll_interval = self.poll_interval;
        let sample_bytes = self.sample_bytes.clone();

        Ok(async move {
            let mut consecutive_over = 0u32;
            loop {
                super::sleep(poll_interval).await;

                match sample_bytes() {
                    Some(used) if used > limit_bytes => {
                        consecutive_over += 1;
                        if consecutive_over >= CONSECUTIVE_SAMPLES_REQUIRED {
                            tracing::warn!(
                                used_bytes = used,
                                limit_bytes,
                                "Memory limit sustained over budget, terminating execution"
                            );
                            return;
                        }
                    }
                    Some(_) => {
                        consecutive_over = 0;
                    }
                    None => {
                        // Sampling failed — fail closed rather than run unmonitored.
                        tracing::error!(
                            "Failed to sample guest memory usage — terminating execution (fail-closed)"
                        );
                        return;
                    }
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_zero_limit_rejected() {
        let result = MemoryMonitor::new(0, Duration::from_millis(10), || Some(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = MemoryMonitor::new(1024, Duration::ZERO, || Some(0));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fires_after_consecutive_overruns() {
        let used = Arc::new(AtomicUsize::new(2048));
        let used_clone = used.clone();
        let monitor = MemoryMonitor::new(1024, Duration::from_millis(1), move || {
            Some(used_clone.load(Ordering::SeqCst))
        })
        .unwrap();

        let fut = monitor.get_monitor().unwrap();
        tokio::time::timeout(Duration::from_secs(1), fut)
            .await
            .expect("monitor should fire within the timeout");
    }

    #[tokio::test]
    async fn test_does_not_fire_within_budget() {
        let monitor = MemoryMonitor::new(1024, Duration::from_millis(1), || Some(512)).unwrap();
        let fut = monitor.get_monitor().unwrap();
        let result = tokio::time::timeout(Duration::from_millis(20), fut).await;
        assert!(result.is_err(), "monitor should not fire while within budget");
    }

    #[tokio::test]
    async fn test_fail_closed_on_sample_failure() {
        let monitor = MemoryMonitor::new(1024, Duration::from_millis(1), || None).unwrap();
        let fut = monitor.get_monitor().unwrap();
        tokio::time::timeout(Duration::from_secs(1), fut)
            .await
            .expect("monitor should fire when sampling fails");
    }
}
