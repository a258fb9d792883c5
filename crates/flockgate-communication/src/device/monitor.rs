//! Periodic liveness polling
//!
//! Runs a check callback on a fixed interval until stopped. The gateway
//! uses it to check every connected role's handle.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Configuration for the liveness monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Time between checks
    pub check_interval: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(2),
        }
    }
}

/// Background ticker driving liveness checks
#[derive(Debug)]
pub struct LivenessMonitor {
    config: LivenessConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LivenessMonitor {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            task: Mutex::new(None),
        }
    }

    /// Start ticking; a running monitor is restarted with the new callback
    pub fn start<F>(&self, runtime: &Handle, mut check: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let period = self.config.check_interval;
        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if !check() {
                    tracing::debug!("Liveness monitor target gone, stopping");
                    break;
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop ticking
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
