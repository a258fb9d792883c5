//! Bounded reconnection after an unexpected disconnect
//!
//! One attempt is: wait the settle delay, reopen the port, perform a test
//! read. A failed attempt bumps the role's counter and waits the retry delay.
//! After `max_attempts` failures the role is left `Failed` with the counter
//! reset, waiting for a manual connect.

use std::sync::Arc;
use std::time::Duration;

use super::connection::DeviceConnection;
use crate::communication::{ConnectionParams, LinkSettings, PortOpener, SerialLink};

/// How hard to try before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Pause before each reopen so the device can enumerate
    pub settle_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(3),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// How a reconnection sequence ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A new link is installed; its read loop must carry `generation`
    Reconnected { generation: u64, port: String },
    /// Every attempt failed
    Exhausted { attempts: u32 },
    /// A manual connect or disconnect took over
    Superseded,
}

/// Drives reconnection attempts for one role
pub struct ReconnectSupervisor {
    connection: Arc<DeviceConnection>,
    opener: Arc<dyn PortOpener>,
    settings: LinkSettings,
    policy: ReconnectPolicy,
}

impl ReconnectSupervisor {
    pub fn new(
        connection: Arc<DeviceConnection>,
        opener: Arc<dyn PortOpener>,
        settings: LinkSettings,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            connection,
            opener,
            settings,
            policy,
        }
    }

    /// Retry until success, exhaustion, or `expected` stops being current
    pub async fn run(self, expected: u64) -> ReconnectOutcome {
        let role = self.connection.role();
        let Some(port) = self.connection.port() else {
            return ReconnectOutcome::Superseded;
        };
        if !self.connection.begin_reconnect(expected) {
            return ReconnectOutcome::Superseded;
        }
        tracing::info!("Reconnecting {} on {}", role, port);

        let mut attempts = 0;
        while attempts < self.policy.max_attempts {
            tokio::time::sleep(self.policy.settle_delay).await;
            if self.connection.generation() != expected {
                return ReconnectOutcome::Superseded;
            }

            let params = self.settings.params(&port);
            let opener = self.opener.clone();
            let attempt = tokio::task::spawn_blocking(move || open_and_test_read(opener.as_ref(), &params))
                .await
                .unwrap_or_else(|e| Err(format!("reconnect attempt aborted: {}", e)));

            match attempt {
                Ok(link) => {
                    return match self.connection.install_if_current(expected, link, &port) {
                        Some(generation) => {
                            tracing::info!("Reconnected {} on {}", role, port);
                            ReconnectOutcome::Reconnected { generation, port }
                        }
                        None => ReconnectOutcome::Superseded,
                    };
                }
                Err(reason) => {
                    let Some(count) = self.connection.record_failed_attempt(expected, &reason)
                    else {
                        return ReconnectOutcome::Superseded;
                    };
                    attempts = count;
                    tracing::debug!(
                        "Reconnect attempt {}/{} for {} failed: {}",
                        attempts,
                        self.policy.max_attempts,
                        role,
                        reason
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }

        if self.connection.mark_failed(expected) {
            tracing::warn!("Max reconnection attempts reached for {}", role);
            ReconnectOutcome::Exhausted { attempts }
        } else {
            ReconnectOutcome::Superseded
        }
    }
}

fn open_and_test_read(
    opener: &dyn PortOpener,
    params: &ConnectionParams,
) -> Result<Box<dyn SerialLink>, String> {
    let mut link = opener.open(params).map_err(|e| e.to_string())?;
    link.read_line().map_err(|e| e.to_string())?;
    Ok(link)
}
