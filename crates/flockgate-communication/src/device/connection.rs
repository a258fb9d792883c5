//! Per-role connection cell
//!
//! A [`DeviceConnection`] owns the open link for one role and the state
//! visible through `status`. Ownership of the link is tracked with a
//! generation counter: every install, loss and manual disconnect bumps it,
//! and a read loop or supervisor holding an older generation must leave the
//! link alone. The generation only changes while the link mutex is held, so
//! a check made under that lock cannot race a replacement.

use flockgate_core::{ConnectionError, ConnectionState, ConnectionStatus, DeviceRole};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::communication::SerialLink;

/// Outcome of one read attempt
#[derive(Debug, Clone, PartialEq)]
pub enum LineRead {
    /// A complete line
    Line(String),
    /// Nothing arrived within the read timeout
    Idle,
    /// The caller's generation is no longer current
    Stale,
    /// The link reported an error or closed underneath the reader
    Failed(ConnectionError),
}

#[derive(Debug, Default)]
struct Cell {
    state: ConnectionState,
    port: Option<String>,
    reconnect_attempts: u32,
    last_error: Option<String>,
}

/// Connection state and link for one device role
pub struct DeviceConnection {
    role: DeviceRole,
    generation: AtomicU64,
    cell: Mutex<Cell>,
    link: Mutex<Option<Box<dyn SerialLink>>>,
}

impl DeviceConnection {
    pub fn new(role: DeviceRole) -> Self {
        Self {
            role,
            generation: AtomicU64::new(0),
            cell: Mutex::new(Cell::default()),
            link: Mutex::new(None),
        }
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Current ownership token
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Install a freshly opened link, replacing and closing any previous one.
    ///
    /// Returns the generation the new read loop must carry.
    pub fn install(&self, link: Box<dyn SerialLink>, port: &str) -> u64 {
        let mut slot = self.link.lock();
        self.install_locked(&mut slot, link, port)
    }

    /// Install only if nobody connected, disconnected or lost the link since
    /// `expected` was observed
    pub fn install_if_current(
        &self,
        expected: u64,
        link: Box<dyn SerialLink>,
        port: &str,
    ) -> Option<u64> {
        let mut slot = self.link.lock();
        if self.generation() != expected {
            return None;
        }
        Some(self.install_locked(&mut slot, link, port))
    }

    fn install_locked(
        &self,
        slot: &mut Option<Box<dyn SerialLink>>,
        link: Box<dyn SerialLink>,
        port: &str,
    ) -> u64 {
        *slot = Some(link);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut cell = self.cell.lock();
        cell.state = ConnectionState::Connected;
        cell.port = Some(port.to_string());
        cell.reconnect_attempts = 0;
        cell.last_error = None;
        generation
    }

    /// Read one line on behalf of the loop owning `generation`
    pub fn read_line(&self, generation: u64) -> LineRead {
        let mut slot = self.link.lock();
        if self.generation() != generation {
            return LineRead::Stale;
        }
        let Some(link) = slot.as_mut() else {
            return LineRead::Stale;
        };
        match link.read_line() {
            Ok(Some(line)) => LineRead::Line(line),
            // The reader holds the link most of the time, so it checks the
            // handle itself whenever a read comes back empty
            Ok(None) if !link.is_open() => LineRead::Failed(ConnectionError::ConnectionLost {
                reason: "port handle is no longer open".to_string(),
            }),
            Ok(None) => LineRead::Idle,
            Err(e) => LineRead::Failed(ConnectionError::ConnectionLost {
                reason: e.to_string(),
            }),
        }
    }

    /// Check the link without waiting for a busy reader.
    ///
    /// `None` when the generation moved on or the reader holds the link. The
    /// reader is the primary loss detector: it surfaces read errors and
    /// checks the handle after every empty read. This check covers links
    /// whose reader is parked between polls.
    pub fn check_alive(&self, generation: u64) -> Option<bool> {
        let mut slot = self.link.try_lock()?;
        if self.generation() != generation {
            return None;
        }
        slot.as_mut().map(|link| link.is_open())
    }

    /// Drop the link after an unexpected failure.
    ///
    /// Returns the post-loss generation for exactly one caller per
    /// generation; a reconnection sequence must carry that value. The port is
    /// kept so the supervisor can reopen it.
    pub fn mark_lost(&self, generation: u64, reason: &str) -> Option<u64> {
        let mut slot = self.link.lock();
        if self.generation() != generation {
            return None;
        }
        *slot = None;
        let after_loss = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut cell = self.cell.lock();
        cell.state = ConnectionState::Disconnected;
        cell.last_error = Some(reason.to_string());
        Some(after_loss)
    }

    /// Manual disconnect: close the link and forget the port.
    ///
    /// Returns true if a link was open.
    pub fn disconnect(&self) -> bool {
        let mut slot = self.link.lock();
        let was_open = slot.take().is_some();
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut cell = self.cell.lock();
        cell.state = ConnectionState::Disconnected;
        cell.port = None;
        cell.reconnect_attempts = 0;
        was_open
    }

    /// Record a failed manual connect
    pub fn record_open_failure(&self, port: &str, reason: &str) {
        let mut cell = self.cell.lock();
        if cell.state != ConnectionState::Connected {
            cell.port = Some(port.to_string());
        }
        cell.last_error = Some(reason.to_string());
    }

    /// Enter the reconnecting state if `generation` is still current
    pub fn begin_reconnect(&self, generation: u64) -> bool {
        let _slot = self.link.lock();
        if self.generation() != generation {
            return false;
        }
        let mut cell = self.cell.lock();
        cell.state = ConnectionState::Reconnecting;
        cell.reconnect_attempts = 0;
        true
    }

    /// Count one failed reconnect attempt; returns the new count, or `None`
    /// when `generation` is no longer current
    pub fn record_failed_attempt(&self, generation: u64, reason: &str) -> Option<u32> {
        let _slot = self.link.lock();
        if self.generation() != generation {
            return None;
        }
        let mut cell = self.cell.lock();
        cell.reconnect_attempts += 1;
        cell.last_error = Some(reason.to_string());
        Some(cell.reconnect_attempts)
    }

    /// Give up reconnecting: state `Failed`, attempt counter reset
    pub fn mark_failed(&self, generation: u64) -> bool {
        let _slot = self.link.lock();
        if self.generation() != generation {
            return false;
        }
        let mut cell = self.cell.lock();
        cell.state = ConnectionState::Failed;
        cell.reconnect_attempts = 0;
        true
    }

    pub fn port(&self) -> Option<String> {
        self.cell.lock().port.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.cell.lock().state == ConnectionState::Connected
    }

    /// Whether the role is connected on exactly `port`
    pub fn is_connected_on(&self, port: &str) -> bool {
        let cell = self.cell.lock();
        cell.state == ConnectionState::Connected && cell.port.as_deref() == Some(port)
    }

    pub fn status(&self) -> ConnectionStatus {
        let cell = self.cell.lock();
        ConnectionStatus {
            role: self.role,
            state: cell.state,
            port: cell.port.clone(),
            reconnect_attempts: cell.reconnect_attempts,
            last_error: cell.last_error.clone(),
        }
    }
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("role", &self.role)
            .field("generation", &self.generation())
            .field("status", &self.status())
            .finish()
    }
}
