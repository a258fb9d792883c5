//! Gateway runtime
//!
//! Owns the two device connections, the detection store, the manufacturer
//! table and the event bus, and wires them together:
//!
//! - one blocking read thread per connected role
//! - a reconnection supervisor per unexpectedly lost role
//! - a liveness monitor and a heartbeat task
//!
//! Background failures never escape as errors; they become state changes
//! and events.

use chrono::Utc;
use flockgate_core::{
    spawn_heartbeat, ConnectionError, ConnectionStatus, DetectionRecord, DetectionStore,
    DeviceRole, Enrichment, Error, EventBus, EventBusConfig, EventFilter, EventSink, GatewayEvent,
    GpsFix, RawDetection, Result, StoreError, SubscribeError, SubscriberGroup, SubscriptionId,
};
use flockgate_devicedb::{DeviceResult, ManufacturerTable, OuiEntry};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::communication::{LinkSettings, PortOpener};
use crate::device::{
    DeviceConnection, LineRead, LivenessConfig, LivenessMonitor, ReconnectOutcome,
    ReconnectPolicy, ReconnectSupervisor,
};
use crate::protocol::{classify_line, decode_sentence, DetectorLine};

/// Sent to a terminal subscriber that did not name a port
pub const NO_PORT_MESSAGE: &str = "No port specified";

/// Sent to a terminal subscriber when the detector is not on the requested port
pub const NOT_CONNECTED_MESSAGE: &str =
    "Device not connected. Please connect to the Sniffer device first.";

/// Runtime configuration of the gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gps: LinkSettings,
    pub detector: LinkSettings,
    pub reconnect: ReconnectPolicy,
    pub liveness_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Sleep between empty polls in the read loops
    pub idle_poll: Duration,
    pub bus: EventBusConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gps: LinkSettings::gps(),
            detector: LinkSettings::detector(),
            reconnect: ReconnectPolicy::default(),
            liveness_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(30),
            idle_poll: Duration::from_millis(100),
            bus: EventBusConfig::default(),
        }
    }
}

impl GatewayConfig {
    fn link(&self, role: DeviceRole) -> LinkSettings {
        match role {
            DeviceRole::Gps => self.gps,
            DeviceRole::Detector => self.detector,
        }
    }
}

struct GatewayInner {
    config: GatewayConfig,
    bus: Arc<EventBus>,
    store: DetectionStore,
    manufacturers: Arc<ManufacturerTable>,
    current_fix: RwLock<Option<GpsFix>>,
    gps: Arc<DeviceConnection>,
    detector: Arc<DeviceConnection>,
    opener: Arc<dyn PortOpener>,
    runtime: Handle,
    supervisors: Mutex<HashMap<DeviceRole, JoinHandle<()>>>,
    monitor: LivenessMonitor,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running gateway; cheap to clone
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Create a gateway bound to the current tokio runtime
    pub fn new(
        config: GatewayConfig,
        opener: Arc<dyn PortOpener>,
        manufacturers: Arc<ManufacturerTable>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::other(format!("Gateway needs a tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(config, opener, manufacturers, runtime))
    }

    /// Create a gateway that spawns its workers on `runtime`
    pub fn with_runtime(
        config: GatewayConfig,
        opener: Arc<dyn PortOpener>,
        manufacturers: Arc<ManufacturerTable>,
        runtime: Handle,
    ) -> Self {
        let bus = Arc::new(EventBus::with_config(config.bus.clone()));
        let monitor = LivenessMonitor::new(LivenessConfig {
            check_interval: config.liveness_interval,
        });
        Self {
            inner: Arc::new(GatewayInner {
                config,
                bus,
                store: DetectionStore::new(),
                manufacturers,
                current_fix: RwLock::new(None),
                gps: Arc::new(DeviceConnection::new(DeviceRole::Gps)),
                detector: Arc::new(DeviceConnection::new(DeviceRole::Detector)),
                opener,
                runtime,
                supervisors: Mutex::new(HashMap::new()),
                monitor,
                heartbeat: Mutex::new(None),
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Connections
    // ---------------------------------------------------------------------

    /// Open `port` for `role` and start its read loop.
    ///
    /// Closes any existing connection of the role, then opens the new one,
    /// and cancels a running reconnection sequence. Blocks while the OS opens
    /// the port.
    pub fn connect(
        &self,
        role: DeviceRole,
        port: &str,
    ) -> std::result::Result<ConnectionStatus, ConnectionError> {
        let port = port.trim();
        if port.is_empty() {
            return Err(ConnectionError::NoPortAssigned {
                role: role.to_string(),
            });
        }

        self.inner.cancel_supervisor(role);
        let connection = self.inner.connection(role);
        // Serial ports open exclusively: release the current handle first
        if connection.disconnect() {
            tracing::debug!("Closed previous {} link before reconnecting", role);
        }
        let params = self.inner.config.link(role).params(port);

        let link = match self.inner.opener.open(&params) {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!("Failed to connect {} on {}: {}", role, port, e);
                connection.record_open_failure(port, &e.to_string());
                return Err(e);
            }
        };

        let generation = connection.install(link, port);
        tracing::info!("Connected {} on {}", role, port);
        GatewayInner::spawn_reader(&self.inner, role, generation);
        Ok(connection.status())
    }

    /// Close the role's port and stop supervising it.
    ///
    /// Returns true if a port was open. Publishes nothing.
    pub fn disconnect(&self, role: DeviceRole) -> bool {
        self.inner.cancel_supervisor(role);
        let was_open = self.inner.connection(role).disconnect();
        if was_open {
            tracing::info!("Disconnected {}", role);
        }
        was_open
    }

    pub fn status(&self, role: DeviceRole) -> ConnectionStatus {
        self.inner.connection(role).status()
    }

    /// Status of both roles, GPS first
    pub fn status_all(&self) -> Vec<ConnectionStatus> {
        DeviceRole::ALL.iter().map(|&role| self.status(role)).collect()
    }

    /// Most recent fix, regardless of quality
    pub fn current_fix(&self) -> Option<GpsFix> {
        self.inner.current_fix.read().clone()
    }

    // ---------------------------------------------------------------------
    // Detections
    // ---------------------------------------------------------------------

    /// Enrich, store and announce a detection
    pub fn ingest(&self, raw: RawDetection) -> DetectionRecord {
        self.inner.ingest(raw)
    }

    pub fn list_all(&self, detection_method: Option<&str>) -> Vec<DetectionRecord> {
        self.inner.store.list_all(detection_method)
    }

    pub fn get_detection(&self, id: u64) -> Option<DetectionRecord> {
        self.inner.store.get(id)
    }

    /// Label a detection and announce the change
    pub fn set_alias(
        &self,
        id: u64,
        alias: &str,
    ) -> std::result::Result<DetectionRecord, StoreError> {
        let record = self.inner.store.set_alias(id, alias)?;
        self.inner
            .bus
            .publish(GatewayEvent::DetectionUpdated(record.clone()));
        Ok(record)
    }

    /// Empty the store; the next detection gets id 1
    pub fn clear(&self) -> usize {
        let removed = self.inner.store.clear();
        tracing::info!("Cleared {} detections", removed);
        self.inner.bus.publish(GatewayEvent::DetectionsCleared);
        removed
    }

    /// Ingest a synthetic detection for exercising subscribers.
    ///
    /// With a sample, only missing method, protocol, MAC and time fields are
    /// filled in; without one a complete Wi-Fi probe request is used.
    pub fn inject_test_detection(&self, sample: Option<RawDetection>) -> DetectionRecord {
        let now = Utc::now();
        let detection_time = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let timestamp = u64::try_from(now.timestamp_millis()).unwrap_or_default();

        let raw = match sample {
            Some(mut raw) => {
                raw.detection_method
                    .get_or_insert_with(|| "probe_request".to_string());
                raw.protocol.get_or_insert_with(|| "wifi".to_string());
                raw.mac_address
                    .get_or_insert_with(|| "AA:BB:CC:DD:EE:FF".to_string());
                raw.detection_time.get_or_insert(detection_time);
                raw.timestamp.get_or_insert(timestamp);
                raw
            }
            None => RawDetection {
                detection_method: Some("probe_request".to_string()),
                protocol: Some("wifi".to_string()),
                mac_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
                ssid: Some("TestNetwork".to_string()),
                rssi: Some(-45),
                signal_strength: Some("Excellent".to_string()),
                channel: Some(6),
                detection_time: Some(detection_time),
                timestamp: Some(timestamp),
                ..Default::default()
            },
        };
        self.inner.ingest(raw)
    }

    // ---------------------------------------------------------------------
    // Manufacturers
    // ---------------------------------------------------------------------

    pub fn lookup_manufacturer(&self, mac_address: &str) -> String {
        self.inner.manufacturers.lookup(mac_address)
    }

    pub fn search_manufacturer(&self, query: &str) -> Vec<OuiEntry> {
        self.inner.manufacturers.search(query)
    }

    /// Atomically swap the manufacturer table; returns the new entry count
    pub fn replace_manufacturer_table(&self, entries: Vec<OuiEntry>) -> usize {
        let count = self.inner.manufacturers.replace_all(entries);
        tracing::info!("Manufacturer table replaced with {} entries", count);
        count
    }

    /// Download a fresh table and optionally persist it
    pub async fn refresh_manufacturers(
        &self,
        url: &str,
        save_to: Option<&Path>,
    ) -> DeviceResult<usize> {
        let count = self.inner.manufacturers.refresh_from_url(url).await?;
        if let Some(path) = save_to {
            self.inner.manufacturers.save_to_file(path)?;
        }
        Ok(count)
    }

    pub fn manufacturers(&self) -> &Arc<ManufacturerTable> {
        &self.inner.manufacturers
    }

    // ---------------------------------------------------------------------
    // Subscribers
    // ---------------------------------------------------------------------

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn subscribe<S>(&self, filter: EventFilter, sink: S) -> SubscriptionId
    where
        S: EventSink + 'static,
    {
        self.inner.bus.subscribe(filter, sink)
    }

    pub fn subscribe_channel(
        &self,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        self.inner.bus.subscribe_channel(filter)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    /// Join the raw terminal stream of the detector on `port`.
    ///
    /// The subscriber receives `serial_error` and the call fails when no port
    /// is given or the detector is not connected on exactly that port. On
    /// success it receives `serial_connected` and the recent backlog; the
    /// replayed line count is returned.
    pub fn subscribe_terminal(
        &self,
        id: SubscriptionId,
        port: Option<&str>,
    ) -> std::result::Result<usize, SubscribeError> {
        let bus = &self.inner.bus;
        let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) else {
            Self::notify_terminal_error(bus, id, NO_PORT_MESSAGE);
            return Err(SubscribeError::NoPortSpecified);
        };

        if !self.inner.detector.is_connected_on(port) {
            Self::notify_terminal_error(bus, id, NOT_CONNECTED_MESSAGE);
            return Err(SubscribeError::NotConnected {
                port: port.to_string(),
            });
        }

        bus.join_terminal(id)
    }

    /// Stop receiving raw terminal lines
    pub fn leave_terminal(&self, id: SubscriptionId) -> bool {
        self.inner.bus.leave_group(id, SubscriberGroup::Terminal)
    }

    fn notify_terminal_error(bus: &EventBus, id: SubscriptionId, message: &str) {
        let event = GatewayEvent::SerialError {
            message: message.to_string(),
        };
        if let Err(e) = bus.send_to(id, &event) {
            tracing::warn!("Could not deliver serial_error to {}: {}", id, e);
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Start the liveness monitor and the heartbeat
    pub fn start_background(&self) {
        let weak: Weak<GatewayInner> = Arc::downgrade(&self.inner);
        self.inner.monitor.start(&self.inner.runtime, move || {
            match weak.upgrade() {
                Some(inner) => {
                    GatewayInner::check_liveness(&inner);
                    true
                }
                None => false,
            }
        });

        let _guard = self.inner.runtime.enter();
        let heartbeat = spawn_heartbeat(
            self.inner.bus.clone(),
            self.inner.config.heartbeat_interval,
        );
        if let Some(previous) = self.inner.heartbeat.lock().replace(heartbeat) {
            previous.abort();
        }
        tracing::debug!("Background workers started");
    }

    /// Stop background workers and close both ports
    pub fn shutdown(&self) {
        self.inner.monitor.stop();
        if let Some(heartbeat) = self.inner.heartbeat.lock().take() {
            heartbeat.abort();
        }
        for role in DeviceRole::ALL {
            self.disconnect(role);
        }
        tracing::info!("Gateway shut down");
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("gps", &self.inner.gps)
            .field("detector", &self.inner.detector)
            .field("detections", &self.inner.store.len())
            .field("bus", &self.inner.bus)
            .finish()
    }
}

impl GatewayInner {
    fn connection(&self, role: DeviceRole) -> &Arc<DeviceConnection> {
        match role {
            DeviceRole::Gps => &self.gps,
            DeviceRole::Detector => &self.detector,
        }
    }

    fn ingest(&self, raw: RawDetection) -> DetectionRecord {
        let manufacturer = raw
            .mac_address
            .as_deref()
            .map(|mac| self.manufacturers.lookup(mac));
        let enrichment = {
            let fix = self.current_fix.read();
            Enrichment::capture(fix.as_ref(), manufacturer, Utc::now())
        };

        let outcome = self.store.ingest(raw, enrichment);
        let event = if outcome.created {
            GatewayEvent::NewDetection(outcome.record.clone())
        } else {
            GatewayEvent::DetectionUpdated(outcome.record.clone())
        };
        self.bus.publish(event);
        outcome.record
    }

    fn handle_line(&self, role: DeviceRole, line: String) {
        match role {
            DeviceRole::Gps => {
                if let Some(fix) = decode_sentence(&line) {
                    *self.current_fix.write() = Some(fix.clone());
                    self.bus.publish(GatewayEvent::GpsUpdate(fix));
                }
            }
            DeviceRole::Detector => {
                let line = line.trim();
                if line.is_empty() {
                    return;
                }
                self.bus.publish_serial_line(line);
                match classify_line(line) {
                    DetectorLine::Detection(raw) => {
                        self.ingest(raw);
                    }
                    DetectorLine::Diagnostic(text) => {
                        tracing::debug!("Detector: {}", text);
                    }
                }
            }
        }
    }

    /// Run the blocking read loop for `role` at `generation` on its own thread
    fn spawn_reader(inner: &Arc<Self>, role: DeviceRole, generation: u64) {
        let inner_for_loop = inner.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{}-reader", role))
            .spawn(move || Self::read_loop(&inner_for_loop, role, generation));

        if let Err(e) = spawned {
            tracing::error!("Failed to start {} reader: {}", role, e);
            Self::connection_lost(inner, role, generation, &e.to_string());
        }
    }

    fn read_loop(inner: &Arc<Self>, role: DeviceRole, generation: u64) {
        let connection = inner.connection(role).clone();
        tracing::debug!("{} reader started (generation {})", role, generation);
        loop {
            match connection.read_line(generation) {
                LineRead::Line(line) => inner.handle_line(role, line),
                LineRead::Idle => std::thread::sleep(inner.config.idle_poll),
                LineRead::Stale => break,
                LineRead::Failed(e) => {
                    tracing::warn!("{} read error: {}", role, e);
                    Self::connection_lost(inner, role, generation, &e.to_string());
                    break;
                }
            }
        }
        tracing::debug!("{} reader stopped (generation {})", role, generation);
    }

    /// Single entry point for unexpected loss, from a reader or the monitor
    fn connection_lost(inner: &Arc<Self>, role: DeviceRole, generation: u64, reason: &str) {
        let connection = inner.connection(role);
        let Some(after_loss) = connection.mark_lost(generation, reason) else {
            return;
        };
        tracing::warn!("{} connection lost: {}", role, reason);
        inner.bus.publish(GatewayEvent::disconnected(role));
        Self::start_supervisor(inner, role, after_loss);
    }

    /// Supervise `role` for as long as `expected` stays its generation
    fn start_supervisor(inner: &Arc<Self>, role: DeviceRole, expected: u64) {
        let connection = inner.connection(role).clone();
        let supervisor = ReconnectSupervisor::new(
            connection,
            inner.opener.clone(),
            inner.config.link(role),
            inner.config.reconnect,
        );

        let weak = Arc::downgrade(inner);
        let task = inner.runtime.spawn(async move {
            let outcome = supervisor.run(expected).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match outcome {
                ReconnectOutcome::Reconnected { generation, port } => {
                    inner.bus.publish(GatewayEvent::reconnected(role, port));
                    Self::spawn_reader(&inner, role, generation);
                }
                ReconnectOutcome::Exhausted { attempts } => {
                    tracing::error!("Giving up on {} after {} attempts", role, attempts);
                    inner.bus.publish(GatewayEvent::reconnect_failed(role));
                }
                ReconnectOutcome::Superseded => {
                    tracing::debug!("{} reconnection superseded", role);
                }
            }
        });

        if let Some(previous) = inner.supervisors.lock().insert(role, task) {
            previous.abort();
        }
    }

    fn cancel_supervisor(&self, role: DeviceRole) {
        if let Some(task) = self.supervisors.lock().remove(&role) {
            task.abort();
        }
    }

    fn check_liveness(inner: &Arc<Self>) {
        for role in DeviceRole::ALL {
            let connection = inner.connection(role);
            if !connection.is_connected() {
                continue;
            }
            let generation = connection.generation();
            if connection.check_alive(generation) == Some(false) {
                Self::connection_lost(inner, role, generation, "port handle is no longer open");
            }
        }
    }
}
