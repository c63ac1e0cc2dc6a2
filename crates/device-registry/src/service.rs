use crate::reconcile::{self, ApplyOutcome, DeviceEvent};
use crate::{ButtonEdge, Device, DeviceRegistry, MetricsHub, ServiceConfig, TouchesView};
use anyhow::Context;
use datagram_transport::{DatagramSocket, Listener, ListenerState};
use handset_protocol::{decode, Button, DeviceId, Quat, Vec3};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, trace};

/// What one [`HandsetService::poll`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// A datagram was waiting in the mailbox.
    pub received: bool,
    /// Result of merging it, if it named a device.
    pub outcome: Option<ApplyOutcome>,
    /// Devices that timed out during this poll.
    pub disconnected: usize,
}

/// Polling driver: pulls the newest datagram, decodes it, routes it to its device and ticks
/// every device's disconnect timeout. All device state lives on the caller's thread.
pub struct HandsetService {
    config: ServiceConfig,
    listener: Listener,
    registry: DeviceRegistry,
    events: VecDeque<DeviceEvent>,
    metrics: MetricsHub,
    superseded_seen: u64,
}

impl HandsetService {
    pub fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid service config")?;
        let metrics = MetricsHub::new().map_err(anyhow::Error::msg)?;
        Ok(Self {
            listener: Listener::new(config.listener_options()),
            registry: DeviceRegistry::new(config.disconnect_timeout()),
            events: VecDeque::new(),
            metrics,
            superseded_seen: 0,
            config,
        })
    }

    /// Bind the configured address and start receiving.
    pub fn start(&mut self) -> anyhow::Result<SocketAddr> {
        let addr = self.config.socket_addr();
        self.listener
            .start(addr)
            .with_context(|| format!("starting listener on {addr}"))
    }

    /// Start receiving from a caller-supplied backend instead of a UDP socket.
    pub fn start_with<S>(&mut self, socket: S) -> anyhow::Result<()>
    where
        S: DatagramSocket + 'static,
    {
        self.listener
            .start_with(socket)
            .context("starting listener")
    }

    pub fn stop(&mut self) {
        self.listener.stop();
    }

    pub fn listener_state(&self) -> ListenerState {
        self.listener.state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// One driver cycle. Never blocks.
    pub fn poll(&mut self, now: Instant) -> PollSummary {
        let mut summary = PollSummary::default();
        if let Some(msg) = self.listener.poll_latest() {
            trace!("polled {msg}");
            summary.received = true;
            self.metrics.pipeline.datagrams_received.inc();
            summary.outcome = self.handle_message(&msg.text, now);
        }
        self.sync_listener_stats();
        summary.disconnected = self.tick(now);
        summary
    }

    /// Decode `text` and merge it into the device it names.
    ///
    /// Returns `None` when the payload carries no valid info group and so cannot be routed.
    pub fn handle_message(&mut self, text: &str, now: Instant) -> Option<ApplyOutcome> {
        let packet = decode(text);
        let invalid = packet.invalid_groups();
        if invalid > 0 {
            debug!("{invalid} field group(s) failed to decode");
            self.metrics.pipeline.groups_invalid.inc_by(invalid as u64);
        }

        let Some(id) = packet.device_id() else {
            debug!("dropping packet without a valid info group");
            self.metrics.pipeline.packets_without_info.inc();
            return None;
        };

        let device = self.registry.lookup_or_create(id);
        let outcome = reconcile::apply(device, &packet, now);
        match outcome {
            ApplyOutcome::Accepted => self.metrics.pipeline.packets_applied.inc(),
            ApplyOutcome::Connected(event) => {
                self.metrics.pipeline.packets_applied.inc();
                info!("{event}");
                self.events.push_back(event);
            }
            ApplyOutcome::Stale {
                sequence,
                last_accepted,
            } => {
                debug!("device {id}: rejected sequence {sequence} (last accepted {last_accepted})");
                self.metrics.pipeline.packets_rejected_stale.inc();
            }
            ApplyOutcome::Unsequenced => {
                debug!("device {id}: rejected info without session or sequence");
                self.metrics.pipeline.packets_rejected_stale.inc();
            }
        }
        self.update_gauges();
        Some(outcome)
    }

    /// Run the disconnect check on every device. Returns how many timed out.
    pub fn tick(&mut self, now: Instant) -> usize {
        let events = &mut self.events;
        let mut timed_out = 0;
        self.registry.for_each_mut(|device| {
            if let Some(event) = reconcile::check_timeout(device, now) {
                info!("{event}");
                events.push_back(event);
                timed_out += 1;
            }
        });
        if timed_out > 0 {
            self.update_gauges();
        }
        timed_out
    }

    /// Take every queued connect/disconnect notification, oldest first.
    pub fn drain_events(&mut self) -> Vec<DeviceEvent> {
        self.events.drain(..).collect()
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.registry.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.registry.iter()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn orientation(&self, id: DeviceId) -> Option<Quat> {
        self.registry.get(id).map(Device::orientation)
    }

    pub fn acceleration(&self, id: DeviceId) -> Option<Vec3> {
        self.registry.get(id).map(Device::acceleration)
    }

    pub fn touches(&self, id: DeviceId) -> Option<TouchesView<'_>> {
        self.registry.get(id).map(Device::touches)
    }

    pub fn button_edge(&self, id: DeviceId, button: Button, edge: ButtonEdge) -> bool {
        self.registry
            .get(id)
            .is_some_and(|d| d.button_edge(button, edge))
    }

    pub fn is_pressed(&self, id: DeviceId, button: Button) -> bool {
        self.registry.get(id).is_some_and(|d| d.is_pressed(button))
    }

    /// Returns false if the device has never been seen.
    pub fn recenter(&mut self, id: DeviceId) -> bool {
        match self.registry.get_mut(id) {
            Some(device) => {
                device.recenter();
                info!("device {id} recentered");
                true
            }
            None => false,
        }
    }

    pub fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }

    fn sync_listener_stats(&mut self) {
        let superseded = self.listener.stats().snapshot().superseded;
        let delta = superseded.saturating_sub(self.superseded_seen);
        if delta > 0 {
            self.metrics.pipeline.datagrams_superseded.inc_by(delta);
            self.superseded_seen = superseded;
        }
    }

    fn update_gauges(&self) {
        let known = i64::try_from(self.registry.len()).unwrap_or(i64::MAX);
        let connected = i64::try_from(self.registry.connected_count()).unwrap_or(i64::MAX);
        self.metrics.pipeline.devices_known.set(known);
        self.metrics.pipeline.devices_connected.set(connected);
    }
}
