use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct PipelineMetrics {
    pub datagrams_received: IntCounter,
    pub datagrams_superseded: IntCounter,
    pub packets_applied: IntCounter,
    pub packets_rejected_stale: IntCounter,
    pub packets_without_info: IntCounter,
    pub groups_invalid: IntCounter,
    pub devices_known: IntGauge,
    pub devices_connected: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub pipeline: PipelineMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

fn gauge(name: &str, help: &str) -> Result<IntGauge, String> {
    IntGauge::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let pipeline = PipelineMetrics {
            datagrams_received: counter("hs_datagrams_received", "Datagrams taken from the listener")?,
            datagrams_superseded: counter(
                "hs_datagrams_superseded",
                "Datagrams overwritten before they were polled",
            )?,
            packets_applied: counter("hs_packets_applied", "Packets merged into a device")?,
            packets_rejected_stale: counter(
                "hs_packets_rejected_stale",
                "Packets dropped for a stale or duplicate sequence number",
            )?,
            packets_without_info: counter(
                "hs_packets_without_info",
                "Packets dropped because they carried no valid info group",
            )?,
            groups_invalid: counter("hs_groups_invalid", "Field groups that failed to decode")?,
            devices_known: gauge("hs_devices_known", "Devices in the registry")?,
            devices_connected: gauge("hs_devices_connected", "Devices currently connected")?,
        };
        let _ = registry.register(Box::new(pipeline.datagrams_received.clone()));
        let _ = registry.register(Box::new(pipeline.datagrams_superseded.clone()));
        let _ = registry.register(Box::new(pipeline.packets_applied.clone()));
        let _ = registry.register(Box::new(pipeline.packets_rejected_stale.clone()));
        let _ = registry.register(Box::new(pipeline.packets_without_info.clone()));
        let _ = registry.register(Box::new(pipeline.groups_invalid.clone()));
        let _ = registry.register(Box::new(pipeline.devices_known.clone()));
        let _ = registry.register(Box::new(pipeline.devices_connected.clone()));
        Ok(Self { registry, pipeline })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
