//! device-registry: reconciled state for every handset seen on the wire
//!
//! Decoded packets are routed by device id to a lazily created [`Device`]. [`reconcile::apply`]
//! merges them under per-session sequence ordering and reports connection changes as values;
//! [`HandsetService`] ties the listener, decoder and registry together behind one poll call.

mod device;
pub use device::{
    axis_remap, ButtonEdge, ButtonState, Device, DeviceSnapshot, TouchSlot, TouchSnapshot,
    TouchesView, DEFAULT_DISCONNECT_TIMEOUT,
};

pub mod reconcile;
pub use reconcile::{ApplyOutcome, DeviceEvent};

mod registry;
pub use registry::DeviceRegistry;

mod config;
pub use config::{load_config_file, ServiceConfig};

mod metrics;
pub use metrics::{MetricsHub, PipelineMetrics};

mod service;
pub use service::{HandsetService, PollSummary};
