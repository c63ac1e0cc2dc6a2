use crate::Device;
use handset_protocol::DeviceId;
use std::collections::BTreeMap;
use std::time::Duration;

/// Every device seen since start-up, keyed by id. Entries are never removed.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Device>,
    disconnect_timeout: Duration,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DISCONNECT_TIMEOUT)
    }
}

impl DeviceRegistry {
    /// Devices created by this registry use `disconnect_timeout`.
    pub fn new(disconnect_timeout: Duration) -> Self {
        Self {
            devices: BTreeMap::new(),
            disconnect_timeout,
        }
    }

    pub fn lookup_or_create(&mut self, id: DeviceId) -> &mut Device {
        let timeout = self.disconnect_timeout;
        self.devices
            .entry(id)
            .or_insert_with(|| Device::with_timeout(id, timeout))
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    /// Visit every known device in id order.
    pub fn for_each_mut<F>(&mut self, mut visitor: F)
    where
        F: FnMut(&mut Device),
    {
        for device in self.devices.values_mut() {
            visitor(device);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.devices.values().filter(|d| d.is_connected()).count()
    }
}
