use anyhow::{ensure, Context};
use datagram_transport::{ListenerOptions, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub disconnect_timeout_secs: f64,
    pub poll_interval_ms: u64,
    pub recv_timeout_ms: u64,
    pub max_datagram_bytes: usize,
    pub yield_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            disconnect_timeout_secs: crate::DEFAULT_DISCONNECT_TIMEOUT.as_secs_f64(),
            poll_interval_ms: 16,
            recv_timeout_ms: 200,
            max_datagram_bytes: 2048,
            yield_ms: 1,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.port != 0, "port must be non-zero");
        ensure!(
            self.disconnect_timeout_secs.is_finite() && self.disconnect_timeout_secs > 0.0,
            "disconnect_timeout_secs must be a positive number, got {}",
            self.disconnect_timeout_secs
        );
        ensure!(
            Duration::try_from_secs_f64(self.disconnect_timeout_secs).is_ok(),
            "disconnect_timeout_secs is too large, got {}",
            self.disconnect_timeout_secs
        );
        ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be non-zero");
        ensure!(self.recv_timeout_ms > 0, "recv_timeout_ms must be non-zero");
        ensure!(
            self.max_datagram_bytes >= 64,
            "max_datagram_bytes must be at least 64, got {}",
            self.max_datagram_bytes
        );
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.disconnect_timeout_secs)
            .unwrap_or(crate::DEFAULT_DISCONNECT_TIMEOUT)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            recv_timeout: Duration::from_millis(self.recv_timeout_ms),
            max_datagram_bytes: self.max_datagram_bytes,
            yield_interval: Duration::from_millis(self.yield_ms),
        }
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<ServiceConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let cfg: ServiceConfig =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config: {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServiceConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.socket_addr().port(), 3010);
        assert_eq!(cfg.disconnect_timeout(), Duration::from_secs(15));
        assert_eq!(
            cfg.listener_options().recv_timeout,
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() -> anyhow::Result<()> {
        let cfg: ServiceConfig =
            serde_yaml::from_str("port: 4000\ndisconnect_timeout_secs: 2.5\nbind_addr: 127.0.0.1\n")?;
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.disconnect_timeout(), Duration::from_millis(2500));
        assert_eq!(cfg.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(cfg.poll_interval_ms, 16);
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = ServiceConfig {
            disconnect_timeout_secs: -1.0,
            ..ServiceConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ServiceConfig {
            port: 0,
            ..ServiceConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_timeout() {
        let cfg = ServiceConfig {
            disconnect_timeout_secs: 1e30,
            ..ServiceConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ServiceConfig {
            disconnect_timeout_secs: 86_400.0,
            ..ServiceConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.disconnect_timeout(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_load_file() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("hs-config-{}.yaml", std::process::id()));
        fs::write(&path, "port: 3999\nyield_ms: 0\n")?;
        let cfg = load_config_file(&path)?;
        fs::remove_file(&path)?;
        assert_eq!(cfg.port, 3999);
        assert_eq!(cfg.listener_options().yield_interval, Duration::ZERO);

        assert!(load_config_file(&path).is_err());
        Ok(())
    }
}
