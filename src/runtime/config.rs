use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SsdpError};
use crate::transport::{
    SSDP_MULTICAST_V4, SSDP_MULTICAST_V6_ADMIN_LOCAL, SSDP_MULTICAST_V6_LINK_LOCAL,
    SSDP_MULTICAST_V6_SITE_LOCAL,
};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    #[default]
    V4,
    V6,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Ipv6Scope {
    #[default]
    LinkLocal,
    SiteLocal,
    AdminLocal,
}

impl Ipv6Scope {
    pub fn group(&self) -> Ipv6Addr {
        match self {
            Ipv6Scope::LinkLocal => SSDP_MULTICAST_V6_LINK_LOCAL,
            Ipv6Scope::SiteLocal => SSDP_MULTICAST_V6_SITE_LOCAL,
            Ipv6Scope::AdminLocal => SSDP_MULTICAST_V6_ADMIN_LOCAL,
        }
    }
}

/// How strictly incoming M-SEARCH requests are checked.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StandardsMode {
    /// MAN and MX must both be present.
    Strict,
    /// MAN must be present; a missing MX counts as 1.
    #[default]
    Default,
    /// MAN is not checked; a missing MX counts as 1.
    Relaxed,
}

/// Socket configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Local port for the unicast socket (0 = ephemeral)
    #[serde(default)]
    pub local_port: u16,
    #[serde(default)]
    pub address_family: AddressFamily,
    #[serde(default)]
    pub ipv6_scope: Ipv6Scope,
    /// Multicast TTL / hop limit (default: 4)
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,
    /// Interface address to bind and join on (default: any)
    #[serde(default)]
    pub local_ip: Option<IpAddr>,
}

impl TransportConfig {
    pub fn multicast_group(&self) -> IpAddr {
        match self.address_family {
            AddressFamily::V4 => IpAddr::V4(SSDP_MULTICAST_V4),
            AddressFamily::V6 => IpAddr::V6(self.ipv6_scope.group()),
        }
    }

    pub fn unspecified_address(&self) -> IpAddr {
        match self.address_family {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.multicast_ttl == 0 {
            return Err(SsdpError::argument("multicast_ttl must be positive"));
        }
        if let Some(ip) = self.local_ip {
            let family_matches = match self.address_family {
                AddressFamily::V4 => ip.is_ipv4(),
                AddressFamily::V6 => ip.is_ipv6(),
            };
            if !family_matches {
                return Err(SsdpError::argument(format!(
                    "local_ip {ip} does not match address family {:?}",
                    self.address_family
                )));
            }
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            local_port: 0,
            address_family: AddressFamily::default(),
            ipv6_scope: Ipv6Scope::default(),
            multicast_ttl: default_multicast_ttl(),
            local_ip: None,
        }
    }
}

/// Publisher configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PublisherConfig {
    /// OS token for the SERVER header
    #[serde(default = "default_os_name")]
    pub os_name: String,
    #[serde(default = "default_os_version")]
    pub os_version: String,
    /// Also announce and answer the legacy `pnp:rootdevice` target
    #[serde(default)]
    pub support_pnp_root_device: bool,
    #[serde(default)]
    pub standards_mode: StandardsMode,
}

impl PublisherConfig {
    pub fn server_header(&self) -> String {
        format!(
            "{}/{} UPnP/1.0 RSSDP/{}",
            self.os_name,
            self.os_version,
            env!("CARGO_PKG_VERSION")
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.os_name.trim().is_empty() {
            return Err(SsdpError::argument("os_name cannot be empty"));
        }
        if self.os_version.trim().is_empty() {
            return Err(SsdpError::argument("os_version cannot be empty"));
        }
        Ok(())
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            os_name: default_os_name(),
            os_version: default_os_version(),
            support_pnp_root_device: false,
            standards_mode: StandardsMode::default(),
        }
    }
}

/// Locator configuration
/// All timing values are in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct LocatorConfig {
    /// Only report devices with this notification type
    #[serde(default)]
    pub notification_filter: Option<String>,
    /// Wait used by a search without an explicit duration (default: 4)
    #[serde(default = "default_search_wait")]
    pub default_search_wait_secs: u64,
    /// Interval between expired-entry sweeps while listening (default: 60)
    #[serde(default = "default_expiry_sweep")]
    pub expiry_sweep_secs: u64,
}

impl LocatorConfig {
    pub fn default_search_wait(&self) -> Duration {
        Duration::from_secs(self.default_search_wait_secs)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.expiry_sweep_secs == 0 {
            return Err(SsdpError::argument("expiry_sweep_secs must be positive"));
        }
        Ok(())
    }
}

impl Default for LocatorConfig {
    fn default() -> Self {
        LocatorConfig {
            notification_filter: None,
            default_search_wait_secs: default_search_wait(),
            expiry_sweep_secs: default_expiry_sweep(),
        }
    }
}

fn default_multicast_ttl() -> u32 { 4 }
fn default_os_name() -> String { std::env::consts::OS.to_string() }
fn default_os_version() -> String { "1.0".to_string() }
fn default_search_wait() -> u64 { 4 }
fn default_expiry_sweep() -> u64 { 60 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SsdpConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
}

impl SsdpConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| SsdpError::Config(format!("cannot open {}: {}", path.display(), e)))?;
        let config: SsdpConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        self.publisher.validate()?;
        self.locator.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SsdpConfig::default();
        assert_eq!(config.transport.multicast_ttl, 4);
        assert_eq!(config.transport.multicast_group(), IpAddr::V4(SSDP_MULTICAST_V4));
        assert_eq!(config.publisher.standards_mode, StandardsMode::Default);
        assert!(!config.publisher.support_pnp_root_device);
        assert_eq!(config.locator.default_search_wait(), Duration::from_secs(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_json() {
        let json = r#"{
            "transport": { "address_family": "v6", "ipv6_scope": "site_local" },
            "publisher": { "standards_mode": "relaxed", "support_pnp_root_device": true }
        }"#;
        let config: SsdpConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.transport.multicast_group(), IpAddr::V6(SSDP_MULTICAST_V6_SITE_LOCAL));
        assert_eq!(config.transport.multicast_ttl, 4);
        assert_eq!(config.publisher.standards_mode, StandardsMode::Relaxed);
        assert!(config.publisher.support_pnp_root_device);
        assert_eq!(config.locator.expiry_sweep_secs, 60);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "publisher": {{ "os_name": "Linux", "os_version": "6.1" }} }}"#).unwrap();
        let config = SsdpConfig::load(file.path()).unwrap();
        assert!(config.publisher.server_header().starts_with("Linux/6.1 UPnP/1.0 RSSDP/"));
    }

    #[test]
    fn test_load_rejects_zero_ttl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "transport": {{ "multicast_ttl": 0 }} }}"#).unwrap();
        assert!(matches!(SsdpConfig::load(file.path()), Err(SsdpError::Argument(_))));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            SsdpConfig::load("/definitely/not/here.json"),
            Err(SsdpError::Config(_))
        ));
    }

    #[test]
    fn test_mismatched_local_ip() {
        let config = TransportConfig {
            local_ip: Some("::1".parse().unwrap()),
            ..TransportConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
