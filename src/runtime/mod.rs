//! # SSDP Runtime Module
//!
//! Wires one communications server, one publisher and one locator together
//! from an [`SsdpConfig`].
//!
//! ## Key Types
//!
//! - [`SsdpRuntime`] - owns the three components and shuts them down in order
//! - [`SsdpConfig`] - JSON configuration (transport, publisher, locator)
//!
//! ## Lifecycle
//!
//! 1. Load configuration: `SsdpRuntime::load("ssdp.json")`
//! 2. Publish devices: `runtime.publisher().add_device(device).await`
//! 3. Discover: `runtime.locator().search().await`
//! 4. Stop gracefully: `runtime.shutdown().await` (sends byebye first)
//!
//! ## Example
//!
//! ```ignore
//! let runtime = SsdpRuntime::load("ssdp.json")?;
//! runtime.locator().start_listening_for_notifications()?;
//! for device in runtime.locator().search().await? {
//!     println!("{} at {:?}", device.usn, device.description_location);
//! }
//! runtime.shutdown().await;
//! ```

pub mod config;

pub use config::{AddressFamily, Ipv6Scope, LocatorConfig, PublisherConfig, SsdpConfig, StandardsMode, TransportConfig};

use crate::error::Result;
use crate::locator::SsdpDeviceLocator;
use crate::logging::{LogFacade, LogLevel, SsdpLogger};
use crate::publisher::SsdpDevicePublisher;
use crate::transport::{SocketFactory, SsdpCommunicationsServer, UdpSocketFactory};
use std::path::Path;
use std::sync::Arc;

pub struct SsdpRuntime {
    config: SsdpConfig,
    comms: Arc<SsdpCommunicationsServer>,
    publisher: SsdpDevicePublisher,
    locator: SsdpDeviceLocator,
    logger: Arc<dyn SsdpLogger>,
}

impl SsdpRuntime {
    /// Loads a JSON config and starts on real UDP sockets, logging through the `log` crate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let logger = LogFacade::new();
        let path = path.as_ref();
        logger.log(LogLevel::Info, "Runtime", &format!("Loading config from {}", path.display()));
        let config = SsdpConfig::load(path)?;
        Self::from_config(config, logger)
    }

    pub fn from_config(config: SsdpConfig, logger: Arc<dyn SsdpLogger>) -> Result<Self> {
        Self::with_factory(config, Arc::new(UdpSocketFactory), logger)
    }

    /// Starts on sockets from `factory`. Must be called within a tokio runtime.
    pub fn with_factory(
        config: SsdpConfig,
        factory: Arc<dyn SocketFactory>,
        logger: Arc<dyn SsdpLogger>,
    ) -> Result<Self> {
        config.validate()?;
        let comms = Arc::new(SsdpCommunicationsServer::new(
            factory,
            config.transport.clone(),
            logger.clone(),
        )?);
        let publisher = SsdpDevicePublisher::new(comms.clone(), config.publisher.clone(), logger.clone())?;
        let locator = SsdpDeviceLocator::new(comms.clone(), config.locator.clone(), logger.clone())?;

        logger.log(
            LogLevel::Info,
            "Runtime",
            &format!(
                "Started ({:?}, group {})",
                config.transport.address_family,
                comms.multicast_endpoint()
            ),
        );

        Ok(SsdpRuntime {
            config,
            comms,
            publisher,
            locator,
            logger,
        })
    }

    pub fn config(&self) -> &SsdpConfig {
        &self.config
    }

    pub fn communications(&self) -> &Arc<SsdpCommunicationsServer> {
        &self.comms
    }

    pub fn publisher(&self) -> &SsdpDevicePublisher {
        &self.publisher
    }

    pub fn locator(&self) -> &SsdpDeviceLocator {
        &self.locator
    }

    pub fn logger(&self) -> Arc<dyn SsdpLogger> {
        self.logger.clone()
    }

    /// Withdraws every published device, then disposes all components.
    pub async fn shutdown(&self) {
        if self.comms.is_disposed() {
            return;
        }
        for device in self.publisher.devices() {
            if let Err(e) = self.publisher.remove_device(&device).await {
                self.logger.log(
                    LogLevel::Warn,
                    "Runtime",
                    &format!("Failed to withdraw {}: {}", device.udn(), e),
                );
            }
        }
        self.publisher.dispose();
        self.locator.dispose();
        self.comms.dispose();
        self.logger.log(LogLevel::Info, "Runtime", "Shut down");
    }
}
