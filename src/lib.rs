pub mod codec;
pub mod device;
pub mod error;
pub mod events;
pub mod locator;
pub mod logging;
pub mod publisher;
pub mod runtime;
pub mod transport;

pub use codec::{HeaderMap, SsdpRequest, SsdpResponse, WireDecode, WireEncode};
pub use device::{DeviceProperties, DeviceTreeEvent, SsdpDevice, SsdpService};
pub use error::{Result, SsdpError};
pub use locator::{DiscoveredDevice, LocatorEvent, SsdpDeviceLocator};
pub use logging::{LogFacade, LogLevel, NullLogger, SsdpLogger};
pub use publisher::SsdpDevicePublisher;
pub use runtime::{SsdpConfig, SsdpRuntime};
pub use transport::{Endpoint, SsdpCommunicationsServer, UdpSocketFactory};
