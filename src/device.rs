//! # Device Tree
//!
//! Minimal UPnP device model consumed by the publisher: a root device with a
//! description location and cache lifetime, embedded child devices and
//! services. Children hold a weak reference to their parent; the root owns
//! the tree.
//!
//! Structural changes anywhere in a tree are raised as [`DeviceTreeEvent`]s
//! on the root device, which is what a publisher subscribes to.

use crate::error::{Result, SsdpError};
use crate::events::Subscribers;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

pub const UPNP_NAMESPACE: &str = "schemas-upnp-org";

/// Identity of a device, shared by root and embedded devices.
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    pub uuid: String,
    pub device_type_namespace: String,
    pub device_type: String,
    pub device_version: u32,
}

impl DeviceProperties {
    pub fn new(uuid: &str, device_type: &str) -> Self {
        DeviceProperties {
            uuid: uuid.to_string(),
            device_type_namespace: UPNP_NAMESPACE.to_string(),
            device_type: device_type.to_string(),
            device_version: 1,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.uuid.trim().is_empty() {
            return Err(SsdpError::argument("device uuid cannot be empty"));
        }
        if self.device_type_namespace.trim().is_empty() {
            return Err(SsdpError::argument("device type namespace cannot be empty"));
        }
        if self.device_type.trim().is_empty() {
            return Err(SsdpError::argument("device type cannot be empty"));
        }
        if self.device_version == 0 {
            return Err(SsdpError::argument("device version must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct RootProperties {
    location: Url,
    cache_lifetime: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpService {
    uuid: String,
    namespace: String,
    service_type: String,
    version: u32,
}

impl SsdpService {
    pub fn new(uuid: &str, namespace: &str, service_type: &str, version: u32) -> Result<Self> {
        if uuid.trim().is_empty() {
            return Err(SsdpError::argument("service uuid cannot be empty"));
        }
        if namespace.trim().is_empty() {
            return Err(SsdpError::argument("service type namespace cannot be empty"));
        }
        if service_type.trim().is_empty() {
            return Err(SsdpError::argument("service type cannot be empty"));
        }
        if version == 0 {
            return Err(SsdpError::argument("service version must be positive"));
        }
        Ok(SsdpService {
            uuid: uuid.to_string(),
            namespace: namespace.to_string(),
            service_type: service_type.to_string(),
            version,
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// `urn:{namespace}:service:{type}:{version}`
    pub fn full_service_type(&self) -> String {
        format!("urn:{}:service:{}:{}", self.namespace, self.service_type, self.version)
    }
}

#[derive(Debug, Clone)]
pub enum DeviceTreeEvent {
    DeviceAdded { parent: Arc<SsdpDevice>, device: Arc<SsdpDevice> },
    DeviceRemoved { parent: Arc<SsdpDevice>, device: Arc<SsdpDevice> },
    ServiceAdded { device: Arc<SsdpDevice>, service: SsdpService },
    ServiceRemoved { device: Arc<SsdpDevice>, service: SsdpService },
}

#[derive(Default)]
struct DeviceState {
    parent: Weak<SsdpDevice>,
    children: Vec<Arc<SsdpDevice>>,
    services: Vec<SsdpService>,
    custom_response_headers: Vec<(String, String)>,
}

pub struct SsdpDevice {
    this: Weak<SsdpDevice>,
    properties: DeviceProperties,
    udn: String,
    root: Option<RootProperties>,
    state: RwLock<DeviceState>,
    events: Subscribers<DeviceTreeEvent>,
}

impl SsdpDevice {
    /// Creates a root device announced with `location` as its description URL.
    pub fn new_root(properties: DeviceProperties, location: Url, cache_lifetime: Duration) -> Result<Arc<Self>> {
        Self::build(properties, Some(RootProperties { location, cache_lifetime }))
    }

    pub fn new_embedded(properties: DeviceProperties) -> Result<Arc<Self>> {
        Self::build(properties, None)
    }

    fn build(properties: DeviceProperties, root: Option<RootProperties>) -> Result<Arc<Self>> {
        properties.validate()?;
        let udn = format!("uuid:{}", properties.uuid);
        Ok(Arc::new_cyclic(|this| SsdpDevice {
            this: this.clone(),
            properties,
            udn,
            root,
            state: RwLock::new(DeviceState::default()),
            events: Subscribers::new(),
        }))
    }

    pub fn is_root(&self) -> bool {
        self.root.is_some()
    }

    pub fn uuid(&self) -> &str {
        &self.properties.uuid
    }

    /// `uuid:{uuid}`
    pub fn udn(&self) -> &str {
        &self.udn
    }

    pub fn device_type(&self) -> &str {
        &self.properties.device_type
    }

    /// `urn:{namespace}:device:{type}:{version}`
    pub fn full_device_type(&self) -> String {
        format!(
            "urn:{}:device:{}:{}",
            self.properties.device_type_namespace, self.properties.device_type, self.properties.device_version
        )
    }

    /// Description location of the tree this device belongs to.
    pub fn location(&self) -> Option<Url> {
        self.root_device().root.as_ref().map(|r| r.location.clone())
    }

    /// Cache lifetime of the tree this device belongs to. Zero when detached.
    pub fn cache_lifetime(&self) -> Duration {
        self.root_device()
            .root
            .as_ref()
            .map(|r| r.cache_lifetime)
            .unwrap_or(Duration::ZERO)
    }

    pub fn parent(&self) -> Option<Arc<SsdpDevice>> {
        self.state.read().parent.upgrade()
    }

    /// Topmost ancestor, or this device when it has no parent.
    pub fn root_device(&self) -> Arc<SsdpDevice> {
        let mut current = self.arc();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn devices(&self) -> Vec<Arc<SsdpDevice>> {
        self.state.read().children.clone()
    }

    pub fn services(&self) -> Vec<SsdpService> {
        self.state.read().services.clone()
    }

    /// Every embedded device below this one, depth first.
    pub fn descendants(&self) -> Vec<Arc<SsdpDevice>> {
        let mut result = Vec::new();
        for child in self.devices() {
            result.push(child.clone());
            result.extend(child.descendants());
        }
        result
    }

    pub fn custom_response_headers(&self) -> Vec<(String, String)> {
        self.state.read().custom_response_headers.clone()
    }

    /// Adds a header sent with every alive notification and search response.
    pub fn add_custom_response_header(&self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || name.chars().any(|c| c == ':' || c.is_control() || c.is_whitespace()) {
            return Err(SsdpError::argument(format!("invalid header name {name:?}")));
        }
        if value.contains(['\r', '\n']) {
            return Err(SsdpError::argument(format!("invalid value for header {name}")));
        }
        let mut state = self.state.write();
        state.custom_response_headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        state.custom_response_headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Subscribes to structural changes of this tree. Only meaningful on a root.
    pub fn subscribe(&self) -> UnboundedReceiver<DeviceTreeEvent> {
        self.events.subscribe()
    }

    pub fn add_device(&self, device: Arc<SsdpDevice>) -> Result<()> {
        if device.is_root() {
            return Err(SsdpError::argument("a root device cannot be embedded"));
        }
        if device.udn == self.udn || self.has_ancestor(&device) {
            return Err(SsdpError::argument("a device cannot contain itself"));
        }
        {
            let mut child_state = device.state.write();
            if let Some(existing) = child_state.parent.upgrade() {
                if Arc::ptr_eq(&existing, &self.arc()) {
                    return Ok(());
                }
                return Err(SsdpError::InvalidOperation(format!(
                    "{} already belongs to {}",
                    device.udn, existing.udn
                )));
            }
            child_state.parent = self.this.clone();
        }
        self.state.write().children.push(device.clone());

        self.raise(DeviceTreeEvent::DeviceAdded { parent: self.arc(), device });
        Ok(())
    }

    pub fn remove_device(&self, device: &Arc<SsdpDevice>) {
        let removed = {
            let mut state = self.state.write();
            let before = state.children.len();
            state.children.retain(|c| !Arc::ptr_eq(c, device));
            state.children.len() != before
        };
        if !removed {
            return;
        }
        // Raise against the old tree before detaching.
        self.raise(DeviceTreeEvent::DeviceRemoved {
            parent: self.arc(),
            device: device.clone(),
        });
        device.state.write().parent = Weak::new();
    }

    pub fn add_service(&self, service: SsdpService) {
        {
            let mut state = self.state.write();
            if state.services.contains(&service) {
                return;
            }
            state.services.push(service.clone());
        }
        self.raise(DeviceTreeEvent::ServiceAdded { device: self.arc(), service });
    }

    pub fn remove_service(&self, service: &SsdpService) {
        let removed = {
            let mut state = self.state.write();
            let before = state.services.len();
            state.services.retain(|s| s != service);
            state.services.len() != before
        };
        if removed {
            self.raise(DeviceTreeEvent::ServiceRemoved {
                device: self.arc(),
                service: service.clone(),
            });
        }
    }

    fn raise(&self, event: DeviceTreeEvent) {
        self.root_device().events.publish(event);
    }

    fn has_ancestor(&self, candidate: &Arc<SsdpDevice>) -> bool {
        let mut current = self.parent();
        while let Some(device) = current {
            if Arc::ptr_eq(&device, candidate) {
                return true;
            }
            current = device.parent();
        }
        false
    }

    fn arc(&self) -> Arc<SsdpDevice> {
        // `this` always upgrades: methods are only reachable through a live Arc.
        self.this.upgrade().unwrap_or_else(|| unreachable!("device used after drop"))
    }
}

impl fmt::Debug for SsdpDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsdpDevice")
            .field("udn", &self.udn)
            .field("device_type", &self.full_device_type())
            .field("root", &self.is_root())
            .finish()
    }
}
