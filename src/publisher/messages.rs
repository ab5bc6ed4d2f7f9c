use crate::codec::{self, HeaderMap, SsdpRequest, SsdpResponse, METHOD_NOTIFY};
use crate::device::SsdpDevice;
use crate::transport::Endpoint;
use std::sync::Arc;

pub const UPNP_ROOT_DEVICE: &str = "upnp:rootdevice";
pub const PNP_ROOT_DEVICE: &str = "pnp:rootdevice";
pub const SSDP_ALL: &str = "ssdp:all";
pub const NTS_ALIVE: &str = "ssdp:alive";
pub const NTS_BYEBYE: &str = "ssdp:byebye";

/// One (target, USN) pair announced or answered for a device.
#[derive(Debug, Clone)]
pub struct Notification {
    pub device: Arc<SsdpDevice>,
    pub target: String,
    pub usn: String,
}

impl Notification {
    fn new(device: &Arc<SsdpDevice>, target: impl Into<String>, usn: impl Into<String>) -> Self {
        Notification {
            device: device.clone(),
            target: target.into(),
            usn: usn.into(),
        }
    }
}

/// Targets a single device is announced under, services included.
pub fn device_targets(device: &Arc<SsdpDevice>, support_pnp_root_device: bool) -> Vec<Notification> {
    let udn = device.udn();
    let mut targets = Vec::new();

    if device.is_root() {
        targets.push(Notification::new(device, UPNP_ROOT_DEVICE, format!("{udn}::{UPNP_ROOT_DEVICE}")));
        if support_pnp_root_device {
            targets.push(Notification::new(device, PNP_ROOT_DEVICE, format!("{udn}::{PNP_ROOT_DEVICE}")));
        }
    }
    targets.push(Notification::new(device, udn, udn));

    let device_type = device.full_device_type();
    targets.push(Notification::new(device, device_type.clone(), format!("{udn}::{device_type}")));

    targets.extend(service_targets(device));
    targets
}

/// One target per distinct service type of `device`.
pub fn service_targets(device: &Arc<SsdpDevice>) -> Vec<Notification> {
    let mut seen: Vec<String> = Vec::new();
    for service in device.services() {
        let service_type = service.full_service_type();
        if !seen.contains(&service_type) {
            seen.push(service_type);
        }
    }
    seen.into_iter()
        .map(|t| Notification::new(device, t.clone(), format!("{}::{}", device.udn(), t)))
        .collect()
}

/// Targets for `device` and every device below it.
pub fn tree_targets(device: &Arc<SsdpDevice>, support_pnp_root_device: bool) -> Vec<Notification> {
    let mut targets = device_targets(device, support_pnp_root_device);
    for child in device.descendants() {
        targets.extend(device_targets(&child, support_pnp_root_device));
    }
    targets
}

/// Byebye uses `urn:` + full device type as NT for the device type target.
/// The USN keeps the unprefixed type.
pub fn byebye_target(notification: &Notification) -> String {
    if notification.target == notification.device.full_device_type() {
        format!("urn:{}", notification.target)
    } else {
        notification.target.clone()
    }
}

/// Formats publisher messages for one transport and server identity.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    host: String,
    server: String,
}

impl MessageBuilder {
    pub fn new(multicast: Endpoint, server: String) -> Self {
        MessageBuilder {
            host: multicast.to_string(),
            server,
        }
    }

    pub fn alive(&self, notification: &Notification) -> SsdpRequest {
        let device = &notification.device;
        let mut headers = HeaderMap::new();
        headers.append("HOST", self.host.clone());
        headers.append("NT", notification.target.clone());
        headers.append("NTS", NTS_ALIVE);
        headers.append("USN", notification.usn.clone());
        headers.append("LOCATION", location_of(device));
        headers.append("CACHE-CONTROL", cache_control_of(device));
        headers.append("SERVER", self.server.clone());
        headers.append("DATE", codec::http_date_now());
        append_custom_headers(&mut headers, device);
        SsdpRequest::new(METHOD_NOTIFY, headers)
    }

    pub fn byebye(&self, notification: &Notification) -> SsdpRequest {
        let mut headers = HeaderMap::new();
        headers.append("HOST", self.host.clone());
        headers.append("DATE", codec::http_date_now());
        headers.append("NT", byebye_target(notification));
        headers.append("NTS", NTS_BYEBYE);
        headers.append("SERVER", self.server.clone());
        headers.append("USN", notification.usn.clone());
        SsdpRequest::new(METHOD_NOTIFY, headers)
    }

    pub fn search_response(&self, notification: &Notification) -> SsdpResponse {
        let device = &notification.device;
        let mut headers = HeaderMap::new();
        headers.append("EXT", "");
        headers.append("DATE", codec::http_date_now());
        headers.append("CACHE-CONTROL", cache_control_of(device));
        headers.append("ST", notification.target.clone());
        headers.append("SERVER", self.server.clone());
        headers.append("USN", notification.usn.clone());
        headers.append("LOCATION", location_of(device));
        append_custom_headers(&mut headers, device);
        SsdpResponse::ok(headers)
    }
}

fn location_of(device: &SsdpDevice) -> String {
    device.location().map(|url| url.to_string()).unwrap_or_default()
}

fn cache_control_of(device: &SsdpDevice) -> String {
    format!("public, max-age={}", device.cache_lifetime().as_secs())
}

fn append_custom_headers(headers: &mut HeaderMap, device: &SsdpDevice) {
    for (name, value) in device.custom_response_headers() {
        headers.append(&name, value);
    }
}
