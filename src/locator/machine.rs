use super::cache::{parse_location, DiscoveredDevice, DiscoveryCache};
use crate::codec::{HeaderMap, SsdpRequest, WireEncode, METHOD_SEARCH};
use crate::error::{Result, SsdpError};
use crate::events::Subscribers;
use crate::logging::{LogLevel, SsdpLogger};
use crate::publisher::search::MAN_DISCOVER;
use crate::publisher::SSDP_ALL;
use crate::runtime::config::LocatorConfig;
use crate::transport::{Endpoint, RequestReceived, ResponseReceived, SsdpCommunicationsServer};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

const COMPONENT: &str = "Locator";

/// Shortest non-zero search wait accepted.
pub const MIN_SEARCH_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum LocatorEvent {
    DeviceAvailable { device: DiscoveredDevice, is_new_device: bool },
    DeviceUnavailable { device: DiscoveredDevice, expired: bool },
}

struct LocatorInner {
    comms: Arc<SsdpCommunicationsServer>,
    config: LocatorConfig,
    cache: DiscoveryCache,
    filter: RwLock<Option<String>>,
    /// Results of the search in progress, if any.
    search_results: Mutex<Option<Vec<DiscoveredDevice>>>,
    listening: Mutex<Option<CancellationToken>>,
    events: Subscribers<LocatorEvent>,
    cancel: CancellationToken,
    logger: Arc<dyn SsdpLogger>,
}

/// Finds devices on the network, passively through their notifications or
/// actively with M-SEARCH, and keeps them in a cache until they expire.
pub struct SsdpDeviceLocator {
    inner: Arc<LocatorInner>,
}

/// Clears the in-progress marker even when the search future is dropped.
struct SearchGuard<'a> {
    inner: &'a LocatorInner,
}

impl Drop for SearchGuard<'_> {
    fn drop(&mut self) {
        *self.inner.search_results.lock() = None;
    }
}

impl SsdpDeviceLocator {
    pub fn new(
        comms: Arc<SsdpCommunicationsServer>,
        config: LocatorConfig,
        logger: Arc<dyn SsdpLogger>,
    ) -> Result<Self> {
        config.validate()?;
        let requests = comms.subscribe_requests();
        let responses = comms.subscribe_responses();

        let inner = Arc::new(LocatorInner {
            comms,
            filter: RwLock::new(config.notification_filter.clone()),
            config,
            cache: DiscoveryCache::new(),
            search_results: Mutex::new(None),
            listening: Mutex::new(None),
            events: Subscribers::new(),
            cancel: CancellationToken::new(),
            logger,
        });
        tokio::spawn(consume_messages(inner.clone(), requests, responses));

        Ok(SsdpDeviceLocator { inner })
    }

    pub fn subscribe(&self) -> UnboundedReceiver<LocatorEvent> {
        self.inner.events.subscribe()
    }

    pub fn notification_filter(&self) -> Option<String> {
        self.inner.filter.read().clone()
    }

    /// Restricts events and search results to one notification type.
    /// `None` or `ssdp:all` accepts everything.
    pub fn set_notification_filter(&self, filter: Option<String>) {
        *self.inner.filter.write() = filter;
    }

    /// Joins the multicast group and processes alive/byebye notifications.
    pub fn start_listening_for_notifications(&self) -> Result<()> {
        self.inner.throw_if_disposed()?;
        self.inner.comms.begin_listening_for_broadcasts()?;

        let mut listening = self.inner.listening.lock();
        if listening.is_some() {
            return Ok(());
        }
        let stop = self.inner.cancel.child_token();
        *listening = Some(stop.clone());
        drop(listening);

        tokio::spawn(expiry_sweep(self.inner.clone(), stop));
        self.inner.logger.log(LogLevel::Info, COMPONENT, "Listening for notifications");
        Ok(())
    }

    /// Stops processing notifications outside of searches.
    pub fn stop_listening_for_notifications(&self) -> Result<()> {
        self.inner.throw_if_disposed()?;
        if let Some(stop) = self.inner.listening.lock().take() {
            stop.cancel();
            self.inner.logger.log(LogLevel::Info, COMPONENT, "Stopped listening for notifications");
        }
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.inner.is_listening()
    }

    pub fn is_searching(&self) -> bool {
        self.inner.search_results.lock().is_some()
    }

    /// Searches for `ssdp:all` for the configured default wait.
    pub async fn search(&self) -> Result<Vec<DiscoveredDevice>> {
        self.search_with(SSDP_ALL, self.inner.config.default_search_wait()).await
    }

    pub async fn search_for(&self, search_target: &str) -> Result<Vec<DiscoveredDevice>> {
        self.search_with(search_target, self.inner.config.default_search_wait()).await
    }

    /// Broadcasts an M-SEARCH for `search_target` and collects answers for `wait`.
    ///
    /// A zero `wait` sends nothing and returns unexpired cached devices.
    /// Waits below one second are rejected, as is a search while another runs.
    pub async fn search_with(&self, search_target: &str, wait: Duration) -> Result<Vec<DiscoveredDevice>> {
        if search_target.trim().is_empty() {
            return Err(SsdpError::argument("search target cannot be empty"));
        }
        if !wait.is_zero() && wait < MIN_SEARCH_WAIT {
            return Err(SsdpError::argument(
                "search wait must be zero (cache only) or at least one second",
            ));
        }
        self.inner.throw_if_disposed()?;

        {
            let mut results = self.inner.search_results.lock();
            if results.is_some() {
                return Err(SsdpError::InvalidOperation(
                    "a search is already in progress".to_string(),
                ));
            }
            *results = Some(Vec::new());
        }
        let _guard = SearchGuard { inner: &self.inner };

        if !wait.is_zero() {
            let request = build_search_request(self.inner.comms.multicast_endpoint(), search_target, search_mx(wait));
            self.inner.comms.send_multicast(&request.to_bytes()).await?;
            self.inner.logger.log(
                LogLevel::Debug,
                COMPONENT,
                &format!("Searching for {} for {:?}", search_target, wait),
            );
        }

        for device in self.inner.cache.unexpired() {
            if self.inner.filter_matches(&device.notification_type) {
                self.inner.device_found(device, false);
            }
        }

        if !wait.is_zero() {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => return Err(SsdpError::Disposed("SsdpDeviceLocator")),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let results = self.inner.search_results.lock().take().unwrap_or_default();
        self.inner.remove_expired();
        Ok(results)
    }

    pub fn cached_devices(&self) -> Vec<DiscoveredDevice> {
        self.inner.cache.snapshot()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stops processing messages. No events are raised afterwards.
    pub fn dispose(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.listening.lock().take();
        self.inner.events.clear();
        self.inner.logger.log(LogLevel::Info, COMPONENT, "Disposed");
    }
}

impl Drop for SsdpDeviceLocator {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// MX sent for a search lasting `wait`: one second less, at least 1.
pub fn search_mx(wait: Duration) -> u64 {
    wait.as_secs().saturating_sub(1).max(1)
}

pub fn build_search_request(multicast: Endpoint, search_target: &str, mx: u64) -> SsdpRequest {
    let mut headers = HeaderMap::new();
    headers.append("HOST", multicast.to_string());
    headers.append("MAN", format!("\"{MAN_DISCOVER}\""));
    headers.append("MX", mx.to_string());
    headers.append("ST", search_target);
    SsdpRequest::new(METHOD_SEARCH, headers)
}

impl LocatorInner {
    fn throw_if_disposed(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SsdpError::Disposed("SsdpDeviceLocator"))
        } else {
            Ok(())
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.lock().is_some()
    }

    fn filter_matches(&self, notification_type: &str) -> bool {
        match self.filter.read().as_deref() {
            None => true,
            Some(filter) => filter == SSDP_ALL || filter == notification_type,
        }
    }

    fn raise(&self, event: LocatorEvent) {
        if !self.cancel.is_cancelled() {
            self.events.publish(event);
        }
    }

    fn handle_response(&self, event: ResponseReceived) {
        let message = &event.message;
        if !message.is_success() {
            return;
        }
        let (Some(usn), Some(target)) = (message.header("USN"), message.header("ST")) else {
            return;
        };
        self.add_or_update(usn, target, &message.headers, event.received_from);
    }

    fn handle_request(&self, event: RequestReceived) {
        let message = &event.message;
        if !message.is_notify() {
            return;
        }
        if !self.is_listening() && self.search_results.lock().is_none() {
            return;
        }
        let (Some(usn), Some(nt)) = (message.header("USN"), message.header("NT")) else {
            return;
        };

        match message.header("NTS") {
            Some(nts) if nts.eq_ignore_ascii_case("ssdp:alive") => {
                self.add_or_update(usn, nt, &message.headers, event.received_from)
            }
            Some(nts) if nts.eq_ignore_ascii_case("ssdp:byebye") => self.device_died(usn, nt, &message.headers),
            _ => {}
        }
    }

    fn add_or_update(&self, usn: &str, notification_type: &str, headers: &HeaderMap, from: Endpoint) {
        if usn.is_empty() || !self.filter_matches(notification_type) {
            return;
        }
        if parse_location(headers).is_none() {
            self.logger.log(
                LogLevel::Debug,
                COMPONENT,
                &format!("Ignoring {} from {}: no usable LOCATION", usn, from),
            );
            return;
        }

        let (device, is_new) = self
            .cache
            .upsert(DiscoveredDevice::from_headers(usn, notification_type, headers));
        if is_new {
            self.logger.log(LogLevel::Debug, COMPONENT, &format!("Discovered {} at {}", usn, from));
        }
        self.device_found(device, is_new);
    }

    fn device_found(&self, device: DiscoveredDevice, is_new_device: bool) {
        if let Some(results) = self.search_results.lock().as_mut() {
            match results.iter_mut().find(|d| d.usn == device.usn) {
                Some(existing) => *existing = device.clone(),
                None => results.push(device.clone()),
            }
        }
        self.raise(LocatorEvent::DeviceAvailable { device, is_new_device });
    }

    fn device_died(&self, usn: &str, notification_type: &str, headers: &HeaderMap) {
        if !self.filter_matches(notification_type) {
            return;
        }
        let device = self.cache.remove(usn).unwrap_or_else(|| {
            let mut synthetic = DiscoveredDevice::new(usn, notification_type);
            synthetic.response_headers = headers.clone();
            synthetic
        });
        if let Some(results) = self.search_results.lock().as_mut() {
            results.retain(|d| d.usn != usn);
        }
        self.logger.log(LogLevel::Debug, COMPONENT, &format!("{} said byebye", usn));
        self.raise(LocatorEvent::DeviceUnavailable { device, expired: false });
    }

    fn remove_expired(&self) {
        for device in self.cache.remove_expired() {
            self.raise(LocatorEvent::DeviceUnavailable { device, expired: true });
        }
    }
}

async fn consume_messages(
    inner: Arc<LocatorInner>,
    mut requests: UnboundedReceiver<RequestReceived>,
    mut responses: UnboundedReceiver<ResponseReceived>,
) {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => inner.handle_request(request),
                None => break,
            },
            response = responses.recv() => match response {
                Some(response) => inner.handle_response(response),
                None => break,
            },
        }
    }
}

async fn expiry_sweep(inner: Arc<LocatorInner>, stop: CancellationToken) {
    let period = inner.config.expiry_sweep_interval();
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(period) => inner.remove_expired(),
        }
    }
}
