use super::messages::{service_targets, tree_targets, MessageBuilder, Notification};
use super::rebroadcast::{first_delay, min_nonzero_cache_lifetime, rebroadcast_interval};
use super::search::{evaluate, matching_targets, response_delay, SearchDedupe};
use crate::codec::WireEncode;
use crate::device::{DeviceTreeEvent, SsdpDevice};
use crate::error::{Result, SsdpError};
use crate::logging::{LogLevel, SsdpLogger};
use crate::runtime::config::PublisherConfig;
use crate::transport::{Endpoint, RequestReceived, SsdpCommunicationsServer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const COMPONENT: &str = "Publisher";

struct PublishedDevice {
    device: Arc<SsdpDevice>,
    watcher: CancellationToken,
}

struct RebroadcastTimer {
    stop: CancellationToken,
    deadline: Instant,
}

#[derive(Default)]
struct PublisherState {
    devices: Vec<PublishedDevice>,
    min_cache_lifetime: Duration,
    rebroadcast: Option<RebroadcastTimer>,
}

struct PublisherInner {
    comms: Arc<SsdpCommunicationsServer>,
    config: PublisherConfig,
    messages: MessageBuilder,
    state: Mutex<PublisherState>,
    dedupe: Mutex<SearchDedupe>,
    cancel: CancellationToken,
    logger: Arc<dyn SsdpLogger>,
}

/// Announces published root devices and answers searches for them.
///
/// Adding a device broadcasts `ssdp:alive` for its whole tree and keeps
/// re-announcing it before its cache lifetime runs out. Removing it
/// broadcasts `ssdp:byebye`. Search requests received through the shared
/// communications server are answered after a random delay.
pub struct SsdpDevicePublisher {
    inner: Arc<PublisherInner>,
}

impl SsdpDevicePublisher {
    pub fn new(
        comms: Arc<SsdpCommunicationsServer>,
        config: PublisherConfig,
        logger: Arc<dyn SsdpLogger>,
    ) -> Result<Self> {
        config.validate()?;
        let messages = MessageBuilder::new(comms.multicast_endpoint(), config.server_header());
        let requests = comms.subscribe_requests();
        comms.begin_listening_for_broadcasts()?;

        let inner = Arc::new(PublisherInner {
            comms,
            config,
            messages,
            state: Mutex::new(PublisherState::default()),
            dedupe: Mutex::new(SearchDedupe::new()),
            cancel: CancellationToken::new(),
            logger,
        });
        tokio::spawn(consume_requests(inner.clone(), requests));

        Ok(SsdpDevicePublisher { inner })
    }

    /// Publishes a root device. Adding a device that is already published does nothing.
    pub async fn add_device(&self, device: Arc<SsdpDevice>) -> Result<()> {
        self.inner.throw_if_disposed()?;
        if !device.is_root() {
            return Err(SsdpError::argument(format!(
                "{} is not a root device; publish its root instead",
                device.udn()
            )));
        }

        let (events, watcher) = {
            let mut state = self.inner.state.lock();
            if state.devices.iter().any(|p| Arc::ptr_eq(&p.device, &device)) {
                return Ok(());
            }
            let watcher = self.inner.cancel.child_token();
            let events = device.subscribe();
            state.devices.push(PublishedDevice {
                device: device.clone(),
                watcher: watcher.clone(),
            });
            self.inner.reschedule_rebroadcast(&mut state);
            (events, watcher)
        };

        self.inner.logger.log(
            LogLevel::Info,
            COMPONENT,
            &format!("Publishing {} ({})", device.udn(), device.full_device_type()),
        );
        tokio::spawn(watch_device(self.inner.clone(), events, watcher));

        self.inner.send_alive(&tree_targets(&device, self.inner.config.support_pnp_root_device)).await
    }

    /// Withdraws a published device. Removing an unknown device does nothing.
    pub async fn remove_device(&self, device: &Arc<SsdpDevice>) -> Result<()> {
        self.inner.throw_if_disposed()?;

        let removed = {
            let mut state = self.inner.state.lock();
            match state.devices.iter().position(|p| Arc::ptr_eq(&p.device, device)) {
                Some(idx) => {
                    let published = state.devices.remove(idx);
                    published.watcher.cancel();
                    self.inner.reschedule_rebroadcast(&mut state);
                    true
                }
                None => false,
            }
        };
        if !removed {
            return Ok(());
        }

        self.inner.logger.log(LogLevel::Info, COMPONENT, &format!("Withdrawing {}", device.udn()));
        self.inner.send_byebye(&tree_targets(device, self.inner.config.support_pnp_root_device)).await
    }

    pub fn devices(&self) -> Vec<Arc<SsdpDevice>> {
        self.inner.devices()
    }

    /// Smallest non-zero cache lifetime among published devices.
    pub fn min_cache_lifetime(&self) -> Duration {
        self.inner.state.lock().min_cache_lifetime
    }

    pub fn is_rebroadcasting(&self) -> bool {
        self.inner.state.lock().rebroadcast.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stops answering searches and re-announcing. No byebye is sent.
    pub fn dispose(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        let mut state = self.inner.state.lock();
        state.devices.clear();
        state.rebroadcast = None;
        drop(state);
        self.inner.logger.log(LogLevel::Info, COMPONENT, "Disposed");
    }
}

impl Drop for SsdpDevicePublisher {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl PublisherInner {
    fn throw_if_disposed(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SsdpError::Disposed("SsdpDevicePublisher"))
        } else {
            Ok(())
        }
    }

    fn devices(&self) -> Vec<Arc<SsdpDevice>> {
        self.state.lock().devices.iter().map(|p| p.device.clone()).collect()
    }

    /// Restarts the rebroadcast timer when the minimum cache lifetime changed.
    /// A pending broadcast keeps its deadline unless the new interval is shorter.
    fn reschedule_rebroadcast(self: &Arc<Self>, state: &mut PublisherState) {
        let min = min_nonzero_cache_lifetime(state.devices.iter().map(|p| &p.device));
        if min == state.min_cache_lifetime {
            return;
        }
        let pending = state.rebroadcast.take().map(|timer| {
            timer.stop.cancel();
            timer.deadline
        });
        state.min_cache_lifetime = min;
        if min.is_zero() {
            self.logger.log(LogLevel::Debug, COMPONENT, "Rebroadcast disabled");
            return;
        }

        let now = Instant::now();
        let interval = rebroadcast_interval(min);
        let delay = first_delay(interval, pending, now);
        let deadline = now + delay;
        let stop = self.cancel.child_token();
        state.rebroadcast = Some(RebroadcastTimer {
            stop: stop.clone(),
            deadline,
        });

        self.logger.log(
            LogLevel::Debug,
            COMPONENT,
            &format!("Rebroadcasting every {:?}, next in {:?}", interval, delay),
        );
        tokio::spawn(rebroadcast_loop(self.clone(), deadline, interval, stop));
    }

    async fn send_all_alive(&self) {
        for device in self.devices() {
            let targets = tree_targets(&device, self.config.support_pnp_root_device);
            if let Err(e) = self.send_alive(&targets).await {
                self.logger.log(
                    LogLevel::Warn,
                    COMPONENT,
                    &format!("Alive rebroadcast for {} failed: {}", device.udn(), e),
                );
            }
        }
    }

    async fn send_alive(&self, targets: &[Notification]) -> Result<()> {
        for target in targets {
            if self.cancel.is_cancelled() {
                break;
            }
            let message = self.messages.alive(target);
            self.comms.send_multicast(&message.to_bytes()).await?;
        }
        Ok(())
    }

    async fn send_byebye(&self, targets: &[Notification]) -> Result<()> {
        for target in targets {
            if self.cancel.is_cancelled() {
                break;
            }
            let message = self.messages.byebye(target);
            self.comms.send_multicast(&message.to_bytes()).await?;
        }
        Ok(())
    }

    fn handle_search(self: &Arc<Self>, event: RequestReceived) {
        let search = match evaluate(&event.message, self.config.standards_mode) {
            Ok(search) => search,
            Err(reason) => {
                self.logger.log(
                    LogLevel::Debug,
                    COMPONENT,
                    &format!("Ignoring search from {}: {}", event.received_from, reason),
                );
                return;
            }
        };

        let duplicate = self
            .dedupe
            .lock()
            .is_duplicate(&search.search_target, event.received_from, Instant::now());
        if duplicate {
            self.logger.log(
                LogLevel::Debug,
                COMPONENT,
                &format!("Duplicate search for {} from {}", search.search_target, event.received_from),
            );
            return;
        }

        let delay = response_delay(search.mx);
        let inner = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    inner.send_search_responses(&search.search_target, event.received_from).await;
                }
            }
        });
    }

    async fn send_search_responses(&self, search_target: &str, destination: Endpoint) {
        let responses = matching_targets(&self.devices(), search_target, self.config.support_pnp_root_device);
        for response in &responses {
            if self.cancel.is_cancelled() {
                return;
            }
            let message = self.messages.search_response(response);
            if let Err(e) = self.comms.send_unicast(&message.to_bytes(), destination).await {
                self.logger.log(
                    LogLevel::Warn,
                    COMPONENT,
                    &format!("Search response to {} failed: {}", destination, e),
                );
                return;
            }
        }
        if !responses.is_empty() {
            self.logger.log(
                LogLevel::Debug,
                COMPONENT,
                &format!("Sent {} responses for {} to {}", responses.len(), search_target, destination),
            );
        }
    }

    async fn handle_tree_event(&self, event: DeviceTreeEvent) -> Result<()> {
        let pnp = self.config.support_pnp_root_device;
        match event {
            DeviceTreeEvent::DeviceAdded { device, .. } => self.send_alive(&tree_targets(&device, pnp)).await,
            DeviceTreeEvent::DeviceRemoved { device, .. } => self.send_byebye(&tree_targets(&device, pnp)).await,
            DeviceTreeEvent::ServiceAdded { device, service } => {
                let targets = service_targets(&device);
                let added: Vec<Notification> = targets
                    .into_iter()
                    .filter(|n| n.target == service.full_service_type())
                    .collect();
                self.send_alive(&added).await
            }
            DeviceTreeEvent::ServiceRemoved { device, service } => {
                let service_type = service.full_service_type();
                // Another service of the same type keeps the type announced.
                if device.services().iter().any(|s| s.full_service_type() == service_type) {
                    return Ok(());
                }
                let usn = format!("{}::{}", device.udn(), service_type);
                self.send_byebye(&[Notification {
                    device,
                    target: service_type,
                    usn,
                }])
                .await
            }
        }
    }
}

async fn consume_requests(inner: Arc<PublisherInner>, mut requests: UnboundedReceiver<RequestReceived>) {
    loop {
        let event = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            event = requests.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if event.message.is_search() {
            inner.handle_search(event);
        }
    }
}

async fn watch_device(
    inner: Arc<PublisherInner>,
    mut events: UnboundedReceiver<DeviceTreeEvent>,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if let Err(e) = inner.handle_tree_event(event).await {
            inner.logger.log(LogLevel::Warn, COMPONENT, &format!("Device tree update failed: {}", e));
        }
    }
}

async fn rebroadcast_loop(inner: Arc<PublisherInner>, first: Instant, interval: Duration, stop: CancellationToken) {
    let mut deadline = first;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {}
        }
        inner.send_all_alive().await;
        deadline = Instant::now() + interval;

        // The token is cancelled under this lock when the timer is replaced.
        let replaced = {
            let mut state = inner.state.lock();
            match state.rebroadcast.as_mut() {
                Some(timer) if !stop.is_cancelled() => {
                    timer.deadline = deadline;
                    false
                }
                _ => true,
            }
        };
        if replaced {
            break;
        }
    }
}
