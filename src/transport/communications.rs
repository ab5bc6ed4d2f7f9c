//! Socket ownership, receive loops and message dispatch.
//!
//! The server owns one unicast socket (created on first send) and one
//! multicast socket (created by [`SsdpCommunicationsServer::begin_listening_for_broadcasts`]).
//! Each socket gets a receive loop; every datagram is decoded on its own task
//! and raised as a [`RequestReceived`] or [`ResponseReceived`] event.

use super::traits::{Endpoint, ReceivedDatagram, SocketFactory, SsdpSocket};
use super::SSDP_PORT;
use crate::codec::{self, SsdpRequest, SsdpResponse, WireDecode};
use crate::error::{Result, SsdpError};
use crate::events::Subscribers;
use crate::logging::{default_logger, LogLevel, SsdpLogger};
use crate::runtime::config::TransportConfig;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

const COMPONENT: &str = "Transport";

/// Pause after a receive error that is not a closed socket.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// A request (`METHOD * HTTP/1.1`) received from the network.
#[derive(Debug, Clone)]
pub struct RequestReceived {
    pub message: SsdpRequest,
    pub received_from: Endpoint,
}

/// A response (`HTTP/1.1 200 OK`) received from the network.
#[derive(Debug, Clone)]
pub struct ResponseReceived {
    pub message: SsdpResponse,
    pub received_from: Endpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketKind {
    Unicast,
    Multicast,
}

#[derive(Default)]
struct SocketSlot {
    socket: Option<Arc<dyn SsdpSocket>>,
    stop: Option<CancellationToken>,
}

impl SocketSlot {
    fn take(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.cancel();
        }
        self.socket = None;
    }
}

struct CommsInner {
    factory: Arc<dyn SocketFactory>,
    config: TransportConfig,
    unicast: Mutex<SocketSlot>,
    multicast: Mutex<SocketSlot>,
    requests: Subscribers<RequestReceived>,
    responses: Subscribers<ResponseReceived>,
    cancel: CancellationToken,
    logger: Arc<dyn SsdpLogger>,
}

pub struct SsdpCommunicationsServer {
    inner: Arc<CommsInner>,
}

impl SsdpCommunicationsServer {
    pub fn new(
        factory: Arc<dyn SocketFactory>,
        config: TransportConfig,
        logger: Arc<dyn SsdpLogger>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(SsdpCommunicationsServer {
            inner: Arc::new(CommsInner {
                factory,
                config,
                unicast: Mutex::new(SocketSlot::default()),
                multicast: Mutex::new(SocketSlot::default()),
                requests: Subscribers::new(),
                responses: Subscribers::new(),
                cancel: CancellationToken::new(),
                logger,
            }),
        })
    }

    pub fn with_defaults(factory: Arc<dyn SocketFactory>) -> Result<Self> {
        Self::new(factory, TransportConfig::default(), default_logger())
    }

    /// Group endpoint multicast messages are sent to (`239.255.255.250:1900` for IPv4).
    pub fn multicast_endpoint(&self) -> Endpoint {
        self.inner.multicast_endpoint()
    }

    pub fn subscribe_requests(&self) -> UnboundedReceiver<RequestReceived> {
        self.inner.requests.subscribe()
    }

    pub fn subscribe_responses(&self) -> UnboundedReceiver<ResponseReceived> {
        self.inner.responses.subscribe()
    }

    /// Joins the multicast group and starts its receive loop. Idempotent.
    pub fn begin_listening_for_broadcasts(&self) -> Result<()> {
        self.inner.ensure_listening(SocketKind::Multicast).map(|_| ())
    }

    /// Stops the multicast receive loop. The socket is not recreated afterwards.
    pub fn stop_listening_for_broadcasts(&self) -> Result<()> {
        self.inner.throw_if_disposed()?;
        self.inner.multicast.lock().take();
        self.inner.logger.log(LogLevel::Info, COMPONENT, "Stopped listening for broadcasts");
        Ok(())
    }

    pub fn is_listening_for_broadcasts(&self) -> bool {
        self.inner.multicast.lock().socket.is_some()
    }

    /// Unicast socket's local endpoint, creating the socket if needed.
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        let socket = self.inner.ensure_listening(SocketKind::Unicast)?;
        Ok(socket.local_endpoint()?)
    }

    pub async fn send_unicast(&self, data: &[u8], destination: Endpoint) -> Result<()> {
        let socket = self.inner.ensure_listening(SocketKind::Unicast)?;
        socket.send_to(data, destination).await?;
        Ok(())
    }

    /// Sends to the multicast group through the unicast socket.
    pub async fn send_multicast(&self, data: &[u8]) -> Result<()> {
        let destination = self.multicast_endpoint();
        self.send_unicast(data, destination).await
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stops both receive loops and releases the sockets.
    pub fn dispose(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.unicast.lock().take();
        self.inner.multicast.lock().take();
        self.inner.requests.clear();
        self.inner.responses.clear();
        self.inner.logger.log(LogLevel::Info, COMPONENT, "Disposed");
    }
}

impl Drop for SsdpCommunicationsServer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl CommsInner {
    fn throw_if_disposed(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SsdpError::Disposed("SsdpCommunicationsServer"))
        } else {
            Ok(())
        }
    }

    fn multicast_endpoint(&self) -> Endpoint {
        Endpoint::new(self.config.multicast_group(), SSDP_PORT)
    }

    fn slot(&self, kind: SocketKind) -> &Mutex<SocketSlot> {
        match kind {
            SocketKind::Unicast => &self.unicast,
            SocketKind::Multicast => &self.multicast,
        }
    }

    fn create_socket(&self, kind: SocketKind) -> std::io::Result<Arc<dyn SsdpSocket>> {
        match kind {
            SocketKind::Unicast => {
                let local = Endpoint::new(
                    self.config.local_ip.unwrap_or_else(|| self.config.unspecified_address()),
                    self.config.local_port,
                );
                self.factory.create_unicast_socket(local, self.config.multicast_ttl)
            }
            SocketKind::Multicast => self.factory.create_multicast_socket(
                self.multicast_endpoint(),
                self.config.local_ip,
                self.config.multicast_ttl,
            ),
        }
    }

    /// Returns the socket of `kind`, creating it and its receive loop if needed.
    fn ensure_listening(self: &Arc<Self>, kind: SocketKind) -> Result<Arc<dyn SsdpSocket>> {
        self.throw_if_disposed()?;

        let mut slot = self.slot(kind).lock();
        if let Some(socket) = &slot.socket {
            return Ok(socket.clone());
        }

        let socket = self.create_socket(kind)?;
        let stop = self.cancel.child_token();
        slot.socket = Some(socket.clone());
        slot.stop = Some(stop.clone());
        drop(slot);

        self.logger.log(LogLevel::Debug, COMPONENT, &format!("Listening on {:?} socket", kind));
        tokio::spawn(listen(self.clone(), kind, socket.clone(), stop));
        Ok(socket)
    }

    /// Replaces a socket whose receive failed as closed, unless the loop was stopped.
    fn recreate(&self, kind: SocketKind, stop: &CancellationToken) -> Option<Arc<dyn SsdpSocket>> {
        if stop.is_cancelled() {
            return None;
        }
        let socket = match self.create_socket(kind) {
            Ok(socket) => socket,
            Err(e) => {
                self.logger.log(
                    LogLevel::Error,
                    COMPONENT,
                    &format!("Failed to recreate {:?} socket: {}", kind, e),
                );
                return None;
            }
        };

        let mut slot = self.slot(kind).lock();
        if stop.is_cancelled() {
            return None;
        }
        slot.socket = Some(socket.clone());
        Some(socket)
    }

    fn process_datagram(&self, datagram: ReceivedDatagram) {
        if self.cancel.is_cancelled() {
            return;
        }
        let text = String::from_utf8_lossy(datagram.data());

        #[cfg(feature = "packet-dump")]
        self.logger.log(
            LogLevel::Debug,
            COMPONENT,
            &format!("Datagram from {}:\n{}", datagram.from, text),
        );

        if codec::is_response_text(&text) {
            match SsdpResponse::decode(&text) {
                Ok(message) => {
                    self.responses.publish(ResponseReceived {
                        message,
                        received_from: datagram.from,
                    });
                }
                Err(e) => self.logger.log(
                    LogLevel::Debug,
                    COMPONENT,
                    &format!("Dropping malformed response from {}: {}", datagram.from, e),
                ),
            }
            return;
        }

        match SsdpRequest::decode(&text) {
            // Other request targets are reserved for future use.
            Ok(message) if message.target != "*" => self.logger.log(
                LogLevel::Debug,
                COMPONENT,
                &format!("Ignoring request for target {:?} from {}", message.target, datagram.from),
            ),
            Ok(message) => {
                self.requests.publish(RequestReceived {
                    message,
                    received_from: datagram.from,
                });
            }
            Err(e) => self.logger.log(
                LogLevel::Debug,
                COMPONENT,
                &format!("Dropping malformed request from {}: {}", datagram.from, e),
            ),
        }
    }
}

fn is_socket_closed(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::ConnectionAborted | ErrorKind::NotConnected)
}

async fn listen(
    inner: Arc<CommsInner>,
    kind: SocketKind,
    mut socket: Arc<dyn SsdpSocket>,
    stop: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = stop.cancelled() => break,
            received = socket.receive() => received,
        };

        match received {
            Ok(datagram) => {
                let inner = inner.clone();
                tokio::spawn(async move { inner.process_datagram(datagram) });
            }
            Err(e) if is_socket_closed(&e) => match inner.recreate(kind, &stop) {
                Some(replacement) => {
                    inner.logger.log(
                        LogLevel::Warn,
                        COMPONENT,
                        &format!("{:?} socket closed ({}), recreated", kind, e),
                    );
                    socket = replacement;
                }
                None => break,
            },
            Err(e) => {
                inner.logger.log(LogLevel::Debug, COMPONENT, &format!("Receive error: {}", e));
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                }
            }
        }
    }
    inner.logger.log(LogLevel::Debug, COMPONENT, &format!("{:?} receive loop finished", kind));
}
