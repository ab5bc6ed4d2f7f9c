#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rssdp::logging::{LogLevel, SsdpLogger};
use rssdp::transport::{Endpoint, ReceivedDatagram, SocketFactory, SsdpSocket};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const GROUP: Endpoint = Endpoint::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 1900);

#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub from: Endpoint,
    pub to: Endpoint,
    pub text: String,
    pub at: Instant,
}

impl SentDatagram {
    /// Value of the first header called `name`, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.text.lines().skip(1).find_map(|line| {
            let (n, v) = line.split_once(':')?;
            n.trim().eq_ignore_ascii_case(name).then(|| v.trim().to_string())
        })
    }

    pub fn is_alive(&self) -> bool {
        self.text.starts_with("NOTIFY") && self.header("NTS").as_deref() == Some("ssdp:alive")
    }

    pub fn is_byebye(&self) -> bool {
        self.text.starts_with("NOTIFY") && self.header("NTS").as_deref() == Some("ssdp:byebye")
    }

    pub fn is_search(&self) -> bool {
        self.text.starts_with("M-SEARCH")
    }

    pub fn is_response(&self) -> bool {
        self.text.starts_with("HTTP/1.1 200")
    }
}

type Delivery = io::Result<ReceivedDatagram>;

pub struct MockSocket {
    local: Endpoint,
    group: Option<Endpoint>,
    tx: mpsc::UnboundedSender<Delivery>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    network: Weak<NetworkInner>,
}

impl MockSocket {
    fn deliver(&self, data: &[u8], from: Endpoint) {
        let _ = self.tx.send(Ok(ReceivedDatagram::new(data.to_vec(), data.len(), from)));
    }

    pub fn fail(&self, kind: io::ErrorKind) {
        let _ = self.tx.send(Err(io::Error::from(kind)));
    }
}

#[async_trait]
impl SsdpSocket for MockSocket {
    async fn receive(&self) -> io::Result<ReceivedDatagram> {
        match self.rx.lock().await.recv().await {
            Some(delivery) => delivery,
            None => Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
        }
    }

    async fn send_to(&self, data: &[u8], destination: Endpoint) -> io::Result<()> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        network.route(data, self.local, destination);
        Ok(())
    }

    fn local_endpoint(&self) -> io::Result<Endpoint> {
        Ok(self.local)
    }
}

#[derive(Default)]
pub struct NetworkInner {
    sockets: Mutex<Vec<Weak<MockSocket>>>,
    sent: Mutex<Vec<SentDatagram>>,
    next_port: AtomicU16,
}

impl NetworkInner {
    fn live_sockets(&self) -> Vec<Arc<MockSocket>> {
        let mut sockets = self.sockets.lock();
        sockets.retain(|s| s.strong_count() > 0);
        sockets.iter().filter_map(Weak::upgrade).collect()
    }

    fn route(&self, data: &[u8], from: Endpoint, to: Endpoint) {
        self.sent.lock().push(SentDatagram {
            from,
            to,
            text: String::from_utf8_lossy(data).into_owned(),
            at: Instant::now(),
        });
        for socket in self.live_sockets() {
            let hit = if to.address().is_multicast() {
                socket.group == Some(to)
            } else {
                socket.group.is_none() && socket.local == to
            };
            if hit {
                socket.deliver(data, from);
            }
        }
    }
}

/// In-memory datagram network. Each node gets its own address.
#[derive(Clone)]
pub struct MockNetwork {
    inner: Arc<NetworkInner>,
}

impl MockNetwork {
    pub fn new() -> Self {
        let inner = NetworkInner {
            next_port: AtomicU16::new(50000),
            ..NetworkInner::default()
        };
        MockNetwork { inner: Arc::new(inner) }
    }

    pub fn node(&self, last_octet: u8) -> Arc<MockNode> {
        Arc::new(MockNode {
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)),
            network: self.inner.clone(),
            created_unicast: AtomicUsize::new(0),
            created_multicast: AtomicUsize::new(0),
            multicast: Mutex::new(Weak::new()),
        })
    }

    /// Sends raw text as if from a remote host.
    pub fn send(&self, from: Endpoint, to: Endpoint, text: &str) {
        self.inner.route(text.as_bytes(), from, to);
    }

    pub fn sent(&self) -> Vec<SentDatagram> {
        self.inner.sent.lock().clone()
    }

    pub fn sent_to(&self, to: Endpoint) -> Vec<SentDatagram> {
        self.sent().into_iter().filter(|d| d.to == to).collect()
    }

    pub fn clear_sent(&self) {
        self.inner.sent.lock().clear();
    }
}

/// Socket factory for one host on the mock network.
pub struct MockNode {
    pub address: IpAddr,
    network: Arc<NetworkInner>,
    pub created_unicast: AtomicUsize,
    pub created_multicast: AtomicUsize,
    multicast: Mutex<Weak<MockSocket>>,
}

impl MockNode {
    pub fn endpoint(&self, port: u16) -> Endpoint {
        Endpoint::new(self.address, port)
    }

    /// The newest multicast socket, if still alive.
    pub fn multicast_socket(&self) -> Option<Arc<MockSocket>> {
        self.multicast.lock().upgrade()
    }

    pub fn unicast_count(&self) -> usize {
        self.created_unicast.load(Ordering::SeqCst)
    }

    pub fn multicast_count(&self) -> usize {
        self.created_multicast.load(Ordering::SeqCst)
    }

    fn socket(&self, local: Endpoint, group: Option<Endpoint>) -> Arc<MockSocket> {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = Arc::new(MockSocket {
            local,
            group,
            tx,
            rx: tokio::sync::Mutex::new(rx),
            network: Arc::downgrade(&self.network),
        });
        self.network.sockets.lock().push(Arc::downgrade(&socket));
        socket
    }
}

impl SocketFactory for MockNode {
    fn create_unicast_socket(&self, local: Endpoint, _multicast_ttl: u32) -> io::Result<Arc<dyn SsdpSocket>> {
        let port = match local.port() {
            0 => self.network.next_port.fetch_add(1, Ordering::SeqCst),
            port => port,
        };
        self.created_unicast.fetch_add(1, Ordering::SeqCst);
        Ok(self.socket(Endpoint::new(self.address, port), None))
    }

    fn create_multicast_socket(
        &self,
        group: Endpoint,
        _interface: Option<IpAddr>,
        _multicast_ttl: u32,
    ) -> io::Result<Arc<dyn SsdpSocket>> {
        self.created_multicast.fetch_add(1, Ordering::SeqCst);
        let socket = self.socket(Endpoint::new(self.address, group.port()), Some(group));
        *self.multicast.lock() = Arc::downgrade(&socket);
        Ok(socket)
    }
}

/// Logger that keeps every line, for asserting on diagnostics.
#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Mutex<Vec<(LogLevel, String, String)>>,
}

impl SsdpLogger for RecordingLogger {
    fn log(&self, level: LogLevel, component: &str, msg: &str) {
        self.lines.lock().push((level, component.to_string(), msg.to_string()));
    }
}

impl RecordingLogger {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, _, msg)| msg.contains(needle))
    }
}

pub fn search_text(st: &str, mx: Option<&str>) -> String {
    let mut text = String::from("M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nMAN: \"ssdp:discover\"\r\n");
    if let Some(mx) = mx {
        text.push_str(&format!("MX: {mx}\r\n"));
    }
    text.push_str(&format!("ST: {st}\r\n\r\n"));
    text
}

pub fn alive_text(nt: &str, usn: &str, location: &str, max_age: u64) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nNT: {nt}\r\nNTS: ssdp:alive\r\nUSN: {usn}\r\n\
         LOCATION: {location}\r\nCACHE-CONTROL: public, max-age={max_age}\r\nSERVER: test/1.0 UPnP/1.0 test/1.0\r\n\r\n"
    )
}

pub fn byebye_text(nt: &str, usn: &str) -> String {
    format!("NOTIFY * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nNT: {nt}\r\nNTS: ssdp:byebye\r\nUSN: {usn}\r\n\r\n")
}

pub fn response_text(st: &str, usn: &str, location: &str, max_age: u64) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nEXT:\r\nCACHE-CONTROL: max-age={max_age}\r\nST: {st}\r\nUSN: {usn}\r\nLOCATION: {location}\r\n\r\n"
    )
}

/// Lets spawned tasks drain their queues. With paused time the clock only
/// moves once every task is idle.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}
