use crate::codec::HeaderMap;
use crate::error::{Result, SsdpError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Debug)]
struct CachedDescription {
    location: Url,
    body: String,
    valid_until: Instant,
}

/// A device seen through an alive notification or a search response.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub usn: String,
    pub notification_type: String,
    pub description_location: Option<Url>,
    /// Zero means the entry must always be re-verified.
    pub cache_lifetime: Duration,
    pub as_at: Instant,
    pub response_headers: HeaderMap,
    description: Arc<tokio::sync::Mutex<Option<CachedDescription>>>,
}

impl DiscoveredDevice {
    pub fn new(usn: &str, notification_type: &str) -> Self {
        DiscoveredDevice {
            usn: usn.to_string(),
            notification_type: notification_type.to_string(),
            description_location: None,
            cache_lifetime: Duration::ZERO,
            as_at: Instant::now(),
            response_headers: HeaderMap::new(),
            description: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Builds an entry from LOCATION and CACHE-CONTROL of a received message.
    pub fn from_headers(usn: &str, notification_type: &str, headers: &HeaderMap) -> Self {
        let mut device = DiscoveredDevice::new(usn, notification_type);
        device.description_location = parse_location(headers);
        device.cache_lifetime = parse_max_age(headers);
        device.response_headers = headers.clone();
        device
    }

    pub fn is_expired(&self) -> bool {
        self.cache_lifetime.is_zero() || Instant::now().saturating_duration_since(self.as_at) > self.cache_lifetime
    }

    /// Downloads the description document, reusing the last download until the entry expires.
    pub async fn fetch_description(&self, client: &reqwest::Client) -> Result<String> {
        let location = self
            .description_location
            .clone()
            .ok_or_else(|| SsdpError::InvalidOperation(format!("{} has no description location", self.usn)))?;

        let mut memo = self.description.lock().await;
        if let Some(cached) = memo.as_ref() {
            if cached.location == location && Instant::now() < cached.valid_until {
                return Ok(cached.body.clone());
            }
        }

        let body = client
            .get(location.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        *memo = if self.cache_lifetime.is_zero() {
            None
        } else {
            Some(CachedDescription {
                location,
                body: body.clone(),
                valid_until: self.as_at + self.cache_lifetime,
            })
        };
        Ok(body)
    }

    fn refresh_from(&mut self, newer: &DiscoveredDevice) {
        self.notification_type = newer.notification_type.clone();
        self.description_location = newer.description_location.clone();
        self.cache_lifetime = newer.cache_lifetime;
        self.as_at = newer.as_at;
        self.response_headers = newer.response_headers.clone();
    }
}

pub(crate) fn parse_location(headers: &HeaderMap) -> Option<Url> {
    headers
        .first("LOCATION")
        .and_then(|raw| Url::parse(raw.trim().trim_matches('"')).ok())
}

pub(crate) fn parse_max_age(headers: &HeaderMap) -> Duration {
    headers
        .get_all("CACHE-CONTROL")
        .unwrap_or_default()
        .iter()
        .flat_map(|value| value.split(','))
        .find_map(|value| {
            let (name, secs) = value.split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("max-age") {
                return None;
            }
            secs.trim().trim_matches('"').parse::<u64>().ok()
        })
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
}

/// Discovered devices keyed by USN.
#[derive(Default)]
pub struct DiscoveryCache {
    entries: Mutex<HashMap<String, DiscoveredDevice>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes the entry for `device.usn`.
    /// Returns the stored entry and whether it was new.
    pub fn upsert(&self, device: DiscoveredDevice) -> (DiscoveredDevice, bool) {
        let mut entries = self.entries.lock();
        match entries.get_mut(&device.usn) {
            Some(existing) => {
                existing.refresh_from(&device);
                (existing.clone(), false)
            }
            None => {
                entries.insert(device.usn.clone(), device.clone());
                (device, true)
            }
        }
    }

    pub fn remove(&self, usn: &str) -> Option<DiscoveredDevice> {
        self.entries.lock().remove(usn)
    }

    pub fn get(&self, usn: &str) -> Option<DiscoveredDevice> {
        self.entries.lock().get(usn).cloned()
    }

    pub fn snapshot(&self) -> Vec<DiscoveredDevice> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn unexpired(&self) -> Vec<DiscoveredDevice> {
        self.entries.lock().values().filter(|d| !d.is_expired()).cloned().collect()
    }

    /// Drops expired entries and returns them.
    pub fn remove_expired(&self) -> Vec<DiscoveredDevice> {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .values()
            .filter(|d| d.is_expired())
            .map(|d| d.usn.clone())
            .collect();
        expired.iter().filter_map(|usn| entries.remove(usn)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
