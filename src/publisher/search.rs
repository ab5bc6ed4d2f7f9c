//! M-SEARCH validation, duplicate suppression and target matching.

use super::messages::{device_targets, service_targets, Notification, PNP_ROOT_DEVICE, SSDP_ALL, UPNP_ROOT_DEVICE};
use crate::codec::SsdpRequest;
use crate::device::SsdpDevice;
use crate::runtime::config::StandardsMode;
use crate::transport::Endpoint;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const MAN_DISCOVER: &str = "ssdp:discover";

/// Largest MX honoured as sent. Larger values are replaced by a random one.
pub const MAX_MX: u32 = 120;

pub const MIN_RESPONSE_DELAY: Duration = Duration::from_millis(16);

/// Window in which a repeated (ST, endpoint) search is ignored.
pub const DUPLICATE_WINDOW: Duration = Duration::from_millis(500);

const DEDUPE_PRUNE_THRESHOLD: usize = 10;

/// A search request that should be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedSearch {
    pub search_target: String,
    pub mx: u32,
}

/// Checks an M-SEARCH against `mode`. Returns the reason when it must be ignored.
pub fn evaluate(request: &SsdpRequest, mode: StandardsMode) -> Result<AcceptedSearch, &'static str> {
    let search_target = request.header("ST").map(trim_quotes).unwrap_or_default();
    if search_target.is_empty() {
        return Err("missing search target");
    }

    if mode != StandardsMode::Relaxed {
        let man = request.header("MAN").map(trim_quotes).unwrap_or_default();
        if !man.eq_ignore_ascii_case(MAN_DISCOVER) {
            return Err("missing or invalid MAN header");
        }
    }

    let mx = match request.header("MX") {
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(mx) if mx <= 0 => return Err("non-positive MX"),
            Ok(mx) if mx > MAX_MX as i64 => rand::rng().random_range(0..=MAX_MX),
            Ok(mx) => mx as u32,
            Err(_) => return Err("non-numeric MX"),
        },
        None if mode == StandardsMode::Strict => return Err("missing MX header"),
        None => 1,
    };

    Ok(AcceptedSearch {
        search_target: search_target.to_string(),
        mx,
    })
}

/// Random delay in `[16ms, max(16ms, mx seconds)]`.
pub fn response_delay(mx: u32) -> Duration {
    let min = MIN_RESPONSE_DELAY.as_millis() as u64;
    let max = (mx as u64 * 1000).max(min);
    Duration::from_millis(rand::rng().random_range(min..=max))
}

fn has_prefix(value: &str, prefix: &str) -> bool {
    value.len() > prefix.len()
        && value
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn trim_quotes(value: &str) -> &str {
    value.trim().trim_matches('"').trim()
}

/// Recently answered (ST, endpoint) pairs.
#[derive(Debug, Default)]
pub struct SearchDedupe {
    recent: HashMap<(String, Endpoint), Instant>,
}

impl SearchDedupe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the request and reports whether it repeats one seen inside the window.
    pub fn is_duplicate(&mut self, search_target: &str, from: Endpoint, now: Instant) -> bool {
        let key = (search_target.to_string(), from);
        if let Some(last) = self.recent.get(&key) {
            if now.saturating_duration_since(*last) <= DUPLICATE_WINDOW {
                return true;
            }
            self.recent.insert(key, now);
            return false;
        }

        self.recent.insert(key, now);
        if self.recent.len() > DEDUPE_PRUNE_THRESHOLD {
            self.recent
                .retain(|_, seen| now.saturating_duration_since(*seen) <= DUPLICATE_WINDOW);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

/// Responses owed to `search_target` by the published root devices.
pub fn matching_targets(
    roots: &[Arc<SsdpDevice>],
    search_target: &str,
    support_pnp_root_device: bool,
) -> Vec<Notification> {
    let is_pnp_root = support_pnp_root_device && search_target.eq_ignore_ascii_case(PNP_ROOT_DEVICE);
    let mut responses = Vec::new();

    for root in roots {
        if search_target.eq_ignore_ascii_case(SSDP_ALL) {
            responses.extend(device_targets(root, support_pnp_root_device));
            for child in root.descendants() {
                responses.extend(device_targets(&child, support_pnp_root_device));
            }
            continue;
        }

        if search_target.eq_ignore_ascii_case(UPNP_ROOT_DEVICE) || is_pnp_root {
            let alias = if is_pnp_root { PNP_ROOT_DEVICE } else { UPNP_ROOT_DEVICE };
            responses.extend(
                device_targets(root, support_pnp_root_device)
                    .into_iter()
                    .filter(|n| n.target == alias),
            );
            continue;
        }

        let mut devices = vec![root.clone()];
        devices.extend(root.descendants());
        for device in devices {
            if let Some(found) = match_device(&device, search_target) {
                responses.push(found);
            }
        }
    }
    responses
}

fn match_device(device: &Arc<SsdpDevice>, search_target: &str) -> Option<Notification> {
    if has_prefix(search_target, "uuid:") {
        return device_targets(device, false)
            .into_iter()
            .find(|n| n.target == device.udn() && n.target.eq_ignore_ascii_case(search_target));
    }

    if has_prefix(search_target, "urn:") {
        let device_type = device.full_device_type();
        if device_type.eq_ignore_ascii_case(search_target) {
            return device_targets(device, false)
                .into_iter()
                .find(|n| n.target == device_type);
        }
        return service_targets(device)
            .into_iter()
            .find(|n| n.target.eq_ignore_ascii_case(search_target));
    }

    None
}
