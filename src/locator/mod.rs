//! # Device Locator
//!
//! Discovers devices published by others.
//!
//! - Passive: [`SsdpDeviceLocator::start_listening_for_notifications`] tracks
//!   `ssdp:alive` / `ssdp:byebye` notifications and sweeps expired entries.
//! - Active: [`SsdpDeviceLocator::search_with`] broadcasts an M-SEARCH and
//!   merges the answers with unexpired cached devices.
//!
//! Changes are reported as [`LocatorEvent`]s. The cache is keyed by USN, so a
//! device refreshing itself updates its entry instead of adding another.

pub mod cache;
pub mod machine;

pub use cache::{DiscoveredDevice, DiscoveryCache};
pub use machine::{LocatorEvent, SsdpDeviceLocator, MIN_SEARCH_WAIT};
