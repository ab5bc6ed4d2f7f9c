//! # Device Publisher
//!
//! Announces local UPnP devices on the network and answers M-SEARCH
//! requests for them.
//!
//! ## Behaviour
//!
//! - `add_device` broadcasts `ssdp:alive` for the device, its embedded
//!   devices and each distinct service type.
//! - `remove_device` broadcasts the matching `ssdp:byebye` messages.
//! - Alive messages are repeated at a random fraction of half the smallest
//!   cache lifetime.
//! - Searches are checked against the configured [`StandardsMode`], repeats
//!   from the same endpoint within 500ms are dropped, and answers are sent
//!   unicast after a random delay bounded by the request's MX.
//!
//! [`StandardsMode`]: crate::runtime::config::StandardsMode

pub mod machine;
pub mod messages;
pub mod rebroadcast;
pub mod search;

pub use machine::SsdpDevicePublisher;
pub use messages::{Notification, PNP_ROOT_DEVICE, SSDP_ALL, UPNP_ROOT_DEVICE};
