pub mod communications;
pub mod traits;
pub mod udp;

pub use communications::*;
pub use traits::*;
pub use udp::*;

use std::net::{Ipv4Addr, Ipv6Addr};

/// SSDP port shared by every multicast group.
pub const SSDP_PORT: u16 = 1900;

pub const SSDP_MULTICAST_V4: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_MULTICAST_V6_LINK_LOCAL: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x000c);
pub const SSDP_MULTICAST_V6_SITE_LOCAL: Ipv6Addr = Ipv6Addr::new(0xff05, 0, 0, 0, 0, 0, 0, 0x000c);
pub const SSDP_MULTICAST_V6_ADMIN_LOCAL: Ipv6Addr = Ipv6Addr::new(0xff04, 0, 0, 0, 0, 0, 0, 0x000c);
