pub mod chromecast;
pub mod locator;
pub mod ports;

pub use chromecast::{ChromecastClient, RemoteDeviceClient};
pub use locator::{NetworkLocator, RouteLocator};
pub use ports::{AllocatePort, PortAllocator};
