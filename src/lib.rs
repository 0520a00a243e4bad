pub mod config;
pub mod error;
pub mod media;
pub mod network;
pub mod server;
pub mod session;

pub use config::CasterConfig;
pub use error::{CasterError, Result};
pub use media::{MediaTarget, MediaUrlBuilder};
pub use media::supervisor::{PlaybackListener, TranscodeEvent, TranscodingSupervisor};
pub use media::transcode::{SinkSpec, TranscodingParameters};
pub use network::{NetworkLocator, PortAllocator, RemoteDeviceClient};
pub use server::EmbeddedServer;
pub use session::{CastSessionController, SessionParts};

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default Cast v2 control port.
pub const DEFAULT_DEVICE_PORT: u16 = 8009;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastMode {
    /// Serve the file untouched from the embedded server
    #[default]
    Direct,
    /// Re-encode to webm and serve from the transcoder's own HTTP sink
    Transcoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Preparing,
    Launching,
    Playing,
    Stopped,
}

impl SessionState {
    /// Whether a new `play` may start from this state.
    pub fn accepts_play(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Preparing => "preparing",
            SessionState::Launching => "launching",
            SessionState::Playing => "playing",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a controller's session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastSession {
    pub id: Uuid,
    pub device: DeviceAddress,
    pub app_id: String,
    pub mode: CastMode,
    pub transcoding_parameters: TranscodingParameters,
    pub bound_port: Option<u16>,
    pub state: SessionState,
    pub last_known_duration_secs: Option<u64>,
    pub created_at: DateTime<Utc>,
}
