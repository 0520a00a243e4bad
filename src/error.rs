use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CasterError>;

#[derive(Error, Debug)]
pub enum CasterError {
    #[error("No bindable port in {start}..{end}")]
    AllocationExhausted { start: u16, end: u32 },

    #[error("Port probe on {port} failed: {source}")]
    PortProbe {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoder unavailable: {0}")]
    TranscoderUnavailable(String),

    #[error("Transcoder error: {0}")]
    Transcoder(String),

    #[error("No local interface routes to {0}")]
    NetworkUnreachable(std::net::IpAddr),

    #[error("Device command '{command}' failed: {reason}")]
    DeviceCommand { command: &'static str, reason: String },

    #[error("Device command '{command}' timed out after {timeout:?}")]
    DeviceTimeout {
        command: &'static str,
        timeout: Duration,
    },

    #[error("Embedded server could not bind port {port}: {source}")]
    ServerBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Session already active ({0}); stop it first")]
    SessionActive(crate::SessionState),

    #[error("Play cancelled by stop")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CasterError {
    pub(crate) fn device(command: &'static str, reason: impl std::fmt::Display) -> Self {
        CasterError::DeviceCommand {
            command,
            reason: reason.to_string(),
        }
    }
}
