use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::media::transcode::TranscodingParameters;
use crate::{CasterError, Result};

/// Default Media Receiver app on Cast devices.
pub const DEFAULT_APP_ID: &str = "CC1AD845";
/// Port the embedded server tries first.
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_PORT_SCAN_LIMIT: u16 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasterConfig {
    pub base_port: u16,
    pub port_scan_limit: u16,
    pub device_timeout_secs: u64,
    pub app_id: String,
    pub transcoding_parameters: TranscodingParameters,
    /// Explicit VLC binary, skips the platform search
    pub transcoder_path: Option<PathBuf>,
}

impl Default for CasterConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_HTTP_PORT,
            port_scan_limit: DEFAULT_PORT_SCAN_LIMIT,
            device_timeout_secs: 10,
            app_id: DEFAULT_APP_ID.to_string(),
            transcoding_parameters: TranscodingParameters::default(),
            transcoder_path: None,
        }
    }
}

impl CasterConfig {
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("is", "8b", "cast-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => p,
            None => return Ok(Self::default()),
        };

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_port == 0 {
            return Err(CasterError::Config("base_port must be a fixed port, not 0".into()));
        }
        if self.port_scan_limit == 0 {
            return Err(CasterError::Config("port_scan_limit must be at least 1".into()));
        }
        if self.device_timeout_secs == 0 {
            return Err(CasterError::Config("device_timeout_secs must be at least 1".into()));
        }
        if self.app_id.trim().is_empty() {
            return Err(CasterError::Config("app_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_secs)
    }
}
