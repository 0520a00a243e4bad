use std::str::FromStr;

use async_trait::async_trait;
use rust_cast::channels::media::{Media, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use rust_cast::CastDevice;
use tracing::{debug, info};

use crate::{CasterError, DeviceAddress, Result};

const RECEIVER_DESTINATION: &str = "receiver-0";

/// Control channel to the receiver.
///
/// Each call either succeeds or returns an error the controller logs; no
/// implementation retries on its own.
#[async_trait]
pub trait RemoteDeviceClient: Send + Sync {
    /// Stop whatever app the receiver is running. No running app is not an error.
    async fn stop_app(&self) -> Result<()>;

    async fn launch_app(&self, app_id: &str) -> Result<()>;

    /// Point the running app at `url`.
    async fn load(&self, url: &str, content_type: &str) -> Result<()>;
}

/// Cast v2 client over rust_cast.
///
/// rust_cast connections are blocking and not `Send`, so every command opens
/// its own connection on the blocking pool.
#[derive(Debug, Clone)]
pub struct ChromecastClient {
    device: DeviceAddress,
}

impl ChromecastClient {
    pub fn new(device: DeviceAddress) -> Self {
        Self { device }
    }

    pub fn device(&self) -> DeviceAddress {
        self.device
    }

    async fn run<T, F>(&self, command: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CastDevice<'_>) -> Result<T> + Send + 'static,
    {
        let device = self.device;
        tokio::task::spawn_blocking(move || {
            let cast_device =
                CastDevice::connect_without_host_verification(device.ip.to_string(), device.port)
                    .map_err(|e| CasterError::device(command, format!("connect to {}: {}", device, e)))?;
            cast_device
                .connection
                .connect(RECEIVER_DESTINATION)
                .map_err(|e| CasterError::device(command, e))?;
            op(&cast_device)
        })
        .await
        .map_err(|e| CasterError::device(command, format!("worker failed: {}", e)))?
    }
}

#[async_trait]
impl RemoteDeviceClient for ChromecastClient {
    async fn stop_app(&self) -> Result<()> {
        let stopped = self
            .run("stop_app", |cast| {
                let fail = |e: rust_cast::errors::Error| CasterError::device("stop_app", e);
                let status = cast.receiver.get_status().map_err(fail)?;
                let mut stopped = Vec::new();
                for app in status.applications {
                    cast.receiver.stop_app(app.session_id.clone()).map_err(fail)?;
                    stopped.push(app.app_id);
                }
                Ok(stopped)
            })
            .await?;

        if stopped.is_empty() {
            debug!("No app running on {}", self.device);
        } else {
            info!("Stopped {:?} on {}", stopped, self.device);
        }
        Ok(())
    }

    async fn launch_app(&self, app_id: &str) -> Result<()> {
        let app = CastDeviceApp::from_str(app_id)
            .unwrap_or_else(|_| CastDeviceApp::Custom(app_id.to_string()));

        let launched = self
            .run("launch_app", move |cast| {
                cast.receiver
                    .launch_app(&app)
                    .map_err(|e| CasterError::device("launch_app", e))
            })
            .await?;

        info!(
            "Launched {} on {} (session {})",
            launched.display_name, self.device, launched.session_id
        );
        Ok(())
    }

    async fn load(&self, url: &str, content_type: &str) -> Result<()> {
        let media = Media {
            content_id: url.to_string(),
            content_type: content_type.to_string(),
            stream_type: StreamType::Buffered,
            duration: None,
            metadata: None,
        };

        self.run("load", move |cast| {
            let fail = |e: rust_cast::errors::Error| CasterError::device("load", e);
            let status = cast.receiver.get_status().map_err(fail)?;
            let Some(app) = status.applications.into_iter().next() else {
                return Err(CasterError::device("load", "no running app to load media into"));
            };
            cast.connection.connect(app.transport_id.clone()).map_err(fail)?;
            cast.media
                .load(app.transport_id.clone(), app.session_id.clone(), &media)
                .map_err(fail)?;
            Ok(())
        })
        .await?;

        info!("Loaded {} on {}", url, self.device);
        Ok(())
    }
}
