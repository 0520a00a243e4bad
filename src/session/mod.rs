use std::future::Future;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::CasterConfig;
use crate::media::supervisor::{EngineLoader, PlaybackListener, TranscodingSupervisor};
use crate::media::transcode::{SinkSpec, TranscodingParameters};
use crate::media::vlc::VlcLoader;
use crate::media::{stream_content_type, MediaTarget};
use crate::network::{AllocatePort, ChromecastClient, NetworkLocator, PortAllocator, RemoteDeviceClient, RouteLocator};
use crate::server::{EmbeddedServer, HttpMediaServer};
use crate::{CastMode, CastSession, CasterError, DeviceAddress, Result, SessionState};

/// Collaborators a controller drives.
pub struct SessionParts {
    pub remote: Arc<dyn RemoteDeviceClient>,
    pub server: Box<dyn EmbeddedServer>,
    pub locator: Arc<dyn NetworkLocator>,
    pub ports: Arc<dyn AllocatePort>,
    pub engine_loader: Arc<dyn EngineLoader>,
}

impl SessionParts {
    /// Cast v2 remote, axum server, route probing and VLC.
    pub fn live(config: &CasterConfig, device: DeviceAddress) -> Self {
        Self {
            remote: Arc::new(ChromecastClient::new(device)),
            server: Box::new(HttpMediaServer::new()),
            locator: Arc::new(RouteLocator),
            ports: Arc::new(PortAllocator::new(config.port_scan_limit)),
            engine_loader: Arc::new(VlcLoader::new(config.transcoder_path.clone())),
        }
    }
}

struct SessionInner {
    device: DeviceAddress,
    mode: CastMode,
    state: SessionState,
    bound_port: Option<u16>,
    transcoding_parameters: TranscodingParameters,
    server: Box<dyn EmbeddedServer>,
    supervisor: TranscodingSupervisor,
}

pub struct CastSessionController {
    id: Uuid,
    created_at: chrono::DateTime<Utc>,
    app_id: String,
    base_port: u16,
    device_timeout: Duration,
    remote: Arc<dyn RemoteDeviceClient>,
    locator: Arc<dyn NetworkLocator>,
    ports: Arc<dyn AllocatePort>,
    listener: Option<Arc<dyn PlaybackListener>>,
    /// Bumped by every stop; a play that sees it move abandons its remaining steps.
    stop_epoch: AtomicU64,
    inner: Mutex<SessionInner>,
}

impl CastSessionController {
    pub fn new(config: &CasterConfig, device: DeviceAddress, parts: SessionParts) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            app_id: config.app_id.clone(),
            base_port: config.base_port,
            device_timeout: config.device_timeout(),
            remote: parts.remote,
            locator: parts.locator,
            ports: parts.ports,
            listener: None,
            stop_epoch: AtomicU64::new(0),
            inner: Mutex::new(SessionInner {
                device,
                mode: CastMode::default(),
                state: SessionState::Idle,
                bound_port: None,
                transcoding_parameters: config.transcoding_parameters.clone(),
                server: parts.server,
                supervisor: TranscodingSupervisor::new(parts.engine_loader),
            }),
        }
    }

    /// Controller wired to the real receiver, server and transcoder.
    pub fn connect(config: &CasterConfig, device: DeviceAddress) -> Self {
        Self::new(config, device, SessionParts::live(config, device))
    }

    pub fn with_listener(mut self, listener: Arc<dyn PlaybackListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> CastSession {
        let inner = self.inner.lock().await;
        CastSession {
            id: self.id,
            device: inner.device,
            app_id: self.app_id.clone(),
            mode: inner.mode,
            transcoding_parameters: inner.transcoding_parameters.clone(),
            bound_port: inner.bound_port,
            state: inner.state,
            last_known_duration_secs: inner.supervisor.duration_secs(),
            created_at: self.created_at,
        }
    }

    /// Replace the encoder options used by the next transcoding play.
    pub async fn set_transcoding_parameters(&self, parameters: TranscodingParameters) {
        self.inner.lock().await.transcoding_parameters = parameters;
    }

    /// Point the session at another receiver. Refused mid-cycle.
    pub async fn set_device(&self, device: DeviceAddress) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.accepts_play() {
            return Err(CasterError::SessionActive(inner.state));
        }
        inner.device = device;
        Ok(())
    }

    /// Start casting `file`. Returns the target handed to the receiver.
    ///
    /// Local failures abort before the receiver is contacted. A failed
    /// remote command leaves acquired resources for [`stop`](Self::stop).
    pub async fn play(&self, file: &Path, mode: CastMode) -> Result<MediaTarget> {
        let mut inner = self.inner.lock().await;
        // Only stops that queue up behind this play may cancel it.
        let epoch = self.stop_epoch.load(Ordering::SeqCst);

        if !inner.state.accepts_play() {
            warn!("play({}) refused: session is {}", file.display(), inner.state);
            return Err(CasterError::SessionActive(inner.state));
        }
        info!("play: {} ({:?}) on {}", file.display(), mode, inner.device);

        inner.mode = mode;
        inner.state = SessionState::Preparing;

        let Some(address) = self.locator.reachable_address_for(inner.device.ip) else {
            error!("Could not find a network interface routing to {}", inner.device.ip);
            inner.state = SessionState::Idle;
            return Err(CasterError::NetworkUnreachable(inner.device.ip));
        };

        let (target, port) = match self.acquire_local(&mut inner, file, mode, address).await {
            Ok(acquired) => acquired,
            Err(e) => {
                error!("Unable to prepare {}: {}", file.display(), e);
                inner.state = SessionState::Idle;
                return Err(e);
            }
        };
        debug!("mediaUrl={}", target.built_url);

        inner.state = SessionState::Launching;
        self.checkpoint(epoch)?;
        self.remote_command("stop_app", self.remote.stop_app()).await?;
        self.checkpoint(epoch)?;
        self.remote_command("launch_app", self.remote.launch_app(&self.app_id)).await?;
        self.checkpoint(epoch)?;

        if mode == CastMode::Transcoding {
            // Encoding is already in flight when the receiver asks for the sink.
            let sink = SinkSpec::new(inner.transcoding_parameters.clone(), port);
            if let Err(e) = inner.supervisor.start(file, &sink, self.listener.clone()) {
                error!("Error transcoding {}: {}", file.display(), e);
                return Err(e);
            }
            inner.bound_port = Some(port);
        }

        let content_type = target.content_type(mode);
        self.remote_command("load", self.remote.load(&target.built_url, &content_type))
            .await?;

        inner.state = SessionState::Playing;
        info!("Playing {} at {}", file.display(), target.built_url);
        Ok(target)
    }

    /// Cast a URL the receiver fetches on its own, such as a live stream.
    ///
    /// Nothing is served or transcoded locally, so no port is bound. Same
    /// remote policy as [`play`](Self::play).
    pub async fn stream(&self, url: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let epoch = self.stop_epoch.load(Ordering::SeqCst);

        if !inner.state.accepts_play() {
            warn!("stream({}) refused: session is {}", url, inner.state);
            return Err(CasterError::SessionActive(inner.state));
        }
        info!("stream: {} on {}", url, inner.device);

        inner.mode = CastMode::Direct;
        inner.state = SessionState::Launching;
        self.checkpoint(epoch)?;
        self.remote_command("stop_app", self.remote.stop_app()).await?;
        self.checkpoint(epoch)?;
        self.remote_command("launch_app", self.remote.launch_app(&self.app_id)).await?;
        self.checkpoint(epoch)?;

        let content_type = stream_content_type(url);
        self.remote_command("load", self.remote.load(url, &content_type))
            .await?;

        inner.state = SessionState::Playing;
        info!("Streaming {}", url);
        Ok(())
    }

    /// Stop the receiver app and release local resources.
    ///
    /// Never fails: the remote stop is best-effort and teardown runs
    /// regardless. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.stop_epoch.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        info!("stop: session on {} is {}", inner.device, inner.state);

        if let Err(e) = self.remote_command("stop_app", self.remote.stop_app()).await {
            warn!("Error stopping current application: {}", e);
        }

        match inner.mode {
            CastMode::Direct => inner.server.stop().await,
            CastMode::Transcoding => inner.supervisor.stop(),
        }
        inner.bound_port = None;
        inner.state = SessionState::Stopped;
    }

    /// Stops the receiver app, like the pause and resume controls have
    /// always done. Local playback state is left alone.
    pub async fn resume(&self) {
        if let Err(e) = self.remote_command("stop_app", self.remote.stop_app()).await {
            warn!("Error playing: {}", e);
        }
    }

    /// See [`resume`](Self::resume).
    pub async fn pause(&self) {
        debug!("pause");
        if let Err(e) = self.remote_command("stop_app", self.remote.stop_app()).await {
            warn!("Error pausing: {}", e);
        }
    }

    async fn acquire_local(
        &self,
        inner: &mut SessionInner,
        file: &Path,
        mode: CastMode,
        address: IpAddr,
    ) -> Result<(MediaTarget, u16)> {
        match mode {
            CastMode::Transcoding => {
                inner.supervisor.prepare()?;
                let port = self.ports.allocate(self.base_port.saturating_add(1))?;
                info!("Available port for transcoder: {}", port);
                // Bound only once the transcoder owns it.
                Ok((MediaTarget::new(file, address, port, mode), port))
            }
            CastMode::Direct => {
                let port = self.ports.allocate(self.base_port)?;
                inner.server.set_served_file(file);
                inner.server.start(port).await?;
                inner.bound_port = Some(port);
                Ok((MediaTarget::new(file, address, port, mode), port))
            }
        }
    }

    fn checkpoint(&self, epoch: u64) -> Result<()> {
        if self.stop_epoch.load(Ordering::SeqCst) != epoch {
            info!("play cancelled by stop");
            return Err(CasterError::Cancelled);
        }
        Ok(())
    }

    async fn remote_command(
        &self,
        command: &'static str,
        call: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        let result = match tokio::time::timeout(self.device_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CasterError::DeviceTimeout {
                command,
                timeout: self.device_timeout,
            }),
        };
        if let Err(e) = &result {
            error!("Remote {} failed: {}", command, e);
        }
        result
    }
}
