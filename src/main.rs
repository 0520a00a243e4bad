use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cast_relay::{CastMode, CastSessionController, CasterConfig, DeviceAddress, PlaybackListener, DEFAULT_DEVICE_PORT};
use tracing_subscriber::EnvFilter;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file to cast, or an http(s) URL the receiver fetches itself
    media: String,

    /// Receiver IP address
    #[arg(short, long)]
    device: IpAddr,

    /// Receiver control port
    #[arg(long, default_value_t = DEFAULT_DEVICE_PORT)]
    device_port: u16,

    /// Re-encode to webm on the fly instead of serving the file as-is
    #[arg(short, long)]
    transcode: bool,

    /// Receiver app to launch (overrides config)
    #[arg(long)]
    app_id: Option<String>,

    /// Encoder options, e.g. "vcodec=VP80,vb=1000" (overrides config)
    #[arg(long)]
    transcoding_parameters: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

struct LogDuration;

impl PlaybackListener for LogDuration {
    fn duration_updated(&self, seconds: u64) {
        tracing::info!("Duration: {}:{:02}", seconds / 60, seconds % 60);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    tracing::info!("Starting cast-relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = CasterConfig::load(args.config.as_deref())?;
    if let Some(app_id) = args.app_id {
        config.app_id = app_id;
    }
    if let Some(params) = args.transcoding_parameters {
        config.transcoding_parameters = params.parse()?;
    }
    config.validate()?;

    let device = DeviceAddress::new(args.device, args.device_port);
    let controller = CastSessionController::connect(&config, device)
        .with_listener(Arc::new(LogDuration));

    let is_url = args.media.starts_with("http://") || args.media.starts_with("https://");
    let played = if is_url {
        controller.stream(&args.media).await.map(|()| args.media.clone())
    } else {
        let mode = if args.transcode { CastMode::Transcoding } else { CastMode::Direct };
        controller
            .play(Path::new(&args.media), mode)
            .await
            .map(|target| target.built_url)
    };

    match played {
        Ok(url) => {
            tracing::info!("Casting {}; press Ctrl-C to stop", url);
            tokio::signal::ctrl_c().await?;
        }
        Err(e) => tracing::error!("Could not cast {}: {}", args.media, e),
    }

    controller.stop().await;
    let session = controller.snapshot().await;
    tracing::debug!("Final session: {}", serde_json::to_string(&session)?);

    Ok(())
}
