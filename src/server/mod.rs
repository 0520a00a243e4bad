pub mod http;

pub use http::HttpMediaServer;

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Serves the configured file at `/video<ext>` on one port at a time.
#[async_trait]
pub trait EmbeddedServer: Send + Sync {
    fn set_served_file(&mut self, path: &Path);

    /// Bind `port` and start serving. Fails with `ServerBind` if the port is taken.
    async fn start(&mut self, port: u16) -> Result<()>;

    /// Stop serving. No-op when not running.
    async fn stop(&mut self);

    fn port(&self) -> Option<u16>;
}
