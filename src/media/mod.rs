pub mod supervisor;
pub mod transcode;
pub mod vlc;

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CastMode;

/// Fixed name of the transcoder's HTTP sink; the container is always webm.
pub const TRANSCODED_FILE_NAME: &str = "cast.webm";
pub const TRANSCODED_CONTENT_TYPE: &str = "video/webm";

/// Builds the URL the receiver fetches media from.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaUrlBuilder;

impl MediaUrlBuilder {
    pub fn build(address: IpAddr, port: u16, mode: CastMode, extension: &str) -> String {
        let host = match address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };
        match mode {
            CastMode::Transcoding => format!("http://{}:{}/{}", host, port, TRANSCODED_FILE_NAME),
            CastMode::Direct => format!("http://{}:{}/video{}", host, port, extension),
        }
    }
}

/// Route the embedded server exposes for a file with `extension`.
pub fn served_route(extension: &str) -> String {
    format!("/video{}", extension)
}

/// Everything after the last '.' of the file name, dot included.
///
/// Dots in parent directories do not count.
pub fn file_extension(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.rfind('.').map(|pos| name[pos..].to_string()))
        .unwrap_or_default()
}

/// Content type for a remote URL, guessed from its path.
pub fn stream_content_type(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// The file and URL of one `play` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTarget {
    pub file_path: PathBuf,
    pub extension: String,
    pub built_url: String,
}

impl MediaTarget {
    pub fn new(file_path: &Path, address: IpAddr, port: u16, mode: CastMode) -> Self {
        let extension = file_extension(file_path);
        let built_url = MediaUrlBuilder::build(address, port, mode, &extension);
        Self {
            file_path: file_path.to_path_buf(),
            extension,
            built_url,
        }
    }

    /// Content type announced to the receiver on load.
    pub fn content_type(&self, mode: CastMode) -> String {
        match mode {
            CastMode::Transcoding => TRANSCODED_CONTENT_TYPE.to_string(),
            CastMode::Direct => mime_guess::from_path(&self.file_path)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        }
    }
}
