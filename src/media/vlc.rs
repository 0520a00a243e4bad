use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use super::supervisor::{EngineLoader, TranscodeEngine, TranscodeEvent, TranscodeRun};
use super::transcode::SinkSpec;
use crate::{CasterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    /// Install directories probed in order before falling back to `PATH`.
    pub fn search_dirs(self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &[
                r"C:\Program Files\VideoLAN\VLC",
                r"C:\Program Files (x86)\VideoLAN\VLC",
            ],
            Platform::MacOs => &["/Applications/VLC.app/Contents/MacOS"],
            Platform::Linux | Platform::Other => &[],
        }
    }

    pub fn binary_names(self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &["vlc.exe"],
            Platform::MacOs => &["VLC", "vlc"],
            Platform::Linux | Platform::Other => &["cvlc", "vlc"],
        }
    }
}

/// Find the VLC binary: explicit override, then the platform's install
/// directories, then every directory on `PATH`.
pub fn locate_vlc(platform: Platform, override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!("Configured transcoder {} does not exist", path.display());
    }

    let names = platform.binary_names();
    let in_dir = |dir: &Path| {
        names
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    };

    for dir in platform.search_dirs() {
        if let Some(found) = in_dir(Path::new(dir)) {
            debug!("Found VLC at {}", found.display());
            return Some(found);
        }
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| in_dir(&dir))
}

/// Loads [`VlcEngine`]; the location probe runs once per loader.
pub struct VlcLoader {
    platform: Platform,
    override_path: Option<PathBuf>,
    located: OnceLock<Option<PathBuf>>,
}

impl VlcLoader {
    pub fn new(override_path: Option<PathBuf>) -> Self {
        Self::for_platform(Platform::current(), override_path)
    }

    pub fn for_platform(platform: Platform, override_path: Option<PathBuf>) -> Self {
        Self {
            platform,
            override_path,
            located: OnceLock::new(),
        }
    }
}

impl EngineLoader for VlcLoader {
    fn load(&self) -> Result<Arc<dyn TranscodeEngine>> {
        let located = self
            .located
            .get_or_init(|| locate_vlc(self.platform, self.override_path.as_deref()));

        match located {
            Some(binary) => {
                info!("VLC available at {}", binary.display());
                Ok(Arc::new(VlcEngine::new(binary.clone())))
            }
            None => Err(CasterError::TranscoderUnavailable(format!(
                "VLC not found for {:?} in install dirs or PATH",
                self.platform
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VlcEngine {
    binary: PathBuf,
}

impl VlcEngine {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    pub fn args(input: &Path, sink: &SinkSpec) -> Vec<String> {
        let mut args = vec!["-I".to_string(), "rc".to_string()];
        if cfg!(unix) {
            args.push("--rc-fake-tty".to_string());
        }
        args.push(input.display().to_string());
        args.push(format!("--sout={}", sink.stream_output()));
        if sink.keep_alive {
            args.push("--sout-keep".to_string());
        }
        args
    }
}

impl TranscodeEngine for VlcEngine {
    fn start(
        &self,
        input: &Path,
        sink: &SinkSpec,
        events: Sender<TranscodeEvent>,
    ) -> Result<Box<dyn TranscodeRun>> {
        let args = Self::args(input, sink);
        debug!("Spawning {} {:?}", self.binary.display(), args);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CasterError::Transcoder(format!("failed to spawn VLC: {}", e)))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(CasterError::Transcoder("VLC stdio not captured".into()));
        };

        let child = Arc::new(Mutex::new(child));
        let released = Arc::new(AtomicBool::new(false));

        let reader_child = Arc::clone(&child);
        let reader_released = Arc::clone(&released);
        let spawned = thread::Builder::new()
            .name("vlc-rc".into())
            .spawn(move || read_rc(stdout, stdin, events, reader_child, reader_released));

        let mut run = VlcRun { child, released };
        if let Err(e) = spawned {
            run.release();
            return Err(e.into());
        }
        Ok(Box::new(run))
    }
}

struct VlcRun {
    child: Arc<Mutex<Child>>,
    released: Arc<AtomicBool>,
}

impl TranscodeRun for VlcRun {
    fn release(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = child.kill() {
            debug!("VLC already gone: {}", e);
        }
        let _ = child.wait();
    }
}

impl Drop for VlcRun {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_rc(
    stdout: impl std::io::Read,
    mut stdin: ChildStdin,
    events: Sender<TranscodeEvent>,
    child: Arc<Mutex<Child>>,
    released: Arc<AtomicBool>,
) {
    let mut awaiting_length = false;

    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else { break };
        let event = match parse_rc_line(&line) {
            Some(RcStatus::Playing) => {
                if writeln!(stdin, "get_length").and_then(|_| stdin.flush()).is_ok() {
                    awaiting_length = true;
                } else {
                    let _ = events.send(TranscodeEvent::Playing { duration_ms: 0 });
                }
                continue;
            }
            Some(RcStatus::Length(secs)) if awaiting_length => {
                awaiting_length = false;
                playing_for(secs)
            }
            Some(RcStatus::Length(_)) | None => continue,
            Some(RcStatus::Opening) => TranscodeEvent::Opening,
            Some(RcStatus::Paused) => TranscodeEvent::Paused,
            Some(RcStatus::Stopped) => TranscodeEvent::Stopped,
            Some(RcStatus::Ended) => TranscodeEvent::Finished,
            Some(RcStatus::Error) => TranscodeEvent::Error(line.trim().to_string()),
        };
        if events.send(event).is_err() {
            break;
        }
    }

    let last = if released.load(Ordering::SeqCst) {
        TranscodeEvent::Stopped
    } else {
        let status = child.lock().unwrap_or_else(PoisonError::into_inner).wait();
        match status {
            Ok(status) if status.success() => TranscodeEvent::Finished,
            Ok(status) => TranscodeEvent::Error(format!("VLC exited with {}", status)),
            Err(e) => TranscodeEvent::Error(format!("VLC wait failed: {}", e)),
        }
    };
    let _ = events.send(last);
}

/// `get_length` answers in seconds; lengths beyond `u64` ms saturate.
fn playing_for(secs: u64) -> TranscodeEvent {
    TranscodeEvent::Playing {
        duration_ms: secs.saturating_mul(1000),
    }
}

/// What one line of `rc` output means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcStatus {
    Opening,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
    /// Answer to `get_length`, in seconds
    Length(u64),
}

/// Parse a line of VLC `rc` output.
///
/// Handles `status change: ( new input: ... )`, `( play state: N ): Word`,
/// `( stop state: 0 )`, `( state playing )` and the bare integer answer to
/// `get_length`. `rc` prints nothing for cache fill or video output changes,
/// so this engine never emits `Buffering` or `VideoOutputChanged`.
pub fn parse_rc_line(line: &str) -> Option<RcStatus> {
    let line = line.trim().trim_start_matches('>').trim();
    if line.is_empty() {
        return None;
    }

    if let Ok(secs) = line.parse::<u64>() {
        return Some(RcStatus::Length(secs));
    }

    let lower = line.to_ascii_lowercase();
    if lower.contains("new input:") {
        return Some(RcStatus::Opening);
    }

    if let Some(rest) = lower.split("state").nth(1) {
        let rest = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());

        // Word form: "( state playing )" or the trailing "): Play".
        let word = lower.rsplit("):").next().filter(|_| lower.contains("):"));
        let word = word.unwrap_or(rest);
        for (needle, status) in [
            ("play", RcStatus::Playing),
            ("pause", RcStatus::Paused),
            ("stop", RcStatus::Stopped),
            ("end", RcStatus::Ended),
            ("error", RcStatus::Error),
            ("opening", RcStatus::Opening),
        ] {
            if word.trim_start().starts_with(needle) {
                return Some(status);
            }
        }

        if lower.contains("stop state") {
            return Some(RcStatus::Stopped);
        }

        // Numeric form, VLC 3 input states.
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        return match digits.parse::<u8>().ok()? {
            0 => Some(RcStatus::Stopped),
            1 => Some(RcStatus::Opening),
            2 => Some(RcStatus::Playing),
            3 => Some(RcStatus::Paused),
            4 => Some(RcStatus::Ended),
            5 => Some(RcStatus::Error),
            _ => None,
        };
    }

    None
}
