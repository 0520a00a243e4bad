use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::transcode::SinkSpec;
use crate::{CasterError, Result};

const EVENT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeEvent {
    Opening,
    /// Cache fill level in percent. Not reported over VLC `rc`.
    Buffering(f32),
    Playing { duration_ms: u64 },
    Paused,
    Stopped,
    Finished,
    Error(String),
    /// Not reported over VLC `rc`.
    VideoOutputChanged(u32),
}

pub trait PlaybackListener: Send + Sync {
    /// Called once per run when the transcoder starts playing.
    fn duration_updated(&self, seconds: u64);
}

/// A loaded transcoding engine, able to start runs.
pub trait TranscodeEngine: Send + Sync {
    fn start(
        &self,
        input: &Path,
        sink: &SinkSpec,
        events: Sender<TranscodeEvent>,
    ) -> Result<Box<dyn TranscodeRun>>;
}

/// One in-flight run. Released exactly once by the supervisor.
pub trait TranscodeRun: Send {
    fn release(&mut self);
}

/// Locates and loads an engine. Fails with `TranscoderUnavailable`.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn TranscodeEngine>>;
}

struct ActiveRun {
    run: Box<dyn TranscodeRun>,
    live: Arc<AtomicBool>,
}

pub struct TranscodingSupervisor {
    loader: Arc<dyn EngineLoader>,
    engine: Option<Arc<dyn TranscodeEngine>>,
    active: Option<ActiveRun>,
    duration_secs: Arc<Mutex<Option<u64>>>,
}

impl TranscodingSupervisor {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            loader,
            engine: None,
            active: None,
            duration_secs: Arc::new(Mutex::new(None)),
        }
    }

    /// Load the engine if it is not loaded yet.
    pub fn prepare(&mut self) -> Result<()> {
        if self.engine.is_none() {
            let engine = self.loader.load()?;
            info!("Transcoding engine loaded");
            self.engine = Some(engine);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// Duration reported by the current run, in whole seconds.
    pub fn duration_secs(&self) -> Option<u64> {
        *self.duration_secs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(
        &mut self,
        input: &Path,
        sink: &SinkSpec,
        listener: Option<Arc<dyn PlaybackListener>>,
    ) -> Result<()> {
        if self.active.is_some() {
            return Err(CasterError::Transcoder("a run is already active".into()));
        }
        self.prepare()?;
        let engine = match &self.engine {
            Some(engine) => Arc::clone(engine),
            None => return Err(CasterError::TranscoderUnavailable("engine not loaded".into())),
        };

        *self.duration_secs.lock().unwrap_or_else(PoisonError::into_inner) = None;

        let (tx, rx) = crossbeam_channel::bounded(EVENT_QUEUE_DEPTH);
        let live = Arc::new(AtomicBool::new(true));

        // The relay exits once every sender is gone, including on a failed start.
        let relay_live = Arc::clone(&live);
        let cell = Arc::clone(&self.duration_secs);
        thread::Builder::new()
            .name("transcode-events".into())
            .spawn(move || relay_events(rx, relay_live, cell, listener))?;

        let run = engine.start(input, sink, tx)?;

        info!("Transcoding {} to {}", input.display(), sink.destination());
        self.active = Some(ActiveRun { run, live });
        Ok(())
    }

    /// Release the run and the engine. No-op when nothing is loaded.
    pub fn stop(&mut self) {
        if let Some(mut active) = self.active.take() {
            {
                let mut cell = self.duration_secs.lock().unwrap_or_else(PoisonError::into_inner);
                active.live.store(false, Ordering::SeqCst);
                *cell = None;
            }
            active.run.release();
            info!("Transcoding run released");
        }
        if self.engine.take().is_some() {
            debug!("Transcoding engine released");
        }
        *self.duration_secs.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Drop for TranscodingSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn relay_events(
    rx: Receiver<TranscodeEvent>,
    live: Arc<AtomicBool>,
    duration: Arc<Mutex<Option<u64>>>,
    listener: Option<Arc<dyn PlaybackListener>>,
) {
    let mut notified = false;
    for event in rx.iter() {
        match &event {
            TranscodeEvent::Opening => debug!("Transcoder: opening"),
            TranscodeEvent::Buffering(fill) => debug!("Transcoder: buffering {:.0}%", fill),
            TranscodeEvent::Playing { duration_ms } => debug!("Transcoder: playing ({} ms)", duration_ms),
            TranscodeEvent::Paused => debug!("Transcoder: paused"),
            TranscodeEvent::Stopped => debug!("Transcoder: stopped"),
            TranscodeEvent::Finished => info!("Transcoder: finished"),
            TranscodeEvent::Error(reason) => warn!("Transcoder error: {}", reason),
            TranscodeEvent::VideoOutputChanged(count) => debug!("Transcoder: {} video outputs", count),
        }

        if let TranscodeEvent::Playing { duration_ms } = event {
            if notified {
                continue;
            }
            let seconds = duration_ms / 1000;
            {
                // `live` is only cleared while this lock is held.
                let mut cell = duration.lock().unwrap_or_else(PoisonError::into_inner);
                if !live.load(Ordering::SeqCst) {
                    continue;
                }
                *cell = Some(seconds);
            }
            notified = true;
            if let Some(listener) = &listener {
                listener.duration_updated(seconds);
            }
        }
    }
    debug!("Transcoder event stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::transcode::TranscodingParameters;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    /// Engine that replays a fixed event script on start.
    struct ScriptedEngine {
        script: Vec<TranscodeEvent>,
        released: Arc<AtomicUsize>,
        started: Arc<Mutex<Vec<(PathBuf, String)>>>,
    }

    struct ScriptedRun {
        released: Arc<AtomicUsize>,
        _events: Sender<TranscodeEvent>,
    }

    impl TranscodeRun for ScriptedRun {
        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl TranscodeEngine for ScriptedEngine {
        fn start(
            &self,
            input: &Path,
            sink: &SinkSpec,
            events: Sender<TranscodeEvent>,
        ) -> Result<Box<dyn TranscodeRun>> {
            self.started
                .lock()
                .unwrap()
                .push((input.to_path_buf(), sink.stream_output()));
            for event in &self.script {
                events.send(event.clone()).unwrap();
            }
            Ok(Box::new(ScriptedRun {
                released: Arc::clone(&self.released),
                _events: events,
            }))
        }
    }

    struct Loader {
        engine: Option<Arc<ScriptedEngine>>,
        loads: AtomicUsize,
    }

    impl EngineLoader for Loader {
        fn load(&self) -> Result<Arc<dyn TranscodeEngine>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match &self.engine {
                Some(engine) => Ok(Arc::clone(engine) as Arc<dyn TranscodeEngine>),
                None => Err(CasterError::TranscoderUnavailable("no engine".into())),
            }
        }
    }

    #[derive(Default)]
    struct Durations(Mutex<Vec<u64>>);

    impl PlaybackListener for Durations {
        fn duration_updated(&self, seconds: u64) {
            self.0.lock().unwrap().push(seconds);
        }
    }

    fn scripted(script: Vec<TranscodeEvent>) -> (Arc<Loader>, Arc<ScriptedEngine>) {
        let engine = Arc::new(ScriptedEngine {
            script,
            released: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(Mutex::new(Vec::new())),
        });
        let loader = Arc::new(Loader {
            engine: Some(Arc::clone(&engine)),
            loads: AtomicUsize::new(0),
        });
        (loader, engine)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_first_playing_event_reports_seconds_once() {
        let (loader, engine) = scripted(vec![
            TranscodeEvent::Opening,
            TranscodeEvent::Buffering(50.0),
            TranscodeEvent::Playing { duration_ms: 120_000 },
            TranscodeEvent::Playing { duration_ms: 99_000 },
        ]);
        let listener = Arc::new(Durations::default());
        let mut supervisor = TranscodingSupervisor::new(loader);

        let sink = SinkSpec::new(TranscodingParameters::default(), 8087);
        supervisor
            .start(Path::new("show.mkv"), &sink, Some(listener.clone() as Arc<dyn PlaybackListener>))
            .unwrap();

        wait_for(|| supervisor.duration_secs().is_some());
        assert_eq!(supervisor.duration_secs(), Some(120));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(*listener.0.lock().unwrap(), vec![120]);

        let started = engine.started.lock().unwrap();
        assert_eq!(started[0].0, PathBuf::from("show.mkv"));
        assert!(started[0].1.ends_with(":http{mux=webm,dst=:8087/cast.webm}"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (loader, engine) = scripted(vec![]);
        let mut supervisor = TranscodingSupervisor::new(loader.clone());

        supervisor.stop();
        supervisor
            .start(Path::new("a.mkv"), &SinkSpec::new(TranscodingParameters::default(), 9000), None)
            .unwrap();
        assert!(supervisor.is_running());

        supervisor.stop();
        supervisor.stop();

        assert!(!supervisor.is_running());
        assert!(!supervisor.is_loaded());
        assert_eq!(engine.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_start_requires_stop() {
        let (loader, _engine) = scripted(vec![]);
        let mut supervisor = TranscodingSupervisor::new(loader.clone());
        let sink = SinkSpec::new(TranscodingParameters::default(), 9000);

        supervisor.start(Path::new("a.mkv"), &sink, None).unwrap();
        assert!(matches!(
            supervisor.start(Path::new("a.mkv"), &sink, None),
            Err(CasterError::Transcoder(_))
        ));
        // Engine is loaded once per prepare/stop cycle.
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unavailable_engine() {
        let loader = Arc::new(Loader {
            engine: None,
            loads: AtomicUsize::new(0),
        });
        let mut supervisor = TranscodingSupervisor::new(loader);

        assert!(matches!(
            supervisor.prepare(),
            Err(CasterError::TranscoderUnavailable(_))
        ));
        assert!(!supervisor.is_running());
    }

    /// Engine that hands its event sender back to the test.
    struct HeldEngine {
        sender: Mutex<Option<Sender<TranscodeEvent>>>,
    }

    struct HeldRun;

    impl TranscodeRun for HeldRun {
        fn release(&mut self) {}
    }

    impl TranscodeEngine for HeldEngine {
        fn start(
            &self,
            _input: &Path,
            _sink: &SinkSpec,
            events: Sender<TranscodeEvent>,
        ) -> Result<Box<dyn TranscodeRun>> {
            *self.sender.lock().unwrap() = Some(events);
            Ok(Box::new(HeldRun))
        }
    }

    struct HeldLoader(Arc<HeldEngine>);

    impl EngineLoader for HeldLoader {
        fn load(&self) -> Result<Arc<dyn TranscodeEngine>> {
            Ok(Arc::clone(&self.0) as Arc<dyn TranscodeEngine>)
        }
    }

    #[test]
    fn test_playing_after_stop_leaves_no_duration() {
        let engine = Arc::new(HeldEngine {
            sender: Mutex::new(None),
        });
        let listener = Arc::new(Durations::default());
        let mut supervisor = TranscodingSupervisor::new(Arc::new(HeldLoader(Arc::clone(&engine))));

        supervisor
            .start(
                Path::new("late.mkv"),
                &SinkSpec::new(TranscodingParameters::default(), 8087),
                Some(listener.clone() as Arc<dyn PlaybackListener>),
            )
            .unwrap();
        supervisor.stop();

        let events = engine.sender.lock().unwrap().take().unwrap();
        events.send(TranscodeEvent::Playing { duration_ms: 60_000 }).unwrap();
        drop(events);
        thread::sleep(Duration::from_millis(50));

        assert_eq!(supervisor.duration_secs(), None);
        assert!(listener.0.lock().unwrap().is_empty());
    }
}
