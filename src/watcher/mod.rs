mod reader;
mod transcript;

pub use reader::{EventCallback, EventReader};
pub use transcript::{tool_input_summary, tool_response_summary, TranscriptReader};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::WatcherError;
use crate::model::HookEvent;

/// Per-session event files are `<events-dir>/<tmux-session-name>.jsonl`.
pub const EVENT_FILE_SUFFIX: &str = ".jsonl";

/// Fallback poll cadence. Inotify appends are missed often enough on tmpfs
/// that the timer, not the notification, is the correctness mechanism.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Directory rescan happens every Nth tick; notify covers creation in
/// between, the rescan covers notify outages.
const RESCAN_TICKS: u32 = 10;

type SessionCallback = Arc<dyn Fn(&str, &HookEvent) + Send + Sync>;
type ReaderRegistry = Arc<Mutex<HashMap<String, Arc<EventReader>>>>;

enum LoopSignal {
    Changed(PathBuf),
    Stop,
}

/// Discovers per-session event files in one directory and fans their events
/// out with the originating session name attached.
///
/// One background thread multiplexes filesystem notifications, a fixed
/// poll timer, and the stop signal. The reader registry can be queried
/// concurrently while the loop runs.
pub struct EventWatcher {
    dir: PathBuf,
    readers: ReaderRegistry,
    callbacks: Arc<Mutex<Vec<SessionCallback>>>,
    loop_tx: Option<mpsc::Sender<LoopSignal>>,
    handle: Option<JoinHandle<()>>,
}

impl EventWatcher {
    /// The events directory is injected, not derived from the environment;
    /// it is created if absent so the watch handle has something to attach to.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, WatcherError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            readers: Arc::new(Mutex::new(HashMap::new())),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            loop_tx: None,
            handle: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register a callback receiving `(session_name, event)` for every event
    /// from every discovered session. Callbacks registered before a reader
    /// exists are wired into it at creation, so nothing is dropped.
    pub fn on_event(&self, callback: impl Fn(&str, &HookEvent) + Send + Sync + 'static) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Session names with a discovered event file, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Scan for existing event files, then launch the background loop.
    ///
    /// Only the notify handle construction is fatal; everything that can go
    /// wrong later is swallowed and covered by the poll timer.
    pub fn start(&mut self) -> Result<(), WatcherError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<LoopSignal>();

        let notify_tx = tx.clone();
        let mut fs_watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for path in event.paths {
                        if notify_tx.send(LoopSignal::Changed(path)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "filesystem notification error"),
            },
            Config::default(),
        )?;
        fs_watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        // Pick up files that existed before the watcher started.
        scan_dir(&self.dir, &self.readers, &self.callbacks);

        let dir = self.dir.clone();
        let readers = Arc::clone(&self.readers);
        let callbacks = Arc::clone(&self.callbacks);

        let handle = std::thread::spawn(move || {
            // Owns the notify handle; dropping it on exit releases the watch.
            let _fs_watcher = fs_watcher;
            let mut tick: u32 = 0;

            loop {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(LoopSignal::Changed(path)) => {
                        if let Some(name) = session_name(&path) {
                            let reader = ensure_reader(&readers, &callbacks, &dir, &name);
                            if let Err(e) = reader.poll() {
                                warn!(session = %name, error = %e, "event poll failed");
                            }
                        }
                    }
                    Ok(LoopSignal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        tick = tick.wrapping_add(1);
                        if tick % RESCAN_TICKS == 0 {
                            scan_dir(&dir, &readers, &callbacks);
                        }
                        poll_all(&readers);
                    }
                }
            }
        });

        self.loop_tx = Some(tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Terminate the background loop and release the watch handle.
    /// Idempotent; the loop observes the signal within one poll interval.
    pub fn stop(&mut self) {
        if let Some(tx) = self.loop_tx.take() {
            let _ = tx.send(LoopSignal::Stop);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("watcher loop panicked before join");
            }
        }
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map an event-file path to its session name by stripping the suffix.
fn session_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(EVENT_FILE_SUFFIX))
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Get or create the reader for one session. Created at most once per name;
/// duplicate notifications and repeated scans reuse the existing reader.
fn ensure_reader(
    readers: &ReaderRegistry,
    callbacks: &Mutex<Vec<SessionCallback>>,
    dir: &Path,
    name: &str,
) -> Arc<EventReader> {
    {
        let registry = readers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(reader) = registry.get(name) {
            return Arc::clone(reader);
        }
    }

    // Snapshot outside the registry lock; the two locks are never nested.
    let wired: Vec<SessionCallback> = callbacks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    let mut registry = readers.lock().unwrap_or_else(PoisonError::into_inner);
    let reader = registry.entry(name.to_string()).or_insert_with(|| {
        debug!(session = %name, "discovered event file");
        let reader = Arc::new(EventReader::new(
            dir.join(format!("{name}{EVENT_FILE_SUFFIX}")),
        ));
        for callback in wired {
            let name = name.to_string();
            reader.on_event(move |event| callback(&name, event));
        }
        reader
    });
    Arc::clone(reader)
}

fn scan_dir(dir: &Path, readers: &ReaderRegistry, callbacks: &Mutex<Vec<SessionCallback>>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "events directory scan failed");
            return;
        }
    };
    for entry in entries.flatten() {
        if let Some(name) = session_name(&entry.path()) {
            ensure_reader(readers, callbacks, dir, &name);
        }
    }
}

/// Poll every known reader. Reader Arcs are snapshotted first so file I/O
/// happens outside the registry lock.
fn poll_all(readers: &ReaderRegistry) {
    let snapshot: Vec<(String, Arc<EventReader>)> = readers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(name, reader)| (name.clone(), Arc::clone(reader)))
        .collect();
    for (name, reader) in snapshot {
        if let Err(e) = reader.poll() {
            warn!(session = %name, error = %e, "event poll failed");
        }
    }
}
