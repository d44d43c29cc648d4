//! Shared settings snapshots and live reloading.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::{Settings, SettingsError};

/// Shared handle to the current [`Settings`].
///
/// Readers take an immutable snapshot with [`SettingsStore::snapshot`] and keep using it for as
/// long as they like. Writers replace the whole snapshot, so a reader never observes a partially
/// updated configuration.
#[derive(Clone)]
pub struct SettingsStore {
    current: Arc<Mutex<Arc<Settings>>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: Arc::new(Mutex::new(Arc::new(settings))),
        }
    }

    /// Returns the current settings.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.lock().clone()
    }

    /// Replaces the current settings.
    ///
    /// Snapshots taken earlier are unaffected.
    pub fn replace(&self, settings: Settings) {
        *self.lock() = Arc::new(settings);
    }

    /// Loads the settings file at `path` and makes it current.
    ///
    /// If loading fails, the current settings are kept and the error is returned.
    pub fn reload(&self, path: &Path) -> Result<(), SettingsError> {
        let settings = Settings::load(path)?;
        self.replace(settings);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Arc<Settings>> {
        // The critical sections only swap an `Arc`, a poisoned lock still holds a valid value.
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Watches a settings file and reloads it into a [`SettingsStore`] when it changes.
///
/// File system events for the file are forwarded to a reload thread. Bursts of events (editors
/// often write a file in several steps) are coalesced into a single reload. Dropping the watcher
/// stops and joins the thread.
pub struct SettingsWatcher {
    watcher: Option<RecommendedWatcher>,
    events: Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

enum Message {
    Changed,
    Stop,
}

impl SettingsWatcher {
    /// How long to wait for more events after a change before reloading.
    pub const SETTLE_TIME: Duration = Duration::from_millis(50);

    /// Starts watching the file at `path`.
    ///
    /// The file does not need to exist yet; it is picked up once it is created. Its directory
    /// has to exist.
    pub fn spawn(store: SettingsStore, path: impl Into<PathBuf>) -> notify::Result<Self> {
        let path = path.into();
        let Some(file_name) = path.file_name().map(OsStr::to_os_string) else {
            return Err(notify::Error::generic(&format!(
                "{} does not name a file",
                path.display()
            )));
        };
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (events, event_recv) = crossbeam_channel::unbounded();

        let tx = events.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("settings watcher error: {e}");
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            if event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()))
            {
                tx.send(Message::Changed).ok();
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let handle = thread::Builder::new()
            .name("settings watcher".into())
            .spawn(move || {
                log::trace!("watching {} for changes", path.display());
                while let Ok(Message::Changed) = event_recv.recv() {
                    // Wait for the writer to finish.
                    loop {
                        match event_recv.recv_timeout(Self::SETTLE_TIME) {
                            Ok(Message::Changed) => {}
                            Err(RecvTimeoutError::Timeout) => break,
                            Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }

                    if !path.exists() {
                        log::debug!("{} was removed, keeping current settings", path.display());
                        continue;
                    }
                    match store.reload(&path) {
                        Ok(()) => log::info!("settings reloaded from {}", path.display()),
                        Err(e) => log::warn!("{e}; keeping previous settings"),
                    }
                }
                log::trace!("settings watcher exiting");
            })
            .map_err(notify::Error::io)?;

        Ok(Self {
            watcher: Some(watcher),
            events,
            handle: Some(handle),
        })
    }
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        // Stop event delivery first, then wake the reload thread up.
        drop(self.watcher.take());
        self.events.send(Message::Stop).ok();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}
