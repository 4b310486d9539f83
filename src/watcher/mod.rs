//! File change notification for tailers.
//!
//! One [`ChangeWatcher`] serves every log file of a session, so a session
//! costs a single OS notification instance however many files it follows.
//! Parent directories are watched rather than the files themselves: files
//! that do not exist yet, or get replaced by rotation, keep producing
//! notifications. Events are routed to each file's `Notify` by file name.
//! A file whose directory cannot be watched is re-checked on a fixed period
//! instead.


use std::collections::HashMap;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::event::EventKind;
use notify::Event;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::Result;
use crate::WatchMode;

/// How one file learns about changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Native,
    Polling,
}

struct Route {
    dir: PathBuf,
    changed: Arc<Notify>,
}

/// File name -> every watched file carrying that name
type Routes = HashMap<OsString, Vec<Route>>;

pub struct ChangeWatcher {
    native: Option<RecommendedWatcher>,
    routes: Arc<RwLock<Routes>>,
    watched_dirs: HashSet<PathBuf>,
    files: HashMap<PathBuf, WatchKind>,
    pollers: Vec<JoinHandle<()>>,
    fallback_interval: Duration,
}

impl ChangeWatcher {
    /// Never fails: when native notification is unavailable every file is polled.
    pub fn new(
        mode: WatchMode,
        fallback_interval: Duration,
    ) -> Self {
        let routes = Arc::new(RwLock::new(Routes::new()));
        let native = match mode {
            WatchMode::Native => match Self::native_backend(routes.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(
                        "native change notification unavailable, polling every {:?}: {}",
                        fallback_interval, e
                    );
                    None
                }
            },
            WatchMode::Poll => None,
        };

        Self {
            native,
            routes,
            watched_dirs: HashSet::new(),
            files: HashMap::new(),
            pollers: Vec::new(),
            fallback_interval,
        }
    }

    fn native_backend(routes: Arc<RwLock<Routes>>) -> Result<RecommendedWatcher> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_content_change(&event.kind) {
                    dispatch(&routes.read(), &event);
                }
            }
            Err(e) => warn!("watch error: {}", e),
        })?;
        Ok(watcher)
    }

    /// Signals `changed` whenever `path` may have changed.
    ///
    /// Never fails: a directory that cannot be watched natively is replaced
    /// by polling for this file only. Must be called within a tokio runtime.
    pub fn watch(
        &mut self,
        path: &Path,
        changed: Arc<Notify>,
    ) -> WatchKind {
        let kind = match self.watch_native(path, changed.clone()) {
            Ok(()) => WatchKind::Native,
            Err(e) => {
                if self.native.is_some() {
                    warn!(
                        "cannot watch {}, polling every {:?}: {}",
                        path.display(),
                        self.fallback_interval,
                        e
                    );
                }
                self.pollers.push(spawn_polling(path, self.fallback_interval, changed));
                WatchKind::Polling
            }
        };
        self.files.insert(path.to_path_buf(), kind);
        kind
    }

    fn watch_native(
        &mut self,
        path: &Path,
        changed: Arc<Notify>,
    ) -> Result<()> {
        let Some(watcher) = self.native.as_mut() else {
            return Err(notify::Error::generic("native notification disabled").into());
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| notify::Error::generic(&format!("{} has no file name", path.display())))?;
        let dir = watched_dir(path);

        if !self.watched_dirs.contains(&dir) {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            self.watched_dirs.insert(dir.clone());
            debug!("watching directory {}", dir.display());
        }

        self.routes.write().entry(file_name).or_default().push(Route { dir, changed });
        trace!("routing changes of {}", path.display());
        Ok(())
    }

    /// Number of files being watched, natively or by polling
    pub fn watched_files(&self) -> usize {
        self.files.len()
    }

    pub fn kind_of(
        &self,
        path: &Path,
    ) -> Option<WatchKind> {
        self.files.get(path).copied()
    }

    /// Stops all notifications. Never fails, even if files or directories are gone.
    pub fn close(mut self) {
        if let Some(mut watcher) = self.native.take() {
            for dir in &self.watched_dirs {
                if let Err(e) = watcher.unwatch(dir) {
                    debug!("unwatch {}: {}", dir.display(), e);
                }
            }
            drop(watcher);
        }
        self.routes.write().clear();
        for handle in self.pollers.drain(..) {
            handle.abort();
        }
        trace!("stopped watching {} files", self.files.len());
    }
}

/// Notifies every route whose file is named in the event. When no route's
/// directory matches the event path exactly (the backend may report a
/// canonicalized path), every route with that name is notified; a spurious
/// wake only costs an empty read.
fn dispatch(
    routes: &Routes,
    event: &Event,
) {
    for path in &event.paths {
        let Some(candidates) = path.file_name().and_then(|name| routes.get(name)) else {
            continue;
        };

        let parent = path.parent();
        let mut matched = false;
        for route in candidates.iter().filter(|r| Some(r.dir.as_path()) == parent) {
            route.changed.notify_one();
            matched = true;
        }
        if !matched {
            for route in candidates {
                route.changed.notify_one();
            }
        }
        trace!("{} changed: {:?}", path.display(), event.kind);
    }
}

fn watched_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn spawn_polling(
    path: &Path,
    period: Duration,
    changed: Arc<Notify>,
) -> JoinHandle<()> {
    debug!("polling {} every {:?}", path.display(), period);
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; the tailer already reads on attach
        ticker.tick().await;
        loop {
            ticker.tick().await;
            changed.notify_one();
        }
    })
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
