//! Folder watching.
//!
//! [`WatchSession`] wraps a debounced `notify` watcher and exposes the files
//! that appear in the watched folder as a blocking iterator of paths.
//! [`Monitor`] drains such a session into an [`Organizer`] on its own thread.

use crate::file_organizer::Organizer;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{
    DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache, new_debouncer,
};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Cannot watch {}: not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Failed to start watcher on {}: {source}", path.display())]
    Start {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to spawn monitor thread: {0}")]
    Spawn(#[from] io::Error),
}

enum WatchMessage {
    Events(DebounceEventResult),
    Stop,
}

/// Cancels a [`WatchSession`] from any thread.
#[derive(Clone)]
pub struct StopHandle {
    active: Arc<AtomicBool>,
    tx: Sender<WatchMessage>,
}

impl StopHandle {
    /// Stops the session. Calling it again has no effect.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            // Wakes a consumer blocked in `next`.
            let _ = self.tx.send(WatchMessage::Stop);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// An active, non-recursive watch on one folder.
///
/// Iterating yields the paths of files created in, or moved into, the folder.
/// The iterator blocks while waiting for events and ends once the session is
/// stopped; paths still queued at that point are dropped.
pub struct WatchSession {
    root: PathBuf,
    rx: Receiver<WatchMessage>,
    pending: VecDeque<PathBuf>,
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    handle: StopHandle,
}

impl WatchSession {
    /// Starts watching `root`. Bursts of events for the same path are merged
    /// until it has been quiet for `debounce`.
    ///
    /// # Errors
    ///
    /// Fails if `root` is not a directory or the OS watch cannot be set up.
    pub fn start(root: impl Into<PathBuf>, debounce: Duration) -> Result<Self, WatchError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root));
        }

        let (tx, rx) = mpsc::channel();
        let events_tx = tx.clone();
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            let _ = events_tx.send(WatchMessage::Events(result));
        })
        .map_err(|source| WatchError::Start {
            path: root.clone(),
            source,
        })?;

        debouncer
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Start {
                path: root.clone(),
                source,
            })?;

        info!(root = %root.display(), debounce_ms = debounce.as_millis() as u64, "Watching folder");

        Ok(Self {
            root,
            rx,
            pending: VecDeque::new(),
            debouncer: Some(debouncer),
            handle: StopHandle {
                active: Arc::new(AtomicBool::new(true)),
                tx,
            },
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    pub fn stop(&mut self) {
        self.handle.stop();
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.pending.clear();
        if self.debouncer.take().is_some() {
            info!(root = %self.root.display(), "Stopped watching folder");
        }
    }

    fn enqueue(&mut self, events: Vec<DebouncedEvent>) {
        for event in &events {
            for path in arrived_paths(&event.event) {
                if !self.pending.contains(&path) {
                    trace!(path = %path.display(), kind = ?event.kind, "Queued");
                    self.pending.push_back(path);
                }
            }
        }
    }
}

impl Iterator for WatchSession {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            if !self.handle.is_active() {
                self.shutdown();
                return None;
            }
            if let Some(path) = self.pending.pop_front() {
                return Some(path);
            }
            match self.rx.recv() {
                Ok(WatchMessage::Events(Ok(events))) => self.enqueue(events),
                Ok(WatchMessage::Events(Err(errors))) => {
                    for error in errors {
                        warn!(root = %self.root.display(), error = %error, "Watcher error");
                    }
                }
                Ok(WatchMessage::Stop) | Err(_) => {
                    self.shutdown();
                    return None;
                }
            }
        }
    }
}

/// Paths an event reports as newly present in the folder.
fn arrived_paths(event: &notify::Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        // [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        // Some backends cannot tell the two sides of a rename apart; the
        // vanished side is dropped later.
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event.paths.clone(),
        _ => Vec::new(),
    }
}

/// Organizes each path in turn and returns how many were processed.
///
/// Paths that no longer exist when their turn comes are dropped silently; they
/// are repeat events for files that have already been moved away.
pub fn run<I>(organizer: &Organizer, paths: I) -> usize
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut processed = 0;
    for path in paths {
        if fs::symlink_metadata(&path).is_err() {
            trace!(path = %path.display(), "Path gone before processing");
            continue;
        }
        organizer.organize(&path);
        processed += 1;
    }
    processed
}

/// Runs an [`Organizer`] over a [`WatchSession`] on a background thread.
pub struct Monitor {
    handle: StopHandle,
    thread: Option<JoinHandle<usize>>,
}

impl Monitor {
    pub fn spawn(organizer: Organizer, session: WatchSession) -> Result<Self, WatchError> {
        let handle = session.stop_handle();
        let thread = thread::Builder::new()
            .name("tidywatch-monitor".to_string())
            .spawn(move || run(&organizer, session))?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    /// Stops the session and waits for the thread. A file being organized at
    /// that moment is finished first. Returns the number of paths processed.
    pub fn stop(mut self) -> usize {
        self.handle.stop();
        self.join_thread()
    }

    /// Waits for the session to be stopped from elsewhere.
    pub fn join(mut self) -> usize {
        self.join_thread()
    }

    fn join_thread(&mut self) -> usize {
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(processed)) => processed,
            Some(Err(_)) => {
                warn!("Monitor thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if self.thread.is_some() {
            debug!("Monitor dropped while running, stopping it");
            self.handle.stop();
            self.join_thread();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_category::CategoryMap;
    use crate::notifier::ChannelNotifier;
    use notify::event::CreateKind;
    use std::time::Instant;
    use tempfile::TempDir;

    fn organizer_with_channel(
        temp_dir: &TempDir,
    ) -> (Organizer, mpsc::Receiver<crate::file_organizer::OrganizeEvent>) {
        let (notifier, rx) = ChannelNotifier::channel();
        let organizer = Organizer::new(temp_dir.path(), Arc::new(CategoryMap::default()))
            .with_notifier(Arc::new(notifier));
        (organizer, rx)
    }

    fn wait_for(path: &Path, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if path.exists() {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        path.exists()
    }

    #[test]
    fn test_run_drops_vanished_paths() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (organizer, rx) = organizer_with_channel(&temp_dir);
        let pdf = temp_dir.path().join("a.pdf");
        let jpg = temp_dir.path().join("b.jpg");
        fs::write(&pdf, "x").unwrap();
        fs::write(&jpg, "x").unwrap();

        let paths = vec![
            pdf.clone(),
            temp_dir.path().join("gone.pdf"),
            jpg.clone(),
            // Already moved by the first entry.
            pdf.clone(),
        ];
        let processed = run(&organizer, paths);
        drop(organizer);

        assert_eq!(processed, 2);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.is_moved()));
        assert!(temp_dir.path().join("Documents/a.pdf").exists());
        assert!(temp_dir.path().join("Images/b.jpg").exists());
    }

    #[test]
    fn test_arrived_paths() {
        let a = PathBuf::from("/w/a.txt");
        let b = PathBuf::from("/w/b.txt");

        let create = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(a.clone());
        assert_eq!(arrived_paths(&create), vec![a.clone()]);

        let rename = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(a.clone())
            .add_path(b.clone());
        assert_eq!(arrived_paths(&rename), vec![b.clone()]);

        let moved_away =
            notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From))).add_path(a.clone());
        assert!(arrived_paths(&moved_away).is_empty());

        let removed = notify::Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(a);
        assert!(arrived_paths(&removed).is_empty());
    }

    #[test]
    fn test_start_rejects_missing_folder() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = WatchSession::start(temp_dir.path().join("nope"), Duration::from_millis(50));
        assert!(matches!(result, Err(WatchError::NotADirectory(_))));
    }

    #[test]
    fn test_stopped_session_yields_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut session =
            WatchSession::start(temp_dir.path(), Duration::from_millis(50)).expect("watch");
        assert!(session.is_active());

        session.stop_handle().stop();

        assert!(!session.is_active());
        assert_eq!(session.next(), None);
        assert_eq!(session.next(), None);
    }

    #[test]
    fn test_no_events_after_monitor_stops() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (organizer, rx) = organizer_with_channel(&temp_dir);
        let session =
            WatchSession::start(temp_dir.path(), Duration::from_millis(50)).expect("watch");
        let monitor = Monitor::spawn(organizer, session).expect("spawn");

        assert_eq!(monitor.stop(), 0);

        let late = temp_dir.path().join("late.pdf");
        fs::write(&late, "x").unwrap();
        thread::sleep(Duration::from_millis(300));

        assert!(late.exists());
        assert!(!temp_dir.path().join("Documents").exists());
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_new_file_is_organized_while_watching() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (organizer, rx) = organizer_with_channel(&temp_dir);
        let session =
            WatchSession::start(temp_dir.path(), Duration::from_millis(100)).expect("watch");
        let monitor = Monitor::spawn(organizer, session).expect("spawn");

        fs::write(temp_dir.path().join("song.mp3"), "x").unwrap();
        let arrived = wait_for(&temp_dir.path().join("Audio/song.mp3"), Duration::from_secs(10));
        let processed = monitor.stop();

        assert!(arrived, "file was not organized");
        assert!(processed >= 1);
        assert!(rx.try_iter().any(|e| e.is_moved()));
    }
}
