//! Delivery of organize events to whoever renders them.
//!
//! The organizer never talks to the terminal or a UI directly. It hands each
//! [`OrganizeEvent`] to a [`Notifier`]; the CLI plugs in a channel so that
//! rendering happens on its own thread.

use crate::file_organizer::{OrganizeEvent, Outcome};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{error, info};

/// Receives every event the organizer emits.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &OrganizeEvent);
}

/// Writes one structured `tracing` record per event. With the file layer
/// installed this is what fills the log file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &OrganizeEvent) {
        let src = event.source_path.display();
        match &event.outcome {
            Outcome::Moved | Outcome::Renamed => {
                let dest = event
                    .destination_path
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default();
                info!(
                    src = %src,
                    dest = %dest,
                    category = %event.category,
                    renamed = matches!(event.outcome, Outcome::Renamed),
                    "Moved file"
                );
            }
            Outcome::Skipped { reason } => {
                info!(src = %src, reason = ?reason, "Skipped");
            }
            Outcome::Failed { error } => {
                error!(src = %src, kind = error.kind(), "{}", error);
            }
        }
    }
}

/// Sends a copy of every event over an mpsc channel.
///
/// A disconnected receiver is not an error; events are then dropped.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<OrganizeEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<OrganizeEvent>) -> Self {
        Self { tx }
    }

    /// Creates a notifier together with the receiving end.
    pub fn channel() -> (Self, Receiver<OrganizeEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &OrganizeEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Fans every event out to several notifiers, in order.
#[derive(Clone, Default)]
pub struct Broadcast {
    targets: Vec<Arc<dyn Notifier>>,
}

impl Broadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.targets.push(Arc::new(notifier));
        self
    }
}

impl Notifier for Broadcast {
    fn notify(&self, event: &OrganizeEvent) {
        for target in &self.targets {
            target.notify(event);
        }
    }
}
