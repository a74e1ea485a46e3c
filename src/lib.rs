//! tidywatch - keep a folder tidy by sorting files into category subfolders
//!
//! This library provides the pieces of the `tidywatch` tool: an extension to
//! category table, a conflict-free destination picker, the organizer that moves
//! files, a debounced folder watcher that feeds it, and TOML configuration for
//! categories, filters and logging.

pub mod cli;
pub mod config;
pub mod conflict;
pub mod error;
pub mod file_category;
pub mod file_organizer;
pub mod logging;
pub mod notifier;
pub mod output;
pub mod watcher;

pub use config::{CompiledFilters, ConfigError, Settings};
pub use conflict::ConflictResolver;
pub use error::OrganizeError;
pub use file_category::{CategoryMap, DEFAULT_CATEGORY};
pub use file_organizer::{OrganizeEvent, Organizer, Outcome, SkipReason};
pub use notifier::{Broadcast, ChannelNotifier, LogNotifier, Notifier};
pub use watcher::{Monitor, StopHandle, WatchError, WatchSession, run};

pub use cli::{Cli, run_cli};
