// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling watch / exclude glob patterns per rule.
//! - Classifying notify events (content changes only) and dropping events
//!   under pipeline destinations.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - (Optionally) skipping triggers when a file's content hash is unchanged.
//!
//! It only turns filesystem changes into task-level triggers; run
//! serialization happens in the engine.

pub mod event_handler;
pub mod hash;
pub mod path_utils;
pub mod rules;
pub mod watcher;

pub use event_handler::{ContentChange, changed_paths, classify};
pub use rules::{RuleSet, WatchRule, rules_from_config};
pub use watcher::{WatchController, WatcherHandle};
