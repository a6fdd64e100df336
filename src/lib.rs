//! Codex SDK - Typed Rust client for `codex exec` turns.
//!
//! Spawns `codex exec --experimental-json`, decodes its newline-delimited
//! event stream into [`exec::ThreadEvent`]s, and aggregates each turn into
//! a [`thread::TurnResult`].

pub mod config;
pub mod display;
pub mod exec;
pub mod input;
pub mod schema;
pub mod thread;

pub use config::{CodexOptions, ThreadOptions, TurnOptions};
pub use exec::{RunError, ThreadEvent, ThreadItem, Usage};
pub use input::{Input, UserInput};
pub use thread::{Codex, StreamedTurn, Thread, TurnResult};
