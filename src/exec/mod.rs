//! `codex exec` process spawning and event stream parsing.

mod error;
mod events;
mod items;
mod process;
mod stream;

pub use error::*;
pub use events::*;
pub use items::*;
pub use process::*;
pub use stream::*;
