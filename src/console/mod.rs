//! Bacula console integration
//!
//! Runs allow-listed commands through the `bconsole` binary and returns its
//! output with the console framing removed.
//!
//! ## Invocation
//!
//! | Step | Detail |
//! |------|--------|
//! | Program | `bconsole`, or `sudo bconsole` when `use_sudo` is set |
//! | Arguments | `-c <cfg> [-D <director>]` |
//! | stdin | `gui on`, optional API mode line, the command, `quit` |
//! | Output | stdout and stderr merged in order |
//!
//! Commands are rejected before a process is spawned when the console is
//! disabled, the command is not allow-listed, or the director is unknown.

mod command;
mod runner;

pub use command::*;
pub use runner::*;
