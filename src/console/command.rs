//! Console command requests and results

use crate::error::{ApiError, Result};
use serde::Serialize;

/// Commands the API is allowed to send to the console
pub const ALLOWED_COMMANDS: [&str; 35] = [
    "version",
    "status",
    "list",
    "messages",
    "show",
    "mount",
    "umount",
    "release",
    "prune",
    "purge",
    "update",
    "estimate",
    "run",
    ".bvfs_update",
    ".bvfs_lsdirs",
    ".bvfs_lsfiles",
    ".bvfs_versions",
    ".bvfs_get_jobids",
    ".bvfs_restore",
    ".bvfs_clear_cache",
    ".bvfs_cleanup",
    "restore",
    "cancel",
    "delete",
    ".jobs",
    "label",
    "reload",
    ".fileset",
    ".storage",
    ".client",
    ".pool",
    ".schedule",
    ".api",
    ".status",
    ".ls",
];

/// Line switching the console to machine readable output
pub const API_MODE_COMMAND: &str = ".api 2 nosignal api_opts=o";

/// Whether `name` is on the command allow-list
pub fn is_allowed_command(name: &str) -> bool {
    ALLOWED_COMMANDS.contains(&name.trim())
}

/// A console command to run against a director
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Target director, the console default when `None`
    pub director: Option<String>,
    /// Command name followed by its arguments
    pub tokens: Vec<String>,
    /// Prefix the command with [`API_MODE_COMMAND`]
    pub api_mode: bool,
}

impl CommandRequest {
    /// Create a request from command tokens
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            director: None,
            tokens: tokens.into_iter().map(Into::into).collect(),
            api_mode: false,
        }
    }

    /// Target a specific director
    pub fn on_director(mut self, director: Option<&str>) -> Self {
        self.director = director.map(str::to_string);
        self
    }

    /// Request machine readable output
    pub fn with_api_mode(mut self) -> Self {
        self.api_mode = true;
        self
    }

    /// Tokens joined the way the console echoes them back
    pub fn command_line(&self) -> String {
        self.tokens.join(" ")
    }

    /// Check the command before anything is spawned.
    ///
    /// The first token must be on the allow-list and no token may contain a
    /// line break, since every line of the script is a separate command.
    pub fn validate(&self) -> Result<()> {
        let first = self.tokens.first().ok_or(ApiError::InvalidCommand)?;
        if !is_allowed_command(first) {
            return Err(ApiError::InvalidCommand);
        }
        if self.tokens.iter().any(|t| t.contains('\n') || t.contains('\r')) {
            return Err(ApiError::InvalidCommand);
        }
        Ok(())
    }

    /// Script fed to the console on stdin
    pub fn script(&self) -> String {
        let mut script = String::from("gui on\n");
        if self.api_mode {
            script.push_str(API_MODE_COMMAND);
            script.push('\n');
        }
        script.push_str(&self.command_line());
        script.push_str("\nquit\n");
        script
    }
}

/// Output of a successful console command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// Output lines following the command echo
    pub output: Vec<String>,
    /// Console exit status
    pub exitcode: i32,
}

impl CommandResult {
    /// Output without its first line, which for list commands is the echo
    pub fn without_echo(&self) -> &[String] {
        self.output.get(1..).unwrap_or(&[])
    }
}

/// Strip console framing from captured output.
///
/// The last line (the `quit` echo) is dropped, then every line before the
/// first one containing `command` is removed. The echo line itself is kept.
/// Output that never echoes the command is empty.
pub fn prepare_output(mut lines: Vec<String>, command: &str) -> Vec<String> {
    lines.pop();
    match lines.iter().position(|line| line.contains(command)) {
        Some(start) => lines.split_off(start),
        None => Vec::new(),
    }
}
