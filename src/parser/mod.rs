//! Console output parsers
//!
//! Stateless functions turning the line-oriented output of console commands
//! into structured records. Every parser is a pure function of its input
//! lines.
//!
//! | Parser | Console command |
//! |--------|-----------------|
//! | [`director_status`] | `status director` (API mode) |
//! | [`storage_status`] | `.status storage=... <type>` (API mode) |
//! | [`schedule_status`] | `status schedule` (API mode) |
//! | [`LStat::decode`] | packed stat field of BVFS listings |
//! | [`bvfs_entries`] | `.bvfs_lsdirs`, `.bvfs_lsfiles` |
//! | [`bvfs_versions`] | `.bvfs_versions` |
//! | [`list_files`] | `list files jobid=...` |

mod line;
mod listing;
mod lstat;
mod schedule;
mod status;

pub use line::*;
pub use listing::*;
pub use lstat::*;
pub use schedule::*;
pub use status::*;

/// One parsed `key=value` block, keys kept in console order
pub type Record = serde_json::Map<String, serde_json::Value>;
