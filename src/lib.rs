//! # Baculum API - JSON REST API for the Bacula console
//!
//! Exposes the Bacula console (`bconsole`) and the Bacula catalog as a JSON
//! REST API. Requests are authenticated with HTTP basic auth or OAuth2
//! bearer tokens, validated, turned into allow-listed console commands or
//! catalog queries, and answered with a uniform envelope:
//!
//! ```json
//! {"output": ..., "error": 0}
//! ```
//!
//! ## Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`api`] | HTTP server, routing, dispatch and endpoints |
//! | [`auth`] | Basic and OAuth2 authentication, scope checks |
//! | [`console`] | `bconsole` subprocess runner |
//! | [`parser`] | Console output parsers and LStat decoding |
//! | [`catalog`] | Catalog database queries |
//! | [`validate`] | Input validators |
//! | [`config`] | CLI arguments and configuration file |
//! | [`error`] | Error codes |
//!
//! ## Running a Console Command
//!
//! ```no_run
//! use baculum_api::config::ConsoleConfig;
//! use baculum_api::console::{CommandRequest, Console};
//!
//! let console = Console::new(ConsoleConfig::default());
//! let request = CommandRequest::new(["status", "director"]).with_api_mode();
//! let result = console.execute(&request, None).unwrap();
//!
//! for line in result.without_echo() {
//!     println!("{}", line);
//! }
//! ```
//!
//! ## Decoding File Attributes
//!
//! ```
//! use baculum_api::parser::LStat;
//! use num_bigint::BigInt;
//!
//! let stat = LStat::decode("A A EHt C A A A Hw A A A A A A A A").unwrap();
//! assert!(stat.is_dir());
//! assert_eq!(stat.size, BigInt::from(496));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod console;
pub mod error;
pub mod parser;
pub mod validate;

// Re-export commonly used types
pub use api::{ApiServer, Envelope, API_VERSION};
pub use config::ApiConfig;
pub use error::{ApiError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use baculum_api::prelude::*;
    //! ```

    pub use crate::api::handlers::AppState;
    pub use crate::api::{dispatch, ApiRequest, ApiResponse, ApiServer, Envelope};
    pub use crate::auth::{AuthContext, Authenticator, FileTokenStore, TokenRecord, TokenStore};
    pub use crate::catalog::{Catalog, SqliteCatalog};
    pub use crate::config::{ApiConfig, AuthType, ConsoleConfig};
    pub use crate::console::{CommandRequest, CommandResult, Console};
    pub use crate::error::{ApiError, Result};
    pub use crate::parser::LStat;
}
