//! Configuration settings for the Baculum API
//!
//! Defines the CLI arguments and the JSON configuration file with its
//! defaults.

use crate::error::{ApiError, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/baculum-api/api.json";

/// Baculum API - JSON REST API for the Bacula console
#[derive(Parser, Debug, Clone)]
#[command(name = "baculum-api")]
#[command(author = "Baculum API Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "JSON REST API front-end for the Bacula console")]
#[command(long_about = r#"
Baculum API exposes the Bacula console (bconsole) and the Bacula catalog
as a JSON REST API.

Every response has the shape {"output": ..., "error": <code>}.

Examples:
  baculum-api serve                           # Start the API server
  baculum-api serve --bind 0.0.0.0 --port 9096
  baculum-api exec status director            # Run a console command
  baculum-api directors                       # List configured directors
  baculum-api lstat "A A IGk B A A A BAA ..." # Decode a packed stat value
  baculum-api token issue --client-id app --scope "jobs clients"
"#)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short = 'c',
        long,
        env = "BACULUM_API_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        value_name = "PATH"
    )]
    pub config: PathBuf,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP API server
    #[command(name = "serve")]
    Serve {
        /// Bind address (overrides the configuration file)
        #[arg(short, long)]
        bind: Option<String>,
        /// Listen port (overrides the configuration file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a single console command and print its output
    #[command(name = "exec")]
    Exec {
        /// Target director
        #[arg(short = 'D', long)]
        director: Option<String>,
        /// Prefix the command with the API output mode
        #[arg(long)]
        api: bool,
        /// Command tokens
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        tokens: Vec<String>,
    },

    /// List directors configured for the console
    #[command(name = "directors")]
    Directors,

    /// Decode a packed stat (LStat) value
    #[command(name = "lstat")]
    Lstat {
        /// Encoded value, 16 space separated fields
        encoded: String,
    },

    /// Manage OAuth2 access tokens
    #[command(name = "token")]
    Token {
        /// Token action
        #[command(subcommand)]
        action: TokenCommand,
    },
}

/// Token management actions
#[derive(Subcommand, Debug, Clone)]
pub enum TokenCommand {
    /// Issue a new access token
    Issue {
        /// OAuth2 client identifier
        #[arg(long)]
        client_id: String,
        /// Space separated list of allowed endpoint scopes
        #[arg(long, default_value = "")]
        scope: String,
        /// Lifetime in seconds
        #[arg(long, default_value = "120")]
        ttl: u64,
        /// Console configuration used for requests made with this token
        #[arg(long, value_name = "PATH")]
        console_cfg: Option<PathBuf>,
    },

    /// Remove expired tokens
    Purge,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable text
    #[default]
    Text,
    /// JSON lines
    Json,
}

/// Authentication method for API requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// HTTP basic authentication against configured users
    #[default]
    Basic,
    /// OAuth2 bearer tokens
    OAuth2,
}

/// Global API options
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiSection {
    /// Authentication method
    pub auth_type: AuthType,
    /// Log every console invocation and request at debug level
    pub debug: bool,
}

/// Console (bconsole) integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Console binary
    pub bin_path: PathBuf,
    /// Console configuration file
    pub cfg_path: PathBuf,
    /// Run the console through sudo
    pub use_sudo: bool,
    /// Console support switch
    pub enabled: bool,
    /// Seconds after which a console invocation is killed
    pub timeout_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            bin_path: PathBuf::from("/usr/sbin/bconsole"),
            cfg_path: PathBuf::from("/etc/bacula/bconsole.conf"),
            use_sudo: false,
            enabled: true,
            timeout_secs: 60,
        }
    }
}

/// Catalog database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite catalog file
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/bacula/bacula.db"),
        }
    }
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,
    /// Port
    pub port: u16,
    /// Send CORS headers for all origins
    pub cors_enabled: bool,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 9096,
            cors_enabled: false,
            max_body_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Basic authentication user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicUser {
    /// User name
    pub username: String,
    /// Hex encoded SHA-256 of the password
    pub password_sha256: String,
}

/// Complete API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Global options
    pub api: ApiSection,
    /// Console integration
    pub console: ConsoleConfig,
    /// Catalog database
    pub catalog: CatalogConfig,
    /// HTTP listener
    pub server: ServerConfig,
    /// OAuth2 token store file
    pub tokens_path: PathBuf,
    /// Users allowed with basic authentication
    pub basic_users: Vec<BasicUser>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api: ApiSection::default(),
            console: ConsoleConfig::default(),
            catalog: CatalogConfig::default(),
            server: ServerConfig::default(),
            tokens_path: PathBuf::from("/var/lib/baculum-api/tokens.json"),
            basic_users: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults, a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("Configuration file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ApiError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ApiError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.console.timeout_secs == 0 {
            return Err(ApiError::config("console.timeout_secs must be greater than 0"));
        }
        if self.server.max_body_size == 0 {
            return Err(ApiError::config("server.max_body_size must be greater than 0"));
        }
        for user in &self.basic_users {
            let valid_hash = user.password_sha256.len() == 64
                && user.password_sha256.bytes().all(|b| b.is_ascii_hexdigit());
            if !valid_hash {
                return Err(ApiError::config(format!(
                    "basic user '{}' has an invalid password_sha256",
                    user.username
                )));
            }
        }
        if self.api.auth_type == AuthType::Basic && self.basic_users.is_empty() {
            tracing::warn!("Basic authentication selected but no users are configured");
        }
        Ok(())
    }
}
