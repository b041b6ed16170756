//! Error types for the Baculum API
//!
//! Every failure that can reach an API client is a variant of [`ApiError`].
//! Each variant carries the numeric code reported in the `error` field of the
//! response envelope and renders the message reported in `output`.

use std::path::PathBuf;
use thiserror::Error;

/// Code reported when a request completed without errors
pub const ERROR_NO_ERRORS: i64 = 0;

/// Code reported for every failure that has no dedicated code
pub const ERROR_INTERNAL_ERROR: i64 = 1000;

/// Main error type for API operations
#[derive(Error, Debug)]
pub enum ApiError {
    /// Console command is not on the allow-list or is malformed
    #[error("Invalid command.")]
    InvalidCommand,

    /// Catalog database cannot be reached or queried
    #[error("Problem with connection to database. {0}")]
    Database(String),

    /// Console exited with a nonzero status
    #[error("Problem with connection to bconsole. Output=>{}, Exitcode=>{exitcode}", .output.join("\n"))]
    ConsoleConnection {
        /// Raw captured output lines
        output: Vec<String>,
        /// Console process exit status
        exitcode: i32,
    },

    /// Console did not finish in time and was killed
    #[error("Problem with connection to bconsole. Timed out after {0} seconds")]
    ConsoleTimeout(u64),

    /// Director is not in the list of configured directors
    #[error("Invalid director.")]
    InvalidDirector,

    /// Missing or wrong credentials
    #[error("Problem with authentication to Baculum API.")]
    Authentication,

    /// Token scopes do not cover the requested endpoint
    #[error("Access attempt to not allowed resource. Permission denied. Endpoint: {0}")]
    NotAllowedResource(String),

    /// No endpoint is registered under the requested path
    #[error("Invalid path.")]
    InvalidPath,

    /// Console support is switched off in the configuration
    #[error("Bconsole support is disabled.")]
    ConsoleDisabled,

    /// Client does not exist
    #[error("Client does not exist.")]
    ClientNotFound,

    /// Storage does not exist
    #[error("Storage does not exist.")]
    StorageNotFound,

    /// Volume does not exist
    #[error("Volume does not exist.")]
    VolumeNotFound,

    /// Volume name is malformed
    #[error("Invalid volume.")]
    InvalidVolume,

    /// Slot number is malformed
    #[error("Invalid slot.")]
    InvalidSlot,

    /// Pool does not exist
    #[error("Pool does not exist.")]
    PoolNotFound,

    /// Pool has no volumes to update
    #[error("Pool with inputted poolid does not contain any volume to update.")]
    PoolHasNoVolumes,

    /// Job does not exist
    #[error("Job does not exist.")]
    JobNotFound,

    /// Job level is not one of the known level codes
    #[error("Inputted job level is invalid.")]
    InvalidJobLevel,

    /// FileSet for a job run does not exist
    #[error("FileSet resource does not exist.")]
    JobFileSetNotFound,

    /// Client for a job run does not exist
    #[error("Client does not exist.")]
    JobClientNotFound,

    /// Storage for a job run does not exist
    #[error("Storage does not exist.")]
    JobStorageNotFound,

    /// Pool for a job run does not exist
    #[error("Pool does not exist.")]
    JobPoolNotFound,

    /// Restore path is not a `b2<digits>` table name
    #[error("Inputted rpath for restore is invalid. Proper format is b2[0-9]+.")]
    InvalidRestorePath,

    /// Restore `where` option is invalid
    #[error("Inputted \"where\" option is invalid.")]
    InvalidWhere,

    /// Restore `replace` option is invalid
    #[error("Inputted \"replace\" option is invalid.")]
    InvalidReplace,

    /// FileSet does not exist
    #[error("FileSet does not exist.")]
    FileSetNotFound,

    /// BVFS restore path is not a `b2<digits>` table name
    #[error("Inputted path for restore is invalid. Proper format is b2[0-9]+.")]
    BvfsInvalidRpath,

    /// BVFS path parameter is invalid
    #[error("Inputted BVFS path param is invalid.")]
    BvfsInvalidPath,

    /// Comma separated jobid list is invalid
    #[error("Invalid jobid list.")]
    InvalidJobidList,

    /// Comma separated fileid list is invalid
    #[error("Invalid fileid list.")]
    InvalidFileidList,

    /// Comma separated file index list is invalid
    #[error("Invalid file index list.")]
    InvalidFileIndexList,

    /// Comma separated dirid list is invalid
    #[error("Invalid dirid list.")]
    InvalidDiridList,

    /// BVFS client name is invalid
    #[error("Invalid client name.")]
    BvfsInvalidClient,

    /// BVFS jobid is invalid
    #[error("Invalid jobid.")]
    BvfsInvalidJobid,

    /// Endpoint has no handler for the HTTP method
    #[error("Internal error. Method {0} is not supported by this endpoint.")]
    UnsupportedMethod(String),

    /// I/O error with path context
    #[error("Internal error. I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Internal error. Configuration error: {0}")]
    Config(String),

    /// Any other failure
    #[error("Internal error. {0}")]
    Internal(String),
}

impl ApiError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a catalog error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Numeric code reported in the `error` field of the envelope
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidCommand => 1,
            Self::Database(_) => 2,
            Self::ConsoleConnection { .. } | Self::ConsoleTimeout(_) => 4,
            Self::InvalidDirector => 5,
            Self::Authentication => 6,
            Self::NotAllowedResource(_) => 7,
            Self::InvalidPath => 8,
            Self::ConsoleDisabled => 11,
            Self::ClientNotFound => 10,
            Self::StorageNotFound => 20,
            Self::VolumeNotFound => 30,
            Self::InvalidVolume => 31,
            Self::InvalidSlot => 32,
            Self::PoolNotFound => 40,
            Self::PoolHasNoVolumes => 41,
            Self::JobNotFound => 50,
            Self::InvalidJobLevel => 51,
            Self::JobFileSetNotFound => 52,
            Self::JobClientNotFound => 53,
            Self::JobStorageNotFound => 54,
            Self::JobPoolNotFound => 55,
            Self::InvalidRestorePath => 56,
            Self::InvalidWhere => 57,
            Self::InvalidReplace => 58,
            Self::FileSetNotFound => 60,
            Self::BvfsInvalidRpath => 71,
            Self::BvfsInvalidPath => 72,
            Self::InvalidJobidList => 73,
            Self::InvalidFileidList => 74,
            Self::InvalidFileIndexList => 75,
            Self::InvalidDiridList => 76,
            Self::BvfsInvalidClient => 77,
            Self::BvfsInvalidJobid => 78,
            Self::UnsupportedMethod(_)
            | Self::Io { .. }
            | Self::Config(_)
            | Self::Internal(_) => ERROR_INTERNAL_ERROR,
        }
    }

    /// HTTP status used when this error ends a request
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Authentication | Self::NotAllowedResource(_) => 401,
            Self::InvalidPath => 404,
            _ => 200,
        }
    }

    /// Check if this error has no dedicated code
    pub fn is_internal(&self) -> bool {
        self.code() == ERROR_INTERNAL_ERROR
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_connection_message() {
        let err = ApiError::ConsoleConnection {
            output: vec!["Connecting to Director".to_string(), "failed".to_string()],
            exitcode: 1,
        };
        assert_eq!(err.code(), 4);
        assert_eq!(
            err.to_string(),
            "Problem with connection to bconsole. Output=>Connecting to Director\nfailed, Exitcode=>1"
        );
    }

    #[test]
    fn test_internal_errors_share_code() {
        assert_eq!(ApiError::internal("boom").code(), ERROR_INTERNAL_ERROR);
        assert_eq!(ApiError::internal("boom").to_string(), "Internal error. boom");
        assert!(ApiError::config("bad").is_internal());
        assert!(ApiError::UnsupportedMethod("PATCH".into()).is_internal());
        assert!(!ApiError::JobNotFound.is_internal());
    }

    #[test]
    fn test_not_allowed_resource_names_endpoint() {
        let err = ApiError::NotAllowedResource("/api/clients/".to_string());
        assert_eq!(err.code(), 7);
        assert_eq!(err.http_status(), 401);
        assert!(err.to_string().ends_with("Endpoint: /api/clients/"));
    }

    #[test]
    fn test_job_resolution_codes_are_ordered() {
        let codes: Vec<i64> = [
            ApiError::JobNotFound,
            ApiError::InvalidJobLevel,
            ApiError::JobFileSetNotFound,
            ApiError::JobClientNotFound,
            ApiError::JobStorageNotFound,
            ApiError::JobPoolNotFound,
        ]
        .iter()
        .map(ApiError::code)
        .collect();
        assert_eq!(codes, vec![50, 51, 52, 53, 54, 55]);
    }
}
