//! API Data Models
//!
//! The response envelope and the typed parameter sets of the write
//! endpoints. Parameters arrive as form strings or JSON values, so numeric
//! and boolean fields are read leniently: `"12"`, `12` and `"12abc"` are all
//! the integer 12, and `1`, `"1"`, `"yes"` and `true` are all true.

use crate::api::request::Params;
use crate::error::{ApiError, Result, ERROR_NO_ERRORS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version reported in the `Baculum-API-Version` header
pub const API_VERSION: &str = "0.1";

/// Response body of every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Handler result, or the error message
    pub output: Value,
    /// 0 on success, error code otherwise
    pub error: i64,
}

impl Envelope {
    /// Successful response
    pub fn ok(output: impl Into<Value>) -> Self {
        Self {
            output: output.into(),
            error: ERROR_NO_ERRORS,
        }
    }

    /// Failed response carrying the error message and code
    pub fn from_error(err: &ApiError) -> Self {
        Self {
            output: Value::String(err.to_string()),
            error: err.code(),
        }
    }

    /// Whether the response reports success
    pub fn is_ok(&self) -> bool {
        self.error == ERROR_NO_ERRORS
    }
}

/// Decode a parameter set into a typed struct
pub fn from_params<T: DeserializeOwned>(params: Params) -> Result<T> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| ApiError::internal(format!("Invalid parameters: {}", e)))
}

/// Lenient field deserializers for `#[serde(deserialize_with)]`
pub mod lenient {
    use crate::api::request::intval;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Integer from a number or the integer prefix of a string
    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => Some(intval(&s)),
            Value::Bool(b) => Some(i64::from(b)),
            _ => None,
        })
    }

    /// String from a string or a scalar
    pub fn string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(if b { "1" } else { "0" }.to_string()),
            _ => None,
        })
    }

    /// Boolean from a bool, a number or a yes/no style string
    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Bool(b) => Some(b),
            Value::Number(n) => Some(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Value::String(s) => Some(matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )),
            _ => None,
        })
    }
}

/// `POST /api/jobs/run`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobRunParams {
    /// Job id to take the job name from
    #[serde(deserialize_with = "lenient::int")]
    pub id: Option<i64>,
    /// Job name
    #[serde(deserialize_with = "lenient::string")]
    pub name: Option<String>,
    /// Job level code
    #[serde(deserialize_with = "lenient::string")]
    pub level: Option<String>,
    /// FileSet id
    #[serde(deserialize_with = "lenient::int")]
    pub filesetid: Option<i64>,
    /// FileSet name, used when no id is given
    #[serde(deserialize_with = "lenient::string")]
    pub fileset: Option<String>,
    /// Client id
    #[serde(deserialize_with = "lenient::int")]
    pub clientid: Option<i64>,
    /// Client name, used when no id is given
    #[serde(deserialize_with = "lenient::string")]
    pub client: Option<String>,
    /// Storage id
    #[serde(deserialize_with = "lenient::int")]
    pub storageid: Option<i64>,
    /// Storage name, used when no id is given
    #[serde(deserialize_with = "lenient::string")]
    pub storage: Option<String>,
    /// Pool id
    #[serde(deserialize_with = "lenient::int")]
    pub poolid: Option<i64>,
    /// Pool name, used when no id is given
    #[serde(deserialize_with = "lenient::string")]
    pub pool: Option<String>,
    /// Job priority
    #[serde(deserialize_with = "lenient::int")]
    pub priority: Option<i64>,
    /// Job to verify against
    #[serde(deserialize_with = "lenient::int")]
    pub jobid: Option<i64>,
    /// Verify job name
    #[serde(deserialize_with = "lenient::string")]
    pub verifyjob: Option<String>,
}

/// `POST /api/jobs/estimate`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EstimateParams {
    /// Job id to take the job name from
    #[serde(deserialize_with = "lenient::int")]
    pub id: Option<i64>,
    /// Job name
    #[serde(deserialize_with = "lenient::string")]
    pub name: Option<String>,
    /// Job level code
    #[serde(deserialize_with = "lenient::string")]
    pub level: Option<String>,
    /// FileSet id
    #[serde(deserialize_with = "lenient::int")]
    pub filesetid: Option<i64>,
    /// FileSet name, used when no id is given
    #[serde(deserialize_with = "lenient::string")]
    pub fileset: Option<String>,
    /// Client id
    #[serde(deserialize_with = "lenient::int")]
    pub clientid: Option<i64>,
    /// Client name, used when no id is given
    #[serde(deserialize_with = "lenient::string")]
    pub client: Option<String>,
    /// Non-zero for an accurate estimate
    #[serde(deserialize_with = "lenient::int")]
    pub accurate: Option<i64>,
}

/// `POST /api/restore`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RestoreParams {
    /// FileSet id
    #[serde(deserialize_with = "lenient::int")]
    pub filesetid: Option<i64>,
    /// FileSet name, used when no id is given
    #[serde(deserialize_with = "lenient::string")]
    pub fileset: Option<String>,
    /// Client id
    #[serde(deserialize_with = "lenient::int")]
    pub clientid: Option<i64>,
    /// Client name, used when no id is given
    #[serde(deserialize_with = "lenient::string")]
    pub client: Option<String>,
    /// Restore path table name (`b2<number>`)
    #[serde(deserialize_with = "lenient::string")]
    pub rpath: Option<String>,
    /// Restore destination on the client
    #[serde(rename = "where", deserialize_with = "lenient::string")]
    pub where_path: Option<String>,
    /// Replace policy
    #[serde(deserialize_with = "lenient::string")]
    pub replace: Option<String>,
    /// Restore job priority
    #[serde(deserialize_with = "lenient::int")]
    pub priority: Option<i64>,
}

/// `PUT /api/volumes/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VolumeUpdateParams {
    /// New volume status
    #[serde(deserialize_with = "lenient::string")]
    pub volstatus: Option<String>,
    /// Pool to move the volume to
    #[serde(deserialize_with = "lenient::int")]
    pub poolid: Option<i64>,
    /// Volume retention, units allowed
    #[serde(deserialize_with = "lenient::string")]
    pub volretention: Option<String>,
    /// Volume use duration, units allowed
    #[serde(deserialize_with = "lenient::string")]
    pub voluseduration: Option<String>,
    /// Job limit
    #[serde(deserialize_with = "lenient::string")]
    pub maxvoljobs: Option<String>,
    /// File limit
    #[serde(deserialize_with = "lenient::string")]
    pub maxvolfiles: Option<String>,
    /// Byte limit, units allowed
    #[serde(deserialize_with = "lenient::string")]
    pub maxvolbytes: Option<String>,
    /// Autochanger slot
    #[serde(deserialize_with = "lenient::string")]
    pub slot: Option<String>,
    /// Recycle flag
    #[serde(deserialize_with = "lenient::flag")]
    pub recycle: Option<bool>,
    /// Enabled flag
    #[serde(deserialize_with = "lenient::flag")]
    pub enabled: Option<bool>,
    /// In changer flag
    #[serde(deserialize_with = "lenient::flag")]
    pub inchanger: Option<bool>,
}

/// BVFS parameters, each endpoint reads the subset it needs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BvfsParams {
    /// Comma separated job ids
    #[serde(deserialize_with = "lenient::string")]
    pub jobids: Option<String>,
    /// Directory path
    #[serde(deserialize_with = "lenient::string")]
    pub path: Option<String>,
    /// File ids to restore
    #[serde(deserialize_with = "lenient::string")]
    pub fileid: Option<String>,
    /// Directory ids to restore
    #[serde(deserialize_with = "lenient::string")]
    pub dirid: Option<String>,
    /// File indexes to restore, sent as hardlinks
    #[serde(deserialize_with = "lenient::string")]
    pub findex: Option<String>,
}

/// `GET /api/welcome`
#[derive(Debug, Clone, Serialize)]
pub struct Welcome {
    /// API name
    pub name: &'static str,
    /// API version
    pub version: &'static str,
}

impl Default for Welcome {
    fn default() -> Self {
        Self {
            name: "Baculum API",
            version: API_VERSION,
        }
    }
}

/// `GET /api/dbsize`
#[derive(Debug, Clone, Serialize)]
pub struct DbSize {
    /// Catalog size in bytes
    pub dbsize: u64,
    /// Catalog database type
    pub dbtype: &'static str,
}

/// One page of a file listing
#[derive(Debug, Clone, Serialize)]
pub struct FileList {
    /// Entries on this page
    pub items: Vec<String>,
    /// Entries before paging
    pub total: usize,
}

/// Offset and limit query parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Entries to skip
    pub offset: usize,
    /// Most entries to return
    pub limit: usize,
}

impl Page {
    /// Apply to a list, a zero limit means no limit
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        if self.limit > 0 {
            iter.take(self.limit).collect()
        } else {
            iter.collect()
        }
    }
}
