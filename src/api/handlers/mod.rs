//! API Request Handlers
//!
//! Every endpoint is a unit struct implementing [`Endpoint`]. The dispatcher
//! picks the method by HTTP verb and wraps the returned value in the
//! response envelope; methods an endpoint does not implement fail with the
//! unsupported method error.
//!
//! Handlers validate their input before anything reaches the console: names
//! and paths are checked against the validators in [`crate::validate`] and
//! resources are resolved through the catalog or the console's own resource
//! lists.

mod bvfs;
mod clients;
mod filesets;
mod jobs;
mod misc;
mod pools;
mod restore;
mod status;
mod storages;
mod volumes;

pub use bvfs::*;
pub use clients::*;
pub use filesets::*;
pub use jobs::*;
pub use misc::*;
pub use pools::*;
pub use restore::*;
pub use status::*;
pub use storages::*;
pub use volumes::*;

use crate::api::request::{intval, Params};
use crate::auth::{AuthContext, Authenticator, FileTokenStore};
use crate::catalog::{Catalog, JobRow, SqliteCatalog};
use crate::config::ApiConfig;
use crate::console::{CommandRequest, CommandResult, Console};
use crate::error::{ApiError, Result};
use crate::validate::is_valid_name;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Loaded configuration
    pub config: ApiConfig,
    /// Console runner
    pub console: Console,
    /// Catalog access
    pub catalog: Arc<dyn Catalog>,
    /// Request authentication
    pub auth: Authenticator,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create application state from the configuration
    pub fn new(config: ApiConfig) -> Result<Self> {
        let console = Console::new(config.console.clone());
        let catalog = Arc::new(SqliteCatalog::open(&config.catalog.path)?);
        let tokens = Arc::new(FileTokenStore::open(&config.tokens_path)?);
        let auth = Authenticator::new(config.api.auth_type, config.basic_users.clone(), tokens);
        Ok(Self::with_parts(config, console, catalog, auth))
    }

    /// Create application state from prepared parts
    pub fn with_parts(
        config: ApiConfig,
        console: Console,
        catalog: Arc<dyn Catalog>,
        auth: Authenticator,
    ) -> Self {
        Self {
            config,
            console,
            catalog,
            auth,
            start_time: Instant::now(),
        }
    }
}

/// Everything a handler sees of one request
pub struct RequestContext<'a> {
    /// Shared state
    pub state: &'a AppState,
    /// Authenticated identity
    pub auth: &'a AuthContext,
    /// Query parameters merged with path parameters
    pub query: &'a HashMap<String, String>,
}

impl<'a> RequestContext<'a> {
    /// Raw query or path parameter
    pub fn param(&self, key: &str) -> Option<&'a str> {
        self.query.get(key).map(String::as_str)
    }

    /// Integer parameter, `None` when absent
    pub fn int_param(&self, key: &str) -> Option<i64> {
        self.param(key).map(intval)
    }

    /// Resource id from the path, 0 when absent
    pub fn id(&self) -> i64 {
        self.int_param("id").unwrap_or(0)
    }

    /// Positive `limit` parameter
    pub fn limit(&self) -> Option<u32> {
        self.int_param("limit")
            .filter(|l| *l > 0)
            .map(|l| u32::try_from(l).unwrap_or(u32::MAX))
    }

    /// Director the request targets, the console default when `None`
    pub fn director(&self) -> Option<&'a str> {
        self.param("director").filter(|d| !d.is_empty())
    }

    /// Catalog access
    pub fn catalog(&self) -> &dyn Catalog {
        self.state.catalog.as_ref()
    }

    fn run(&self, request: CommandRequest) -> Result<CommandResult> {
        self.state.console.execute(&request, self.auth.console_cfg())
    }

    /// Run a command on the requested director
    pub fn console<I, T>(&self, tokens: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.run(CommandRequest::new(tokens).on_director(self.director()))
    }

    /// Run a command in API mode on the requested director
    pub fn console_api<I, T>(&self, tokens: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.run(
            CommandRequest::new(tokens)
                .on_director(self.director())
                .with_api_mode(),
        )
    }

    /// Run a command on a given director
    pub fn console_on<I, T>(&self, director: &str, tokens: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.run(CommandRequest::new(tokens).on_director(Some(director)))
    }

    /// Directors of the console configuration
    pub fn directors(&self) -> Result<Vec<String>> {
        Ok(self.state.console.directors(self.auth.console_cfg())?.output)
    }

    /// Resource names from a list command such as `.client`
    pub fn resource_names(&self, command: &str) -> Result<Vec<String>> {
        Ok(self.console([command])?.without_echo().to_vec())
    }

    /// Job names an OAuth2 user may see, `None` for administrators
    pub fn allowed_jobs(&self) -> Result<Option<Vec<String>>> {
        if self.auth.is_admin() {
            return Ok(None);
        }
        self.resource_names(".jobs").map(Some)
    }

    /// Fail with `err` unless `name` is in the list printed by `command`
    pub fn ensure_listed(&self, command: &str, name: &str, err: ApiError) -> Result<()> {
        if self.resource_names(command)?.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// An API endpoint
///
/// Every method defaults to the unsupported method error.
pub trait Endpoint: Send + Sync {
    /// `GET`
    fn get(&self, _ctx: &RequestContext<'_>) -> Result<Value> {
        Err(ApiError::UnsupportedMethod("GET".to_string()))
    }

    /// `POST` with the parameters under `create`
    fn create(&self, _ctx: &RequestContext<'_>, _params: Params) -> Result<Value> {
        Err(ApiError::UnsupportedMethod("POST".to_string()))
    }

    /// `PUT` with the resource id and the parameters under `update`
    fn update(&self, _ctx: &RequestContext<'_>, _id: i64, _params: Params) -> Result<Value> {
        Err(ApiError::UnsupportedMethod("PUT".to_string()))
    }

    /// `DELETE` with the resource id
    fn remove(&self, _ctx: &RequestContext<'_>, _id: i64) -> Result<Value> {
        Err(ApiError::UnsupportedMethod("DELETE".to_string()))
    }
}

/// Serialize a handler result
pub(crate) fn to_output<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Console output lines as the handler result
pub(crate) fn lines(result: CommandResult) -> Value {
    Value::from(result.output)
}

/// Run a catalog job query under the caller's job restriction.
///
/// Administrators see every job. Other users see the jobs their console
/// lists, and nothing when it lists none.
pub(crate) fn visible_jobs<F>(ctx: &RequestContext<'_>, query: F) -> Result<Value>
where
    F: FnOnce(&[String]) -> Result<Vec<JobRow>>,
{
    let jobs = match ctx.allowed_jobs()? {
        None => query(&[])?,
        Some(names) if names.is_empty() => Vec::new(),
        Some(names) => query(&names)?,
    };
    to_output(jobs)
}

/// Resolve a resource given by id or by name.
///
/// An id wins and is looked up with `by_id`; a name is taken as is when it
/// is a valid resource name. Anything else fails with `err`.
pub(crate) fn resolve_name<F>(
    id: Option<i64>,
    name: Option<&str>,
    by_id: F,
    err: ApiError,
) -> Result<String>
where
    F: FnOnce(i64) -> Result<Option<String>>,
{
    let resolved = match (id, name) {
        (Some(id), _) => by_id(id)?,
        (None, Some(name)) if is_valid_name(name) => Some(name.to_string()),
        _ => None,
    };
    resolved.ok_or(err)
}

/// `key="value"` console argument
pub(crate) fn quoted(key: &str, value: impl std::fmt::Display) -> String {
    format!("{}=\"{}\"", key, value)
}
