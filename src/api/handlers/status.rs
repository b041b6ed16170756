//! Component status endpoints
//!
//! All three run their command in API mode and return parsed records
//! instead of console text.

use super::{quoted, to_output, Endpoint, RequestContext};
use crate::error::{ApiError, Result};
use crate::parser::{director_status, schedule_status, storage_status, StorageStatusKind};
use crate::validate::{is_valid_bdate, is_valid_integer, is_valid_name};
use serde_json::Value;

/// `GET /api/status/director`
///
/// With a `type` naming a section of the output only that section is
/// returned, otherwise every section keyed by name.
pub struct DirectorStatusEndpoint;

impl Endpoint for DirectorStatusEndpoint {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let result = ctx.console_api(["status", "director"])?;
        let status = director_status(&result.output);

        let section = ctx
            .param("type")
            .filter(|t| is_valid_name(t))
            .and_then(|t| status.section(t));
        match section {
            Some(records) => to_output(records),
            None => to_output(&status),
        }
    }
}

/// `GET /api/status/storage`
///
/// `type` is one of header, running, terminated or devices and defaults to
/// header; unknown types fall back to the default.
pub struct StorageStatusEndpoint;

impl Endpoint for StorageStatusEndpoint {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let kind: StorageStatusKind = ctx
            .param("type")
            .and_then(|t| t.parse().ok())
            .unwrap_or_default();

        let target = match ctx.param("name") {
            Some(name) if is_valid_name(name) => quoted("storage", name),
            Some(_) => return Err(ApiError::StorageNotFound),
            None => "storage".to_string(),
        };

        let result = ctx.console_api([".status".to_string(), target, kind.as_str().to_string()])?;
        to_output(storage_status(&result.output, kind))
    }
}

/// `GET /api/schedules/status`
///
/// Optional filters: `job`, `client` and `schedule` names, `days` and
/// `limit` counts and a `time` in `YYYY-MM-DD HH:MM:SS` form. Invalid
/// filters are left out of the command.
pub struct ScheduleStatusEndpoint;

impl Endpoint for ScheduleStatusEndpoint {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let mut command = vec!["status".to_string(), "schedule".to_string()];
        for key in ["job", "client", "schedule"] {
            if let Some(value) = ctx.param(key).filter(|v| is_valid_name(v)) {
                command.push(quoted(key, value));
            }
        }
        for key in ["days", "limit"] {
            if let Some(value) = ctx.param(key).filter(|v| is_valid_integer(v)) {
                command.push(quoted(key, value));
            }
        }
        if let Some(time) = ctx.param("time").filter(|v| is_valid_bdate(v)) {
            command.push(quoted("time", time));
        }

        let result = ctx.console_api(command)?;
        to_output(schedule_status(result.without_echo()))
    }
}
