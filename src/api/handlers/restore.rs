//! Restore endpoint

use super::{lines, quoted, resolve_name, Endpoint, RequestContext, DEFAULT_JOB_PRIORITY};
use crate::api::models::{from_params, RestoreParams};
use crate::api::request::Params;
use crate::error::{ApiError, Result};
use crate::validate::{is_valid_path, is_valid_replace, is_valid_rpath};
use serde_json::Value;

/// `POST /api/restore/run`
///
/// Restores the files selected into a BVFS restore table (`rpath`, created
/// by `.bvfs_restore`). The table is dropped afterwards whether or not the
/// restore command succeeded; a failed drop is only logged.
pub struct RestoreRun;

impl Endpoint for RestoreRun {
    fn create(&self, ctx: &RequestContext<'_>, params: Params) -> Result<Value> {
        let p: RestoreParams = from_params(params)?;

        let fileset = resolve_name(
            p.filesetid,
            p.fileset.as_deref(),
            |id| Ok(ctx.catalog().fileset(id)?.map(|f| f.fileset)),
            ApiError::JobFileSetNotFound,
        )?;
        let client = resolve_name(
            p.clientid,
            p.client.as_deref(),
            |id| Ok(ctx.catalog().client(id)?.map(|c| c.name)),
            ApiError::JobClientNotFound,
        )?;
        let rpath = p
            .rpath
            .filter(|r| is_valid_rpath(r))
            .ok_or(ApiError::InvalidRestorePath)?;
        let where_path = p
            .where_path
            .filter(|w| is_valid_path(w))
            .ok_or(ApiError::InvalidWhere)?;
        let replace = p
            .replace
            .filter(|r| is_valid_replace(r))
            .ok_or(ApiError::InvalidReplace)?;
        let priority = p.priority.unwrap_or(DEFAULT_JOB_PRIORITY);

        let result = ctx.console([
            "restore".to_string(),
            quoted("file", format!("?{}", rpath)),
            quoted("client", &client),
            quoted("where", &where_path),
            quoted("replace", &replace),
            quoted("fileset", &fileset),
            quoted("priority", priority),
            "yes".to_string(),
        ]);

        if let Err(e) = ctx.catalog().drop_restore_table(&rpath) {
            tracing::warn!(table = %rpath, error = %e, "Failed to drop restore table");
        }

        Ok(lines(result?))
    }
}
