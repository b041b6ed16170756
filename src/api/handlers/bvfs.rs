//! BVFS (Bacula virtual file system) endpoints
//!
//! BVFS browses backed up files by job. The cache has to be built with
//! `update` before directories and files can be listed; a restore selection
//! is collected into a temporary `b2<N>` table with `restore` and removed
//! with `cleanup`.
//!
//! Listings return the console lines, or parsed entries when the query has
//! `output=json`.

use super::{lines, quoted, to_output, Endpoint, RequestContext};
use crate::api::models::{from_params, BvfsParams};
use crate::api::request::{intval, Params};
use crate::console::CommandResult;
use crate::error::{ApiError, Result};
use crate::parser::{bvfs_entries, bvfs_versions};
use crate::validate::{is_valid_ids_list, is_valid_name, is_valid_path, is_valid_rpath};
use serde_json::Value;

fn wants_json(ctx: &RequestContext<'_>) -> bool {
    ctx.param("output") == Some("json")
}

fn jobids(p: &BvfsParams) -> Result<&str> {
    p.jobids
        .as_deref()
        .filter(|ids| is_valid_ids_list(ids))
        .ok_or(ApiError::InvalidJobidList)
}

fn rpath(p: &BvfsParams) -> Result<&str> {
    p.path
        .as_deref()
        .filter(|path| is_valid_rpath(path))
        .ok_or(ApiError::BvfsInvalidRpath)
}

fn optional_list(value: Option<&str>, err: ApiError) -> Result<Option<&str>> {
    match value {
        Some(ids) if is_valid_ids_list(ids) => Ok(Some(ids)),
        Some(_) => Err(err),
        None => Ok(None),
    }
}

fn listing(ctx: &RequestContext<'_>, command: &str, params: Params) -> Result<Value> {
    let p: BvfsParams = from_params(params)?;
    let jobids = jobids(&p)?;
    let path = p
        .path
        .as_deref()
        .filter(|path| is_valid_path(path))
        .ok_or(ApiError::BvfsInvalidPath)?;

    let mut tokens = vec![
        command.to_string(),
        quoted("jobid", jobids),
        quoted("path", path),
    ];
    for key in ["offset", "limit"] {
        if let Some(value) = ctx.int_param(key).filter(|v| *v > 0) {
            tokens.push(quoted(key, value));
        }
    }

    let result = ctx.console(tokens)?;
    entries_or_lines(ctx, result)
}

fn entries_or_lines(ctx: &RequestContext<'_>, result: CommandResult) -> Result<Value> {
    if wants_json(ctx) {
        to_output(bvfs_entries(&result.output))
    } else {
        Ok(lines(result))
    }
}

/// `PUT /api/bvfs/update`
///
/// Every job in `jobids` must exist.
pub struct BvfsUpdate;

impl Endpoint for BvfsUpdate {
    fn update(&self, ctx: &RequestContext<'_>, _id: i64, params: Params) -> Result<Value> {
        let p: BvfsParams = from_params(params)?;
        let jobids = jobids(&p)?;
        for jobid in jobids.split(',').filter(|id| !id.is_empty()) {
            if ctx.catalog().job(intval(jobid))?.is_none() {
                return Err(ApiError::JobNotFound);
            }
        }
        Ok(lines(ctx.console([".bvfs_update".to_string(), quoted("jobid", jobids)])?))
    }
}

/// `PUT /api/bvfs/lsdirs`
pub struct BvfsLsDirs;

impl Endpoint for BvfsLsDirs {
    fn update(&self, ctx: &RequestContext<'_>, _id: i64, params: Params) -> Result<Value> {
        listing(ctx, ".bvfs_lsdirs", params)
    }
}

/// `PUT /api/bvfs/lsfiles`
pub struct BvfsLsFiles;

impl Endpoint for BvfsLsFiles {
    fn update(&self, ctx: &RequestContext<'_>, _id: i64, params: Params) -> Result<Value> {
        listing(ctx, ".bvfs_lsfiles", params)
    }
}

/// `GET /api/bvfs/versions`
///
/// Versions of one file (`pathid`, `filenameid`) for a client. `copies=1`
/// includes copy jobs.
pub struct BvfsVersions;

impl Endpoint for BvfsVersions {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let client = ctx
            .param("client")
            .filter(|c| is_valid_name(c))
            .ok_or(ApiError::BvfsInvalidClient)?;
        let mut tokens = vec![
            ".bvfs_versions".to_string(),
            quoted("client", client),
            quoted("jobid", ctx.int_param("jobid").unwrap_or(0)),
            quoted("pathid", ctx.int_param("pathid").unwrap_or(0)),
            quoted("fnid", ctx.int_param("filenameid").unwrap_or(0)),
        ];
        if ctx.int_param("copies") == Some(1) {
            tokens.push("copies".to_string());
        }

        let result = ctx.console(tokens)?;
        if wants_json(ctx) {
            let name = ctx.param("name").filter(|n| is_valid_path(n)).unwrap_or_default();
            to_output(bvfs_versions(name, &result.output))
        } else {
            Ok(lines(result))
        }
    }
}

/// `GET /api/bvfs/getjobids/{id}`
///
/// Jobids needed to restore the state of job `id`, as computed by the
/// director.
pub struct BvfsGetJobids;

impl Endpoint for BvfsGetJobids {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let jobid = ctx.id();
        if jobid <= 0 {
            return Err(ApiError::BvfsInvalidJobid);
        }
        Ok(lines(ctx.console([".bvfs_get_jobids".to_string(), quoted("jobid", jobid)])?))
    }
}

/// `PUT /api/bvfs/restore`
///
/// Fill restore table `path` with the selected files (`fileid`),
/// directories (`dirid`) and hard links (`findex`).
pub struct BvfsRestore;

impl Endpoint for BvfsRestore {
    fn update(&self, ctx: &RequestContext<'_>, _id: i64, params: Params) -> Result<Value> {
        let p: BvfsParams = from_params(params)?;
        let path = rpath(&p)?;
        let jobids = jobids(&p)?;
        let fileids = optional_list(p.fileid.as_deref(), ApiError::InvalidFileidList)?;
        let dirids = optional_list(p.dirid.as_deref(), ApiError::InvalidDiridList)?;
        let findexes = optional_list(p.findex.as_deref(), ApiError::InvalidFileIndexList)?;

        let mut tokens = vec![
            ".bvfs_restore".to_string(),
            quoted("path", path),
            quoted("jobid", jobids),
        ];
        if let Some(ids) = fileids {
            tokens.push(quoted("fileid", ids));
        }
        if let Some(ids) = dirids {
            tokens.push(quoted("dirid", ids));
        }
        if let Some(ids) = findexes {
            tokens.push(quoted("hardlink", ids));
        }
        Ok(lines(ctx.console(tokens)?))
    }
}

/// `PUT /api/bvfs/cleanup`
pub struct BvfsCleanup;

impl Endpoint for BvfsCleanup {
    fn update(&self, ctx: &RequestContext<'_>, _id: i64, params: Params) -> Result<Value> {
        let p: BvfsParams = from_params(params)?;
        let path = rpath(&p)?;
        Ok(lines(ctx.console([".bvfs_cleanup".to_string(), quoted("path", path)])?))
    }
}

/// `GET /api/bvfs/clear`
pub struct BvfsClearCache;

impl Endpoint for BvfsClearCache {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        Ok(lines(ctx.console([".bvfs_clear_cache", "yes"])?))
    }
}
