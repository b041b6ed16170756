//! Job endpoints
//!
//! Run and estimate resolve their parameters in a fixed order and stop at
//! the first failure:
//!
//! | Step | Source | Error |
//! |------|--------|-------|
//! | job | `id` (catalog) or `name` | 50 |
//! | level | level code | 51 |
//! | fileset | `filesetid` (catalog) or `fileset` | 52 |
//! | client | `clientid` (catalog) or `client` | 53 |
//! | storage | `storageid` (catalog) or `storage` | 54 (run only) |
//! | pool | `poolid` (catalog) or `pool` | 55 (run only) |

use super::{lines, quoted, resolve_name, to_output, visible_jobs, Endpoint, RequestContext};
use crate::api::models::{from_params, EstimateParams, FileList, JobRunParams, Page};
use crate::api::request::Params;
use crate::catalog::{recent_jobids, restore_jobids, JobRow};
use crate::error::{ApiError, Result};
use crate::parser::{filter_files, job_shown, list_files, queued_jobid};
use crate::validate::{
    is_valid_list_files_type, is_valid_name, is_valid_path, job_level_name, job_type_name,
};
use serde_json::{Map, Value};

/// Priority of jobs run without one
pub const DEFAULT_JOB_PRIORITY: i64 = 10;

fn catalog_job(ctx: &RequestContext<'_>, jobid: i64) -> Result<JobRow> {
    ctx.catalog().job(jobid)?.ok_or(ApiError::JobNotFound)
}

fn job_name(ctx: &RequestContext<'_>, id: Option<i64>, name: Option<&str>) -> Result<String> {
    resolve_name(
        id,
        name,
        |id| Ok(ctx.catalog().job(id)?.map(|j| j.name)),
        ApiError::JobNotFound,
    )
}

fn fileset_name(
    ctx: &RequestContext<'_>,
    id: Option<i64>,
    name: Option<&str>,
) -> Result<String> {
    resolve_name(
        id,
        name,
        |id| Ok(ctx.catalog().fileset(id)?.map(|f| f.fileset)),
        ApiError::JobFileSetNotFound,
    )
}

fn client_name(ctx: &RequestContext<'_>, id: Option<i64>, name: Option<&str>) -> Result<String> {
    resolve_name(
        id,
        name,
        |id| Ok(ctx.catalog().client(id)?.map(|c| c.name)),
        ApiError::JobClientNotFound,
    )
}

fn level_name(level: Option<&str>) -> Result<&'static str> {
    level.and_then(job_level_name).ok_or(ApiError::InvalidJobLevel)
}

/// `GET /api/jobs`
pub struct Jobs;

impl Endpoint for Jobs {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        visible_jobs(ctx, |allowed| ctx.catalog().jobs(ctx.limit(), allowed))
    }
}

/// `GET /api/jobs/{id}` and `DELETE /api/jobs/{id}`
pub struct Job;

impl Endpoint for Job {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let job = catalog_job(ctx, ctx.id())?;
        ctx.ensure_listed(".jobs", &job.name, ApiError::JobNotFound)?;
        to_output(job)
    }

    fn remove(&self, ctx: &RequestContext<'_>, id: i64) -> Result<Value> {
        Ok(lines(ctx.console(["delete".to_string(), quoted("jobid", id)])?))
    }
}

/// `GET /api/jobs/show`
pub struct JobsShow;

impl Endpoint for JobsShow {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let result = match ctx.param("name") {
            Some(name) => {
                ctx.ensure_listed(".jobs", name, ApiError::JobNotFound)?;
                ctx.console(["show".to_string(), quoted("job", name)])?
            }
            None => ctx.console(["show", "jobs"])?,
        };
        Ok(lines(result))
    }
}

/// `GET /api/jobs/{id}/show`
pub struct JobShow;

impl Endpoint for JobShow {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let job = catalog_job(ctx, ctx.id())?;
        Ok(lines(ctx.console(["show".to_string(), quoted("job", &job.name)])?))
    }
}

/// `GET /api/jobs/tasks`
///
/// Job names defined on every director, keyed by director. A name counts
/// only if `show jobs` on the same director describes it, which skips
/// stray console messages in the `.jobs` output.
pub struct JobTasks;

impl Endpoint for JobTasks {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let limit = ctx.limit().map(|l| l as usize);
        let mut list_command = vec![".jobs".to_string()];
        if let Some(job_type) = ctx.param("type").filter(|t| job_type_name(t).is_some()) {
            list_command.push(quoted("type", job_type));
        }

        let mut tasks = Map::new();
        for director in ctx.directors()? {
            let names = ctx.console_on(&director, list_command.clone())?;
            let shown = ctx.console_on(&director, ["show", "jobs"])?;

            let mut jobs = Vec::new();
            for name in names.without_echo() {
                if job_shown(&shown.output, name) {
                    jobs.push(Value::String(name.clone()));
                }
                if limit.map_or(false, |l| jobs.len() >= l) {
                    break;
                }
            }
            tasks.insert(director, Value::Array(jobs));
        }
        Ok(Value::Object(tasks))
    }
}

/// `GET /api/jobs/recent/{name}`
///
/// Jobids needed to restore the latest state of a job for one client and
/// fileset.
pub struct JobsRecent;

impl Endpoint for JobsRecent {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let name = ctx.param("name").unwrap_or_default();

        let clientid = match (ctx.int_param("clientid"), ctx.param("client")) {
            (Some(id), _) => id,
            (None, Some(client)) if is_valid_name(client) => ctx
                .catalog()
                .client_by_name(client)?
                .map(|c| c.clientid)
                .ok_or(ApiError::ClientNotFound)?,
            _ => return Err(ApiError::ClientNotFound),
        };

        let filesetid = match (ctx.int_param("filesetid"), ctx.param("fileset")) {
            (Some(id), _) => id,
            (None, Some(fileset)) if is_valid_name(fileset) => ctx
                .catalog()
                .fileset_by_name(fileset)?
                .map(|f| f.filesetid)
                .ok_or(ApiError::FileSetNotFound)?,
            _ => return Err(ApiError::FileSetNotFound),
        };

        ctx.ensure_listed(".jobs", name, ApiError::JobNotFound)?;
        to_output(recent_jobids(ctx.catalog(), name, clientid, filesetid)?)
    }
}

/// `POST /api/jobs/run`
pub struct JobRun;

impl Endpoint for JobRun {
    fn create(&self, ctx: &RequestContext<'_>, params: Params) -> Result<Value> {
        let p: JobRunParams = from_params(params)?;

        let job = job_name(ctx, p.id, p.name.as_deref())?;
        let level = level_name(p.level.as_deref())?;
        let fileset = fileset_name(ctx, p.filesetid, p.fileset.as_deref())?;
        let client = client_name(ctx, p.clientid, p.client.as_deref())?;
        let storage = resolve_name(
            p.storageid,
            p.storage.as_deref(),
            |id| Ok(ctx.catalog().storage(id)?.map(|s| s.name)),
            ApiError::JobStorageNotFound,
        )?;
        let pool = resolve_name(
            p.poolid,
            p.pool.as_deref(),
            |id| Ok(ctx.catalog().pool(id)?.map(|p| p.name)),
            ApiError::JobPoolNotFound,
        )?;
        let priority = p.priority.unwrap_or(DEFAULT_JOB_PRIORITY);

        let mut command = vec![
            "run".to_string(),
            quoted("job", &job),
            quoted("level", level),
            quoted("fileset", &fileset),
            quoted("client", &client),
            quoted("storage", &storage),
            quoted("pool", &pool),
            quoted("priority", priority),
        ];
        if let Some(jobid) = p.jobid {
            command.push(quoted("jobid", jobid));
        }
        if let Some(verifyjob) = p.verifyjob.as_deref().filter(|v| is_valid_name(v)) {
            command.push(quoted("verifyjob", verifyjob));
        }
        command.push("yes".to_string());

        let result = ctx.console(command)?;
        match queued_jobid(&result.output) {
            Some(jobid) => tracing::info!(job = %job, jobid, "Job queued"),
            None => tracing::warn!(job = %job, "Run did not report a queued jobid"),
        }
        Ok(lines(result))
    }
}

/// `POST /api/jobs/estimate`
pub struct JobEstimate;

impl Endpoint for JobEstimate {
    fn create(&self, ctx: &RequestContext<'_>, params: Params) -> Result<Value> {
        let p: EstimateParams = from_params(params)?;

        let job = job_name(ctx, p.id, p.name.as_deref())?;
        let level = level_name(p.level.as_deref())?;
        let fileset = fileset_name(ctx, p.filesetid, p.fileset.as_deref())?;
        let client = client_name(ctx, p.clientid, p.client.as_deref())?;

        let mut command = vec![
            "estimate".to_string(),
            quoted("job", &job),
            quoted("level", level),
            quoted("fileset", &fileset),
            quoted("client", &client),
        ];
        if let Some(accurate) = p.accurate {
            command.push(quoted("accurate", if accurate == 1 { "yes" } else { "no" }));
        }
        Ok(lines(ctx.console(command)?))
    }
}

/// `GET /api/jobs/{id}/files`
///
/// Optional `type` (saved, deleted, all), `search` (case-insensitive
/// substring), `offset` and `limit`. `total` counts matches before paging.
pub struct JobListFiles;

impl Endpoint for JobListFiles {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let job = catalog_job(ctx, ctx.id())?;
        ctx.ensure_listed(".jobs", &job.name, ApiError::JobNotFound)?;

        let mut command = vec!["list".to_string(), "files".to_string()];
        if let Some(kind) = ctx.param("type").filter(|t| is_valid_list_files_type(t)) {
            command.push(quoted("type", kind));
        }
        command.push(quoted("jobid", job.jobid));

        let result = ctx.console(command)?;
        let mut files = list_files(&result.output);
        if let Some(search) = ctx.param("search").filter(|s| is_valid_path(s)) {
            files = filter_files(files, search);
        }

        let total = files.len();
        let page = Page {
            offset: ctx.int_param("offset").unwrap_or(0).max(0) as usize,
            limit: ctx.int_param("limit").unwrap_or(0).max(0) as usize,
        };
        to_output(FileList {
            items: page.apply(files),
            total,
        })
    }
}

/// `GET /api/jobs/{id}/restorejobids`
pub struct JobRestoreIds;

impl Endpoint for JobRestoreIds {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let job = catalog_job(ctx, ctx.id())?;
        to_output(restore_jobids(ctx.catalog(), &job)?)
    }
}

/// `GET /api/jobs/{id}/cancel`
pub struct JobCancel;

impl Endpoint for JobCancel {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let job = catalog_job(ctx, ctx.id())?;
        Ok(lines(ctx.console(["cancel".to_string(), quoted("jobid", job.jobid)])?))
    }
}

/// `GET /api/joblog/{id}`
pub struct JobLog;

impl Endpoint for JobLog {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let job = catalog_job(ctx, ctx.id())?;
        let log: Vec<String> = ctx
            .catalog()
            .job_log(job.jobid)?
            .into_iter()
            .map(|line| line.trim().to_string())
            .collect();
        to_output(log)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use serde_json::json;

    fn console() -> ScriptedConsole {
        ScriptedConsole::new()
            .reply(".jobs", &["backup", "other"])
            .reply(
                "run job=\"backup\" level=\"Full\" fileset=\"Full Set\" client=\"c1-fd\" \
                 storage=\"File1\" pool=\"Default\" priority=\"10\" yes",
                &["Job queued. JobId=8"],
            )
    }

    #[test]
    fn test_run_resolves_parameters() {
        let (app, console) = state(console());
        let out = with_admin(&app, &query(&[]), |ctx| {
            JobRun.create(
                ctx,
                params(json!({
                    "id": "1",
                    "level": "F",
                    "filesetid": 1,
                    "client": "c1-fd",
                    "storageid": "1",
                    "pool": "Default",
                })),
            )
        })
        .unwrap();
        assert_eq!(out[1], json!("Job queued. JobId=8"));
        assert_eq!(console.commands().len(), 1);
    }

    #[test]
    fn test_run_stops_at_first_failure() {
        let (app, console) = state(console());
        let run = |p: Value| with_admin(&app, &query(&[]), |ctx| JobRun.create(ctx, params(p)));

        assert_eq!(run(json!({})).unwrap_err().code(), 50);
        assert_eq!(run(json!({"id": 99})).unwrap_err().code(), 50);
        assert_eq!(run(json!({"name": "bad\"name"})).unwrap_err().code(), 50);
        assert_eq!(run(json!({"name": "backup", "level": "X"})).unwrap_err().code(), 51);
        assert_eq!(
            run(json!({"name": "backup", "level": "F", "filesetid": 9})).unwrap_err().code(),
            52
        );
        assert_eq!(
            run(json!({"name": "backup", "level": "F", "fileset": "Full Set"}))
                .unwrap_err()
                .code(),
            53
        );
        assert_eq!(
            run(json!({"name": "backup", "level": "F", "fileset": "Full Set", "client": "c1-fd"}))
                .unwrap_err()
                .code(),
            54
        );
        assert_eq!(
            run(json!({"name": "backup", "level": "F", "fileset": "Full Set", "client": "c1-fd",
                "storage": "File1", "poolid": 7}))
            .unwrap_err()
            .code(),
            55
        );
        assert!(console.commands().is_empty());
    }

    #[test]
    fn test_run_optional_tokens() {
        let (app, console) = state(ScriptedConsole::new());
        with_admin(&app, &query(&[]), |ctx| {
            JobRun.create(
                ctx,
                params(json!({
                    "name": "verify", "level": "O", "fileset": "Full Set", "client": "c1-fd",
                    "storage": "File1", "pool": "Default", "priority": "5",
                    "jobid": "3", "verifyjob": "backup",
                })),
            )
        })
        .unwrap();
        assert_eq!(
            console.commands(),
            vec![
                "run job=\"verify\" level=\"VolumeToCatalog\" fileset=\"Full Set\" client=\"c1-fd\" \
                 storage=\"File1\" pool=\"Default\" priority=\"5\" jobid=\"3\" verifyjob=\"backup\" yes"
            ]
        );
    }

    #[test]
    fn test_estimate() {
        let (app, console) = state(ScriptedConsole::new());
        let estimate = |p: Value| with_admin(&app, &query(&[]), |ctx| JobEstimate.create(ctx, params(p)));

        estimate(json!({"id": 1, "level": "I", "filesetid": 1, "clientid": 1, "accurate": 1})).unwrap();
        estimate(json!({"id": 1, "level": "I", "filesetid": 1, "clientid": 1})).unwrap();
        assert_eq!(
            console.commands(),
            vec![
                "estimate job=\"backup\" level=\"Incremental\" fileset=\"Full Set\" client=\"c1-fd\" accurate=\"yes\"",
                "estimate job=\"backup\" level=\"Incremental\" fileset=\"Full Set\" client=\"c1-fd\"",
            ]
        );
        assert_eq!(
            estimate(json!({"id": 1, "level": "I", "filesetid": 1})).unwrap_err().code(),
            53
        );
    }

    #[test]
    fn test_job_get_and_delete() {
        let (app, console) = state(ScriptedConsole::new().reply(".jobs", &["other"]));
        let out = with_admin(&app, &query(&[("id", "6")]), |ctx| Job.get(ctx)).unwrap();
        assert_eq!(out["name"], json!("other"));
        let err = with_admin(&app, &query(&[("id", "1")]), |ctx| Job.get(ctx)).unwrap_err();
        assert_eq!(err.code(), 50);

        with_admin(&app, &query(&[]), |ctx| Job.remove(ctx, 4)).unwrap();
        assert_eq!(console.commands().last().unwrap(), "delete jobid=\"4\"");
    }

    #[test]
    fn test_jobs_list_restricted_for_users() {
        let (app, _) = state(ScriptedConsole::new().reply(".jobs", &["other"]));
        let all = with_admin(&app, &query(&[("limit", "2")]), |ctx| Jobs.get(ctx)).unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);

        let mine = with_auth(&app, &user(&["jobs"]), &query(&[]), |ctx| Jobs.get(ctx)).unwrap();
        assert_eq!(mine.as_array().unwrap().len(), 1);
        assert_eq!(mine[0]["jobid"], json!(6));
    }

    #[test]
    fn test_show() {
        let (app, console) = state(console());
        with_admin(&app, &query(&[("name", "backup")]), |ctx| JobsShow.get(ctx)).unwrap();
        with_admin(&app, &query(&[]), |ctx| JobsShow.get(ctx)).unwrap();
        with_admin(&app, &query(&[("id", "6")]), |ctx| JobShow.get(ctx)).unwrap();
        let err = with_admin(&app, &query(&[("name", "missing")]), |ctx| JobsShow.get(ctx))
            .unwrap_err();
        assert_eq!(err.code(), 50);
        assert_eq!(
            console.commands(),
            vec![".jobs", "show job=\"backup\"", "show jobs", "show job=\"other\"", ".jobs"]
        );
    }

    #[test]
    fn test_tasks_fan_out() {
        let console = ScriptedConsole::new()
            .reply(".jobs@dir1", &["backup", "You have messages.", "restore"])
            .reply(".jobs@dir2", &["remote"])
            .reply(
                "show jobs@dir1",
                &["Job: name=backup JobType=66", "Job: name=restore JobType=82"],
            )
            .reply("show jobs@dir2", &["Job: name=remote JobType=66"]);
        let (app, _) = state(console);

        let out = with_admin(&app, &query(&[]), |ctx| JobTasks.get(ctx)).unwrap();
        assert_eq!(out, json!({"dir1": ["backup", "restore"], "dir2": ["remote"]}));

        let out = with_admin(&app, &query(&[("limit", "1")]), |ctx| JobTasks.get(ctx)).unwrap();
        assert_eq!(out, json!({"dir1": ["backup"], "dir2": ["remote"]}));
    }

    #[test]
    fn test_tasks_type_filter() {
        let (app, console) = state(ScriptedConsole::new());
        with_admin(&app, &query(&[("type", "B")]), |ctx| JobTasks.get(ctx)).unwrap();
        with_admin(&app, &query(&[("type", "bogus")]), |ctx| JobTasks.get(ctx)).unwrap();
        let commands = console.commands();
        assert_eq!(commands[0], ".jobs type=\"B\"@dir1");
        assert_eq!(commands[4], ".jobs@dir1");
    }

    #[test]
    fn test_tasks_failure_aborts() {
        let (app, _) = state(ScriptedConsole::new().failing(1));
        let err = with_admin(&app, &query(&[]), |ctx| JobTasks.get(ctx)).unwrap_err();
        assert_eq!(err.code(), 4);
    }

    #[test]
    fn test_recent() {
        let (app, _) = state(console());
        let recent = |q: &[(&str, &str)]| with_admin(&app, &query(q), |ctx| JobsRecent.get(ctx));

        let out = recent(&[("name", "backup"), ("clientid", "1"), ("fileset", "Full Set")]).unwrap();
        assert_eq!(out, json!([7, 5, 3, 1]));

        assert_eq!(recent(&[("name", "backup")]).unwrap_err().code(), 10);
        assert_eq!(
            recent(&[("name", "backup"), ("client", "nope")]).unwrap_err().code(),
            10
        );
        assert_eq!(
            recent(&[("name", "backup"), ("clientid", "1"), ("fileset", "nope")])
                .unwrap_err()
                .code(),
            60
        );
        assert_eq!(
            recent(&[("name", "missing"), ("clientid", "1"), ("filesetid", "1")])
                .unwrap_err()
                .code(),
            50
        );
    }

    #[test]
    fn test_list_files() {
        let console = ScriptedConsole::new().reply(".jobs", &["backup"]).reply(
            "list files type=\"deleted\" jobid=\"1\"",
            &[
                "+----------+",
                "| filename |",
                "+----------+",
                "| /etc/passwd |",
                "| /etc/group |",
                "| /home/user/Notes.txt |",
                "+----------+",
            ],
        );
        let (app, console) = state(console);
        let files = |q: &[(&str, &str)]| with_admin(&app, &query(q), |ctx| JobListFiles.get(ctx));

        let out = files(&[("id", "1"), ("type", "deleted")]).unwrap();
        assert_eq!(out["total"], json!(3));
        assert_eq!(out["items"][2], json!("/home/user/Notes.txt"));

        let out = files(&[("id", "1"), ("type", "deleted"), ("search", "ETC"), ("offset", "1")]).unwrap();
        assert_eq!(out, json!({"items": ["/etc/group"], "total": 2}));

        let out = files(&[("id", "1"), ("type", "deleted"), ("limit", "1")]).unwrap();
        assert_eq!(out["items"], json!(["/etc/passwd"]));

        files(&[("id", "1"), ("type", "everything")]).unwrap();
        assert_eq!(console.commands().last().unwrap(), "list files jobid=\"1\"");

        assert_eq!(files(&[("id", "6")]).unwrap_err().code(), 50);
    }

    #[test]
    fn test_restore_ids_cancel_and_log() {
        let (app, console) = state(ScriptedConsole::new());
        let out = with_admin(&app, &query(&[("id", "5")]), |ctx| JobRestoreIds.get(ctx)).unwrap();
        assert_eq!(out, json!([5, 3, 1]));

        with_admin(&app, &query(&[("id", "7")]), |ctx| JobCancel.get(ctx)).unwrap();
        assert_eq!(console.commands(), vec!["cancel jobid=\"7\""]);
        let err = with_admin(&app, &query(&[("id", "70")]), |ctx| JobCancel.get(ctx)).unwrap_err();
        assert_eq!(err.code(), 50);

        let log = with_admin(&app, &query(&[("id", "1")]), |ctx| JobLog.get(ctx)).unwrap();
        assert_eq!(
            log,
            json!(["bacula-dir JobId 1: Start Backup", "bacula-dir JobId 1: Backup OK"])
        );
    }
}
