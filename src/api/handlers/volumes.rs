//! Volume endpoints

use super::{lines, quoted, to_output, visible_jobs, Endpoint, RequestContext};
use crate::api::models::{from_params, VolumeUpdateParams};
use crate::api::request::Params;
use crate::catalog::VolumeRow;
use crate::error::{ApiError, Result};
use crate::validate::{is_valid_integer, is_valid_name};
use serde_json::Value;

fn catalog_volume(ctx: &RequestContext<'_>, mediaid: i64) -> Result<VolumeRow> {
    let volume = ctx
        .catalog()
        .volume(mediaid)?
        .ok_or(ApiError::VolumeNotFound)?;
    if !is_valid_name(&volume.volumename) {
        return Err(ApiError::InvalidVolume);
    }
    Ok(volume)
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// `GET /api/volumes`
pub struct Volumes;

impl Endpoint for Volumes {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        to_output(ctx.catalog().volumes(ctx.limit())?)
    }
}

/// `GET /api/volumes/{id}` and `PUT /api/volumes/{id}`
///
/// An update sends one `update volume` command carrying every given
/// property. The pool is given by id and resolved through the catalog.
pub struct Volume;

impl Endpoint for Volume {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        to_output(catalog_volume(ctx, ctx.id())?)
    }

    fn update(&self, ctx: &RequestContext<'_>, id: i64, params: Params) -> Result<Value> {
        let volume = catalog_volume(ctx, id)?;
        let p: VolumeUpdateParams = from_params(params)?;

        let mut command = vec!["update".to_string(), quoted("volume", &volume.volumename)];
        if let Some(ref volstatus) = p.volstatus {
            if !is_valid_name(volstatus) {
                return Err(ApiError::InvalidVolume);
            }
            command.push(quoted("volstatus", volstatus));
        }
        if let Some(poolid) = p.poolid {
            let pool = ctx.catalog().pool(poolid)?.ok_or(ApiError::PoolNotFound)?;
            command.push(quoted("pool", &pool.name));
        }
        // Durations and sizes go to the console as given, units included
        let limits = [
            ("volretention", &p.volretention),
            ("voluseduration", &p.voluseduration),
            ("maxvoljobs", &p.maxvoljobs),
            ("maxvolfiles", &p.maxvolfiles),
            ("maxvolbytes", &p.maxvolbytes),
        ];
        for (key, value) in limits {
            if let Some(value) = value {
                if !is_valid_name(value) {
                    return Err(ApiError::InvalidVolume);
                }
                command.push(quoted(key, value));
            }
        }
        if let Some(ref slot) = p.slot {
            if !is_valid_integer(slot) {
                return Err(ApiError::InvalidSlot);
            }
            command.push(quoted("slot", slot));
        }
        let flags = [
            ("recycle", p.recycle),
            ("enabled", p.enabled),
            ("inchanger", p.inchanger),
        ];
        for (key, value) in flags {
            if let Some(value) = value {
                command.push(quoted(key, yes_no(value)));
            }
        }

        Ok(lines(ctx.console(command)?))
    }
}

/// `GET /api/volumes/{id}/prune`
pub struct VolumePrune;

impl Endpoint for VolumePrune {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let volume = catalog_volume(ctx, ctx.id())?;
        let result = ctx.console([
            "prune".to_string(),
            quoted("volume", &volume.volumename),
            "yes".to_string(),
        ])?;
        Ok(lines(result))
    }
}

/// `GET /api/volumes/{id}/jobs`
pub struct JobsOnVolume;

impl Endpoint for JobsOnVolume {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        visible_jobs(ctx, |allowed| ctx.catalog().jobs_on_volume(ctx.id(), allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get() {
        let (app, _) = state(ScriptedConsole::new());
        let out = with_admin(&app, &query(&[("id", "1")]), |ctx| Volume.get(ctx)).unwrap();
        assert_eq!(out["volumename"], json!("Vol-0001"));
        let err = with_admin(&app, &query(&[("id", "3")]), |ctx| Volume.get(ctx)).unwrap_err();
        assert_eq!(err.code(), 30);

        let all = with_admin(&app, &query(&[]), |ctx| Volumes.get(ctx)).unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);
        assert_eq!(all[0]["pool"]["name"], json!("Default"));
    }

    #[test]
    fn test_update_builds_one_command() {
        let (app, console) = state(ScriptedConsole::new());
        with_admin(&app, &query(&[]), |ctx| {
            Volume.update(
                ctx,
                2,
                params(json!({
                    "volstatus": "Used",
                    "poolid": "1",
                    "volretention": "3600",
                    "maxvoljobs": 4,
                    "slot": "2",
                    "recycle": "1",
                    "enabled": false,
                })),
            )
        })
        .unwrap();
        assert_eq!(
            console.commands(),
            vec![
                "update volume=\"Vol-0002\" volstatus=\"Used\" pool=\"Default\" volretention=\"3600\" \
                 maxvoljobs=\"4\" slot=\"2\" recycle=\"yes\" enabled=\"no\""
            ]
        );
    }

    #[test]
    fn test_update_passes_limits_verbatim() {
        let (app, console) = state(ScriptedConsole::new());
        with_admin(&app, &query(&[]), |ctx| {
            Volume.update(
                ctx,
                1,
                params(json!({
                    "volretention": "30 days",
                    "voluseduration": "12h",
                    "maxvolbytes": "1.5 GB",
                })),
            )
        })
        .unwrap();
        assert_eq!(
            console.commands(),
            vec![
                "update volume=\"Vol-0001\" volretention=\"30 days\" voluseduration=\"12h\" \
                 maxvolbytes=\"1.5 GB\""
            ]
        );
    }

    #[test]
    fn test_update_rejects_bad_values() {
        let (app, console) = state(ScriptedConsole::new());
        let update = |p: Value| with_admin(&app, &query(&[]), |ctx| Volume.update(ctx, 1, params(p)));

        assert_eq!(update(json!({"slot": "a1"})).unwrap_err().code(), 32);
        assert_eq!(update(json!({"volstatus": "Full\"; x"})).unwrap_err().code(), 31);
        assert_eq!(update(json!({"poolid": 9})).unwrap_err().code(), 40);
        assert_eq!(update(json!({"volretention": "30\"\nquit"})).unwrap_err().code(), 31);
        assert!(console.commands().is_empty());

        let err = with_admin(&app, &query(&[]), |ctx| Volume.update(ctx, 8, Params::new())).unwrap_err();
        assert_eq!(err.code(), 30);
    }

    #[test]
    fn test_prune_and_jobs() {
        let (app, console) = state(ScriptedConsole::new().reply(".jobs", &["backup"]));
        with_admin(&app, &query(&[("id", "1")]), |ctx| VolumePrune.get(ctx)).unwrap();
        assert_eq!(console.commands(), vec!["prune volume=\"Vol-0001\" yes"]);

        let jobs = with_admin(&app, &query(&[("id", "2")]), |ctx| JobsOnVolume.get(ctx)).unwrap();
        assert_eq!(jobs[0]["jobid"], json!(6));

        let jobs = with_auth(&app, &user(&["volumes"]), &query(&[("id", "2")]), |ctx| {
            JobsOnVolume.get(ctx)
        })
        .unwrap();
        assert_eq!(jobs, json!([]));
    }
}
