//! Pool endpoints

use super::{lines, quoted, to_output, Endpoint, RequestContext};
use crate::api::request::Params;
use crate::catalog::PoolRow;
use crate::error::{ApiError, Result};
use crate::validate::is_valid_name;
use serde_json::Value;

/// `GET /api/pools`
pub struct Pools;

impl Endpoint for Pools {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let allowed = ctx.resource_names(".pool")?;
        let pools: Vec<PoolRow> = ctx
            .catalog()
            .pools(ctx.limit())?
            .into_iter()
            .filter(|p| allowed.contains(&p.name))
            .collect();
        to_output(pools)
    }
}

/// `GET /api/pools/{id}`, or by `name` when the id is 0
pub struct Pool;

impl Endpoint for Pool {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let id = ctx.id();
        let pool = if id > 0 {
            ctx.catalog().pool(id)?
        } else {
            match ctx.param("name").filter(|n| is_valid_name(n)) {
                Some(name) => ctx.catalog().pool_by_name(name)?,
                None => None,
            }
        };
        let pool = pool.ok_or(ApiError::PoolNotFound)?;
        ctx.ensure_listed(".pool", &pool.name, ApiError::PoolNotFound)?;
        to_output(pool)
    }
}

/// `GET /api/pools/show`
pub struct PoolsShow;

impl Endpoint for PoolsShow {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let result = match ctx.param("name") {
            Some(name) => {
                ctx.ensure_listed(".pool", name, ApiError::PoolNotFound)?;
                ctx.console(["show".to_string(), quoted("pool", name)])?
            }
            None => ctx.console(["show", "pools"])?,
        };
        Ok(lines(result))
    }
}

/// `PUT /api/pools/{id}/update`
///
/// Reapplies the pool's volume defaults to all of its volumes.
pub struct PoolUpdateVolumes;

impl Endpoint for PoolUpdateVolumes {
    fn update(&self, ctx: &RequestContext<'_>, id: i64, _params: Params) -> Result<Value> {
        let pool = ctx.catalog().pool(id)?.ok_or(ApiError::PoolNotFound)?;
        let volume = ctx
            .catalog()
            .volume_in_pool(pool.poolid)?
            .ok_or(ApiError::PoolHasNoVolumes)?;
        let result = ctx.console([
            "update".to_string(),
            quoted("volume", &volume.volumename),
            quoted("allfrompool", &pool.name),
        ])?;
        Ok(lines(result))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use serde_json::json;

    fn console() -> ScriptedConsole {
        ScriptedConsole::new().reply(".pool", &["Default", "Scratch"])
    }

    #[test]
    fn test_list() {
        let (app, _) = state(console());
        let out = with_admin(&app, &query(&[]), |ctx| Pools.get(ctx)).unwrap();
        assert_eq!(out.as_array().unwrap().len(), 1);
        assert_eq!(out[0]["name"], json!("Default"));
    }

    #[test]
    fn test_pool_by_id_or_name() {
        let (app, _) = state(console());
        let get = |q: &[(&str, &str)]| with_admin(&app, &query(q), |ctx| Pool.get(ctx));

        assert_eq!(get(&[("id", "1")]).unwrap()["poolid"], json!(1));
        assert_eq!(get(&[("name", "Default")]).unwrap()["poolid"], json!(1));
        assert_eq!(get(&[("id", "2")]).unwrap_err().code(), 40);
        assert_eq!(get(&[("name", "Scratch")]).unwrap_err().code(), 40);
        assert_eq!(get(&[]).unwrap_err().code(), 40);
    }

    #[test]
    fn test_show() {
        let (app, console) = state(console());
        with_admin(&app, &query(&[("name", "Scratch")]), |ctx| PoolsShow.get(ctx)).unwrap();
        with_admin(&app, &query(&[]), |ctx| PoolsShow.get(ctx)).unwrap();
        assert_eq!(
            console.commands(),
            vec![".pool", "show pool=\"Scratch\"", "show pools"]
        );
    }

    #[test]
    fn test_update_volumes() {
        let (app, console) = state(ScriptedConsole::new());
        with_admin(&app, &query(&[]), |ctx| {
            PoolUpdateVolumes.update(ctx, 1, Params::new())
        })
        .unwrap();
        assert_eq!(
            console.commands(),
            vec!["update volume=\"Vol-0001\" allfrompool=\"Default\""]
        );

        let err = with_admin(&app, &query(&[]), |ctx| {
            PoolUpdateVolumes.update(ctx, 2, Params::new())
        })
        .unwrap_err();
        assert_eq!(err.code(), 41);

        let err = with_admin(&app, &query(&[]), |ctx| {
            PoolUpdateVolumes.update(ctx, 9, Params::new())
        })
        .unwrap_err();
        assert_eq!(err.code(), 40);
    }
}
