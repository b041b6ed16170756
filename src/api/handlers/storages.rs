//! Storage endpoints

use super::{lines, quoted, to_output, Endpoint, RequestContext};
use crate::catalog::StorageRow;
use crate::error::{ApiError, Result};
use serde_json::Value;

fn catalog_storage(ctx: &RequestContext<'_>) -> Result<StorageRow> {
    ctx.catalog()
        .storage(ctx.id())?
        .ok_or(ApiError::StorageNotFound)
}

fn drive(ctx: &RequestContext<'_>) -> String {
    format!("drive={}", ctx.int_param("drive").unwrap_or(0))
}

/// `GET /api/storages`
pub struct Storages;

impl Endpoint for Storages {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let allowed = ctx.resource_names(".storage")?;
        let storages: Vec<StorageRow> = ctx
            .catalog()
            .storages(ctx.limit())?
            .into_iter()
            .filter(|s| allowed.contains(&s.name))
            .collect();
        to_output(storages)
    }
}

/// `GET /api/storages/{id}`
pub struct Storage;

impl Endpoint for Storage {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let storage = catalog_storage(ctx)?;
        ctx.ensure_listed(".storage", &storage.name, ApiError::StorageNotFound)?;
        to_output(storage)
    }
}

/// `GET /api/storages/show`
pub struct StoragesShow;

impl Endpoint for StoragesShow {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let result = match ctx.param("name") {
            Some(name) => {
                ctx.ensure_listed(".storage", name, ApiError::StorageNotFound)?;
                ctx.console(["show".to_string(), quoted("storage", name)])?
            }
            None => ctx.console(["show", "storages"])?,
        };
        Ok(lines(result))
    }
}

/// `GET /api/storages/{id}/show`
pub struct StorageShow;

impl Endpoint for StorageShow {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let storage = catalog_storage(ctx)?;
        Ok(lines(ctx.console(["show".to_string(), quoted("storage", &storage.name)])?))
    }
}

/// `GET /api/storages/{id}/mount`
pub struct StorageMount;

impl Endpoint for StorageMount {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let storage = catalog_storage(ctx)?;
        let slot = format!("slot={}", ctx.int_param("slot").unwrap_or(0));
        let result = ctx.console([
            "mount".to_string(),
            quoted("storage", &storage.name),
            drive(ctx),
            slot,
        ])?;
        Ok(lines(result))
    }
}

/// `GET /api/storages/{id}/umount`
pub struct StorageUmount;

impl Endpoint for StorageUmount {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let storage = catalog_storage(ctx)?;
        let result = ctx.console(["umount".to_string(), quoted("storage", &storage.name), drive(ctx)])?;
        Ok(lines(result))
    }
}

/// `GET /api/storages/{id}/release`
pub struct StorageRelease;

impl Endpoint for StorageRelease {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let storage = catalog_storage(ctx)?;
        let result = ctx.console(["release".to_string(), quoted("storage", &storage.name), drive(ctx)])?;
        Ok(lines(result))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_storage_double_check() {
        let (app, _) = state(ScriptedConsole::new().reply(".storage", &["File1"]));
        let out = with_admin(&app, &query(&[("id", "1")]), |ctx| Storage.get(ctx)).unwrap();
        assert_eq!(out["name"], json!("File1"));
        let list = with_admin(&app, &query(&[]), |ctx| Storages.get(ctx)).unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (app, _) = state(ScriptedConsole::new().reply(".storage", &["File2"]));
        let err = with_admin(&app, &query(&[("id", "1")]), |ctx| Storage.get(ctx)).unwrap_err();
        assert_eq!(err.code(), 20);
        let list = with_admin(&app, &query(&[]), |ctx| Storages.get(ctx)).unwrap();
        assert_eq!(list, json!([]));
    }

    #[test]
    fn test_device_commands() {
        let (app, console) = state(ScriptedConsole::new());
        with_admin(&app, &query(&[("id", "1"), ("drive", "1"), ("slot", "3")]), |ctx| {
            StorageMount.get(ctx)
        })
        .unwrap();
        with_admin(&app, &query(&[("id", "1")]), |ctx| StorageUmount.get(ctx)).unwrap();
        with_admin(&app, &query(&[("id", "1"), ("drive", "x")]), |ctx| StorageRelease.get(ctx))
            .unwrap();
        assert_eq!(
            console.commands(),
            vec![
                "mount storage=\"File1\" drive=1 slot=3",
                "umount storage=\"File1\" drive=0",
                "release storage=\"File1\" drive=0",
            ]
        );

        let err = with_admin(&app, &query(&[("id", "5")]), |ctx| StorageMount.get(ctx)).unwrap_err();
        assert_eq!(err.code(), 20);
    }

    #[test]
    fn test_show() {
        let (app, console) = state(ScriptedConsole::new().reply(".storage", &["File1"]));
        with_admin(&app, &query(&[("name", "File1")]), |ctx| StoragesShow.get(ctx)).unwrap();
        with_admin(&app, &query(&[("id", "1")]), |ctx| StorageShow.get(ctx)).unwrap();
        with_admin(&app, &query(&[]), |ctx| StoragesShow.get(ctx)).unwrap();
        assert_eq!(
            console.commands(),
            vec![
                ".storage",
                "show storage=\"File1\"",
                "show storage=\"File1\"",
                "show storages"
            ]
        );
    }
}
