//! FileSet endpoints

use super::{to_output, Endpoint, RequestContext};
use crate::error::{ApiError, Result};
use crate::parser::fileset_name;
use serde_json::{Map, Value};

/// `GET /api/filesets`
///
/// FileSet names defined on every director, keyed by director. Any failing
/// director fails the whole request.
pub struct FileSets;

impl Endpoint for FileSets {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let mut filesets = Map::new();
        for director in ctx.directors()? {
            let shown = ctx.console_on(&director, ["show", "fileset"])?;
            let names: Vec<Value> = shown
                .output
                .iter()
                .filter_map(|line| fileset_name(line))
                .map(Value::String)
                .collect();
            filesets.insert(director, Value::Array(names));
        }
        Ok(Value::Object(filesets))
    }
}

/// `GET /api/filesets/{id}`
pub struct FileSet;

impl Endpoint for FileSet {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let fileset = ctx
            .catalog()
            .fileset(ctx.id())?
            .ok_or(ApiError::FileSetNotFound)?;
        ctx.ensure_listed(".fileset", &fileset.fileset, ApiError::FileSetNotFound)?;
        to_output(fileset)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fan_out() {
        let console = ScriptedConsole::new()
            .reply(
                "show fileset@dir1",
                &[
                    "FileSet: name=Full Set IgnoreFileSetChanges=0",
                    "      I /home",
                    "FileSet: name=Catalog IgnoreFileSetChanges=0",
                ],
            )
            .reply("show fileset@dir2", &["FileSet: name=Remote Set IgnoreFileSetChanges=0"]);
        let (app, console) = state(console);

        let out = with_admin(&app, &query(&[]), |ctx| FileSets.get(ctx)).unwrap();
        assert_eq!(
            out,
            json!({"dir1": ["Full Set", "Catalog"], "dir2": ["Remote Set"]})
        );
        assert_eq!(console.commands(), vec!["show fileset@dir1", "show fileset@dir2"]);
    }

    #[test]
    fn test_fan_out_failure() {
        let (app, _) = state(ScriptedConsole::new().failing(2));
        let err = with_admin(&app, &query(&[]), |ctx| FileSets.get(ctx)).unwrap_err();
        assert_eq!(err.code(), 4);
    }

    #[test]
    fn test_fileset_must_be_listed() {
        let (app, _) = state(ScriptedConsole::new().reply(".fileset", &["Full Set"]));
        let out = with_admin(&app, &query(&[("id", "1")]), |ctx| FileSet.get(ctx)).unwrap();
        assert_eq!(out["fileset"], json!("Full Set"));

        let (app, _) = state(ScriptedConsole::new());
        let err = with_admin(&app, &query(&[("id", "1")]), |ctx| FileSet.get(ctx)).unwrap_err();
        assert_eq!(err.code(), 60);
    }
}
