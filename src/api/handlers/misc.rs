//! Public endpoints

use super::{to_output, Endpoint, RequestContext};
use crate::api::models::{DbSize, Welcome};
use crate::error::Result;
use serde_json::Value;

/// `GET /api/welcome`
pub struct WelcomeEndpoint;

impl Endpoint for WelcomeEndpoint {
    fn get(&self, _ctx: &RequestContext<'_>) -> Result<Value> {
        to_output(Welcome::default())
    }
}

/// `GET /api/directors`
pub struct Directors;

impl Endpoint for Directors {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        to_output(ctx.directors()?)
    }
}

/// `GET /api/catalog`
pub struct CatalogCheck;

impl Endpoint for CatalogCheck {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        ctx.catalog().ping()?;
        Ok(Value::Bool(true))
    }
}

/// `GET /api/dbsize`
pub struct DbSizeEndpoint;

impl Endpoint for DbSizeEndpoint {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        to_output(DbSize {
            dbsize: ctx.catalog().size()?,
            dbtype: "sqlite",
        })
    }
}
