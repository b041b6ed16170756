//! Client endpoints

use super::{lines, quoted, to_output, visible_jobs, Endpoint, RequestContext};
use crate::catalog::ClientRow;
use crate::error::{ApiError, Result};
use serde_json::Value;

fn listed_client(ctx: &RequestContext<'_>) -> Result<ClientRow> {
    let client = ctx
        .catalog()
        .client(ctx.id())?
        .ok_or(ApiError::ClientNotFound)?;
    ctx.ensure_listed(".client", &client.name, ApiError::ClientNotFound)?;
    Ok(client)
}

/// `GET /api/clients`
pub struct Clients;

impl Endpoint for Clients {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let allowed = ctx.resource_names(".client")?;
        let clients: Vec<ClientRow> = ctx
            .catalog()
            .clients(ctx.limit())?
            .into_iter()
            .filter(|c| allowed.contains(&c.name))
            .collect();
        to_output(clients)
    }
}

/// `GET /api/clients/{id}`
pub struct Client;

impl Endpoint for Client {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        to_output(listed_client(ctx)?)
    }
}

/// `GET /api/clients/show`
pub struct ClientsShow;

impl Endpoint for ClientsShow {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let result = match ctx.param("name") {
            Some(name) => {
                ctx.ensure_listed(".client", name, ApiError::ClientNotFound)?;
                ctx.console(["show".to_string(), quoted("client", name)])?
            }
            None => ctx.console(["show", "clients"])?,
        };
        Ok(lines(result))
    }
}

/// `GET /api/clients/{id}/show`
pub struct ClientShow;

impl Endpoint for ClientShow {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        let client = ctx
            .catalog()
            .client(ctx.id())?
            .ok_or(ApiError::ClientNotFound)?;
        let result = ctx.console(["show".to_string(), quoted("client", &client.name)])?;
        Ok(lines(result))
    }
}

/// `GET /api/clients/{id}/jobs`
pub struct JobsForClient;

impl Endpoint for JobsForClient {
    fn get(&self, ctx: &RequestContext<'_>) -> Result<Value> {
        visible_jobs(ctx, |allowed| ctx.catalog().jobs_for_client(ctx.id(), allowed))
    }
}
