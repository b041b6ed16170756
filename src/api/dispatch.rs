//! Request dispatch
//!
//! Every request goes through the same stages, and the first failing stage
//! decides the response:
//!
//! 1. authenticate the `Authorization` header (401, error 6)
//! 2. check the endpoint against the token scopes (401, error 7)
//! 3. find the route (404, error 8)
//! 4. call the endpoint method for the HTTP verb
//!
//! Whatever happens the body is an [`Envelope`].

use crate::api::handlers::{AppState, RequestContext};
use crate::api::models::Envelope;
use crate::api::request::{intval, ApiRequest, Method};
use crate::api::routes::{find_route, Route, ROUTES};
use crate::auth::authorize;
use crate::error::{ApiError, Result};
use serde_json::Value;

/// Status and body of a dispatched request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Envelope,
}

impl ApiResponse {
    fn ok(output: Value) -> Self {
        Self {
            status: 200,
            body: Envelope::ok(output),
        }
    }

    fn error(err: &ApiError) -> Self {
        Self {
            status: err.http_status(),
            body: Envelope::from_error(err),
        }
    }

    /// Whether the client has to authenticate again
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Dispatch a request against the API routes
pub fn dispatch(state: &AppState, request: &ApiRequest) -> ApiResponse {
    dispatch_routes(state, request, ROUTES)
}

/// Dispatch a request against a route table
pub fn dispatch_routes(
    state: &AppState,
    request: &ApiRequest,
    routes: &'static [Route],
) -> ApiResponse {
    tracing::debug!(method = %request.method, path = %request.path, "Request");

    match process(state, request, routes) {
        Ok(output) => ApiResponse::ok(output),
        Err(err) => {
            log_failure(request, &err);
            ApiResponse::error(&err)
        }
    }
}

fn process(state: &AppState, request: &ApiRequest, routes: &'static [Route]) -> Result<Value> {
    let auth = state.auth.authenticate(request.header("authorization"))?;
    authorize(&auth, &request.path)?;

    let route = find_route(routes, &request.path).ok_or(ApiError::InvalidPath)?;
    let mut query = request.query.clone();
    query.extend(route.params);

    let method = Method::parse(&request.method)
        .ok_or_else(|| ApiError::UnsupportedMethod(request.method.clone()))?;
    let id = query.get("id").map(|id| intval(id)).unwrap_or(0);

    let ctx = RequestContext {
        state,
        auth: &auth,
        query: &query,
    };
    match method {
        Method::Get => route.endpoint.get(&ctx),
        Method::Post => route.endpoint.create(&ctx, request.create_params()),
        Method::Put => route.endpoint.update(&ctx, id, request.update_params()),
        Method::Delete => route.endpoint.remove(&ctx, id),
    }
}

fn log_failure(request: &ApiRequest, err: &ApiError) {
    tracing::error!(
        method = %request.method,
        path = %request.path,
        code = err.code(),
        "{}",
        err
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::testing::*;
    use crate::api::handlers::Endpoint;
    use crate::api::request::Params;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn admin(method: &str, target: &str) -> ApiRequest {
        ApiRequest::new(method, target)
            .with_header("Authorization", &format!("Basic {}", STANDARD.encode("admin:secret")))
    }

    fn bearer(method: &str, target: &str) -> ApiRequest {
        ApiRequest::new(method, target).with_header("Authorization", &format!("Bearer {}", TEST_TOKEN))
    }

    static UPDATES: AtomicUsize = AtomicUsize::new(0);

    struct Counting;

    impl Endpoint for Counting {
        fn update(&self, _ctx: &RequestContext<'_>, id: i64, params: Params) -> Result<Value> {
            UPDATES.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"id": id, "params": Value::Object(params)}))
        }
    }

    static READS: AtomicUsize = AtomicUsize::new(0);

    struct CountingRead;

    impl Endpoint for CountingRead {
        fn get(&self, _ctx: &RequestContext<'_>) -> Result<Value> {
            READS.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Bool(true))
        }
    }

    static COUNTING_ROUTES: &[Route] = &[
        Route {
            pattern: "/api/counting/{id}",
            endpoint: &Counting,
        },
        Route {
            pattern: "/api/reads/{id}",
            endpoint: &CountingRead,
        },
    ];

    #[test]
    fn test_put_without_params_still_reaches_handler() {
        let (app, console) = state(ScriptedConsole::new());

        let response = dispatch_routes(&app, &admin("PUT", "/api/counting/5"), COUNTING_ROUTES);
        assert_eq!(response.status, 200);
        assert_eq!(response.body.output, json!({"id": 5, "params": {}}));

        let request = admin("PUT", "/api/counting/6").with_body("update[volstatus]=Used&other=1");
        let response = dispatch_routes(&app, &request, COUNTING_ROUTES);
        assert_eq!(response.body.output, json!({"id": 6, "params": {"volstatus": "Used"}}));
        assert_eq!(UPDATES.load(Ordering::SeqCst), 2);

        let response = dispatch_routes(&app, &admin("GET", "/api/counting/7"), COUNTING_ROUTES);
        assert_eq!(response.body.error, 1000);
        assert_eq!(UPDATES.load(Ordering::SeqCst), 2);
        assert!(console.commands().is_empty());
    }

    #[test]
    fn test_authentication_failures() {
        let (app, console) = state(ScriptedConsole::new());

        let response = dispatch(&app, &ApiRequest::new("GET", "/api/jobs"));
        assert!(response.is_unauthorized());
        assert_eq!(response.body.error, 6);

        let request = ApiRequest::new("GET", "/api/jobs")
            .with_header("Authorization", &format!("Basic {}", STANDARD.encode("admin:nope")));
        let response = dispatch(&app, &request);
        assert_eq!(response.status, 401);
        assert_eq!(response.body.error, 6);
        assert!(console.commands().is_empty());
    }

    #[test]
    fn test_scopes() {
        let (app, _) = oauth_state(ScriptedConsole::new().reply(".jobs", &["backup"]), "jobs");

        let response = dispatch(&app, &bearer("GET", "/api/jobs?limit=1"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body.output[0]["name"], json!("backup"));

        let response = dispatch(&app, &bearer("GET", "/api/volumes"));
        assert_eq!(response.status, 401);
        assert_eq!(response.body.error, 7);

        let response = dispatch(&app, &bearer("GET", "/api/welcome"));
        assert_eq!(response.body.output["version"], json!("0.1"));
    }

    #[test]
    fn test_out_of_scope_request_never_reaches_handler() {
        let (app, console) = oauth_state(ScriptedConsole::new(), "jobs clients");

        let response = dispatch_routes(&app, &bearer("GET", "/api/reads/1"), COUNTING_ROUTES);
        assert_eq!(response.status, 401);
        assert_eq!(response.body.error, 7);
        assert!(response
            .body
            .output
            .as_str()
            .unwrap()
            .ends_with("Endpoint: /api/reads/1"));
        assert_eq!(READS.load(Ordering::SeqCst), 0);
        assert!(console.commands().is_empty());

        let (app, _) = oauth_state(ScriptedConsole::new(), "reads");
        let response = dispatch_routes(&app, &bearer("GET", "/api/reads/1"), COUNTING_ROUTES);
        assert_eq!(response.body, Envelope::ok(true));
        assert_eq!(READS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_route_and_method() {
        let (app, _) = state(ScriptedConsole::new());

        let response = dispatch(&app, &admin("GET", "/api/nothing/here"));
        assert_eq!(response.status, 404);
        assert_eq!(response.body.error, 8);

        let response = dispatch(&app, &admin("PATCH", "/api/jobs"));
        assert_eq!(response.status, 200);
        assert_eq!(response.body.error, 1000);

        let response = dispatch(&app, &admin("DELETE", "/api/clients/1"));
        assert_eq!(response.body.error, 1000);
    }

    #[test]
    fn test_path_params_override_query() {
        let (app, console) = state(ScriptedConsole::new());
        dispatch(&app, &admin("GET", "/api/jobs/7/cancel?id=1"));
        assert_eq!(console.commands(), vec!["cancel jobid=\"7\""]);
    }

    #[test]
    fn test_post_and_delete() {
        let (app, console) = state(ScriptedConsole::new());
        let request = admin("POST", "/api/jobs/estimate")
            .with_body("create[id]=1&create[level]=F&create[filesetid]=1&create[clientid]=1");
        let response = dispatch(&app, &request);
        assert_eq!(response.body.error, 0);

        let response = dispatch(&app, &admin("DELETE", "/api/jobs/3"));
        assert_eq!(response.body.error, 0);
        assert_eq!(
            console.commands(),
            vec![
                "estimate job=\"backup\" level=\"Full\" fileset=\"Full Set\" client=\"c1-fd\"",
                "delete jobid=\"3\"",
            ]
        );

        let response = dispatch(&app, &admin("POST", "/api/jobs/run"));
        assert_eq!(response.body.error, 50);
    }

    #[test]
    fn test_every_response_is_an_envelope() {
        let (app, _) = state(ScriptedConsole::new().failing(3));
        let requests = [
            admin("GET", "/api/welcome"),
            admin("GET", "/api/jobs/show"),
            admin("GET", "/api/jobs/999"),
            admin("GET", "/api/unknown"),
            admin("PUT", "/api/bvfs/update"),
            ApiRequest::new("GET", "/api/jobs"),
        ];
        for request in &requests {
            let response = dispatch(&app, request);
            let body = serde_json::to_value(&response.body).unwrap();
            let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
            assert_eq!(keys, vec!["output", "error"]);
            assert_eq!(response.body.is_ok(), response.body.error == 0);
            if !response.body.is_ok() {
                assert!(response.body.output.is_string());
            }
        }
    }
}
