//! Route table
//!
//! Patterns are `/`-separated segments. A `{id}` segment matches digits
//! only; any other `{name}` segment matches one non-empty segment. Captured
//! segments become request parameters. A trailing slash is ignored.

use crate::api::handlers::*;
use crate::api::request::urlencoding_decode;
use std::collections::HashMap;

/// A pattern and the endpoint serving it
pub struct Route {
    /// Path pattern
    pub pattern: &'static str,
    /// Endpoint handling the path
    pub endpoint: &'static dyn Endpoint,
}

macro_rules! routes {
    ($($pattern:literal => $endpoint:expr),* $(,)?) => {
        &[$(Route { pattern: $pattern, endpoint: &$endpoint }),*]
    };
}

/// All API routes, first match wins
pub static ROUTES: &[Route] = routes![
    "/api/welcome" => WelcomeEndpoint,
    "/api/directors" => Directors,
    "/api/catalog" => CatalogCheck,
    "/api/dbsize" => DbSizeEndpoint,

    "/api/clients" => Clients,
    "/api/clients/show" => ClientsShow,
    "/api/clients/{id}" => Client,
    "/api/clients/{id}/show" => ClientShow,
    "/api/clients/{id}/jobs" => JobsForClient,

    "/api/jobs" => Jobs,
    "/api/jobs/show" => JobsShow,
    "/api/jobs/tasks" => JobTasks,
    "/api/jobs/run" => JobRun,
    "/api/jobs/estimate" => JobEstimate,
    "/api/jobs/recent/{name}" => JobsRecent,
    "/api/jobs/{id}" => Job,
    "/api/jobs/{id}/show" => JobShow,
    "/api/jobs/{id}/files" => JobListFiles,
    "/api/jobs/{id}/restorejobids" => JobRestoreIds,
    "/api/jobs/{id}/cancel" => JobCancel,
    "/api/joblog/{id}" => JobLog,

    "/api/pools" => Pools,
    "/api/pools/show" => PoolsShow,
    "/api/pools/{id}" => Pool,
    "/api/pools/{id}/update" => PoolUpdateVolumes,

    "/api/storages" => Storages,
    "/api/storages/show" => StoragesShow,
    "/api/storages/{id}" => Storage,
    "/api/storages/{id}/show" => StorageShow,
    "/api/storages/{id}/mount" => StorageMount,
    "/api/storages/{id}/umount" => StorageUmount,
    "/api/storages/{id}/release" => StorageRelease,

    "/api/volumes" => Volumes,
    "/api/volumes/{id}" => Volume,
    "/api/volumes/{id}/prune" => VolumePrune,
    "/api/volumes/{id}/jobs" => JobsOnVolume,

    "/api/filesets" => FileSets,
    "/api/filesets/{id}" => FileSet,

    "/api/bvfs/update" => BvfsUpdate,
    "/api/bvfs/lsdirs" => BvfsLsDirs,
    "/api/bvfs/lsfiles" => BvfsLsFiles,
    "/api/bvfs/versions" => BvfsVersions,
    "/api/bvfs/getjobids/{id}" => BvfsGetJobids,
    "/api/bvfs/restore" => BvfsRestore,
    "/api/bvfs/cleanup" => BvfsCleanup,
    "/api/bvfs/clear" => BvfsClearCache,

    "/api/restore/run" => RestoreRun,

    "/api/status/director" => DirectorStatusEndpoint,
    "/api/status/storage" => StorageStatusEndpoint,
    "/api/schedules/status" => ScheduleStatusEndpoint,
];

/// A matched route with its captured path parameters
pub struct RouteMatch {
    /// Endpoint to call
    pub endpoint: &'static dyn Endpoint,
    /// Captured segments by name
    pub params: HashMap<String, String>,
}

/// Find the endpoint for `path` among [`ROUTES`]
pub fn match_route(path: &str) -> Option<RouteMatch> {
    find_route(ROUTES, path)
}

/// Find the endpoint for `path` in a route table
pub fn find_route(routes: &'static [Route], path: &str) -> Option<RouteMatch> {
    let path = path.strip_suffix('/').unwrap_or(path);
    let segments: Vec<&str> = path.split('/').collect();

    routes.iter().find_map(|route| {
        let params = match_pattern(route.pattern, &segments)?;
        Some(RouteMatch {
            endpoint: route.endpoint,
            params,
        })
    })
}

fn match_pattern(pattern: &str, segments: &[&str]) -> Option<HashMap<String, String>> {
    let parts: Vec<&str> = pattern.split('/').collect();
    if parts.len() != segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (part, segment) in parts.iter().zip(segments) {
        match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some("id") => {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                params.insert("id".to_string(), segment.to_string());
            }
            Some(name) => {
                if segment.is_empty() {
                    return None;
                }
                params.insert(name.to_string(), urlencoding_decode(segment));
            }
            None if part == segment => {}
            None => return None,
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_trailing_slash() {
        assert!(match_route("/api/jobs").is_some());
        assert!(match_route("/api/jobs/").is_some());
        assert!(match_route("/api/nothing").is_none());
        assert!(match_route("/api").is_none());
    }

    #[test]
    fn test_id_is_digits_only() {
        let m = match_route("/api/jobs/12/files").unwrap();
        assert_eq!(m.params.get("id").map(String::as_str), Some("12"));
        assert!(match_route("/api/jobs/abc/files").is_none());
        assert!(match_route("/api/joblog/-1").is_none());
    }

    #[test]
    fn test_named_segment_is_decoded() {
        let m = match_route("/api/jobs/recent/My%20Job").unwrap();
        assert_eq!(m.params.get("name").map(String::as_str), Some("My Job"));
    }

    #[test]
    fn test_every_pattern_is_unique() {
        let mut patterns: Vec<&str> = ROUTES.iter().map(|r| r.pattern).collect();
        let total = patterns.len();
        patterns.sort_unstable();
        patterns.dedup();
        assert_eq!(patterns.len(), total);
    }
}
