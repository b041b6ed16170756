//! Baculum REST API
//!
//! JSON API over the Bacula console and catalog. Every response body is
//! `{"output": ..., "error": <code>}` where `error` is 0 on success.
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/welcome` | GET | API name and version |
//! | `/api/directors` | GET | Directors of the console configuration |
//! | `/api/catalog` | GET | Catalog connection check |
//! | `/api/dbsize` | GET | Catalog size |
//! | `/api/clients` | GET | Clients |
//! | `/api/clients/{id}` | GET | Client |
//! | `/api/clients/show` | GET | `show client(s)` output |
//! | `/api/clients/{id}/jobs` | GET | Jobs of a client |
//! | `/api/jobs` | GET | Jobs |
//! | `/api/jobs/{id}` | GET, DELETE | Job, delete job |
//! | `/api/jobs/tasks` | GET | Job resources per director |
//! | `/api/jobs/recent/{name}` | GET | Recent successful jobids |
//! | `/api/jobs/run` | POST | Run a job |
//! | `/api/jobs/estimate` | POST | Estimate a job |
//! | `/api/jobs/{id}/files` | GET | Files saved by a job |
//! | `/api/jobs/{id}/restorejobids` | GET | Jobids needed to restore a job |
//! | `/api/jobs/{id}/cancel` | GET | Cancel a running job |
//! | `/api/joblog/{id}` | GET | Job log |
//! | `/api/pools` | GET | Pools |
//! | `/api/pools/{id}` | GET | Pool |
//! | `/api/pools/{id}/update` | PUT | Update volumes from pool |
//! | `/api/storages` | GET | Storages |
//! | `/api/storages/{id}/mount` | GET | Mount, also `umount` and `release` |
//! | `/api/volumes` | GET | Volumes |
//! | `/api/volumes/{id}` | GET, PUT | Volume, update volume |
//! | `/api/volumes/{id}/prune` | GET | Prune volume |
//! | `/api/volumes/{id}/jobs` | GET | Jobs on a volume |
//! | `/api/filesets` | GET | FileSet resources per director |
//! | `/api/filesets/{id}` | GET | FileSet |
//! | `/api/bvfs/...` | PUT, GET | Catalog browsing for restore |
//! | `/api/restore/run` | POST | Run a restore |
//! | `/api/status/director` | GET | Director status |
//! | `/api/status/storage` | GET | Storage daemon status |
//! | `/api/schedules/status` | GET | Scheduled jobs |
//!
//! The `show` variants of clients, jobs, pools and storages return the
//! console's resource dump. All console endpoints accept `director`.

mod dispatch;
pub mod handlers;
mod models;
mod request;
mod routes;
mod server;

pub use dispatch::*;
pub use models::*;
pub use request::*;
pub use routes::*;
pub use server::*;
