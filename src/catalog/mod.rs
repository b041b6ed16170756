//! Backup catalog access
//!
//! The catalog is the database the director writes job, client, pool,
//! storage and volume records to. Handlers read it through the [`Catalog`]
//! trait; [`SqliteCatalog`] implements it over the SQLite catalog schema.
//!
//! Listings are ordered the way the console lists them: jobs newest first,
//! volumes by pool then name.

mod sqlite;

pub use sqlite::*;

#[cfg(test)]
pub(crate) use sqlite::tests::catalog as test_catalog;

use crate::error::Result;
use serde::Serialize;

/// `Job` table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRow {
    /// Job id
    pub jobid: i64,
    /// Unique job name with the start timestamp
    pub job: String,
    /// Job resource name
    pub name: String,
    /// Job type code
    #[serde(rename = "type")]
    pub job_type: String,
    /// Job level code
    pub level: String,
    /// Client id
    pub clientid: Option<i64>,
    /// Job status code
    pub jobstatus: String,
    /// Scheduled start
    pub schedtime: Option<String>,
    /// Actual start
    pub starttime: Option<String>,
    /// End time
    pub endtime: Option<String>,
    /// End time including despooling
    pub realendtime: Option<String>,
    /// End time as a Unix timestamp
    pub jobtdate: i64,
    /// Storage session id
    pub volsessionid: i64,
    /// Storage session start time
    pub volsessiontime: i64,
    /// Files written
    pub jobfiles: i64,
    /// Bytes written
    pub jobbytes: i64,
    /// Bytes read on the client
    pub readbytes: i64,
    /// Error count
    pub joberrors: i64,
    /// Files missing from a verify
    pub jobmissingfiles: i64,
    /// Pool the job wrote to
    pub poolid: Option<i64>,
    /// FileSet id
    pub filesetid: Option<i64>,
    /// Job this one was copied or migrated from
    pub priorjobid: i64,
    /// Non-zero once file records were pruned
    pub purgedfiles: i64,
    /// Non-zero when the job used a base job
    pub hasbase: i64,
}

/// `Client` table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRow {
    /// Client id
    pub clientid: i64,
    /// Client name
    pub name: String,
    /// Client version and platform
    pub uname: String,
    /// Non-zero when pruning is automatic
    pub autoprune: i64,
    /// File retention in seconds
    pub fileretention: i64,
    /// Job retention in seconds
    pub jobretention: i64,
}

/// `Pool` table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolRow {
    /// Pool id
    pub poolid: i64,
    /// Pool name
    pub name: String,
    /// Volumes in the pool
    pub numvols: i64,
    /// Volume limit, 0 means unlimited
    pub maxvols: i64,
    /// Non-zero for single-use volumes
    pub useonce: i64,
    /// Non-zero when the catalog is used for volume selection
    pub usecatalog: i64,
    /// Non-zero when any volume is accepted
    pub acceptanyvolume: i64,
    /// Volume retention in seconds
    pub volretention: i64,
    /// Volume use duration in seconds
    pub voluseduration: i64,
    /// Job limit per volume of the pool
    pub maxvoljobs: i64,
    /// File limit per volume
    pub maxvolfiles: i64,
    /// Byte limit per volume
    pub maxvolbytes: i64,
    /// Non-zero when pruning is automatic
    pub autoprune: i64,
    /// Non-zero when the pool recycles volumes
    pub recycle: i64,
    /// Pool type, usually `Backup`
    pub pooltype: String,
    /// Automatic label format
    pub labelformat: Option<String>,
    /// Enabled flag
    pub enabled: i64,
    /// Scratch pool id
    pub scratchpoolid: Option<i64>,
    /// Pool recycled volumes move to
    pub recyclepoolid: Option<i64>,
}

/// `Storage` table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageRow {
    /// Storage id
    pub storageid: i64,
    /// Storage name
    pub name: String,
    /// Non-zero for an autochanger
    pub autochanger: i64,
}

/// `FileSet` table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSetRow {
    /// FileSet id
    pub filesetid: i64,
    /// FileSet name
    pub fileset: String,
    /// Digest of the FileSet definition
    pub md5: Option<String>,
    /// First time the FileSet was used
    pub createtime: Option<String>,
}

/// `Media` table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeRow {
    /// Media id
    pub mediaid: i64,
    /// Volume label
    pub volumename: String,
    /// Autochanger slot, 0 when none
    pub slot: i64,
    /// Owning pool id
    pub poolid: Option<i64>,
    /// Media type
    pub mediatype: String,
    /// First write time
    pub firstwritten: Option<String>,
    /// Last write time
    pub lastwritten: Option<String>,
    /// Label time
    pub labeldate: Option<String>,
    /// Jobs written
    pub voljobs: i64,
    /// File marks written
    pub volfiles: i64,
    /// Bytes written
    pub volbytes: i64,
    /// Mount count
    pub volmounts: i64,
    /// Error count
    pub volerrors: i64,
    /// Write count
    pub volwrites: i64,
    /// Byte limit per volume
    pub maxvolbytes: i64,
    /// Volume status, e.g. `Append` or `Full`
    pub volstatus: String,
    /// Enabled flag, 1 enabled, 0 disabled, 2 archived
    pub enabled: i64,
    /// Non-zero when the volume can be recycled
    pub recycle: i64,
    /// Volume retention in seconds
    pub volretention: i64,
    /// Volume use duration in seconds
    pub voluseduration: i64,
    /// Job limit per volume
    pub maxvoljobs: i64,
    /// File limit per volume
    pub maxvolfiles: i64,
    /// Non-zero when the volume is in the autochanger
    pub inchanger: i64,
    /// Storage the volume was last used on
    pub storageid: Option<i64>,
    /// Expiry date for full or used volumes, `no date` otherwise
    pub whenexpire: String,
    /// Owning pool, filled in for volume listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolRow>,
}

/// Read access to the backup catalog
///
/// Lookups return `Ok(None)` for missing records. Errors mean the catalog
/// itself failed and map to the database error code.
pub trait Catalog: Send + Sync {
    /// Check that the catalog answers queries
    fn ping(&self) -> Result<()>;

    /// Catalog size in bytes
    fn size(&self) -> Result<u64>;

    /// Jobs newest first, restricted to `allowed` names unless it is empty
    fn jobs(&self, limit: Option<u32>, allowed: &[String]) -> Result<Vec<JobRow>>;

    /// Job by id
    fn job(&self, jobid: i64) -> Result<Option<JobRow>>;

    /// Jobs run for a client
    fn jobs_for_client(&self, clientid: i64, allowed: &[String]) -> Result<Vec<JobRow>>;

    /// Jobs with data on a volume
    fn jobs_on_volume(&self, mediaid: i64, allowed: &[String]) -> Result<Vec<JobRow>>;

    /// Successful backups of one job definition, most recently ended first
    fn recent_jobs(&self, name: &str, clientid: i64, filesetid: i64) -> Result<Vec<JobRow>>;

    /// Successful backups sharing the reference job's client and fileset
    /// that started no later than it, newest first
    fn restore_candidates(&self, reference: &JobRow) -> Result<Vec<JobRow>>;

    /// Log lines of a job in time order
    fn job_log(&self, jobid: i64) -> Result<Vec<String>>;

    /// Clients
    fn clients(&self, limit: Option<u32>) -> Result<Vec<ClientRow>>;

    /// Client by id
    fn client(&self, clientid: i64) -> Result<Option<ClientRow>>;

    /// Client by name
    fn client_by_name(&self, name: &str) -> Result<Option<ClientRow>>;

    /// Pools
    fn pools(&self, limit: Option<u32>) -> Result<Vec<PoolRow>>;

    /// Pool by id
    fn pool(&self, poolid: i64) -> Result<Option<PoolRow>>;

    /// Pool by name
    fn pool_by_name(&self, name: &str) -> Result<Option<PoolRow>>;

    /// Storages
    fn storages(&self, limit: Option<u32>) -> Result<Vec<StorageRow>>;

    /// Storage by id
    fn storage(&self, storageid: i64) -> Result<Option<StorageRow>>;

    /// FileSet by id
    fn fileset(&self, filesetid: i64) -> Result<Option<FileSetRow>>;

    /// FileSet by name
    fn fileset_by_name(&self, name: &str) -> Result<Option<FileSetRow>>;

    /// Volumes with their pools
    fn volumes(&self, limit: Option<u32>) -> Result<Vec<VolumeRow>>;

    /// Volume by id
    fn volume(&self, mediaid: i64) -> Result<Option<VolumeRow>>;

    /// Any volume of a pool
    fn volume_in_pool(&self, poolid: i64) -> Result<Option<VolumeRow>>;

    /// Drop a temporary BVFS restore table
    fn drop_restore_table(&self, table: &str) -> Result<()>;
}

/// Pick the jobids a point-in-time restore needs.
///
/// `candidates` are `(jobid, level)` pairs, newest first. The walk stops at
/// the first Full, which is included. The first Differential is included and
/// everything after it except a Full is skipped. Incrementals seen before
/// the Differential are included.
pub fn select_restore_chain<'a, I>(candidates: I) -> Vec<i64>
where
    I: IntoIterator<Item = (i64, &'a str)>,
{
    let mut jobids = Vec::new();
    let mut wait_for_full = false;
    for (jobid, level) in candidates {
        match level {
            "F" => {
                jobids.push(jobid);
                break;
            }
            "D" if !wait_for_full => {
                jobids.push(jobid);
                wait_for_full = true;
            }
            "I" if !wait_for_full => jobids.push(jobid),
            _ => {}
        }
    }
    jobids
}

/// Jobids to restore one job definition as of its latest backup
pub fn recent_jobids(
    catalog: &dyn Catalog,
    name: &str,
    clientid: i64,
    filesetid: i64,
) -> Result<Vec<i64>> {
    let jobs = catalog.recent_jobs(name, clientid, filesetid)?;
    Ok(select_restore_chain(
        jobs.iter().map(|j| (j.jobid, j.level.as_str())),
    ))
}

/// Jobids to restore the state captured by `reference`
pub fn restore_jobids(catalog: &dyn Catalog, reference: &JobRow) -> Result<Vec<i64>> {
    let jobs = catalog.restore_candidates(reference)?;
    Ok(select_restore_chain(
        jobs.iter().map(|j| (j.jobid, j.level.as_str())),
    ))
}
