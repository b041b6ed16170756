//! SQLite catalog backend

use super::{Catalog, ClientRow, FileSetRow, JobRow, PoolRow, StorageRow, VolumeRow};
use crate::error::{ApiError, Result};
use crate::validate::is_valid_rpath;
use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const JOB_COLUMNS: &str = "Job.JobId, Job.Job, Job.Name, Job.Type, Job.Level, Job.ClientId, \
     Job.JobStatus, Job.SchedTime, Job.StartTime, Job.EndTime, Job.RealEndTime, Job.JobTDate, \
     Job.VolSessionId, Job.VolSessionTime, Job.JobFiles, Job.JobBytes, Job.ReadBytes, \
     Job.JobErrors, Job.JobMissingFiles, Job.PoolId, Job.FileSetId, Job.PriorJobId, \
     Job.PurgedFiles, Job.HasBase";

const CLIENT_COLUMNS: &str =
    "ClientId, Name, Uname, AutoPrune, FileRetention, JobRetention";

const POOL_COLUMNS: &str = "PoolId, Name, NumVols, MaxVols, UseOnce, UseCatalog, \
     AcceptAnyVolume, VolRetention, VolUseDuration, MaxVolJobs, MaxVolFiles, MaxVolBytes, \
     AutoPrune, Recycle, PoolType, LabelFormat, Enabled, ScratchPoolId, RecyclePoolId";

const STORAGE_COLUMNS: &str = "StorageId, Name, AutoChanger";

const FILESET_COLUMNS: &str = "FileSetId, FileSet, MD5, CreateTime";

const MEDIA_COLUMNS: &str = "MediaId, VolumeName, Slot, PoolId, MediaType, FirstWritten, \
     LastWritten, LabelDate, VolJobs, VolFiles, VolBytes, VolMounts, VolErrors, VolWrites, \
     MaxVolBytes, VolStatus, Enabled, Recycle, VolRetention, VolUseDuration, MaxVolJobs, \
     MaxVolFiles, InChanger, StorageId";

/// Catalog format of date columns
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Catalog stored in an SQLite database
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCatalog").finish_non_exhaustive()
    }
}

impl SqliteCatalog {
    /// Open an existing catalog file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ApiError::database(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Opened catalog {}", path.display());
        Ok(Self::new(conn))
    }

    /// Wrap an open connection
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ApiError::database("catalog connection lock poisoned"))
    }

    fn query_all<T, P>(&self, sql: &str, params: P, map: fn(&Row<'_>) -> rusqlite::Result<T>) -> Result<Vec<T>>
    where
        P: rusqlite::Params,
    {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
    }

    fn query_one<T, P>(&self, sql: &str, params: P, map: fn(&Row<'_>) -> rusqlite::Result<T>) -> Result<Option<T>>
    where
        P: rusqlite::Params,
    {
        let conn = self.conn()?;
        Ok(conn.query_row(sql, params, map).optional()?)
    }

    fn jobs_matching(&self, from_where: &str, first: i64, allowed: &[String]) -> Result<Vec<JobRow>> {
        let mut sql = format!("SELECT DISTINCT {} FROM {}", JOB_COLUMNS, from_where);
        if !allowed.is_empty() {
            sql.push_str(&format!(" AND Job.Name IN ({})", placeholders(allowed.len())));
        }
        let values = std::iter::once(rusqlite::types::Value::Integer(first)).chain(
            allowed
                .iter()
                .map(|name| rusqlite::types::Value::Text(name.clone())),
        );
        self.query_all(&sql, params_from_iter(values), job_from_row)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn limit_clause(limit: Option<u32>) -> String {
    match limit {
        Some(n) if n > 0 => format!(" LIMIT {}", n),
        _ => String::new(),
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        jobid: row.get("JobId")?,
        job: row.get("Job")?,
        name: row.get("Name")?,
        job_type: row.get("Type")?,
        level: row.get("Level")?,
        clientid: row.get("ClientId")?,
        jobstatus: row.get("JobStatus")?,
        schedtime: row.get("SchedTime")?,
        starttime: row.get("StartTime")?,
        endtime: row.get("EndTime")?,
        realendtime: row.get("RealEndTime")?,
        jobtdate: row.get("JobTDate")?,
        volsessionid: row.get("VolSessionId")?,
        volsessiontime: row.get("VolSessionTime")?,
        jobfiles: row.get("JobFiles")?,
        jobbytes: row.get("JobBytes")?,
        readbytes: row.get("ReadBytes")?,
        joberrors: row.get("JobErrors")?,
        jobmissingfiles: row.get("JobMissingFiles")?,
        poolid: row.get("PoolId")?,
        filesetid: row.get("FileSetId")?,
        priorjobid: row.get("PriorJobId")?,
        purgedfiles: row.get("PurgedFiles")?,
        hasbase: row.get("HasBase")?,
    })
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<ClientRow> {
    Ok(ClientRow {
        clientid: row.get("ClientId")?,
        name: row.get("Name")?,
        uname: row.get("Uname")?,
        autoprune: row.get("AutoPrune")?,
        fileretention: row.get("FileRetention")?,
        jobretention: row.get("JobRetention")?,
    })
}

fn pool_from_row(row: &Row<'_>) -> rusqlite::Result<PoolRow> {
    Ok(PoolRow {
        poolid: row.get("PoolId")?,
        name: row.get("Name")?,
        numvols: row.get("NumVols")?,
        maxvols: row.get("MaxVols")?,
        useonce: row.get("UseOnce")?,
        usecatalog: row.get("UseCatalog")?,
        acceptanyvolume: row.get("AcceptAnyVolume")?,
        volretention: row.get("VolRetention")?,
        voluseduration: row.get("VolUseDuration")?,
        maxvoljobs: row.get("MaxVolJobs")?,
        maxvolfiles: row.get("MaxVolFiles")?,
        maxvolbytes: row.get("MaxVolBytes")?,
        autoprune: row.get("AutoPrune")?,
        recycle: row.get("Recycle")?,
        pooltype: row.get("PoolType")?,
        labelformat: row.get("LabelFormat")?,
        enabled: row.get("Enabled")?,
        scratchpoolid: row.get("ScratchPoolId")?,
        recyclepoolid: row.get("RecyclePoolId")?,
    })
}

fn storage_from_row(row: &Row<'_>) -> rusqlite::Result<StorageRow> {
    Ok(StorageRow {
        storageid: row.get("StorageId")?,
        name: row.get("Name")?,
        autochanger: row.get("AutoChanger")?,
    })
}

fn fileset_from_row(row: &Row<'_>) -> rusqlite::Result<FileSetRow> {
    Ok(FileSetRow {
        filesetid: row.get("FileSetId")?,
        fileset: row.get("FileSet")?,
        md5: row.get("MD5")?,
        createtime: row.get("CreateTime")?,
    })
}

fn volume_from_row(row: &Row<'_>) -> rusqlite::Result<VolumeRow> {
    let volstatus: String = row.get("VolStatus")?;
    let lastwritten: Option<String> = row.get("LastWritten")?;
    let volretention: i64 = row.get("VolRetention")?;
    let whenexpire = when_expire(&volstatus, lastwritten.as_deref(), volretention);
    Ok(VolumeRow {
        mediaid: row.get("MediaId")?,
        volumename: row.get("VolumeName")?,
        slot: row.get("Slot")?,
        poolid: row.get("PoolId")?,
        mediatype: row.get("MediaType")?,
        firstwritten: row.get("FirstWritten")?,
        lastwritten,
        labeldate: row.get("LabelDate")?,
        voljobs: row.get("VolJobs")?,
        volfiles: row.get("VolFiles")?,
        volbytes: row.get("VolBytes")?,
        volmounts: row.get("VolMounts")?,
        volerrors: row.get("VolErrors")?,
        volwrites: row.get("VolWrites")?,
        maxvolbytes: row.get("MaxVolBytes")?,
        volstatus,
        enabled: row.get("Enabled")?,
        recycle: row.get("Recycle")?,
        volretention,
        voluseduration: row.get("VolUseDuration")?,
        maxvoljobs: row.get("MaxVolJobs")?,
        maxvolfiles: row.get("MaxVolFiles")?,
        inchanger: row.get("InChanger")?,
        storageid: row.get("StorageId")?,
        whenexpire,
        pool: None,
    })
}

/// Expiry of a full or used volume: last write plus retention.
pub fn when_expire(volstatus: &str, lastwritten: Option<&str>, volretention: i64) -> String {
    const NO_DATE: &str = "no date";
    let status = volstatus.to_ascii_lowercase();
    if status != "full" && status != "used" {
        return NO_DATE.to_string();
    }
    lastwritten
        .and_then(|lw| NaiveDateTime::parse_from_str(lw, DATE_FORMAT).ok())
        .and_then(|lw| lw.checked_add_signed(Duration::try_seconds(volretention)?))
        .map(|expire| expire.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| NO_DATE.to_string())
}

impl Catalog for SqliteCatalog {
    fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        let conn = self.conn()?;
        let pages: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
        Ok(u64::try_from(pages.saturating_mul(page_size)).unwrap_or(0))
    }

    fn jobs(&self, limit: Option<u32>, allowed: &[String]) -> Result<Vec<JobRow>> {
        let mut sql = format!("SELECT {} FROM Job", JOB_COLUMNS);
        if !allowed.is_empty() {
            sql.push_str(&format!(" WHERE Job.Name IN ({})", placeholders(allowed.len())));
        }
        sql.push_str(" ORDER BY Job.JobId DESC");
        sql.push_str(&limit_clause(limit));
        self.query_all(&sql, params_from_iter(allowed.iter()), job_from_row)
    }

    fn job(&self, jobid: i64) -> Result<Option<JobRow>> {
        let sql = format!("SELECT {} FROM Job WHERE Job.JobId = ?1", JOB_COLUMNS);
        self.query_one(&sql, params![jobid], job_from_row)
    }

    fn jobs_for_client(&self, clientid: i64, allowed: &[String]) -> Result<Vec<JobRow>> {
        self.jobs_matching(
            "Client, Job WHERE Client.ClientId = ? AND Client.ClientId = Job.ClientId",
            clientid,
            allowed,
        )
    }

    fn jobs_on_volume(&self, mediaid: i64, allowed: &[String]) -> Result<Vec<JobRow>> {
        self.jobs_matching(
            "Job, JobMedia WHERE JobMedia.MediaId = ? AND JobMedia.JobId = Job.JobId",
            mediaid,
            allowed,
        )
    }

    fn recent_jobs(&self, name: &str, clientid: i64, filesetid: i64) -> Result<Vec<JobRow>> {
        let sql = format!(
            "SELECT {} FROM Job WHERE Job.Name = ?1 AND Job.ClientId = ?2 AND Job.FileSetId = ?3 \
             AND Job.JobStatus IN ('T', 'W') AND Job.Level IN ('F', 'I', 'D') \
             ORDER BY Job.EndTime DESC",
            JOB_COLUMNS
        );
        self.query_all(&sql, params![name, clientid, filesetid], job_from_row)
    }

    fn restore_candidates(&self, reference: &JobRow) -> Result<Vec<JobRow>> {
        let sql = format!(
            "SELECT {} FROM Job WHERE Job.ClientId = ?1 AND Job.FileSetId = ?2 \
             AND Job.StartTime <= ?3 AND Job.JobId <= ?4 \
             AND Job.JobStatus IN ('T', 'W') AND Job.Level IN ('F', 'I', 'D') \
             ORDER BY Job.StartTime DESC, Job.JobId DESC",
            JOB_COLUMNS
        );
        self.query_all(
            &sql,
            params![
                reference.clientid,
                reference.filesetid,
                reference.starttime,
                reference.jobid
            ],
            job_from_row,
        )
    }

    fn job_log(&self, jobid: i64) -> Result<Vec<String>> {
        self.query_all(
            "SELECT LogText FROM Log WHERE JobId = ?1 ORDER BY Time, LogId",
            params![jobid],
            |r| r.get(0),
        )
    }

    fn clients(&self, limit: Option<u32>) -> Result<Vec<ClientRow>> {
        let sql = format!("SELECT {} FROM Client{}", CLIENT_COLUMNS, limit_clause(limit));
        self.query_all(&sql, [], client_from_row)
    }

    fn client(&self, clientid: i64) -> Result<Option<ClientRow>> {
        let sql = format!("SELECT {} FROM Client WHERE ClientId = ?1", CLIENT_COLUMNS);
        self.query_one(&sql, params![clientid], client_from_row)
    }

    fn client_by_name(&self, name: &str) -> Result<Option<ClientRow>> {
        let sql = format!("SELECT {} FROM Client WHERE Name = ?1", CLIENT_COLUMNS);
        self.query_one(&sql, params![name], client_from_row)
    }

    fn pools(&self, limit: Option<u32>) -> Result<Vec<PoolRow>> {
        let sql = format!("SELECT {} FROM Pool{}", POOL_COLUMNS, limit_clause(limit));
        self.query_all(&sql, [], pool_from_row)
    }

    fn pool(&self, poolid: i64) -> Result<Option<PoolRow>> {
        let sql = format!("SELECT {} FROM Pool WHERE PoolId = ?1", POOL_COLUMNS);
        self.query_one(&sql, params![poolid], pool_from_row)
    }

    fn pool_by_name(&self, name: &str) -> Result<Option<PoolRow>> {
        let sql = format!("SELECT {} FROM Pool WHERE Name = ?1", POOL_COLUMNS);
        self.query_one(&sql, params![name], pool_from_row)
    }

    fn storages(&self, limit: Option<u32>) -> Result<Vec<StorageRow>> {
        let sql = format!("SELECT {} FROM Storage{}", STORAGE_COLUMNS, limit_clause(limit));
        self.query_all(&sql, [], storage_from_row)
    }

    fn storage(&self, storageid: i64) -> Result<Option<StorageRow>> {
        let sql = format!("SELECT {} FROM Storage WHERE StorageId = ?1", STORAGE_COLUMNS);
        self.query_one(&sql, params![storageid], storage_from_row)
    }

    fn fileset(&self, filesetid: i64) -> Result<Option<FileSetRow>> {
        let sql = format!("SELECT {} FROM FileSet WHERE FileSetId = ?1", FILESET_COLUMNS);
        self.query_one(&sql, params![filesetid], fileset_from_row)
    }

    fn fileset_by_name(&self, name: &str) -> Result<Option<FileSetRow>> {
        let sql = format!("SELECT {} FROM FileSet WHERE FileSet = ?1", FILESET_COLUMNS);
        self.query_one(&sql, params![name], fileset_from_row)
    }

    fn volumes(&self, limit: Option<u32>) -> Result<Vec<VolumeRow>> {
        let sql = format!(
            "SELECT {} FROM Media ORDER BY PoolId ASC, VolumeName ASC{}",
            MEDIA_COLUMNS,
            limit_clause(limit)
        );
        let mut volumes = self.query_all(&sql, [], volume_from_row)?;
        let pools = self.pools(None)?;
        for volume in &mut volumes {
            volume.pool = pools
                .iter()
                .find(|p| Some(p.poolid) == volume.poolid)
                .cloned();
        }
        Ok(volumes)
    }

    fn volume(&self, mediaid: i64) -> Result<Option<VolumeRow>> {
        let sql = format!("SELECT {} FROM Media WHERE MediaId = ?1", MEDIA_COLUMNS);
        self.query_one(&sql, params![mediaid], volume_from_row)
    }

    fn volume_in_pool(&self, poolid: i64) -> Result<Option<VolumeRow>> {
        let sql = format!(
            "SELECT {} FROM Media WHERE PoolId = ?1 ORDER BY MediaId LIMIT 1",
            MEDIA_COLUMNS
        );
        self.query_one(&sql, params![poolid], volume_from_row)
    }

    fn drop_restore_table(&self, table: &str) -> Result<()> {
        // Table names cannot be bound, only b2<digits> is ever interpolated
        if !is_valid_rpath(table) {
            return Err(ApiError::BvfsInvalidRpath);
        }
        let conn = self.conn()?;
        conn.execute_batch(&format!("DROP TABLE {}", table))?;
        Ok(())
    }
}
