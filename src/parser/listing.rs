//! BVFS listings, file lists and other line based console output

use super::LStat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;

static FILESET_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^FileSet: name=").expect("valid fileset pattern"));

static ATTRIBUTE_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s\S+=.+").expect("valid attribute pattern"));

static JOB_QUEUED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Job queued\.\sJobId=([0-9]+)$").expect("valid queued pattern"));

/// Kind of a BVFS entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Directory, name ends with `/` (or is `..`)
    Dir,
    /// Regular file
    File,
}

/// One row of `.bvfs_lsdirs` or `.bvfs_lsfiles`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BvfsEntry {
    /// Path id
    pub pathid: u64,
    /// File name id
    pub filenameid: u64,
    /// File id
    pub fileid: u64,
    /// Job id
    pub jobid: u64,
    /// Decoded attributes
    pub lstat: Option<LStat>,
    /// Entry name
    pub name: String,
    /// Entry kind
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

/// One row of `.bvfs_versions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BvfsVersion {
    /// File name the versions were requested for
    pub name: String,
    /// Path id
    pub pathid: u64,
    /// File name id
    pub filenameid: u64,
    /// File id
    pub fileid: u64,
    /// Job id
    pub jobid: u64,
    /// Decoded attributes
    pub lstat: Option<LStat>,
    /// Stored checksum
    pub md5: String,
    /// Volume holding this version
    pub volname: String,
    /// Whether the volume is in an autochanger
    pub inchanger: bool,
    /// Always a file
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

struct BvfsRow<'a> {
    pathid: u64,
    filenameid: u64,
    fileid: u64,
    jobid: u64,
    lstat: &'a str,
    rest: &'a str,
}

/// Split the leading id columns and the lstat column of a BVFS row.
fn split_row(line: &str, columns: usize) -> Option<(BvfsRow<'_>, Vec<&str>)> {
    let parts: Vec<&str> = line.splitn(columns, '\t').collect();
    if parts.len() != columns {
        return None;
    }
    let id = |s: &str| -> Option<u64> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    };
    let lstat = parts[4];
    if lstat.is_empty()
        || !lstat
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b' ')
    {
        return None;
    }
    let row = BvfsRow {
        pathid: id(parts[0])?,
        filenameid: id(parts[1])?,
        fileid: id(parts[2])?,
        jobid: id(parts[3])?,
        lstat,
        rest: parts[5],
    };
    Some((row, parts[5..].to_vec()))
}

/// Parse `.bvfs_lsdirs` / `.bvfs_lsfiles` output.
///
/// Directories are reported with a trailing `/`, the parent entry `..` is
/// kept and the current directory `.` is skipped. Entries are sorted by
/// name, dot entries first, ignoring case.
pub fn bvfs_entries<S: AsRef<str>>(lines: &[S]) -> Vec<BvfsEntry> {
    let mut entries: Vec<BvfsEntry> = lines
        .iter()
        .filter_map(|line| {
            let (row, _) = split_row(line.as_ref(), 6)?;
            let (name, entry_type) = if let Some(base) = row.rest.strip_suffix('/') {
                if base == "." {
                    return None;
                }
                if base == ".." {
                    (base.to_string(), EntryType::Dir)
                } else {
                    (format!("{}/", base), EntryType::Dir)
                }
            } else if row.rest == ".." {
                (row.rest.to_string(), EntryType::Dir)
            } else if row.rest.is_empty() || row.rest == "." || row.rest.contains('/') {
                return None;
            } else {
                (row.rest.to_string(), EntryType::File)
            };
            Some(BvfsEntry {
                pathid: row.pathid,
                filenameid: row.filenameid,
                fileid: row.fileid,
                jobid: row.jobid,
                lstat: LStat::decode(row.lstat),
                name,
                entry_type,
            })
        })
        .collect();

    entries.sort_by(|a, b| compare_names(&a.name, &b.name));
    entries
}

fn compare_names(a: &str, b: &str) -> Ordering {
    match (a.starts_with('.'), b.starts_with('.')) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

/// Parse `.bvfs_versions` output for `name`.
pub fn bvfs_versions<S: AsRef<str>>(name: &str, lines: &[S]) -> Vec<BvfsVersion> {
    lines
        .iter()
        .filter_map(|line| {
            let (row, tail) = split_row(line.as_ref(), 8)?;
            let (md5, volname, inchanger) = (tail[0], tail[1], tail[2]);
            if md5.is_empty()
                || volname.is_empty()
                || inchanger.is_empty()
                || !inchanger.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            Some(BvfsVersion {
                name: name.to_string(),
                pathid: row.pathid,
                filenameid: row.filenameid,
                fileid: row.fileid,
                jobid: row.jobid,
                lstat: LStat::decode(row.lstat),
                md5: md5.to_string(),
                volname: volname.to_string(),
                inchanger: inchanger.trim_start_matches('0') != "",
                entry_type: EntryType::File,
            })
        })
        .collect()
}

/// File names from the table printed by `list files jobid=...`
pub fn list_files<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| {
            let inner = line.as_ref().strip_prefix('|')?.strip_suffix('|')?.trim();
            if inner.is_empty() || inner.eq_ignore_ascii_case("filename") {
                None
            } else {
                Some(inner.to_string())
            }
        })
        .collect()
}

/// Files whose name contains `search`, ignoring case
pub fn filter_files(files: Vec<String>, search: &str) -> Vec<String> {
    let needle = search.to_lowercase();
    files
        .into_iter()
        .filter(|f| f.to_lowercase().contains(&needle))
        .collect()
}

/// FileSet name from a `show fileset` line.
///
/// The name runs until the first ` key=value` attribute following it.
pub fn fileset_name(line: &str) -> Option<String> {
    let prefix = FILESET_PREFIX.find(line)?;
    let rest = &line[prefix.end()..];
    if rest.is_empty() {
        return None;
    }
    let end = rest
        .char_indices()
        .skip(1)
        .find(|(i, _)| ATTRIBUTE_TAIL.is_match(&rest[*i..]))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

/// Whether `show jobs` output describes a job called `name`
pub fn job_shown<S: AsRef<str>>(show_output: &[S], name: &str) -> bool {
    let marker = format!("Job: name={}", name);
    show_output
        .iter()
        .any(|line| line.as_ref().starts_with(&marker))
}

/// JobId reported by `run` when the job was queued
pub fn queued_jobid<S: AsRef<str>>(lines: &[S]) -> Option<u64> {
    lines.iter().rev().find_map(|line| {
        JOB_QUEUED
            .captures(line.as_ref())
            .and_then(|c| c[1].parse().ok())
    })
}
