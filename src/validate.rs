//! Request parameter validation
//!
//! Every value that ends up inside a console command passes through one of
//! these checks first. Names are restricted so they can never close the
//! surrounding quotes or start a new console line.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest accepted resource name
pub const MAX_NAME_LEN: usize = 127;

/// Longest accepted file system path
pub const MAX_PATH_LEN: usize = 1000;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_:.\- \t]+$").expect("valid name pattern"));

static PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{L}\p{N}\p{Z}\[\]()\-+/\\:.#~_,{}!]+$").expect("valid path pattern")
});

static IDS_LIST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9,]+$").expect("valid id list pattern"));

static INTEGER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid integer pattern"));

static BDATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}$")
        .expect("valid date pattern")
});

static RPATH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^b2[0-9]+$").expect("valid rpath pattern"));

/// Replace policies accepted by `restore`
pub const REPLACE_OPTIONS: [&str; 4] = ["always", "ifnewer", "ifolder", "never"];

/// File listing types accepted by `list files`
pub const LIST_FILES_TYPES: [&str; 3] = ["saved", "deleted", "all"];

/// Job level codes and the names the console expects
pub const JOB_LEVELS: [(&str, &str); 9] = [
    ("F", "Full"),
    ("I", "Incremental"),
    ("D", "Differential"),
    ("B", "Base"),
    ("f", "VirtualFull"),
    ("V", "InitCatalog"),
    ("C", "Catalog"),
    ("O", "VolumeToCatalog"),
    ("d", "DiskToCatalog"),
];

/// Job type codes and their names
pub const JOB_TYPES: [(&str, &str); 10] = [
    ("B", "Backup"),
    ("M", "Migrated"),
    ("V", "Verify"),
    ("R", "Restore"),
    ("I", "Internal"),
    ("D", "Admin"),
    ("A", "Archive"),
    ("C", "Copy"),
    ("c", "Copy Job"),
    ("g", "Migration"),
];

/// Resource name (job, client, pool, storage, fileset, volume)
pub fn is_valid_name(value: &str) -> bool {
    value.chars().count() <= MAX_NAME_LEN && NAME_PATTERN.is_match(value)
}

/// File system path as used by BVFS and restore `where`
pub fn is_valid_path(value: &str) -> bool {
    value.chars().count() <= MAX_PATH_LEN && PATH_PATTERN.is_match(value)
}

/// Comma separated list of numeric identifiers
pub fn is_valid_ids_list(value: &str) -> bool {
    IDS_LIST_PATTERN.is_match(value)
}

/// Unsigned decimal integer
pub fn is_valid_integer(value: &str) -> bool {
    INTEGER_PATTERN.is_match(value)
}

/// Date and time in `YYYY-MM-DD HH:MM:SS` form
pub fn is_valid_bdate(value: &str) -> bool {
    BDATE_PATTERN.is_match(value)
}

/// Temporary BVFS restore table name
pub fn is_valid_rpath(value: &str) -> bool {
    RPATH_PATTERN.is_match(value)
}

/// Restore replace policy
pub fn is_valid_replace(value: &str) -> bool {
    REPLACE_OPTIONS.contains(&value)
}

/// `list files` type filter
pub fn is_valid_list_files_type(value: &str) -> bool {
    LIST_FILES_TYPES.contains(&value)
}

/// Console name for a job level code
pub fn job_level_name(code: &str) -> Option<&'static str> {
    JOB_LEVELS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Name for a job type code
pub fn job_type_name(code: &str) -> Option<&'static str> {
    JOB_TYPES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert!(is_valid_name("BackupCatalog"));
        assert!(is_valid_name("My Client-fd.1:x"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("job\"; delete"));
        assert!(!is_valid_name("job\nstatus"));
        assert!(!is_valid_name(&"a".repeat(128)));
        assert!(is_valid_name(&"a".repeat(127)));
    }

    #[test]
    fn test_paths() {
        assert!(is_valid_path("/home/user/Documents/"));
        assert!(is_valid_path("C:/Program Files (x86)/"));
        assert!(is_valid_path("/srv/zażółć/"));
        assert!(!is_valid_path("/etc/\"passwd"));
        assert!(!is_valid_path("/tmp/\nquit"));
        assert!(!is_valid_path(""));
    }

    #[test]
    fn test_lists_and_numbers() {
        assert!(is_valid_ids_list("1,2,3"));
        assert!(!is_valid_ids_list("1, 2"));
        assert!(is_valid_integer("42"));
        assert!(!is_valid_integer("-1"));
        assert!(is_valid_bdate("2020-01-01 10:00:00"));
        assert!(!is_valid_bdate("2020-01-01"));
        assert!(is_valid_rpath("b21234"));
        assert!(!is_valid_rpath("b2"));
        assert!(!is_valid_rpath("b21; DROP TABLE Job"));
    }

    #[test]
    fn test_job_levels() {
        assert_eq!(job_level_name("F"), Some("Full"));
        assert_eq!(job_level_name("f"), Some("VirtualFull"));
        assert_eq!(job_level_name("X"), None);
        assert_eq!(job_type_name("c"), Some("Copy Job"));
        assert!(is_valid_replace("ifnewer"));
        assert!(!is_valid_replace("sometimes"));
        assert!(is_valid_list_files_type("deleted"));
    }
}
