//! OAuth2 access token storage

use crate::error::{ApiError, Result};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Issued access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Bearer token value
    pub access_token: String,
    /// Token to request a new access token
    pub refresh_token: String,
    /// OAuth2 client the token belongs to
    pub client_id: String,
    /// Expiry as a unix timestamp
    pub expires: i64,
    /// Space separated endpoint scopes
    pub scope: String,
    /// Console configuration used for requests with this token
    #[serde(default, alias = "bconsole_cfg_path", skip_serializing_if = "Option::is_none")]
    pub console_cfg_path: Option<PathBuf>,
}

impl TokenRecord {
    /// Create a record valid for `ttl_secs` from now
    pub fn issue(
        client_id: impl Into<String>,
        scope: impl Into<String>,
        ttl_secs: u64,
        console_cfg_path: Option<PathBuf>,
    ) -> Self {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            access_token: generate_token(),
            refresh_token: generate_token(),
            client_id: client_id.into(),
            expires: Utc::now().timestamp().saturating_add(ttl),
            scope: scope.into(),
            console_cfg_path,
        }
    }

    /// Scope list
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether the token is expired at unix time `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires < now
    }
}

/// Random 40 character hex token
pub fn generate_token() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Token persistence
pub trait TokenStore: Send + Sync {
    /// Remove tokens expired at unix time `now`, returning how many went
    fn delete_expired(&self, now: i64) -> Result<usize>;

    /// Look up a token by its access token value
    fn find(&self, access_token: &str) -> Result<Option<TokenRecord>>;

    /// Store a token
    fn insert(&self, record: TokenRecord) -> Result<()>;
}

/// Token store kept in a JSON file
///
/// Every operation reads the file under an exclusive lock and writes it back
/// before releasing the lock when it changed something, so a server and the
/// `token` CLI can share one file.
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

#[cfg(unix)]
type LockedFile = nix::fcntl::Flock<File>;

#[cfg(not(unix))]
type LockedFile = File;

impl FileTokenStore {
    /// Open a store, creating its directory when needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ApiError::io(parent, e))?;
            }
        }

        let store = Self {
            path,
            lock: Mutex::new(()),
        };
        let count = store.transaction(|tokens| (tokens.len(), false))?;
        tracing::debug!("Token store {} holds {} tokens", store.path.display(), count);
        Ok(store)
    }

    /// Run `f` over the current file contents.
    ///
    /// `f` returns its result and whether the token list has to be written
    /// back.
    fn transaction<R>(&self, f: impl FnOnce(&mut Vec<TokenRecord>) -> (R, bool)) -> Result<R> {
        let _guard = self.lock.lock().map_err(|_| Self::poisoned())?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| ApiError::io(&self.path, e))?;
        let mut file = self.lock_file(file)?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| ApiError::io(&self.path, e))?;
        let mut tokens: Vec<TokenRecord> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable token store {}: {}", self.path.display(), e);
                Vec::new()
            })
        };

        let (result, changed) = f(&mut tokens);
        if changed {
            let content = serde_json::to_string_pretty(&tokens)?;
            rewrite(&mut file, &content).map_err(|e| ApiError::io(&self.path, e))?;
        }
        Ok(result)
    }

    #[cfg(unix)]
    fn lock_file(&self, file: File) -> Result<LockedFile> {
        use nix::fcntl::{Flock, FlockArg};

        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| ApiError::io(&self.path, std::io::Error::from(errno)))
    }

    #[cfg(not(unix))]
    fn lock_file(&self, file: File) -> Result<LockedFile> {
        Ok(file)
    }

    fn poisoned() -> ApiError {
        ApiError::internal("token store lock poisoned")
    }
}

fn rewrite(file: &mut File, content: &str) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(content.as_bytes())?;
    file.sync_data()
}

impl TokenStore for FileTokenStore {
    fn delete_expired(&self, now: i64) -> Result<usize> {
        let removed = self.transaction(|tokens| {
            let before = tokens.len();
            tokens.retain(|t| !t.is_expired(now));
            let removed = before - tokens.len();
            (removed, removed > 0)
        })?;
        if removed > 0 {
            tracing::debug!("Removed {} expired tokens", removed);
        }
        Ok(removed)
    }

    fn find(&self, access_token: &str) -> Result<Option<TokenRecord>> {
        self.transaction(|tokens| {
            let found = tokens.iter().find(|t| t.access_token == access_token).cloned();
            (found, false)
        })
    }

    fn insert(&self, record: TokenRecord) -> Result<()> {
        self.transaction(|tokens| {
            tokens.retain(|t| t.access_token != record.access_token);
            tokens.push(record);
            ((), true)
        })
    }
}
