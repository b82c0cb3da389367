//! Remote-cache and data-transfer pair attached to a scene.
//!
//! # Responsibility
//! - Classify file references as remote (`scheme://...`) or local.
//! - Map remote references onto files in the remote cache directory and
//!   record every transfer.
//!
//! # Invariants
//! - `file://` references are local.
//! - A remote reference whose cached file does not exist is a read error;
//!   no network access happens here.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static REMOTE_SCHEME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://").expect("valid remote scheme regex")
});

const FILE_SCHEME_PREFIX: &str = "file://";

/// Remote-cache settings and reference classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheManager {
    remote_cache_directory: Option<PathBuf>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remote_cache_directory(&self) -> Option<&Path> {
        self.remote_cache_directory.as_deref()
    }

    pub fn set_remote_cache_directory(&mut self, directory: impl Into<PathBuf>) {
        self.remote_cache_directory = Some(directory.into());
    }

    /// Whether `reference` must be fetched through the cache.
    pub fn is_remote_reference(&self, reference: &str) -> bool {
        match REMOTE_SCHEME_RE.captures(reference.trim()) {
            Some(captures) => !captures["scheme"].eq_ignore_ascii_case("file"),
            None => false,
        }
    }

    /// Local cache path for a remote URI: cache directory plus the last path
    /// segment, query and fragment stripped.
    pub fn cached_path(&self, uri: &str) -> Option<PathBuf> {
        let directory = self.remote_cache_directory.as_ref()?;
        let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
        let file_name = without_query
            .rsplit('/')
            .find(|segment| !segment.is_empty())?;
        if REMOTE_SCHEME_RE.is_match(file_name) || file_name.ends_with(':') {
            return None;
        }
        Some(directory.join(file_name))
    }
}

/// Outcome of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Remote reference served from the cache.
    Cached,
    /// Remote reference whose cached file was absent.
    Missing,
    /// Write target resolved into the cache.
    Staged,
}

/// One recorded remote transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTransfer {
    pub uri: String,
    pub local_path: Option<PathBuf>,
    pub status: TransferStatus,
}

/// Records remote transfers performed on behalf of storage nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataIoManager {
    transfers: Vec<DataTransfer>,
}

impl DataIoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transfer(&mut self, transfer: DataTransfer) {
        log::debug!(
            "event=data_transfer module=remote_io status={:?} uri={}",
            transfer.status,
            transfer.uri
        );
        self.transfers.push(transfer);
    }

    pub fn transfers(&self) -> &[DataTransfer] {
        &self.transfers
    }

    pub fn clear_transfers(&mut self) {
        self.transfers.clear();
    }
}

/// Cache manager plus data-transfer manager of one scene.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteIo {
    pub cache: CacheManager,
    pub data_io: DataIoManager,
}

impl RemoteIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh pair that shares only the cache directory setting of `self`.
    pub fn clone_settings(&self) -> Self {
        let mut cache = CacheManager::new();
        if let Some(directory) = self.cache.remote_cache_directory() {
            cache.set_remote_cache_directory(directory);
        }
        Self {
            cache,
            data_io: DataIoManager::new(),
        }
    }

    /// Maps a reference onto a readable local path.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, String> {
        if !self.cache.is_remote_reference(reference) {
            return Ok(local_path(reference));
        }
        let path = self
            .cache
            .cached_path(reference)
            .ok_or_else(|| format!("no remote cache location for {reference}"))?;
        if !path.is_file() {
            return Err(format!(
                "remote file not cached: {reference} (expected {})",
                path.display()
            ));
        }
        Ok(path)
    }

    /// Maps a reference onto a writable local path.
    pub fn resolve_for_write(&self, reference: &str) -> Result<PathBuf, String> {
        if !self.cache.is_remote_reference(reference) {
            return Ok(local_path(reference));
        }
        self.cache
            .cached_path(reference)
            .ok_or_else(|| format!("no remote cache location for {reference}"))
    }
}

/// Strips a `file://` prefix.
pub fn local_path(reference: &str) -> PathBuf {
    let trimmed = reference.trim();
    let stripped = if trimmed.len() >= FILE_SCHEME_PREFIX.len()
        && trimmed[..FILE_SCHEME_PREFIX.len()].eq_ignore_ascii_case(FILE_SCHEME_PREFIX)
    {
        &trimmed[FILE_SCHEME_PREFIX.len()..]
    } else {
        trimmed
    };
    PathBuf::from(stripped)
}
