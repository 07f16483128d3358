//! On-disk media cache.
//!
//! Each entry is a pair of files: `<name>.cache` holds the raw bytes and
//! `<name>.meta` a small JSON document describing them. Pairs are published
//! by renaming fully written temporary files, data first. A reader only
//! accepts a pair whose metadata matches the data (size and SHA-256), so a
//! half-published or interleaved pair reads as corrupt, never as a hit.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::{
    domain::{ChatRef, MessageId},
    errors::Error,
    media::MediaBlob,
    Result,
};

const DATA_EXT: &str = "cache";
const META_EXT: &str = "meta";
const MAX_COMPONENT_LEN: usize = 100;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// ============== Keys ==============

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Media {
        chat: ChatRef,
        message_id: MessageId,
        index: usize,
    },
    ChannelPhoto {
        chat: ChatRef,
    },
}

impl CacheKey {
    pub fn media(chat: ChatRef, message_id: MessageId, index: usize) -> Self {
        CacheKey::Media {
            chat,
            message_id,
            index,
        }
    }

    pub fn channel_photo(chat: ChatRef) -> Self {
        CacheKey::ChannelPhoto { chat }
    }

    /// Path of the entry relative to the cache root, without extension.
    fn relative_stem(&self) -> PathBuf {
        match self {
            CacheKey::Media {
                chat,
                message_id,
                index,
            } => Path::new("media")
                .join(sanitize_component(&chat.to_string()))
                .join(message_id.to_string())
                .join(index.to_string()),
            CacheKey::ChannelPhoto { chat } => {
                Path::new("channel_photos").join(sanitize_component(&chat.to_string()))
            }
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Media {
                chat,
                message_id,
                index,
            } => write!(f, "media:{chat}/{message_id}/{index}"),
            CacheKey::ChannelPhoto { chat } => write!(f, "channel_photo:{chat}"),
        }
    }
}

/// Make `raw` safe as a single path component.
pub fn sanitize_component(raw: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\s]+"#).expect("valid regex"));

    let replaced = re.replace_all(raw, "_");
    let trimmed = replaced.trim_matches(|c| c == '_' || c == '.' || c == ' ');
    let cut: String = trimmed.chars().take(MAX_COMPONENT_LEN).collect();
    if cut.is_empty() {
        "default".to_string()
    } else {
        cut
    }
}

// ============== Metadata ==============

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheMeta {
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    pub size: u64,
    pub sha256: String,
    pub cached_at: DateTime<Utc>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ============== Store ==============

#[derive(Clone, Debug)]
pub struct EntryPaths {
    pub data: PathBuf,
    pub meta: PathBuf,
}

#[derive(Clone, Debug)]
pub struct DiskCache {
    root: PathBuf,
    enabled: bool,
}

impl DiskCache {
    /// Open the cache at `root`, creating it if needed. If the directory
    /// cannot be created the cache is disabled: every read misses and writes
    /// are dropped.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        match std::fs::create_dir_all(&root) {
            Ok(()) => {
                tracing::info!(root = %root.display(), "media cache ready");
                Self { root, enabled: true }
            }
            Err(e) => {
                tracing::error!(root = %root.display(), error = %e, "cannot create cache dir, caching disabled");
                Self {
                    root,
                    enabled: false,
                }
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            root: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn paths(&self, key: &CacheKey) -> EntryPaths {
        let stem = self.root.join(key.relative_stem());
        EntryPaths {
            data: with_suffix(&stem, DATA_EXT),
            meta: with_suffix(&stem, META_EXT),
        }
    }

    /// `Ok(None)` when either file is absent; `CacheCorrupt` when the pair
    /// exists but cannot be trusted.
    pub async fn read(&self, key: &CacheKey) -> Result<Option<MediaBlob>> {
        if !self.enabled {
            return Ok(None);
        }
        let paths = self.paths(key);

        let meta_raw = match fs::read(&paths.meta).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corrupt(&paths.meta, e)),
        };
        let bytes = match fs::read(&paths.data).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(corrupt(&paths.data, e)),
        };

        let meta: CacheMeta =
            serde_json::from_slice(&meta_raw).map_err(|e| corrupt(&paths.meta, e))?;
        if meta.size != bytes.len() as u64 {
            return Err(corrupt(
                &paths.data,
                format!("size {} does not match metadata {}", bytes.len(), meta.size),
            ));
        }
        if meta.sha256 != sha256_hex(&bytes) {
            return Err(corrupt(&paths.data, "digest does not match metadata"));
        }

        let filename = meta.original_filename.unwrap_or_else(|| {
            paths
                .data
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        Ok(Some(MediaBlob {
            bytes,
            mime_type: meta.mime_type,
            filename,
        }))
    }

    /// Publish `blob` under `key`. Readers never observe a partially written
    /// file; a failed publish removes what it already renamed into place.
    pub async fn write(&self, key: &CacheKey, blob: &MediaBlob) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let paths = self.paths(key);
        let Some(dir) = paths.data.parent() else {
            return Err(Error::InvalidPath {
                path: paths.data.clone(),
                reason: "cache entry has no parent directory".to_string(),
            });
        };
        fs::create_dir_all(dir).await?;

        let meta = CacheMeta {
            mime_type: blob.mime_type.clone(),
            original_filename: Some(blob.filename.clone()),
            size: blob.bytes.len() as u64,
            sha256: sha256_hex(&blob.bytes),
            cached_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec(&meta)?;

        let suffix = format!(
            "tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let tmp_data = with_suffix(&paths.data, &suffix);
        let tmp_meta = with_suffix(&paths.meta, &suffix);

        let staged = async {
            fs::write(&tmp_data, &blob.bytes).await?;
            fs::write(&tmp_meta, &meta_json).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = staged {
            remove_quietly(&tmp_data).await;
            remove_quietly(&tmp_meta).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&tmp_data, &paths.data).await {
            remove_quietly(&tmp_data).await;
            remove_quietly(&tmp_meta).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp_meta, &paths.meta).await {
            remove_quietly(&tmp_meta).await;
            remove_quietly(&paths.data).await;
            return Err(e.into());
        }

        tracing::debug!(%key, size = meta.size, "cache entry written");
        Ok(())
    }
}

/// `name` -> `name.<suffix>`, keeping any dots already in the name.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove cache file");
        }
    }
}

fn corrupt(path: &Path, reason: impl std::fmt::Display) -> Error {
    Error::CacheCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
