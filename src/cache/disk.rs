//! Directory-backed cache store.
//!
//! One file per key. The file name is the hex SHA-256 of the key, fanned out
//! into a subdirectory named after its first two hex digits. Each file starts
//! with a fixed header:
//!
//! ```text
//! magic "SYMC" | version u8 | status u16 BE | expires_at u64 BE (unix secs)
//! ```
//!
//! followed by the body bytes. Writes land in a temporary file that is then
//! renamed over the target, so readers only ever see complete entries.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{CacheStore, CachedArtifact, StoreError, StoredEntry, SymbolKey};
use crate::http::{Body, StatusCode};

const MAGIC: &[u8; 4] = b"SYMC";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 2 + 8;

/// A [`CacheStore`] persisting entries under a root directory.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl DiskStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &SymbolKey) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_str().as_bytes()));
        self.root.join(&digest[..2]).join(digest)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn encode(artifact: &CachedArtifact, expires_at: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + artifact.body.len());
    buf.put_slice(MAGIC);
    buf.put_u8(FORMAT_VERSION);
    buf.put_u16(artifact.status.as_u16());
    buf.put_u64(expires_at);
    buf.put_slice(&artifact.body);
    buf.freeze()
}

struct Decoded {
    status: StatusCode,
    expires_at: u64,
    body: Bytes,
}

fn decode(mut raw: Bytes) -> Result<Decoded, String> {
    if raw.len() < HEADER_LEN {
        return Err(format!("{} bytes is shorter than the header", raw.len()));
    }
    if &raw[..4] != MAGIC {
        return Err("bad magic".to_owned());
    }
    if raw[4] != FORMAT_VERSION {
        return Err(format!("unsupported format version {}", raw[4]));
    }
    let code = u16::from_be_bytes([raw[5], raw[6]]);
    let status = StatusCode::from_u16(code).ok_or_else(|| format!("invalid status {code}"))?;
    let mut expiry = [0u8; 8];
    expiry.copy_from_slice(&raw[7..HEADER_LEN]);
    let body = raw.split_off(HEADER_LEN);
    Ok(Decoded {
        status,
        expires_at: u64::from_be_bytes(expiry),
        body,
    })
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(&self, key: &SymbolKey) -> Result<Option<StoredEntry>, StoreError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => Bytes::from(raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.clone(),
                    source,
                });
            }
        };

        let decoded = decode(raw).map_err(|reason| StoreError::Corrupt {
            key: key.clone(),
            reason,
        })?;

        if decoded.expires_at <= unix_now() {
            debug!(%key, "dropping expired disk entry");
            // A concurrent put may already have replaced it; either way it is gone.
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(StoredEntry {
            status: decoded.status,
            body: Body::from(decoded.body),
        }))
    }

    async fn put(
        &self,
        key: &SymbolKey,
        artifact: CachedArtifact,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let io_err = |source: io::Error| StoreError::Io {
            key: key.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp.{}.{seq}", std::process::id()));
        let expires_at = unix_now().saturating_add(ttl.as_secs().max(1));

        tokio::fs::write(&tmp, encode(&artifact, expires_at))
            .await
            .map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        Ok(())
    }
}
