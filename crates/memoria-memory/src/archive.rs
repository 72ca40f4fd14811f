//! Level 3 memory: append-oriented, optionally compressed and encrypted blob
//! store with an external checksum index.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use chrono::{DateTime, Utc};
use memoria_core::{Error, Layer, MemoryExperience, MemoryType, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::warn;

/// Segments rotate once they would exceed this size.
const MAX_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveIndexEntry {
    pub archive_file: String,
    pub offset: u64,
    pub size: u64,
    pub checksum: String,
    pub compressed: bool,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub total_memories: usize,
    pub total_segments: usize,
    pub total_bytes: u64,
}

struct ActiveSegment {
    index: u32,
    len: u64,
}

pub struct Archive {
    base_path: PathBuf,
    master_key: Option<[u8; 32]>,
    compression_default: bool,
    index: Mutex<HashMap<String, ArchiveIndexEntry>>,
    active: Mutex<ActiveSegment>,
}

impl Archive {
    pub async fn open(base_path: impl Into<PathBuf>, master_key_hex: Option<&str>, compression_default: bool) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        let master_key = match master_key_hex {
            Some(hex) => Some(parse_key_hex(hex)?),
            None => None,
        };

        let index = load_index(&base_path).unwrap_or_default();
        let active_index = index
            .values()
            .map(|e| segment_index_of(&e.archive_file))
            .max()
            .unwrap_or(0);
        let active_len = segment_path(&base_path, active_index)
            .metadata()
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(Archive {
            base_path,
            master_key,
            compression_default,
            index: Mutex::new(index),
            active: Mutex::new(ActiveSegment { index: active_index, len: active_len }),
        })
    }

    /// Append `exp` to the active segment, optionally compressed and
    /// encrypted, returning its archive id (same as `exp.id`).
    pub async fn archive(&self, mut exp: MemoryExperience, compress: Option<bool>) -> Result<String> {
        exp.layer = Layer::Archive;
        let compress = compress.unwrap_or(self.compression_default);
        let plaintext = serde_json::to_vec(&exp)?;

        let payload = if compress {
            zstd::encode_all(plaintext.as_slice(), 0).map_err(|e| Error::persistence(e.to_string()))?
        } else {
            plaintext
        };

        let (payload, encrypted) = match &self.master_key {
            Some(key) => (encrypt(key, &payload)?, true),
            None => (payload, false),
        };

        let checksum = format!("{:x}", Sha256::digest(&payload));

        let mut active = self.active.lock().await;
        if active.len + payload.len() as u64 > MAX_SEGMENT_BYTES {
            active.index += 1;
            active.len = 0;
        }
        let segment_name = segment_filename(active.index);
        let offset = active.len;
        append_to_segment(&self.base_path, active.index, &payload)?;
        active.len += payload.len() as u64;
        drop(active);

        let entry = ArchiveIndexEntry {
            archive_file: segment_name,
            offset,
            size: payload.len() as u64,
            checksum,
            compressed: compress,
            encrypted,
            created_at: Utc::now(),
            memory_type: exp.memory_type,
        };

        let mut index = self.index.lock().await;
        index.insert(exp.id.clone(), entry);
        write_index(&self.base_path, &index)?;
        Ok(exp.id)
    }

    pub async fn retrieve(&self, id: &str) -> Result<Option<MemoryExperience>> {
        let entry = {
            let index = self.index.lock().await;
            match index.get(id) {
                Some(e) => e.clone(),
                None => return Ok(None),
            }
        };

        let raw = read_segment_range(&self.base_path, &entry.archive_file, entry.offset, entry.size)?;
        let checksum = format!("{:x}", Sha256::digest(&raw));
        if checksum != entry.checksum {
            warn!(id, "archive checksum mismatch, treating as corrupted");
            return Err(Error::persistence(format!("checksum mismatch for {id}")));
        }

        let decrypted = if entry.encrypted {
            let key = self
                .master_key
                .ok_or_else(|| Error::configuration("archive entry is encrypted but no master key is configured"))?;
            decrypt(&key, &raw)?
        } else {
            raw
        };

        let plaintext = if entry.compressed {
            zstd::decode_all(decrypted.as_slice()).map_err(|e| Error::persistence(e.to_string()))?
        } else {
            decrypted
        };

        let exp: MemoryExperience = serde_json::from_slice(&plaintext)?;
        Ok(Some(exp))
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryExperience> {
        let ids: Vec<String> = self.index.lock().await.keys().cloned().collect();
        let query_lower = query.to_lowercase();
        let mut scored = Vec::new();
        for id in ids {
            if let Ok(Some(exp)) = self.retrieve(&id).await {
                if exp.content.to_lowercase().contains(&query_lower) {
                    scored.push(exp);
                }
            }
        }
        scored.truncate(limit);
        scored
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut index = self.index.lock().await;
        if index.remove(id).is_none() {
            return false;
        }
        write_index(&self.base_path, &index).is_ok()
    }

    pub async fn stats(&self) -> ArchiveStats {
        let index = self.index.lock().await;
        let segments: std::collections::HashSet<&str> = index.values().map(|e| e.archive_file.as_str()).collect();
        ArchiveStats {
            total_memories: index.len(),
            total_segments: segments.len().max(1),
            total_bytes: index.values().map(|e| e.size).sum(),
        }
    }
}

fn segment_filename(index: u32) -> String {
    format!("archive_{index:05}.luna.archive")
}

fn segment_index_of(filename: &str) -> u32 {
    filename
        .trim_start_matches("archive_")
        .trim_end_matches(".luna.archive")
        .parse()
        .unwrap_or(0)
}

fn segment_path(base_path: &Path, index: u32) -> PathBuf {
    base_path.join(segment_filename(index))
}

fn append_to_segment(base_path: &Path, index: u32, bytes: &[u8]) -> Result<()> {
    let path = segment_path(base_path, index);
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

fn read_segment_range(base_path: &Path, filename: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
    let path = base_path.join(filename);
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; size as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn index_path(base_path: &Path) -> PathBuf {
    base_path.join("archive_index.json")
}

fn load_index(base_path: &Path) -> Option<HashMap<String, ArchiveIndexEntry>> {
    let path = index_path(base_path);
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn write_index(base_path: &Path, index: &HashMap<String, ArchiveIndexEntry>) -> Result<()> {
    let tmp = index_path(base_path).with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(index)?)?;
    std::fs::rename(&tmp, index_path(base_path))?;
    Ok(())
}

fn parse_key_hex(hex: &str) -> Result<[u8; 32]> {
    let bytes = hex_decode(hex).map_err(|e| Error::configuration(format!("invalid master key hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(Error::configuration("archive master key must be 32 bytes (64 hex chars)"));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn hex_decode(s: &str) -> std::result::Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd-length hex string".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::persistence(format!("encryption failed: {e}")))?;
    let mut out = nonce.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt(key: &[u8; 32], payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < 12 {
        return Err(Error::persistence("ciphertext too short to contain a nonce"));
    }
    let (nonce_bytes, ciphertext) = payload.split_at(12);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(nonce_bytes.into(), ciphertext)
        .map_err(|e| Error::persistence(format!("decryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_core::MemoryType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn archive_then_retrieve_round_trips_plaintext() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(dir.path(), None, false).await.unwrap();
        let exp = MemoryExperience::new("quiet night", MemoryType::Root);
        let id = archive.archive(exp.clone(), Some(false)).await.unwrap();
        let found = archive.retrieve(&id).await.unwrap().unwrap();
        assert_eq!(found.content, exp.content);
    }

    #[tokio::test]
    async fn compression_shrinks_repetitive_content() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(dir.path(), None, true).await.unwrap();
        let content = "the quick brown fox ".repeat(2000);
        let exp = MemoryExperience::new(content.clone(), MemoryType::Root);
        let id = archive.archive(exp, Some(true)).await.unwrap();
        let found = archive.retrieve(&id).await.unwrap().unwrap();
        assert_eq!(found.content, content);
        let stats = archive.stats().await;
        assert!(stats.total_bytes < content.len() as u64);
    }

    #[tokio::test]
    async fn encrypted_segment_does_not_contain_plaintext_content() {
        let dir = TempDir::new().unwrap();
        let key_hex = "00".repeat(32);
        let archive = Archive::open(dir.path(), Some(&key_hex), false).await.unwrap();
        let secret = "the eagle flies at midnight, do not repeat this phrase elsewhere";
        let exp = MemoryExperience::new(secret, MemoryType::Root);
        archive.archive(exp, Some(false)).await.unwrap();

        let segment_path = dir.path().join(segment_filename(0));
        let raw = std::fs::read(segment_path).unwrap();
        let raw_str = String::from_utf8_lossy(&raw);
        assert!(!raw_str.contains(secret));
    }

    #[tokio::test]
    async fn encrypted_round_trip_still_recovers_content() {
        let dir = TempDir::new().unwrap();
        let key_hex = "ab".repeat(32);
        let archive = Archive::open(dir.path(), Some(&key_hex), false).await.unwrap();
        let exp = MemoryExperience::new("protected thought", MemoryType::Root);
        let id = archive.archive(exp.clone(), Some(false)).await.unwrap();
        let found = archive.retrieve(&id).await.unwrap().unwrap();
        assert_eq!(found.content, exp.content);
    }

    #[tokio::test]
    async fn checksum_mismatch_is_reported_as_corrupted() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(dir.path(), None, false).await.unwrap();
        let exp = MemoryExperience::new("fragile", MemoryType::Root);
        let id = archive.archive(exp, Some(false)).await.unwrap();

        let segment_path = dir.path().join(segment_filename(0));
        let mut raw = std::fs::read(&segment_path).unwrap();
        raw[0] ^= 0xFF;
        std::fs::write(&segment_path, raw).unwrap();

        assert!(archive.retrieve(&id).await.is_err());
    }

    #[tokio::test]
    async fn stats_counts_memories() {
        let dir = TempDir::new().unwrap();
        let archive = Archive::open(dir.path(), None, false).await.unwrap();
        for i in 0..3 {
            archive
                .archive(MemoryExperience::new(format!("item {i}"), MemoryType::Root), Some(false))
                .await
                .unwrap();
        }
        let stats = archive.stats().await;
        assert_eq!(stats.total_memories, 3);
    }
}
