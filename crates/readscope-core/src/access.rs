//! Single-use access codes: issuance and an in-memory store.
//!
//! Codes are drawn from an alphabet without look-alike characters and
//! reserved with an atomic insert-if-absent, retrying a bounded number of
//! times on collision.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AssessmentError;
use crate::traits::{AccessCodeStore, CodeStatus, Redemption};

/// Characters used in generated codes (no 0/O, 1/I/L).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of generated codes.
pub const CODE_LENGTH: usize = 8;

/// Default number of draws before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// How long [`StoreLock::acquire`] waits for another holder by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Draw one random code. Does not touch any store.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Draw codes until one can be reserved in `store`.
pub async fn issue_code<R: Rng + ?Sized>(
    store: &dyn AccessCodeStore,
    rng: &mut R,
    max_attempts: u32,
) -> Result<String, AssessmentError> {
    for attempt in 1..=max_attempts {
        let code = generate_code(rng);
        match store.reserve(&code).await {
            Ok(true) => return Ok(code),
            Ok(false) => {
                tracing::debug!("access code collision on attempt {attempt}");
            }
            Err(e) => return Err(AssessmentError::CodeStore(format!("{e:#}"))),
        }
    }
    Err(AssessmentError::CodeSpaceExhausted(max_attempts))
}

/// One stored code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRecord {
    pub code: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub used_by: Option<String>,
    #[serde(default)]
    pub used_at: Option<DateTime<Utc>>,
}

impl CodeRecord {
    pub fn is_used(&self) -> bool {
        self.used_by.is_some()
    }
}

/// Mutex-guarded code store. Every operation holds the lock for its whole
/// check-and-set.
#[derive(Debug, Default)]
pub struct InMemoryCodeStore {
    codes: Mutex<HashMap<String, CodeRecord>>,
}

impl InMemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<CodeRecord>) -> Self {
        Self {
            codes: Mutex::new(records.into_iter().map(|r| (r.code.clone(), r)).collect()),
        }
    }

    /// All records, sorted by creation time then code.
    pub fn snapshot(&self) -> Vec<CodeRecord> {
        let mut records: Vec<CodeRecord> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.code.cmp(&b.code)));
        records
    }

    /// Load a store from a JSON file; a missing file yields an empty store.
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read code store from {}", path.display()))?;
        let records: Vec<CodeRecord> =
            serde_json::from_str(&content).context("failed to parse code store JSON")?;
        Ok(Self::from_records(records))
    }

    /// Save the store as JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .context("failed to serialize code store")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write code store to {}", path.display()))?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CodeRecord>> {
        // Mutations are single inserts or field writes; a poisoned map is still consistent.
        self.codes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AccessCodeStore for InMemoryCodeStore {
    async fn status(&self, code: &str) -> anyhow::Result<CodeStatus> {
        let codes = self.lock();
        Ok(match codes.get(code) {
            Some(record) => CodeStatus {
                exists: true,
                used: record.is_used(),
            },
            None => CodeStatus {
                exists: false,
                used: false,
            },
        })
    }

    async fn reserve(&self, code: &str) -> anyhow::Result<bool> {
        let mut codes = self.lock();
        if codes.contains_key(code) {
            return Ok(false);
        }
        codes.insert(
            code.to_string(),
            CodeRecord {
                code: code.to_string(),
                created_at: Utc::now(),
                used_by: None,
                used_at: None,
            },
        );
        Ok(true)
    }

    async fn redeem(&self, code: &str, holder: &str) -> anyhow::Result<Redemption> {
        let mut codes = self.lock();
        Ok(match codes.get_mut(code) {
            None => Redemption::Unknown,
            Some(record) if record.is_used() => Redemption::AlreadyUsed,
            Some(record) => {
                record.used_by = Some(holder.to_string());
                record.used_at = Some(Utc::now());
                Redemption::Redeemed
            }
        })
    }
}

/// Exclusive hold on a file-backed code store across processes.
///
/// Taken by creating `<store>.lock` with `create_new`, which the filesystem
/// performs as a single check-and-set. Hold it from `load_json` through
/// `save_json`; the lock file is removed on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Wait up to `timeout` for the lock on `store_path`.
    pub async fn acquire(store_path: &Path, timeout: Duration) -> Result<Self> {
        let path = lock_path(store_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    tracing::debug!("locked code store {}", store_path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if tokio::time::Instant::now() >= deadline {
                        anyhow::bail!(
                            "code store {} is locked by another process (delete {} if no other readscope is running)",
                            store_path.display(),
                            path.display()
                        );
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to create {}", path.display()))
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("failed to release {}: {e}", self.path.display());
        }
    }
}

fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    /// A store that reports every code as taken.
    struct FullStore;

    #[async_trait]
    impl AccessCodeStore for FullStore {
        async fn status(&self, _: &str) -> anyhow::Result<CodeStatus> {
            Ok(CodeStatus {
                exists: true,
                used: false,
            })
        }
        async fn reserve(&self, _: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn redeem(&self, _: &str, _: &str) -> anyhow::Result<Redemption> {
            Ok(Redemption::AlreadyUsed)
        }
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_code(&mut rng);
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn issued_code_is_reserved_and_unused() {
        let store = InMemoryCodeStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        let code = issue_code(&store, &mut rng, DEFAULT_MAX_ATTEMPTS)
            .await
            .unwrap();
        let status = store.status(&code).await.unwrap();
        assert!(status.exists);
        assert!(!status.used);
    }

    #[tokio::test]
    async fn issuance_gives_up_after_bounded_attempts() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = issue_code(&FullStore, &mut rng, 3).await.unwrap_err();
        assert!(matches!(err, AssessmentError::CodeSpaceExhausted(3)));
    }

    #[tokio::test]
    async fn redeem_transitions_exactly_once() {
        let store = InMemoryCodeStore::new();
        assert!(store.reserve("ABCD2345").await.unwrap());
        assert!(!store.reserve("ABCD2345").await.unwrap());

        assert_eq!(
            store.redeem("ABCD2345", "Mina").await.unwrap(),
            Redemption::Redeemed
        );
        assert_eq!(
            store.redeem("ABCD2345", "Joon").await.unwrap(),
            Redemption::AlreadyUsed
        );
        assert_eq!(
            store.redeem("ZZZZ9999", "Mina").await.unwrap(),
            Redemption::Unknown
        );

        let records = store.snapshot();
        assert_eq!(records[0].used_by.as_deref(), Some("Mina"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redemptions_have_one_winner() {
        let store = Arc::new(InMemoryCodeStore::new());
        store.reserve("RACE2345").await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.redeem("RACE2345", &format!("taker-{i}")).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == Redemption::Redeemed {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn store_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.json");

        let held = StoreLock::acquire(&path, DEFAULT_LOCK_TIMEOUT).await.unwrap();
        assert!(held.path().exists());
        let err = StoreLock::acquire(&path, Duration::from_millis(120))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("locked by another process"));

        drop(held);
        assert!(!dir.path().join("codes.json.lock").exists());
        StoreLock::acquire(&path, Duration::from_millis(120))
            .await
            .unwrap();
    }

    /// Each caller loads its own copy of the file, as separate processes do.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn file_redemptions_under_lock_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.json");
        let store = InMemoryCodeStore::new();
        store.reserve("FILE2345").await.unwrap();
        store.save_json(&path).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                tokio::spawn(async move {
                    let _lock = StoreLock::acquire(&path, DEFAULT_LOCK_TIMEOUT).await?;
                    let store = InMemoryCodeStore::load_json(&path)?;
                    let outcome = store.redeem("FILE2345", &format!("taker-{i}")).await?;
                    store.save_json(&path)?;
                    anyhow::Ok(outcome)
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == Redemption::Redeemed {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let saved = InMemoryCodeStore::load_json(&path).unwrap().snapshot();
        assert!(saved[0].is_used());
    }

    #[test]
    fn json_roundtrip_keeps_usage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.json");

        let store = InMemoryCodeStore::from_records(vec![CodeRecord {
            code: "USED2345".into(),
            created_at: Utc::now(),
            used_by: Some("Mina".into()),
            used_at: Some(Utc::now()),
        }]);
        store.save_json(&path).unwrap();

        let loaded = InMemoryCodeStore::load_json(&path).unwrap();
        assert_eq!(loaded.snapshot().len(), 1);
        assert!(loaded.snapshot()[0].is_used());

        let missing = InMemoryCodeStore::load_json(&dir.path().join("none.json")).unwrap();
        assert!(missing.snapshot().is_empty());
    }
}
