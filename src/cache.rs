use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::normalize_name;
use crate::types::{CachedMetadata, PackageMetadata};

const CACHE_FORMAT: u8 = 2;
const CACHE_FILE: &str = "pypi-cache.json";

#[derive(Debug)]
pub struct MetadataCache {
    path: PathBuf,
    data: CacheData,
    max_age: Duration,
    dirty: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheData {
    version: u8,
    entries: HashMap<String, CachedMetadata>,
}

impl Default for CacheData {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT,
            entries: HashMap::new(),
        }
    }
}

impl MetadataCache {
    pub fn load(cache_dir: Option<&Path>) -> Result<Self> {
        let path = match cache_dir {
            Some(dir) => dir.join(CACHE_FILE),
            None => default_cache_path(),
        };
        Self::load_from(path)
    }

    fn load_from(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("キャッシュディレクトリの作成に失敗: {}", parent.display())
            })?;
        }

        let data = if path.exists() {
            let content = fs::read_to_string(&path).with_context(|| {
                format!("キャッシュファイルの読み込みに失敗: {}", path.display())
            })?;
            match serde_json::from_str::<CacheData>(&content) {
                Ok(data) if data.version == CACHE_FORMAT => data,
                _ => {
                    tracing::warn!(
                        "キャッシュ形式が異なるため破棄します: {}",
                        path.display()
                    );
                    CacheData::default()
                }
            }
        } else {
            CacheData::default()
        };

        tracing::debug!(path = %path.display(), entries = data.entries.len(), "キャッシュを読み込みました");
        Ok(Self {
            path,
            data,
            max_age: Duration::hours(24),
            dirty: false,
        })
    }

    pub fn get(&self, name: &str) -> Option<PackageMetadata> {
        let entry = self.data.entries.get(&normalize_name(name))?;
        (Utc::now() - entry.fetched_at <= self.max_age).then(|| entry.metadata.clone())
    }

    pub fn insert(&mut self, name: &str, metadata: PackageMetadata) {
        self.data.entries.insert(
            normalize_name(name),
            CachedMetadata {
                metadata,
                fetched_at: Utc::now(),
            },
        );
        self.dirty = true;
    }

    /// 変更がある場合のみ、一時ファイル経由で置き換えて保存する。
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let json =
            serde_json::to_vec_pretty(&self.data).context("キャッシュのJSON化に失敗しました")?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json)
            .with_context(|| format!("キャッシュの一時ファイル書き込みに失敗: {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("キャッシュファイルの置き換えに失敗: {}", self.path.display()))?;

        tracing::debug!(entries = self.data.entries.len(), "キャッシュを保存しました");
        self.dirty = false;
        Ok(())
    }
}

fn default_cache_path() -> PathBuf {
    if let Some(dir) = dirs::cache_dir() {
        dir.join("pin-scout").join(CACHE_FILE)
    } else {
        Path::new(".pin-scout-cache.json").to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PackageMetadata {
        PackageMetadata {
            latest: Some("4.67.1".to_string()),
            license: Some("MPL-2.0 AND MIT".to_string()),
            homepage: Some("https://tqdm.github.io".to_string()),
            releases: vec!["4.66.1".to_string(), "4.67.1".to_string()],
            yanked: Vec::new(),
        }
    }

    #[test]
    fn entries_persist_under_normalized_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = MetadataCache::load(Some(dir.path())).unwrap();
        cache.insert("TQDM", sample());
        cache.save().unwrap();

        assert!(!dir.path().join("pypi-cache.json.tmp").exists());

        let reloaded = MetadataCache::load(Some(dir.path())).unwrap();
        assert_eq!(reloaded.get("tqdm"), Some(sample()));
        assert_eq!(reloaded.get("numpy"), None);
    }

    #[test]
    fn stale_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = MetadataCache::load(Some(dir.path())).unwrap();
        cache.data.entries.insert(
            "tqdm".to_string(),
            CachedMetadata {
                metadata: sample(),
                fetched_at: Utc::now() - Duration::hours(25),
            },
        );
        assert_eq!(cache.get("tqdm"), None);
    }

    #[test]
    fn save_without_changes_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = MetadataCache::load(Some(dir.path())).unwrap();
        cache.save().unwrap();
        assert!(!dir.path().join(CACHE_FILE).exists());
    }

    #[test]
    fn old_format_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CACHE_FILE),
            r#"{"version": 1, "entries": {"pip::tqdm": {"license": "MIT", "homepage": null}}}"#,
        )
        .unwrap();
        let cache = MetadataCache::load(Some(dir.path())).unwrap();
        assert_eq!(cache.get("tqdm"), None);
    }
}
