use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

use crate::manifest::Manifest;
use crate::types::DependencyRecord;

#[derive(Debug)]
pub struct LoadedManifest {
    pub path: PathBuf,
    pub manifest: Manifest,
}

impl LoadedManifest {
    pub fn records(&self) -> impl Iterator<Item = DependencyRecord> + '_ {
        self.manifest.dependencies().map(|dep| DependencyRecord {
            dependency: dep.clone(),
            source: self.path.clone(),
        })
    }
}

pub fn resolve_search_paths(paths: &[PathBuf], cwd: &Path) -> Vec<PathBuf> {
    if paths.is_empty() {
        vec![cwd.to_path_buf()]
    } else {
        paths
            .iter()
            .map(|p| {
                if p.is_relative() {
                    cwd.join(p)
                } else {
                    p.clone()
                }
            })
            .collect()
    }
}

pub fn load_manifests(roots: &[PathBuf]) -> Result<Vec<LoadedManifest>> {
    let mut loaded = Vec::new();
    for root in roots {
        for path in find_manifests(root)? {
            let manifest = Manifest::load(&path)
                .with_context(|| format!("マニフェストの読み込みに失敗: {}", path.display()))?;
            tracing::debug!(
                path = %path.display(),
                packages = manifest.dependencies().count(),
                "マニフェストを読み込みました"
            );
            loaded.push(LoadedManifest { path, manifest });
        }
    }
    Ok(loaded)
}

pub fn find_manifests(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("指定されたパスが存在しません: {}", root.display());
    }
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry
                .file_name()
                .to_str()
                .unwrap_or_default()
                .to_ascii_lowercase();
            entry.depth() <= 64
                && !matches!(
                    name.as_str(),
                    "node_modules" | ".git" | "target" | "__pycache__" | "venv" | ".venv"
                )
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("ディレクトリの走査に失敗しました: {err}");
                continue;
            }
        };

        if entry.file_type().is_file() && is_manifest_name(&entry.file_name().to_string_lossy()) {
            found.push(entry.into_path());
        }
    }

    Ok(found)
}

fn is_manifest_name(file_name: &str) -> bool {
    file_name == "requirements.txt"
        || (file_name.starts_with("requirements-") && file_name.ends_with(".txt"))
}
