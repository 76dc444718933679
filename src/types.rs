use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub comment: Option<String>,
    pub previous_version: Option<String>,
    pub section: Option<String>,
    pub line: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct DependencyRecord {
    #[serde(flatten)]
    pub dependency: Dependency,
    pub source: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub latest: Option<String>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    #[serde(default)]
    pub releases: Vec<String>,
    #[serde(default)]
    pub yanked: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMetadata {
    pub metadata: PackageMetadata,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Ok,
    Outdated,
    Missing,
    Yanked,
    Unknown,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "ok",
            AuditStatus::Outdated => "outdated",
            AuditStatus::Missing => "missing",
            AuditStatus::Yanked => "yanked",
            AuditStatus::Unknown => "unknown",
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, AuditStatus::Missing | AuditStatus::Yanked)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub name: String,
    pub pinned: String,
    pub latest: Option<String>,
    pub status: AuditStatus,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub source: PathBuf,
}
