use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use reqwest::{StatusCode, blocking::Client};
use serde::Deserialize;
use urlencoding::encode;

use crate::cache::MetadataCache;
use crate::manifest::normalize_name;
use crate::types::{AuditRecord, AuditStatus, DependencyRecord, PackageMetadata};
use crate::version;

pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("pin-scout/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(10))
        .build()
        .context("HTTPクライアントの初期化に失敗しました")
}

pub fn audit_records(
    records: &[DependencyRecord],
    progress: Option<&ProgressBar>,
    cache: &mut MetadataCache,
    refresh: bool,
) -> Result<Vec<AuditRecord>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let client = build_client()?;
    let total = records.len();
    let mut session: HashMap<String, Option<PackageMetadata>> = HashMap::new();
    let mut audited = Vec::with_capacity(total);

    for (idx, record) in records.iter().enumerate() {
        let dep = &record.dependency;
        if let Some(pb) = progress {
            pb.set_message(format!("PyPIを照会中... ({}/{total}) {}", idx + 1, dep.name));
        }

        let key = normalize_name(&dep.name);
        let metadata = match session.get(&key) {
            Some(known) => known.clone(),
            None => {
                let resolved = resolve_metadata(&client, cache, &dep.name, refresh);
                session.insert(key, resolved.clone());
                resolved
            }
        };

        audited.push(build_audit_record(record, metadata.as_ref()));
    }

    Ok(audited)
}

fn resolve_metadata(
    client: &Client,
    cache: &mut MetadataCache,
    name: &str,
    refresh: bool,
) -> Option<PackageMetadata> {
    if !refresh {
        if let Some(cached) = cache.get(name) {
            tracing::debug!(package = name, "キャッシュを使用します");
            return Some(cached);
        }
    }

    match fetch_package(client, name) {
        Ok(Some(metadata)) => {
            cache.insert(name, metadata.clone());
            Some(metadata)
        }
        Ok(None) => {
            tracing::warn!("{name} はPyPIに存在しません");
            None
        }
        Err(err) => {
            tracing::warn!("{name} のメタデータ取得に失敗しました: {err:#}");
            None
        }
    }
}

fn build_audit_record(record: &DependencyRecord, metadata: Option<&PackageMetadata>) -> AuditRecord {
    let dep = &record.dependency;
    AuditRecord {
        name: dep.name.clone(),
        pinned: dep.version.clone(),
        latest: metadata.and_then(|m| m.latest.clone()),
        status: metadata
            .map(|m| classify(&dep.version, m))
            .unwrap_or(AuditStatus::Unknown),
        license: metadata.and_then(|m| m.license.clone()),
        homepage: metadata.and_then(|m| m.homepage.clone()),
        source: record.source.clone(),
    }
}

pub fn classify(pinned: &str, metadata: &PackageMetadata) -> AuditStatus {
    let same = |candidate: &String| version::compare(candidate, pinned) == Ordering::Equal;

    if !metadata.releases.is_empty() && !metadata.releases.iter().any(same) {
        return AuditStatus::Missing;
    }
    if metadata.yanked.iter().any(same) {
        return AuditStatus::Yanked;
    }

    match metadata.latest.as_deref() {
        Some(latest)
            if !version::is_prerelease(latest)
                && version::compare(latest, pinned) == Ordering::Greater =>
        {
            AuditStatus::Outdated
        }
        Some(_) => AuditStatus::Ok,
        None if metadata.releases.is_empty() => AuditStatus::Unknown,
        None => AuditStatus::Ok,
    }
}

#[derive(Debug, Deserialize)]
struct PyPiResponse {
    info: PyPiInfo,
    #[serde(default)]
    releases: HashMap<String, Vec<PyPiFile>>,
}

#[derive(Debug, Deserialize)]
struct PyPiInfo {
    version: Option<String>,
    license: Option<String>,
    license_expression: Option<String>,
    classifiers: Option<Vec<String>>,
    home_page: Option<String>,
    project_urls: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct PyPiFile {
    #[serde(default)]
    yanked: bool,
}

pub fn fetch_package(client: &Client, package_name: &str) -> Result<Option<PackageMetadata>> {
    let encoded = encode(package_name);
    let url = format!("https://pypi.org/pypi/{encoded}/json");
    tracing::debug!(%url, "PyPIへリクエストします");
    let response = client
        .get(&url)
        .send()
        .with_context(|| format!("PyPIリクエストに失敗しました: {package_name}"))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    if !response.status().is_success() {
        bail!(
            "PyPIがエラーを返しました({package_name}): {}",
            response.status()
        );
    }

    let data: PyPiResponse = response
        .json()
        .with_context(|| format!("PyPIレスポンスの解析に失敗: {package_name}"))?;

    Ok(Some(metadata_from_response(data)))
}

fn metadata_from_response(data: PyPiResponse) -> PackageMetadata {
    let license = data
        .info
        .license_expression
        .as_deref()
        .and_then(normalize_license_text)
        .or_else(|| data.info.license.as_deref().and_then(normalize_license_text))
        .or_else(|| {
            data.info
                .classifiers
                .as_ref()
                .and_then(|c| license_from_classifiers(c))
        });
    let homepage = extract_homepage(&data.info);

    let mut releases: Vec<String> = data.releases.keys().cloned().collect();
    releases.sort_by(|a, b| version::compare(a, b));
    let mut yanked: Vec<String> = data
        .releases
        .iter()
        .filter(|(_, files)| !files.is_empty() && files.iter().all(|f| f.yanked))
        .map(|(v, _)| v.clone())
        .collect();
    yanked.sort_by(|a, b| version::compare(a, b));

    PackageMetadata {
        latest: data.info.version.filter(|v| !v.trim().is_empty()),
        license,
        homepage,
        releases,
        yanked,
    }
}

fn license_from_classifiers(classifiers: &[String]) -> Option<String> {
    classifiers
        .iter()
        .filter(|classifier| classifier.starts_with("License ::"))
        .filter_map(|classifier| classifier.split("::").last().map(|part| part.trim().to_string()))
        .find(|value| !value.is_empty())
}

fn extract_homepage(info: &PyPiInfo) -> Option<String> {
    if let Some(urls) = &info.project_urls {
        for key in [
            "Homepage",
            "Home Page",
            "Source",
            "Repository",
            "Documentation",
        ] {
            if let Some(value) = urls.get(key).and_then(|url| normalize_homepage(url)) {
                return Some(value);
            }
        }

        let mut rest: Vec<_> = urls.iter().collect();
        rest.sort();
        for (_, value) in rest {
            if let Some(url) = normalize_homepage(value) {
                return Some(url);
            }
        }
    }

    info.home_page.as_deref().and_then(normalize_homepage)
}

fn normalize_homepage(url: &str) -> Option<String> {
    let cleaned = url.trim().trim_end_matches('/');
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn normalize_license_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANDAS_JSON: &str = r#"{
        "info": {
            "version": "2.2.3",
            "license": "",
            "license_expression": null,
            "classifiers": [
                "Development Status :: 5 - Production/Stable",
                "License :: OSI Approved :: BSD License"
            ],
            "home_page": "",
            "project_urls": {
                "Documentation": "https://pandas.pydata.org/docs/",
                "Homepage": "https://pandas.pydata.org/"
            }
        },
        "releases": {
            "2.1.4": [{"yanked": false}],
            "2.2.0": [{"yanked": false}, {"yanked": false}],
            "2.2.3": [{"yanked": false}],
            "2.0.0rc0": [],
            "1.5.0": [{"yanked": true}]
        }
    }"#;

    fn pandas_metadata() -> PackageMetadata {
        let response: PyPiResponse = serde_json::from_str(PANDAS_JSON).unwrap();
        metadata_from_response(response)
    }

    #[test]
    fn metadata_from_pypi_json() {
        let metadata = pandas_metadata();
        assert_eq!(metadata.latest.as_deref(), Some("2.2.3"));
        assert_eq!(metadata.license.as_deref(), Some("BSD License"));
        assert_eq!(metadata.homepage.as_deref(), Some("https://pandas.pydata.org"));
        assert_eq!(
            metadata.releases,
            vec!["1.5.0", "2.0.0rc0", "2.1.4", "2.2.0", "2.2.3"]
        );
        assert_eq!(metadata.yanked, vec!["1.5.0"]);
    }

    #[test]
    fn license_expression_wins_over_free_text() {
        let json = r#"{"info": {"version": "1.0.0", "license": "MIT License text...",
            "license_expression": "MIT", "classifiers": null, "home_page": "https://example.org/",
            "project_urls": null}}"#;
        let metadata = metadata_from_response(serde_json::from_str(json).unwrap());
        assert_eq!(metadata.license.as_deref(), Some("MIT"));
        assert_eq!(metadata.homepage.as_deref(), Some("https://example.org"));
        assert!(metadata.releases.is_empty());
    }

    #[test]
    fn classify_statuses() {
        let metadata = pandas_metadata();
        assert_eq!(classify("2.2.3", &metadata), AuditStatus::Ok);
        assert_eq!(classify("2.2.0", &metadata), AuditStatus::Outdated);
        assert_eq!(classify("2.1.9", &metadata), AuditStatus::Missing);
        assert_eq!(classify("1.5.0", &metadata), AuditStatus::Yanked);
        assert_eq!(classify("2.2.3", &PackageMetadata::default()), AuditStatus::Unknown);

        let beta_latest = PackageMetadata {
            latest: Some("3.0.0b1".to_string()),
            ..PackageMetadata::default()
        };
        assert_eq!(classify("2.2.3", &beta_latest), AuditStatus::Ok);
    }

    #[test]
    fn audit_uses_cached_metadata_per_normalized_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = MetadataCache::load(Some(dir.path())).unwrap();
        cache.insert("pandas", pandas_metadata());
        cache.insert(
            "python-dotenv",
            PackageMetadata {
                latest: Some("1.0.0".to_string()),
                license: Some("BSD-3-Clause".to_string()),
                homepage: None,
                releases: vec!["0.21.0".to_string(), "1.0.0".to_string()],
                yanked: Vec::new(),
            },
        );

        let manifest = crate::manifest::Manifest::parse(
            "pandas==2.2.0  # Changed from 2.1.4\npython_dotenv==1.0.0\nPandas==2.1.9\n",
        );
        let records: Vec<DependencyRecord> = manifest
            .dependencies()
            .map(|dep| DependencyRecord {
                dependency: dep.clone(),
                source: "requirements.txt".into(),
            })
            .collect();

        let audited = audit_records(&records, None, &mut cache, false).unwrap();
        let statuses: Vec<(&str, AuditStatus)> = audited
            .iter()
            .map(|r| (r.name.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("pandas", AuditStatus::Outdated),
                ("python_dotenv", AuditStatus::Ok),
                ("Pandas", AuditStatus::Missing),
            ]
        );
        assert_eq!(audited[0].latest.as_deref(), Some("2.2.3"));
        assert_eq!(audited[0].license.as_deref(), Some("BSD License"));
        assert_eq!(audited[1].license.as_deref(), Some("BSD-3-Clause"));
    }

    #[test]
    fn audit_of_nothing_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = MetadataCache::load(Some(dir.path())).unwrap();
        assert!(audit_records(&[], None, &mut cache, false).unwrap().is_empty());
    }

    #[test]
    fn audit_record_without_metadata_is_unknown() {
        let record = DependencyRecord {
            dependency: crate::manifest::Manifest::parse("fastf1==3.3.9\n")
                .find("fastf1")
                .cloned()
                .unwrap(),
            source: "requirements.txt".into(),
        };
        let audited = build_audit_record(&record, None);
        assert_eq!(audited.status, AuditStatus::Unknown);
        assert_eq!(audited.pinned, "3.3.9");
        assert!(audited.latest.is_none());
    }
}
