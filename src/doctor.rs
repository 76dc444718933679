use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::cli::DoctorArgs;
use crate::manifest::Manifest;

const DEFAULT_PACKAGES: &[&str] = &["pandas", "numpy", "requests", "fastf1", "python-dotenv", "tqdm"];
const DEFAULT_DIRS: &[&str] = &["data", "data/raw", "data/processed", "notebooks", "src", "config"];
const DEFAULT_ENV_VARS: &[&str] = &["DATA_DIR", "RAW_DATA_DIR", "PROCESSED_DATA_DIR"];

#[derive(Debug, Clone)]
pub struct DoctorOptions {
    pub project: PathBuf,
    pub create_missing: bool,
    pub packages: Vec<String>,
    pub dirs: Vec<PathBuf>,
    pub env_vars: Vec<String>,
}

impl DoctorOptions {
    pub fn from_args(args: &DoctorArgs, cwd: &Path) -> Self {
        let project = match &args.project {
            Some(p) if p.is_relative() => cwd.join(p),
            Some(p) => p.clone(),
            None => cwd.to_path_buf(),
        };
        Self {
            project,
            create_missing: !args.no_create,
            packages: or_defaults(&args.packages, DEFAULT_PACKAGES, |s| s.to_string()),
            dirs: or_defaults(&args.dirs, DEFAULT_DIRS, |s| PathBuf::from(s)),
            env_vars: or_defaults(&args.env_vars, DEFAULT_ENV_VARS, |s| s.to_string()),
        }
    }
}

fn or_defaults<T, F>(given: &[T], defaults: &[&str], convert: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&str) -> T,
{
    if given.is_empty() {
        defaults.iter().map(|d| convert(d)).collect()
    } else {
        given.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Pass,
    Warn,
    Fail,
}

impl Mark {
    fn symbol(&self) -> &'static str {
        match self {
            Mark::Pass => "✓",
            Mark::Warn => "⚠",
            Mark::Fail => "✗",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckItem {
    pub mark: Mark,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub title: &'static str,
    pub items: Vec<CheckItem>,
    pub passed: bool,
}

impl CheckReport {
    fn new(title: &'static str) -> Self {
        Self {
            title,
            items: Vec::new(),
            passed: true,
        }
    }

    fn push(&mut self, mark: Mark, message: impl Into<String>) {
        if mark == Mark::Fail {
            self.passed = false;
        }
        self.items.push(CheckItem {
            mark,
            message: message.into(),
        });
    }
}

/// 各チェックは失敗しても残りを続行し、常に4件のレポートを返す。
pub fn run(options: &DoctorOptions) -> Vec<CheckReport> {
    let (manifest_report, manifest) = check_manifest(&options.project);
    let packages_report = check_packages(manifest.as_ref(), &options.packages);
    let dirs_report = check_directories(&options.project, &options.dirs, options.create_missing);
    let env_report = check_environment(&options.project, &options.env_vars, |key| {
        std::env::var(key).ok()
    });

    vec![manifest_report, packages_report, dirs_report, env_report]
}

fn check_manifest(project: &Path) -> (CheckReport, Option<Manifest>) {
    let mut report = CheckReport::new("マニフェスト");
    let path = project.join("requirements.txt");

    let manifest = match Manifest::load(&path) {
        Ok(manifest) => manifest,
        Err(err) => {
            tracing::debug!("{err}");
            report.push(Mark::Fail, format!("{} を読み込めません", path.display()));
            return (report, None);
        }
    };

    report.push(
        Mark::Pass,
        format!(
            "requirements.txt に {}件のパッケージが宣言されています",
            manifest.dependencies().count()
        ),
    );
    for diagnostic in manifest.diagnostics() {
        report.push(
            Mark::Fail,
            format!("{}行目: {}", diagnostic.line, diagnostic.issue),
        );
    }

    (report, Some(manifest))
}

fn check_packages(manifest: Option<&Manifest>, packages: &[String]) -> CheckReport {
    let mut report = CheckReport::new("必須パッケージ");
    let Some(manifest) = manifest else {
        report.push(Mark::Fail, "マニフェストが無いため確認できません");
        return report;
    };

    for name in packages {
        match manifest.find(name) {
            Some(dep) => report.push(Mark::Pass, format!("{name}=={} が宣言されています", dep.version)),
            None => report.push(Mark::Fail, format!("{name} が宣言されていません")),
        }
    }
    report
}

fn check_directories(project: &Path, dirs: &[PathBuf], create_missing: bool) -> CheckReport {
    let mut report = CheckReport::new("ディレクトリ構成");

    for dir in dirs {
        let path = project.join(dir);
        let label = dir.display();
        if path.is_dir() {
            report.push(Mark::Pass, format!("{label}/ があります"));
        } else if create_missing {
            match fs::create_dir_all(&path)
                .with_context(|| format!("ディレクトリの作成に失敗: {}", path.display()))
            {
                Ok(()) => {
                    tracing::info!("ディレクトリを作成しました: {}", path.display());
                    report.push(Mark::Warn, format!("{label}/ が無かったため作成しました"));
                }
                Err(err) => {
                    tracing::warn!("{err:#}");
                    report.push(Mark::Fail, format!("{label}/ を作成できません: {err:#}"));
                }
            }
        } else {
            report.push(Mark::Fail, format!("{label}/ がありません"));
        }
    }

    report
}

fn check_environment<F>(project: &Path, vars: &[String], lookup: F) -> CheckReport
where
    F: Fn(&str) -> Option<String>,
{
    let mut report = CheckReport::new("環境変数");
    let env_path = project.join(".env");

    if !env_path.is_file() {
        report.push(Mark::Fail, ".env がありません（.env.example から作成してください）");
        return report;
    }

    let text = match fs::read_to_string(&env_path)
        .with_context(|| format!(".envの読み込みに失敗: {}", env_path.display()))
    {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!("{err:#}");
            report.push(Mark::Fail, format!("{err:#}"));
            return report;
        }
    };
    let file_vars = parse_env_file(&text);
    report.push(Mark::Pass, ".env があります");

    for key in vars {
        let value = lookup(key)
            .or_else(|| file_vars.get(key).cloned())
            .filter(|v| !v.is_empty());
        match value {
            Some(value) => report.push(Mark::Pass, format!("{key} = {value}")),
            None => report.push(Mark::Warn, format!("{key} が設定されていません")),
        }
    }

    report
}

/// `KEY=VALUE` 形式の .env を読む。`#` コメント、`export ` 接頭辞、引用符に対応する。
pub fn parse_env_file(text: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = value.trim();
        let value = if let Some(inner) = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        {
            inner.to_string()
        } else {
            value
                .split(" #")
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        vars.insert(key.to_string(), value);
    }

    vars
}

/// 結果を出力し、すべてのチェックが成功したかを返す。
pub fn print_reports(reports: &[CheckReport]) -> bool {
    for report in reports {
        println!("\n{}:", report.title);
        for item in &report.items {
            println!("  {} {}", item.mark.symbol(), item.message);
        }
    }

    let passed = reports.iter().filter(|r| r.passed).count();
    println!("\n{}", "=".repeat(50));
    for report in reports {
        let (symbol, status) = if report.passed {
            (Mark::Pass.symbol(), "PASSED")
        } else {
            (Mark::Fail.symbol(), "FAILED")
        };
        println!("{symbol} {}: {status}", report.title);
    }
    println!("\n合計: {passed}/{} 件のチェックに成功", reports.len());

    passed == reports.len()
}
