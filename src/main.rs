mod cache;
mod cli;
mod doctor;
mod error;
mod logging;
mod manifest;
mod output;
mod progress;
mod pypi;
mod scan;
mod types;
mod version;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cache::MetadataCache;
use crate::cli::{AuditArgs, BumpArgs, Cli, Command, DoctorArgs, ListArgs, PathArgs};
use crate::manifest::{BumpOutcome, Manifest};
use crate::output::PathContext;
use crate::scan::LoadedManifest;
use crate::types::DependencyRecord;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let cwd = std::env::current_dir()?;

    match &cli.command {
        Command::Check(args) => run_check(args, &cwd),
        Command::List(args) => run_list(args, &cwd),
        Command::Bump(args) => run_bump(args, &cwd),
        Command::Audit(args) => run_audit(args, &cwd, cli.cache_dir.as_deref()),
        Command::Doctor(args) => run_doctor(args, &cwd),
    }
}

fn load(args: &PathArgs, cwd: &Path) -> Result<(Vec<PathBuf>, Vec<LoadedManifest>)> {
    let search_paths = scan::resolve_search_paths(&args.paths, cwd);
    let manifests = progress::with_spinner("マニフェストを解析中...", |spinner| {
        let mut acc = Vec::new();
        for dir in &search_paths {
            spinner.set_message(format!("解析中: {}", dir.display()));
            acc.extend(scan::load_manifests(std::slice::from_ref(dir))?);
        }
        Ok(acc)
    })?;
    Ok((search_paths, manifests))
}

fn run_check(args: &PathArgs, cwd: &Path) -> Result<ExitCode> {
    let (search_paths, manifests) = load(args, cwd)?;
    let home_dir = dirs::home_dir();
    let paths = PathContext {
        cwd,
        search_paths: &search_paths,
        home_dir: home_dir.as_deref(),
    };

    let results: Vec<(PathBuf, Vec<manifest::Diagnostic>)> = manifests
        .into_iter()
        .map(|loaded| {
            let diagnostics = loaded.manifest.diagnostics();
            (loaded.path, diagnostics)
        })
        .collect();

    if results.is_empty() {
        println!("requirements.txt が見つかりませんでした。");
        return Ok(ExitCode::SUCCESS);
    }

    output::print_diagnostics(&results, &paths);
    let clean = results.iter().all(|(_, d)| d.is_empty());
    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_list(args: &ListArgs, cwd: &Path) -> Result<ExitCode> {
    let (search_paths, manifests) = load(&args.paths, cwd)?;
    let mut records: Vec<DependencyRecord> = manifests.iter().flat_map(|m| m.records()).collect();

    if let Some(query) = args.search.as_deref() {
        let needle = query.to_ascii_lowercase();
        let before = records.len();
        records.retain(|record| record_matches_query(record, &needle));
        println!(
            "> 検索クエリ \"{query}\" を適用: {before}件 -> {}件",
            records.len()
        );
    }

    let home_dir = dirs::home_dir();
    let paths = PathContext {
        cwd,
        search_paths: &search_paths,
        home_dir: home_dir.as_deref(),
    };
    output::print_dependencies(&records, &paths, args.hide_source);
    output::output_json(
        &records,
        args.json.print_json,
        args.json.json_output.as_deref(),
    )?;
    Ok(ExitCode::SUCCESS)
}

fn run_bump(args: &BumpArgs, cwd: &Path) -> Result<ExitCode> {
    let path = if args.file.is_relative() {
        cwd.join(&args.file)
    } else {
        args.file.clone()
    };

    let mut manifest = Manifest::load(&path)?;
    match manifest
        .bump(&args.name, &args.version)
        .with_context(|| format!("{} を更新できません", path.display()))?
    {
        BumpOutcome::Updated { name, from, to } => {
            manifest.save(&path)?;
            tracing::info!(package = %name, %from, %to, "ピンを更新しました");
            println!("✔ {name}: {from} -> {to}");
        }
        BumpOutcome::Unchanged { name, version } => {
            println!("{name} は既に {version} です。変更はありません。");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_audit(args: &AuditArgs, cwd: &Path, cache_dir: Option<&Path>) -> Result<ExitCode> {
    let (search_paths, manifests) = load(&args.paths, cwd)?;
    let records: Vec<DependencyRecord> = manifests.iter().flat_map(|m| m.records()).collect();

    let mut cache = MetadataCache::load(cache_dir)?;
    let audited = progress::with_spinner("PyPIを照会中...", |spinner| {
        pypi::audit_records(&records, Some(spinner), &mut cache, args.refresh)
    })?;
    cache.save()?;

    let home_dir = dirs::home_dir();
    let paths = PathContext {
        cwd,
        search_paths: &search_paths,
        home_dir: home_dir.as_deref(),
    };
    output::print_audit(&audited, &paths);
    output::output_json(
        &audited,
        args.json.print_json,
        args.json.json_output.as_deref(),
    )?;

    let problems = audited.iter().filter(|r| r.status.is_problem()).count();
    if problems > 0 {
        println!("✘ {problems}件のピンが公開されていないか取り下げられています。");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_doctor(args: &DoctorArgs, cwd: &Path) -> Result<ExitCode> {
    let options = doctor::DoctorOptions::from_args(args, cwd);
    println!("セットアップ確認: {}", options.project.display());
    println!("{}", "=".repeat(50));

    let reports = doctor::run(&options);
    if doctor::print_reports(&reports) {
        println!("\n✔ すべてのチェックに成功しました。");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("\n✘ 失敗したチェックがあります。上記の項目を修正してください。");
        Ok(ExitCode::FAILURE)
    }
}

fn record_matches_query(record: &DependencyRecord, needle: &str) -> bool {
    let dep = &record.dependency;
    let source = record.source.display().to_string();

    let targets = [
        dep.name.as_str(),
        dep.version.as_str(),
        dep.section.as_deref().unwrap_or(""),
        dep.comment.as_deref().unwrap_or(""),
        source.as_str(),
    ];

    targets
        .iter()
        .map(|value| value.to_ascii_lowercase())
        .any(|value| value.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(line: &str) -> DependencyRecord {
        let manifest = Manifest::parse(&format!("# F1 specific\n{line}\n"));
        DependencyRecord {
            dependency: manifest.dependencies().next().cloned().unwrap(),
            source: PathBuf::from("/work/f1/requirements.txt"),
        }
    }

    #[test]
    fn search_matches_name_section_comment_and_source() {
        let rec = record("fastf1==3.3.9  # Changed from 3.3.6");
        assert!(record_matches_query(&rec, "fastf1"));
        assert!(record_matches_query(&rec, "f1 specific"));
        assert!(record_matches_query(&rec, "changed from 3.3.6"));
        assert!(record_matches_query(&rec, "/work/f1"));
        assert!(!record_matches_query(&rec, "pandas"));
    }

    #[test]
    fn list_command_filters_and_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("requirements.txt"),
            include_str!("../testdata/f1-requirements.txt"),
        )
        .unwrap();
        let report = dir.path().join("pins.json");

        let args = ListArgs {
            paths: PathArgs { paths: Vec::new() },
            json: cli::JsonArgs {
                json_output: Some(report.clone()),
                print_json: false,
            },
            search: Some("F1 SPECIFIC".to_string()),
            hide_source: true,
        };
        assert_eq!(run_list(&args, dir.path()).unwrap(), ExitCode::SUCCESS);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        let entries = written.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "fastf1");
        assert_eq!(entries[0]["version"], "3.3.9");
        assert_eq!(entries[0]["previous_version"], "3.3.6");
        assert_eq!(entries[0]["section"], "F1 specific");
        assert_eq!(entries[0]["line"], 7);
        assert!(
            entries[0]["source"]
                .as_str()
                .unwrap()
                .ends_with("requirements.txt")
        );
    }

    #[test]
    fn bump_command_edits_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        std::fs::write(&path, "numpy==1.26.2\n").unwrap();

        let args = BumpArgs {
            name: "numpy".to_string(),
            version: "1.26.4".to_string(),
            file: PathBuf::from("requirements.txt"),
        };
        assert_eq!(run_bump(&args, dir.path()).unwrap(), ExitCode::SUCCESS);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "numpy==1.26.4  # Changed from 1.26.2\n"
        );
    }

    #[test]
    fn bump_command_fails_for_undeclared_package() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "numpy==1.26.2\n").unwrap();
        let args = BumpArgs {
            name: "scipy".to_string(),
            version: "1.12.0".to_string(),
            file: PathBuf::from("requirements.txt"),
        };
        assert!(run_bump(&args, dir.path()).is_err());
    }

    #[test]
    fn check_command_reports_failure_on_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("requirements.txt"),
            "numpy==1.26.4\nNumPy==1.26.2\n",
        )
        .unwrap();
        let args = PathArgs { paths: Vec::new() };
        assert_eq!(run_check(&args, dir.path()).unwrap(), ExitCode::FAILURE);
    }
}
