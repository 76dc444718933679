use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Attribute, Cell, Color, Table, presets::UTF8_BORDERS_ONLY};
use serde::Serialize;

use crate::manifest::Diagnostic;
use crate::types::{AuditRecord, AuditStatus, DependencyRecord};

/// パス表示の短縮に使う基準ディレクトリ。
pub struct PathContext<'a> {
    pub cwd: &'a Path,
    pub search_paths: &'a [PathBuf],
    pub home_dir: Option<&'a Path>,
}

pub fn print_dependencies(
    records: &[DependencyRecord],
    paths: &PathContext<'_>,
    hide_source: bool,
) {
    if records.is_empty() {
        println!("依存関係は見つかりませんでした。");
        return;
    }

    let mut header = vec![
        bold("Name"),
        bold("Version"),
        bold("Previous"),
        bold("Section"),
    ];
    if !hide_source {
        header.push(bold("Source"));
    }
    let mut table = new_table(header);

    for record in records {
        let dep = &record.dependency;
        let mut row = vec![
            Cell::new(&dep.name)
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
            Cell::new(&dep.version),
            previous_cell(dep.previous_version.as_deref()),
            Cell::new(dep.section.as_deref().unwrap_or("-")),
        ];
        if !hide_source {
            row.push(Cell::new(source_label(&record.source, Some(dep.line), paths)));
        }
        table.add_row(row);
    }

    println!("{table}");
}

pub fn print_diagnostics(results: &[(PathBuf, Vec<Diagnostic>)], paths: &PathContext<'_>) {
    let total: usize = results.iter().map(|(_, d)| d.len()).sum();
    if total == 0 {
        println!("✔ {}件のマニフェストに問題はありません。", results.len());
        return;
    }

    let mut table = new_table(vec![bold("Source"), bold("Rule"), bold("Message")]);
    for (path, diagnostics) in results {
        for diagnostic in diagnostics {
            table.add_row(vec![
                Cell::new(source_label(path, Some(diagnostic.line), paths)),
                Cell::new(diagnostic.issue.code())
                    .fg(Color::Red)
                    .add_attribute(Attribute::Bold),
                Cell::new(diagnostic.issue.to_string()),
            ]);
        }
    }

    println!("{table}");
    println!("✘ {total}件の問題が見つかりました。");
}

pub fn print_audit(records: &[AuditRecord], paths: &PathContext<'_>) {
    if records.is_empty() {
        println!("監査対象の依存関係はありません。");
        return;
    }

    let mut table = new_table(vec![
        bold("Name"),
        bold("Pinned"),
        bold("Latest"),
        bold("Status"),
        bold("License"),
        bold("Homepage"),
        bold("Source"),
    ]);

    for record in records {
        table.add_row(vec![
            Cell::new(&record.name),
            Cell::new(&record.pinned),
            Cell::new(record.latest.as_deref().unwrap_or("-")),
            colorize_status(record.status),
            colorize_license(record.license.as_deref().unwrap_or("Unknown")),
            Cell::new(
                record
                    .homepage
                    .as_deref()
                    .map(shorten_url)
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(source_label(&record.source, None, paths)),
        ]);
    }

    println!("{table}");
}

fn new_table(header: Vec<Cell>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(header);
    table
}

fn bold(title: &str) -> Cell {
    Cell::new(title).add_attribute(Attribute::Bold)
}

fn previous_cell(previous: Option<&str>) -> Cell {
    match previous {
        Some(version) => Cell::new(version).fg(Color::DarkGrey),
        None => Cell::new("-"),
    }
}

/// 表示用のソース名。cwd・検索パス・ホームの順に相対化し、行番号があれば `:N` を付ける。
fn source_label(source: &Path, line: Option<usize>, paths: &PathContext<'_>) -> String {
    let mut label = display_source(source, paths);
    if let Some(line) = line {
        let _ = write!(label, ":{line}");
    }
    label
}

fn display_source(source: &Path, paths: &PathContext<'_>) -> String {
    if let Ok(rel) = source.strip_prefix(paths.cwd) {
        if !rel.as_os_str().is_empty() {
            return rel.display().to_string();
        }
    }

    let under_search_path = paths.search_paths.iter().find_map(|base| {
        let rel = source.strip_prefix(base).ok()?;
        match base.file_name() {
            Some(name) => Some(prefixed(Path::new(name), rel)),
            None if !rel.as_os_str().is_empty() => Some(rel.display().to_string()),
            None => None,
        }
    });
    if let Some(label) = under_search_path {
        return label;
    }

    match paths.home_dir.and_then(|home| source.strip_prefix(home).ok()) {
        Some(rel) => prefixed(Path::new("~"), rel),
        None => source.display().to_string(),
    }
}

fn prefixed(prefix: &Path, rel: &Path) -> String {
    if rel.as_os_str().is_empty() {
        prefix.display().to_string()
    } else {
        prefix.join(rel).display().to_string()
    }
}

fn colorize_status(status: AuditStatus) -> Cell {
    let cell = Cell::new(status.as_str()).add_attribute(Attribute::Bold);
    match status {
        AuditStatus::Ok => cell.fg(Color::Green),
        AuditStatus::Outdated => cell.fg(Color::Yellow),
        AuditStatus::Missing | AuditStatus::Yanked => cell.fg(Color::Red),
        AuditStatus::Unknown => cell.fg(Color::Magenta),
    }
}

fn colorize_license(license: &str) -> Cell {
    let lower = license.to_ascii_lowercase();
    let color = if lower.contains("gpl") {
        Color::Red
    } else if lower.contains("mit") {
        Color::Green
    } else if lower.contains("bsd") {
        Color::Blue
    } else if lower.contains("apache") {
        Color::Cyan
    } else if lower == "unknown" {
        Color::Yellow
    } else {
        return Cell::new(license).fg(Color::Magenta);
    };
    Cell::new(license).fg(color).add_attribute(Attribute::Bold)
}

fn shorten_url(url: &str) -> String {
    const MAX_CHARS: usize = 60;
    match url.char_indices().nth(MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &url[..cut]),
        None => url.to_string(),
    }
}

pub fn output_json<T: Serialize + ?Sized>(
    records: &T,
    print_json: bool,
    output_path: Option<&Path>,
) -> Result<()> {
    if !print_json && output_path.is_none() {
        return Ok(());
    }

    let json = serde_json::to_string_pretty(records)?;
    if let Some(path) = output_path {
        fs::write(path, &json)
            .with_context(|| format!("JSONファイルの書き込みに失敗: {}", path.display()))?;
        tracing::info!("JSONを{}に書き出しました", path.display());
    }

    if print_json {
        println!("{json}");
    }
    Ok(())
}
