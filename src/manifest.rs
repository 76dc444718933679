use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{LineIssue, ManifestError};
use crate::types::Dependency;
use crate::version::is_pinned_version;

static REQUIREMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<name>[^\s=#]+)\s*==\s*(?P<version>[^\s#]*)\s*(?:#(?P<comment>.*))?$")
        .expect("requirement pattern is valid")
});

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("name pattern is valid")
});

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("separator pattern is valid"));

const CHANGED_FROM: &str = "changed from";
const BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    None,
}

impl LineEnding {
    fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::None => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment { text: String },
    Requirement(Dependency),
    Invalid(LineIssue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    raw: String,
    ending: LineEnding,
    kind: LineKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub issue: LineIssue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BumpOutcome {
    Updated {
        name: String,
        from: String,
        to: String,
    },
    Unchanged {
        name: String,
        version: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    bom: bool,
    lines: Vec<Line>,
}

impl Manifest {
    pub fn parse(text: &str) -> Self {
        let (bom, text) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let mut lines = Vec::new();
        let mut section: Option<String> = None;

        for (idx, chunk) in text.split_inclusive('\n').enumerate() {
            let (raw, ending) = if let Some(body) = chunk.strip_suffix("\r\n") {
                (body, LineEnding::CrLf)
            } else if let Some(body) = chunk.strip_suffix('\n') {
                (body, LineEnding::Lf)
            } else {
                (chunk, LineEnding::None)
            };

            let kind = classify_line(raw, idx + 1, section.as_deref());
            if let LineKind::Comment { text } = &kind {
                section = (!text.is_empty()).then(|| text.clone());
            }

            lines.push(Line {
                raw: raw.to_string(),
                ending,
                kind,
            });
        }

        Self { bom, lines }
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        fs::write(path, self.render()).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.bom {
            out.push(BOM);
        }
        for line in &self.lines {
            out.push_str(&line.raw);
            out.push_str(line.ending.as_str());
        }
        out
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.lines.iter().filter_map(|line| match &line.kind {
            LineKind::Requirement(dep) => Some(dep),
            _ => None,
        })
    }

    pub fn find(&self, name: &str) -> Option<&Dependency> {
        let wanted = normalize_name(name);
        self.dependencies()
            .find(|dep| normalize_name(&dep.name) == wanted)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut found = Vec::new();
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for (idx, line) in self.lines.iter().enumerate() {
            match &line.kind {
                LineKind::Invalid(issue) => found.push(Diagnostic {
                    line: idx + 1,
                    issue: issue.clone(),
                }),
                LineKind::Requirement(dep) => {
                    let key = normalize_name(&dep.name);
                    if let Some(first_line) = first_seen.get(&key) {
                        found.push(Diagnostic {
                            line: dep.line,
                            issue: LineIssue::DuplicatePackage {
                                name: dep.name.clone(),
                                first_line: *first_line,
                            },
                        });
                    } else {
                        first_seen.insert(key, dep.line);
                    }
                }
                LineKind::Blank | LineKind::Comment { .. } => {}
            }
        }

        found
    }

    pub fn bump(&mut self, name: &str, new_version: &str) -> Result<BumpOutcome, ManifestError> {
        let new_version = new_version.trim();
        if !is_pinned_version(new_version) {
            return Err(ManifestError::InvalidVersion {
                version: new_version.to_string(),
            });
        }

        let wanted = normalize_name(name);
        let (raw, dep) = self
            .lines
            .iter_mut()
            .find_map(|line| match &mut line.kind {
                LineKind::Requirement(dep) if normalize_name(&dep.name) == wanted => {
                    Some((&mut line.raw, dep))
                }
                _ => None,
            })
            .ok_or_else(|| ManifestError::PackageNotDeclared {
                name: name.to_string(),
            })?;

        if dep.version == new_version {
            return Ok(BumpOutcome::Unchanged {
                name: dep.name.clone(),
                version: dep.version.clone(),
            });
        }

        let indent: String = raw
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect();
        let old_version = std::mem::replace(&mut dep.version, new_version.to_string());
        let comment = format!("Changed from {old_version}");
        *raw = format!("{indent}{}=={new_version}  # {comment}", dep.name);
        dep.comment = Some(comment);
        dep.previous_version = Some(old_version.clone());

        Ok(BumpOutcome::Updated {
            name: dep.name.clone(),
            from: old_version,
            to: new_version.to_string(),
        })
    }
}

/// PEP 503 の正規化名（小文字化し、`-_.` の連続を `-` にまとめる）。
pub fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS
        .replace_all(&name.trim().to_ascii_lowercase(), "-")
        .into_owned()
}

fn classify_line(raw: &str, line: usize, section: Option<&str>) -> LineKind {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if let Some(text) = trimmed.strip_prefix('#') {
        return LineKind::Comment {
            text: text.trim().to_string(),
        };
    }

    let Some(caps) = REQUIREMENT_LINE.captures(raw) else {
        return LineKind::Invalid(LineIssue::MalformedLine);
    };

    let name = &caps["name"];
    let version = &caps["version"];
    if !PACKAGE_NAME.is_match(name) {
        return LineKind::Invalid(LineIssue::InvalidName {
            name: name.to_string(),
        });
    }
    if !is_pinned_version(version) {
        return LineKind::Invalid(LineIssue::InvalidVersion {
            version: version.to_string(),
        });
    }

    let comment = caps
        .name("comment")
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty());
    let previous_version = comment.as_deref().and_then(previous_version_from_comment);

    LineKind::Requirement(Dependency {
        name: name.to_string(),
        version: version.to_string(),
        comment,
        previous_version,
        section: section.map(str::to_string),
        line,
    })
}

fn previous_version_from_comment(comment: &str) -> Option<String> {
    let head = comment.get(..CHANGED_FROM.len())?;
    if !head.eq_ignore_ascii_case(CHANGED_FROM) {
        return None;
    }
    let rest = &comment[CHANGED_FROM.len()..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace()
        .next()
        .filter(|version| is_pinned_version(version))
        .map(str::to_string)
}
