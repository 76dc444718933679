use std::path::PathBuf;

use thiserror::Error;

/// 1行単位で検出される構造上の問題。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineIssue {
    #[error("`name==version` の形式ではありません")]
    MalformedLine,

    #[error("パッケージ名が不正です: {name}")]
    InvalidName { name: String },

    #[error("バージョンが数値のドット区切りではありません: {version}")]
    InvalidVersion { version: String },

    #[error("{name} は {first_line} 行目で既に宣言されています")]
    DuplicatePackage { name: String, first_line: usize },
}

impl LineIssue {
    pub fn code(&self) -> &'static str {
        match self {
            LineIssue::MalformedLine => "malformed-line",
            LineIssue::InvalidName { .. } => "invalid-name",
            LineIssue::InvalidVersion { .. } => "invalid-version",
            LineIssue::DuplicatePackage { .. } => "duplicate-package",
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("{name} はマニフェストに宣言されていません")]
    PackageNotDeclared { name: String },

    #[error("ピン留めできないバージョンです: {version}")]
    InvalidVersion { version: String },

    #[error("ファイル操作に失敗しました: {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
