use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "requirements.txt のピン留めを検証・編集・監査するCLI",
    long_about = None
)]
pub struct Cli {
    /// デバッグログを表示します（RUST_LOG が優先されます）。
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// PyPIメタデータのキャッシュ保存先ディレクトリ。
    #[arg(long = "cache-dir", value_name = "DIR", env = "PIN_SCOUT_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// マニフェストの書式・バージョン・重複を検査します。
    Check(PathArgs),

    /// 宣言されている依存関係を一覧表示します。
    List(ListArgs),

    /// 依存関係のバージョンを書き換え、変更前のバージョンをコメントに残します。
    Bump(BumpArgs),

    /// PyPIと照合して古い・存在しない・取り下げられたピンを報告します。
    Audit(AuditArgs),

    /// プロジェクトのセットアップ（マニフェスト・ディレクトリ・.env）を確認します。
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct PathArgs {
    /// 解析対象のファイルまたはディレクトリ。複数指定可。省略時はカレントディレクトリ。
    #[arg(short, long = "path", value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct JsonArgs {
    /// JSON出力を書き出すファイルパス。
    #[arg(long = "json-output", value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// JSONを標準出力へ出す場合は指定してください。
    #[arg(long = "print-json")]
    pub print_json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    #[command(flatten)]
    pub json: JsonArgs,

    /// 名前・バージョン・セクション・コメント・ソースを対象に絞り込みます。
    #[arg(long = "search", value_name = "QUERY")]
    pub search: Option<String>,

    /// テーブル出力時にSource列を非表示にします。
    #[arg(long = "hide-source")]
    pub hide_source: bool,
}

#[derive(Args, Debug)]
pub struct BumpArgs {
    /// 対象パッケージ名。
    pub name: String,

    /// 新しいバージョン（例: 2.2.0）。
    pub version: String,

    /// 編集するマニフェスト。
    #[arg(short, long, value_name = "FILE", default_value = "requirements.txt")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    #[command(flatten)]
    pub json: JsonArgs,

    /// キャッシュを使わずPyPIから取得し直します。
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// プロジェクトのルートディレクトリ。省略時はカレントディレクトリ。
    #[arg(long, value_name = "DIR")]
    pub project: Option<PathBuf>,

    /// 不足しているディレクトリを作成しません。
    #[arg(long = "no-create")]
    pub no_create: bool,

    /// 宣言されているべきパッケージ（指定時は既定値を置き換えます）。
    #[arg(long = "require-package", value_name = "NAME")]
    pub packages: Vec<String>,

    /// 存在すべきディレクトリ（指定時は既定値を置き換えます）。
    #[arg(long = "require-dir", value_name = "DIR")]
    pub dirs: Vec<PathBuf>,

    /// 設定されているべき環境変数（指定時は既定値を置き換えます）。
    #[arg(long = "require-env", value_name = "VAR")]
    pub env_vars: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bump_defaults_to_requirements_txt() {
        let cli = Cli::try_parse_from(["pin-scout", "bump", "pandas", "2.2.3"]).unwrap();
        match cli.command {
            Command::Bump(args) => {
                assert_eq!(args.name, "pandas");
                assert_eq!(args.version, "2.2.3");
                assert_eq!(args.file, PathBuf::from("requirements.txt"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "pin-scout",
            "list",
            "-p",
            "svc",
            "--verbose",
            "--cache-dir",
            "/tmp/pins",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/pins")));
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.paths.paths, vec![PathBuf::from("svc")]);
    }
}
