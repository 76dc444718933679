use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// スピナーを表示しながら `action` を実行する。標準エラーが端末でなければ何も描画しない。
pub fn with_spinner<T, F>(message: &str, action: F) -> Result<T>
where
    F: FnOnce(&ProgressBar) -> Result<T>,
{
    let spinner = spinner(message)?;
    let result = action(&spinner);
    match &result {
        Ok(_) => spinner.finish_with_message(format!("{message} 完了")),
        Err(_) => spinner.finish_and_clear(),
    }
    result
}

fn spinner(message: &str) -> Result<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return Ok(ProgressBar::hidden());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?.tick_chars("/|\\- "));
    spinner.set_message(message.to_string());
    Ok(spinner)
}
