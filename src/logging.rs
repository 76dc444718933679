use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` が無ければ `-v` の有無で既定のフィルタを選ぶ。ログは標準エラーへ出す。
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "pin_scout=debug,warn"
    } else {
        "pin_scout=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .compact(),
        )
        .init();
}
