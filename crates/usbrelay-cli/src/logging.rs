use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the stderr logger. `RUST_LOG` overrides the flag-derived level.
pub fn init_cli_logger(debug: bool, verbose: bool) {
    let default = if verbose {
        "usbrelay_core=trace,relay=trace"
    } else if debug {
        "usbrelay_core=debug,relay=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
