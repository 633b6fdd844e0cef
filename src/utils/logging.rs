use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use std::env;
use std::fs;
use std::io;
use std::path::Path;

/// Default session log file
pub const LOG_FILE: &str = "avatar_log.txt";

/// Initialize logging with console output and a session log file
pub fn init_logging() -> io::Result<()> {
    init_logging_to(Path::new(LOG_FILE))
}

/// Initialize logging, writing the session log to `log_path`
///
/// The previous session's file is removed first. Honors `RUST_LOG` when set,
/// otherwise logs at `info` with this crate at `debug`.
pub fn init_logging_to(log_path: &Path) -> io::Result<()> {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let enable_backtrace = env::var("RUST_BACKTRACE").unwrap_or_else(|_| "0".to_string()) == "1";

    if let Err(e) = fs::remove_file(log_path) {
        if e.kind() != io::ErrorKind::NotFound {
            eprintln!("Warning: Failed to remove existing {}: {}", log_path.display(), e);
        }
    }

    let log_file = fs::File::create(log_path)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&log_level);
        if let Ok(directive) = "slv_avatar=debug".parse() {
            filter = filter.add_directive(directive);
        }
        filter
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_ansi(true)
        )
        .with(fmt::layer()
            .with_writer(log_file)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
        )
        .init();

    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("Panic occurred: {}", panic_info);

        if let Some(location) = panic_info.location() {
            tracing::error!(
                "Panic location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }

        if enable_backtrace {
            tracing::error!("Backtrace:\n{:?}", std::backtrace::Backtrace::capture());
        }
    }));

    tracing::info!("Logging initialized with level: {}", log_level);
    tracing::info!("File logging enabled: {}", log_path.display());
    tracing::info!("Backtrace enabled: {}", enable_backtrace);
    Ok(())
}

/// Log system information for debugging
pub fn log_system_info() {
    tracing::info!("=== System Information ===");
    tracing::info!("OS: {}", std::env::consts::OS);
    tracing::info!("Architecture: {}", std::env::consts::ARCH);
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("========================");
}
