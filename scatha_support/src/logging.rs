//! Logging initialization shared by the driver binary and by tests that want
//! log output under `RUST_LOG`.

/// Maps a `-v` repeat count to a log level, matching the driver's verbosity
/// flag: unset is `Info`, one `-v` is `Debug`, two or more is `Trace`.
pub fn level_for_verbosity(verbosity: u8) -> log::LevelFilter {
    match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Initializes `env_logger` at the given verbosity, unless `RUST_LOG` is
/// already set in the environment (which always wins).
pub fn init(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(level_for_verbosity(verbosity));
    }
    let _ = builder.try_init();
}
