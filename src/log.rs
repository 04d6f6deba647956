use slog::{o, Discard, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, TermDecorator};

/// Terminal logger for embedders, tagged with the calling module. Hand it to
/// `Session::open_with_logger` or `Analysis::with_logger`.
pub fn create_logger(for_module: &str) -> Logger {
    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator)
        .use_utc_timestamp()
        .use_original_order()
        .build()
        .fuse();
    let async_drain = Async::new(drain).build().fuse();
    Logger::root(
        async_drain,
        o!("component" => "PPGCore", "module" => for_module.to_string()),
    )
}

/// Logger that drops every record; the default for library types.
pub fn silent_logger() -> Logger {
    Logger::root(Discard, o!())
}
