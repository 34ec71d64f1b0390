use hornsync_config::LogLevel;
use hornsync_config::LoggingConfig;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

/// Default level plus per-target overrides.
pub fn targets(config: &LoggingConfig) -> Targets {
    config
        .overrides
        .iter()
        .fold(
            Targets::new().with_default(level_filter(config.level)),
            |targets, (target, level)| targets.with_target(target.clone(), level_filter(*level)),
        )
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(targets(config))
        .init();
}
