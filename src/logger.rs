use model::config::LogLevel;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::fmt::{MakeWriter, Subscriber};
use tracing_subscriber::util::SubscriberInitExt;

/// One JSON object per event, without timestamps.
pub(crate) type JsonSubscriber<W> = Subscriber<JsonFields, Format<Json, ()>, LevelFilter, W>;

/// Install the JSON stdout subscriber at the configured verbosity.
/// Must only be called once, at cold start.
pub(crate) fn init(level: LogLevel) {
    json_subscriber(level, std::io::stdout).init();
}

pub(crate) fn json_subscriber<W>(level: LogLevel, writer: W) -> JsonSubscriber<W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .json()
        .with_max_level(level_filter(level))
        .with_target(false)
        // CloudWatch stamps every line already
        .without_time()
        .with_writer(writer)
        .finish()
}

pub(crate) fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warning => LevelFilter::WARN,
        // tracing has nothing above error
        LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
    }
}
