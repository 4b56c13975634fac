// Logging System for Skein
//
// This module sets up the `tracing` subscriber a host application uses to see
// pool diagnostics. The pool itself only emits events; nothing here is
// required for the pool to work.
//
// # Usage Examples
//
// ## Basic Initialization
//
// ```rust
// use skein::logging;
//
// // Initialize with default settings (INFO level, console output)
// logging::init_default();
//
// // Or initialize with custom settings
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// ## Environment Presets
//
// ```rust
// use skein::logging;
//
// // DEBUG level, file/line info, unit threads at TRACE
// logging::init_development();
//
// // INFO level, JSON lines, no file/line info
// logging::init_production();
// ```
//
// ## File Logging
//
// ```rust
// use skein::logging;
//
// let config = logging::LogConfig::default();
// logging::init_with_file(config, "/var/log/skein/pool.log").unwrap();
// ```
//
// ## Spans and Events
//
// Execution unit threads run inside a `unit_span!`, and each task attempt
// inside a `task_span!`, so events from handler code are attributed to the
// unit and task that produced them.

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the logging system
///
/// # Examples
///
/// ```rust
/// use skein::logging::LogConfig;
/// use tracing::Level;
///
/// let custom_config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     show_file_line: false,
///     show_thread_info: true,
///     show_time: true,
///     target_filters: Some("skein=debug,skein::thread::unit=trace".to_string()),
/// };
/// assert!(custom_config.json_format);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id; unit threads are named after their unit
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

/// Whether a global subscriber has been installed through this module.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            match filter.trim().parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(err) => eprintln!("Ignoring invalid log filter '{}': {}", filter, err),
            }
        }
    }

    env_filter
}

/// Initialize the logging system with the given configuration
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = match (config.json_format, config.show_time) {
            (true, _) => Box::new(registry.with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_thread_names(config.show_thread_info),
            )),
            (false, true) => Box::new(registry.with(
                fmt::layer()
                    .with_ansi(atty::is(atty::Stream::Stdout))
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_thread_names(config.show_thread_info)
                    .with_thread_ids(config.show_thread_info),
            )),
            (false, false) => Box::new(registry.with(
                fmt::layer()
                    .without_time()
                    .with_ansi(atty::is(atty::Stream::Stdout))
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_thread_names(config.show_thread_info)
                    .with_thread_ids(config.show_thread_info),
            )),
        };

        set_global_subscriber(subscriber);
    });
}

// Helper function to set the global subscriber
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open a log file in append mode, creating it if needed
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(Box::new(file))
}

/// Initialize logging with both console and file output
///
/// Console output respects the ansi color setting, while file output is
/// always plain. The file is opened up front so a bad path is reported to the
/// caller instead of being discovered on the first event.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    // Probe the path before committing the global subscriber
    file_writer(log_file)?;

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(std::io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// Initialize default logging: INFO level, human-readable console output
pub fn init_default() {
    init(LogConfig::default());
}

/// Initialize logging for development
///
/// - DEBUG level for the pool, TRACE for execution units
/// - Colorized console output with file/line information
/// - Thread names and IDs displayed
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("skein=debug,skein::thread::unit=trace".to_string()),
    });
}

/// Initialize logging for production
///
/// JSON lines for log aggregators, no file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Initialize logging for tests: warnings and errors only, compact output
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Create a span covering an execution unit thread
///
/// ```rust
/// let span = skein::unit_span!(3u64);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! unit_span {
    ($unit_id:expr) => {
        tracing::info_span!("unit", id = %$unit_id)
    };
    ($unit_id:expr, $($fields:tt)*) => {
        tracing::info_span!("unit", id = %$unit_id, $($fields)*)
    };
}

/// Create a span covering one attempt of a task on a unit
///
/// ```rust
/// let span = skein::task_span!("task-1", "resize", attempt = 2);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! task_span {
    ($task_id:expr, $task_type:expr) => {
        tracing::debug_span!("task", id = %$task_id, task_type = %$task_type)
    };
    ($task_id:expr, $task_type:expr, $($fields:tt)*) => {
        tracing::debug_span!("task", id = %$task_id, task_type = %$task_type, $($fields)*)
    };
}

/// Log execution unit lifecycle events
///
/// ```rust
/// skein::log_lifecycle!("unit-1", "started");
/// skein::log_lifecycle!("unit-1", "stopped", reason = "idle timeout");
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($unit:expr, $event:expr) => {
        tracing::info!(unit = %$unit, event = $event);
    };
    ($unit:expr, $event:expr, $($fields:tt)*) => {
        tracing::info!(unit = %$unit, event = $event, $($fields)*);
    };
}

/// Get the current tracing dispatcher
///
/// Execution unit threads are plain OS threads; they capture the dispatcher of
/// the thread that created them so events from handler code reach the same
/// subscriber even when no global default is installed.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}
