//! Logging setup shared by the eNB binary and the tests.
//!
//! Log lines are laid out in columns: level, subframe, UE, source location, message.
//! Events carry the subframe as a `ts` field and the UE as an optional `rnti` field, e.g.
//! `tracing::debug!(ts = %now, rnti = %rnti, "granted")`; both are lifted out of the message
//! into their own columns.

use core::fmt;
use core::fmt::Write as _;
use std::fs::OpenOptions;
use std::sync::Once;

use tracing::field::{Field, Visit};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, fmt as tracingfmt};

/// if `cond` is false, logs a warning with your message.
#[macro_export]
macro_rules! assert_warn {
    ($cond:expr, $($arg:tt)+) => {{
        if !$cond {
            tracing::warn!(
                target: module_path!(),
                "assertion warning: `{}` failed: {} at {}:{}",
                stringify!($cond),
                format_args!($($arg)+),
                file!(),
                line!(),
            );
        }
    }};
}

/// Column at which the message starts
const MESSAGE_COLUMN: usize = 64;

/// Splits an event into the columns printed by `ColumnFormatter`
#[derive(Default)]
struct ColumnVisitor {
    message: String,
    ts: Option<String>,
    rnti: Option<String>,
    /// Remaining fields as `key=value`
    extra: String,
}

impl Visit for ColumnVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            "ts" => self.ts = Some(format!("{:?}", value)),
            "rnti" => self.rnti = Some(format!("{:?}", value)),
            name => {
                let _ = write!(self.extra, " {}={:?}", name, value);
            }
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            _ => self.record_debug(field, &value),
        }
    }
}

/// Shortens a source path to `[crate/module] file`.
/// "crates/nbiot-entities/src/mac/subcomp/harq.rs" becomes "[entities/mac] harq.rs".
fn short_location(file_path: &str) -> String {
    let Some(src_idx) = file_path.find("/src/") else {
        return file_path.to_string();
    };
    let crate_dir = file_path[..src_idx].rsplit('/').next().unwrap_or("");
    let crate_name = crate_dir.strip_prefix("nbiot-").unwrap_or(crate_dir);
    let in_src = &file_path[src_idx + 5..];

    match in_src.rsplit_once('/') {
        Some((modules, filename)) => {
            let top = modules.split('/').next().unwrap_or(modules);
            format!("[{}/{}] {}", crate_name, top, filename)
        }
        None => format!("[{}] {}", crate_name, in_src),
    }
}

fn level_color(level: &tracing::Level) -> &'static str {
    match *level {
        tracing::Level::ERROR => "\x1b[31m",
        tracing::Level::WARN => "\x1b[33m",
        tracing::Level::INFO => "\x1b[32m",
        tracing::Level::DEBUG => "\x1b[34m",
        tracing::Level::TRACE => "\x1b[35m",
    }
}

struct ColumnFormatter;

impl<S, N> FormatEvent<S, N> for ColumnFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let mut fields = ColumnVisitor::default();
        event.record(&mut fields);

        let level = if writer.has_ansi_escapes() {
            format!("{}{:<5}\x1b[0m", level_color(metadata.level()), metadata.level())
        } else {
            format!("{:<5}", metadata.level())
        };
        let prefix = format!(
            "{} {:>11} {:>6} {}:{}:",
            level,
            fields.ts.as_deref().unwrap_or(""),
            fields.rnti.as_deref().unwrap_or(""),
            short_location(metadata.file().unwrap_or("unknown")),
            metadata.line().unwrap_or(0),
        );
        writeln!(writer, "{:<width$} {}{}", prefix, fields.message, fields.extra, width = MESSAGE_COLUMN)
    }
}

static INIT_LOG: Once = Once::new();

/// Sets up logging with maximum verbosity (trace level)
/// Mainly for unit tests
pub fn setup_logging_verbose() {
    setup_logging(EnvFilter::new("trace"), None);
}

/// Sets up default logging to stdout and optionally, a verbose log file
/// Returns a guard, that needs to be kept alive for logging to file to work
pub fn setup_logging_default(verbose_logfile: Option<String>) -> Option<WorkerGuard> {
    let logfile_and_filter = verbose_logfile.map(|file| (file, get_default_logfile_filter()));
    setup_logging(get_default_stdout_filter(), logfile_and_filter)
}

pub fn get_default_filter() -> EnvFilter {
    EnvFilter::new("info")
}

pub fn get_default_stdout_filter() -> EnvFilter {
    let directives = [
        // One line per subframe otherwise
        "nbiot_entities::messagerouter=warn",
        "nbiot_entities::event_queue=warn",

        // Per-grant decisions are debug, keep them off the console
        "nbiot_entities::mac::subcomp::sched=info",
        "nbiot_entities::mac::subcomp::harq=info",
        "nbiot_entities::mac::enb_mac=info",
    ];

    directives.iter()
        .filter_map(|d| d.parse().ok())
        .fold(get_default_filter(), |filter, d| filter.add_directive(d))
}

fn get_default_logfile_filter() -> EnvFilter {
    EnvFilter::new("debug")
}

/// Installs the global subscriber once. Later calls only open the requested log file, so the
/// returned guard is Some whenever a file was asked for and could be opened.
fn setup_logging(stdout_filter: EnvFilter, outfile: Option<(String, EnvFilter)>) -> Option<WorkerGuard> {
    let file_writer = match outfile {
        Some((path, filter)) => match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some((tracing_appender::non_blocking(file), filter)),
            Err(e) => {
                eprintln!("Failed to open log file {}: {}, logging to stdout only", path, e);
                None
            }
        },
        None => None,
    };

    let (file_layer, guard) = match file_writer {
        Some(((writer, guard), filter)) => {
            let layer = tracingfmt::layer()
                .event_format(ColumnFormatter)
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    INIT_LOG.call_once(|| {
        let stdout_layer = tracingfmt::layer()
            .event_format(ColumnFormatter)
            .with_filter(stdout_filter);
        tracing_subscriber::registry()
            .with(file_layer)
            .with(stdout_layer)
            .init();
    });
    guard
}
