//! Tracing subscriber setup.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const MAX_MESSAGE_CHARS: usize = 280;

fn truncate_for_log(message: &str, max_chars: usize) -> (&str, bool) {
    match message.char_indices().nth(max_chars) {
        Some((byte_index, _character)) => (&message[..byte_index], true),
        None => (message, false),
    }
}

fn format_field(
    writer: &mut format::Writer<'_>,
    field: &tracing::field::Field,
    value: &dyn std::fmt::Debug,
) -> std::fmt::Result {
    let field_name = field.name();
    if field_name != "message" {
        return write!(writer, "{field_name}={value:?}");
    }

    let formatted = format!("{value:?}");
    let (truncated, was_truncated) = truncate_for_log(&formatted, MAX_MESSAGE_CHARS);
    if was_truncated {
        write!(writer, "{field_name}={truncated}...")
    } else {
        write!(writer, "{field_name}={formatted}")
    }
}

/// Install the global subscriber: compact console output, plus a daily
/// rolling file when `log_dir` is given.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// process lifetime.
pub fn init_tracing(debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console_layer = tracing_subscriber::fmt::layer()
        .fmt_fields(format::debug_fn(format_field))
        .compact();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "bugbot.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .fmt_fields(format::debug_fn(format_field))
                .compact();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_env_filter(debug))
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

/// `RUST_LOG` when set, else `info` (or `debug` with `--debug`).
fn build_env_filter(debug: bool) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::new("info")
        }
    })
}
