//! Per-talk log capture.
//!
//! Any span opened with a `log_file` field gets its own log file: every
//! event emitted inside that span (at or above the layer's level) is
//! appended to the file. The handle lives in the span's extensions and is
//! closed when the span closes, so concurrent talks each write to their own
//! `processing.log` without any global handler list.
//!
//! Work handed to blocking or rayon threads must carry the span along with
//! [`TraceContext`], otherwise its events never reach the talk's file.

use std::fmt::{self, Write as _};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::{span, Dispatch, Event, Level, Span, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// Span field naming the file the span's events are copied to
pub const LOG_FILE_FIELD: &str = "log_file";

struct SpanLogFile {
    file: Mutex<File>,
}

pub struct TalkLogLayer {
    max_level: Level,
}

impl TalkLogLayer {
    pub fn new() -> Self {
        Self { max_level: Level::INFO }
    }

    /// Capture events up to and including `level` in verbosity
    pub fn with_level(level: Level) -> Self {
        Self { max_level: level }
    }
}

impl Default for TalkLogLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for TalkLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = LogFileVisitor::default();
        attrs.record(&mut visitor);
        let Some(path) = visitor.path else {
            return;
        };

        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                if let Some(span) = ctx.span(id) {
                    span.extensions_mut().insert(SpanLogFile { file: Mutex::new(file) });
                }
            }
            // Logging about logging would recurse into this layer
            Err(e) => eprintln!("Failed to open log file {}: {}", path, e),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > self.max_level {
            return;
        }
        let Some(scope) = ctx.event_scope(event) else {
            return;
        };

        for span in scope {
            let extensions = span.extensions();
            let Some(log) = extensions.get::<SpanLogFile>() else {
                continue;
            };

            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);
            let line = format!(
                "{} - {} - {}{}\n",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                level,
                visitor.message,
                visitor.fields
            );

            if let Ok(mut file) = log.file.lock() {
                let _ = file.write_all(line.as_bytes());
            }
            // Innermost log file only
            break;
        }
    }
}

/// The subscriber and span active where work was handed off
#[derive(Clone)]
pub struct TraceContext {
    dispatch: Dispatch,
    span: Span,
}

impl TraceContext {
    pub fn current() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
            span: Span::current(),
        }
    }

    /// Run `f` as if it were still inside the captured span
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }
}

/// `tokio::task::spawn_blocking` that keeps the caller's span
pub fn spawn_blocking_traced<F, R>(f: F) -> tokio::task::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let context = TraceContext::current();
    tokio::task::spawn_blocking(move || context.in_scope(f))
}

#[derive(Default)]
struct LogFileVisitor {
    path: Option<String>,
}

impl Visit for LogFileVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == LOG_FILE_FIELD {
            self.path = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == LOG_FILE_FIELD {
            self.path = Some(format!("{:?}", value));
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
