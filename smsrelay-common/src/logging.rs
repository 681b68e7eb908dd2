//! Structured logging.
//!
//! The source this project generalizes from had one convenience macro per
//! log category (`outgoing!`, `incoming!`, `internal!`), each a thin wrapper
//! hardcoding its category as a tracing span name. That is an open-class
//! extension of the logger and gets harder to grep and filter on as
//! categories grow. Here there is exactly one macro, [`log_event`], and it
//! takes a [`Category`] as a required first argument, recorded as a
//! structured field rather than baked into the call site's name.

use chrono::Utc;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    filter::FilterFn, fmt::time::FormatTime, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt, Layer,
};

/// The set of components that may emit a log line. Required, not inferred,
/// so every call site is self-describing when read out of context (e.g. in
/// a log aggregator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Control,
    Dispatch,
    Health,
    Maintenance,
    Metrics,
    Queue,
    Retry,
    Scheduler,
    Store,
}

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Dispatch => "dispatch",
            Self::Health => "health",
            Self::Maintenance => "maintenance",
            Self::Metrics => "metrics",
            Self::Queue => "queue",
            Self::Retry => "retry",
            Self::Scheduler => "scheduler",
            Self::Store => "store",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emit a structured log line tagged with a required [`Category`].
///
/// ```ignore
/// log_event!(Category::Dispatch, Level::INFO, "claimed message"; message_id = %id);
/// ```
#[macro_export]
macro_rules! log_event {
    ($category:expr, $level:expr, $msg:expr) => {
        $crate::tracing::event!($level, category = %$category, $msg)
    };
    ($category:expr, $level:expr, $msg:expr; $($field:tt)+) => {
        $crate::tracing::event!($level, category = %$category, $($field)+, $msg)
    };
}

pub use tracing;

struct MicrosTime;

impl FormatTime for MicrosTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        w.write_fmt(format_args!("{}", Utc::now().timestamp_micros()))
    }
}

/// Initialise the global tracing subscriber.
///
/// Level is sourced from `LOG_LEVEL` (falling back to `RUST_LOG` semantics
/// only in that one env var, not a full `EnvFilter`, to keep the single
/// call site simple), then a debug/release default.
pub fn init() {
    init_with_level(std::env::var("LOG_LEVEL").ok().as_deref());
}

/// As [`init`], but takes the level directly instead of reading
/// `LOG_LEVEL`. The composition root uses this to apply the `log_level`
/// config field without touching process environment from async context.
pub fn init_with_level(level: Option<&str>) {
    let level = level.map_or_else(
        || {
            if cfg!(debug_assertions) {
                LevelFilter::TRACE
            } else {
                LevelFilter::INFO
            }
        },
        |level| match level.to_ascii_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "warn" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            _ => LevelFilter::INFO,
        },
    );

    tracing_subscriber::Registry::default()
        .with(
            (if cfg!(debug_assertions) {
                tracing_subscriber::fmt::layer()
            } else {
                tracing_subscriber::fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
            })
            .compact()
            .with_ansi(true)
            .with_timer(MicrosTime)
            .with_target(false)
            .with_filter(level)
            .with_filter(FilterFn::new(|metadata| {
                metadata.target().starts_with("smsrelay")
            })),
        )
        .init();
}
