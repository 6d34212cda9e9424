//! Logging setup for binaries and examples.
//!
//! [`init_with_level`] installs a stderr logger printing
//! `[elapsed LEVEL] module: message`. Records from the `planar_kinematics*`
//! crates pass at the requested level; other crates (the corner detector,
//! image decoders) only at `Warn` or above unless the level is `Trace`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const CRATE_PREFIX: &str = "planar_kinematics";

/// Default `tracing` directives when `RUST_LOG` is unset.
#[cfg(feature = "tracing")]
const DEFAULT_DIRECTIVES: &str = "warn,planar_kinematics=info";

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    fn passes(&self, level: Level, target: &str) -> bool {
        if target.starts_with(CRATE_PREFIX) || self.level == LevelFilter::Trace {
            level <= self.level
        } else {
            level <= self.level.min(LevelFilter::Warn)
        }
    }
}

/// `planar_kinematics_motion::scan` -> `motion::scan`.
fn short_target(target: &str) -> &str {
    target
        .strip_prefix(CRATE_PREFIX)
        .map(|rest| rest.trim_start_matches(['_', ':']))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(target)
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.passes(metadata.level(), metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{elapsed:8.3}s {:>5}] {}: {}",
            record.level(),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger. Later calls keep the first logger.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`, falling back to
/// `info` for the workspace crates and `warn` elsewhere. Span closings are
/// reported so instrumented stages show their duration.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
