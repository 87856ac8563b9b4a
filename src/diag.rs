//! Diagnostics: user-facing messages and the debug log.
//!
//! Errors and notices meant for the user go to stderr, colored when the
//! session's color flag is on. Debug notices go through `tracing`; the level
//! filter sits in a reload layer so `debug on` / `debug off` take effect at
//! runtime.

use crate::session::Session;
use std::fmt::Display;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Registry, fmt, reload};

const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Report an error to the user.
pub fn error(session: &Session, message: impl Display) {
    if session.color {
        eprintln!("{RED}jsh: {message}{RESET}");
    } else {
        eprintln!("jsh: {message}");
    }
}

/// Report an informational notice to the user.
pub fn info(session: &Session, message: impl Display) {
    if session.color {
        eprintln!("{CYAN}jsh: {message}{RESET}");
    } else {
        eprintln!("jsh: {message}");
    }
}

/// Handle on the global subscriber's level filter.
pub struct LogControl {
    handle: reload::Handle<LevelFilter, Registry>,
}

impl LogControl {
    /// Install the global subscriber. Returns `None` if one is already set.
    pub fn init(debug: bool, color: bool) -> Option<Self> {
        let (filter, handle) = reload::Layer::new(level(debug));
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .without_time()
                    .with_target(false)
                    .with_ansi(color),
            )
            .try_init()
            .ok()?;
        Some(Self { handle })
    }

    pub fn set_debug(&self, on: bool) {
        if let Err(err) = self.handle.modify(|filter| *filter = level(on)) {
            eprintln!("jsh: cannot switch debug output: {err}");
        }
    }
}

fn level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    }
}
