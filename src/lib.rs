//! jsh, a small interactive shell.
//!
//! The crate is built around a cooperative read-eval loop ([`Repl`]): every
//! cycle renders a `%`-template prompt, reads a line through a
//! [`LineEditor`], expands history references and aliases, then either
//! dispatches one of the fixed built-in commands or hands the line to an
//! [`Executor`] that runs pipelines of external programs.
//!
//! Interrupts never unwind: the SIGINT handler only marks a [`CancelToken`],
//! which the loop and long-running built-ins poll at their yield points.

pub mod alias;
pub mod builtin;
pub mod command;
pub mod complete;
pub mod diag;
pub mod editor;
pub mod exec;
pub mod history;
pub mod input;
pub mod lexer;
pub mod parser;
pub mod prompt;
pub mod repl;
pub mod script;
pub mod session;
pub mod signal;

pub use command::{CommandRecord, ExitCode, Flow};
pub use editor::{LineEditor, ReadOutcome, RustylineEditor};
pub use exec::{Executor, ProcessExecutor};
pub use repl::Repl;
pub use session::{Session, Shell};
pub use signal::CancelToken;

/// Serializes tests that change the process' working directory.
#[cfg(test)]
pub(crate) fn lock_current_dir() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
