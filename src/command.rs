use crate::lexer::{self, TokenKind};
use std::path::Path;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

pub const SUCCESS: ExitCode = 0;
pub const FAILURE: ExitCode = 1;
/// Status reported for a command that could not be found on `PATH`.
pub const NOT_FOUND: ExitCode = 127;
/// Status carried into the next cycle after a read or execution was cancelled.
pub const INTERRUPTED: ExitCode = -1;

/// What the read-eval loop does after a line has been evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading input; the code becomes the "last status".
    Continue(ExitCode),
    /// Stop the session right away with the given code.
    Exit(ExitCode),
}

impl Flow {
    pub fn status(self) -> ExitCode {
        match self {
            Flow::Continue(code) | Flow::Exit(code) => code,
        }
    }
}

/// A parsed simple command: the command name followed by its arguments.
///
/// Records are immutable once built. A blank line produces a record whose only
/// token is the empty name, which the registry maps to a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    argv: Vec<String>,
}

impl CommandRecord {
    pub fn new(mut argv: Vec<String>) -> Self {
        if argv.is_empty() {
            argv.push(String::new());
        }
        Self { argv }
    }

    /// Build a record from a line made only of words.
    ///
    /// Returns `None` when the line does not lex or contains operators or
    /// redirections; such lines belong to the executor.
    pub fn parse_simple(line: &str, home: &Path) -> Option<Self> {
        let tokens = lexer::split_into_tokens(line).ok()?;
        let mut argv = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token.kind {
                TokenKind::Word(word) => argv.push(expand_tilde(word, home)),
                _ => return None,
            }
        }
        Some(Self::new(argv))
    }

    pub fn name(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments after the command name.
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// Number of tokens, command name included.
    pub fn len(&self) -> usize {
        self.argv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.argv.len() == 1 && self.argv[0].is_empty()
    }
}

/// Replace a leading `~` (alone or followed by `/`) with the home directory.
pub fn expand_tilde(word: String, home: &Path) -> String {
    if word == "~" {
        return home.to_string_lossy().into_owned();
    }
    match word.strip_prefix("~/") {
        Some(rest) => home.join(rest).to_string_lossy().into_owned(),
        None => word,
    }
}
