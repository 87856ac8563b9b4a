//! Tab-completion: deciding which candidates fit the cursor position.
//!
//! The word under the cursor is classified first (command name, argument or
//! redirection target, together with the words before it). The
//! classification picks an ordered list of candidate sources; the first
//! source that produces any match wins. When none does, the line editor
//! falls back to file names.

use crate::builtin;
use crate::lexer::{self, TokenKind};
use std::process::{Command, Stdio};

/// Commands offered in command position when neither a built-in nor an alias matches.
pub const WIDELY_USED_COMMANDS: &[&str] = &[
    "git", "cat", "grep", "ls", "exit", "sudo", "kill", "killall", "links", "find", "clear",
    "chmod", "echo", "make", "poweroff", "reboot", "pacman", "aptitude", "apt-cache", "apt-get",
    "man", "nano", "vi", "gcc", "jsh", "zsh", "bash",
];

pub const GIT_SUBCOMMANDS: &[&str] = &[
    "add", "bisect", "branch", "checkout", "clone", "commit", "diff", "fetch", "grep", "init",
    "log", "merge", "mv", "pull", "push", "rebase", "reset", "rm", "show", "status", "tag",
];

pub const APT_SUBCOMMANDS: &[&str] = &[
    "list", "search", "show", "install", "remove", "edit-sources", "update", "upgrade",
    "full-upgrade",
];

/// Command-line flags of the shell itself.
pub const SHELL_FLAGS: &[&str] = &[
    "--nodebug", "--debug", "--color", "--nocolor", "--norc", "--license", "--version", "--help",
];

pub const TOGGLE_VALUES: &[&str] = &["on", "off"];

/// Characters that end a word for completion purposes, besides whitespace.
const WORD_BREAKS: &[char] = &['|', '&', ';', '<', '>'];

/// Role of the word being completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Command,
    Argument,
    RedirectTarget,
}

/// Where the cursor word sits, with the words of its command that precede it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    pub position: Position,
    pub preceding: Vec<String>,
}

/// Byte offset where the word ending at `pos` starts.
pub fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .char_indices()
        .rev()
        .find(|&(_, c)| c.is_whitespace() || WORD_BREAKS.contains(&c))
        .map_or(0, |(index, c)| index + c.len_utf8())
}

/// Classify the word following `before` (the text left of the cursor word).
///
/// Text that does not lex, such as an open quote, is treated as an argument
/// with unknown context.
pub fn classify(before: &str) -> CompletionContext {
    let Ok(tokens) = lexer::split_into_tokens(before) else {
        return CompletionContext {
            position: Position::Argument,
            preceding: Vec::new(),
        };
    };

    let mut preceding = Vec::new();
    let mut redirect_pending = false;
    for token in tokens {
        match token.kind {
            kind if kind.is_separator() => {
                preceding.clear();
                redirect_pending = false;
            }
            kind if kind.is_redirect() => redirect_pending = true,
            TokenKind::Word(word) => {
                if !std::mem::take(&mut redirect_pending) {
                    preceding.push(word);
                }
            }
            _ => {}
        }
    }

    let position = if redirect_pending {
        Position::RedirectTarget
    } else if preceding.is_empty() {
        Position::Command
    } else {
        Position::Argument
    };
    CompletionContext {
        position,
        preceding,
    }
}

/// A set of completion candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource<'a> {
    /// Built-in command names, except the empty one.
    Builtins,
    Aliases(&'a [String]),
    Fixed(&'static [&'static str]),
    /// Local branches of the git repository in the current directory.
    GitBranches,
}

impl CandidateSource<'_> {
    fn candidates(&self) -> Vec<String> {
        match self {
            CandidateSource::Builtins => builtin::names()
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect(),
            CandidateSource::Aliases(keys) => keys.to_vec(),
            CandidateSource::Fixed(words) => words.iter().map(|w| w.to_string()).collect(),
            CandidateSource::GitBranches => git_branches(),
        }
    }
}

/// Ordered sources to try for `context`.
pub fn sources_for<'a>(
    context: &CompletionContext,
    alias_keys: &'a [String],
) -> Vec<CandidateSource<'a>> {
    match context.position {
        Position::Command => vec![
            CandidateSource::Builtins,
            CandidateSource::Aliases(alias_keys),
            CandidateSource::Fixed(WIDELY_USED_COMMANDS),
        ],
        Position::RedirectTarget => Vec::new(),
        Position::Argument => {
            let words: Vec<&str> = context.preceding.iter().map(String::as_str).collect();
            match words.as_slice() {
                ["git"] => vec![CandidateSource::Fixed(GIT_SUBCOMMANDS)],
                ["git", "checkout" | "branch" | "merge"] => vec![CandidateSource::GitBranches],
                ["jsh"] => vec![CandidateSource::Fixed(SHELL_FLAGS)],
                ["debug" | "color"] => vec![CandidateSource::Fixed(TOGGLE_VALUES)],
                ["apt"] => vec![CandidateSource::Fixed(APT_SUBCOMMANDS)],
                _ => Vec::new(),
            }
        }
    }
}

/// Restartable sequence of the candidates of one source that start with a prefix.
///
/// [`Generator::reset`] computes the whole filtered set once; iteration then
/// hands out one match at a time, in source order.
#[derive(Debug)]
pub struct Generator<'a> {
    source: CandidateSource<'a>,
    matches: Vec<String>,
    next: usize,
}

impl<'a> Generator<'a> {
    pub fn new(source: CandidateSource<'a>) -> Self {
        Self {
            source,
            matches: Vec::new(),
            next: 0,
        }
    }

    pub fn reset(&mut self, prefix: &str) {
        self.matches = self
            .source
            .candidates()
            .into_iter()
            .filter(|candidate| candidate.starts_with(prefix))
            .collect();
        self.next = 0;
    }
}

impl Iterator for Generator<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let candidate = self.matches.get(self.next)?.clone();
        self.next += 1;
        Some(candidate)
    }
}

/// Complete the word ending at byte `pos` of `line`.
///
/// Returns the start of that word and the matches of the first source that
/// has any. An empty list means no source applies.
pub fn complete(line: &str, pos: usize, alias_keys: &[String]) -> (usize, Vec<String>) {
    let start = word_start(line, pos);
    let prefix = &line[start..pos];
    let context = classify(&line[..start]);

    for source in sources_for(&context, alias_keys) {
        let mut generator = Generator::new(source);
        generator.reset(prefix);
        let matches: Vec<String> = generator.collect();
        if !matches.is_empty() {
            return (start, matches);
        }
    }
    (start, Vec::new())
}

/// Branch names out of `git branch` output.
pub fn parse_branch_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(|line| line.replace([' ', '*'], ""))
        .filter(|name| !name.is_empty())
        .collect()
}

fn git_branches() -> Vec<String> {
    let in_repository = Command::new("git")
        .args(["rev-parse", "--git-dir"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success());
    if !in_repository {
        return Vec::new();
    }

    match Command::new("git")
        .args(["branch", "--no-color"])
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => parse_branch_listing(&String::from_utf8_lossy(&output.stdout)),
        Err(err) => {
            tracing::debug!("listing git branches: {err}");
            Vec::new()
        }
    }
}
