//! Line editing: the [`LineEditor`] seam and its `rustyline` implementation.

use crate::complete;
use anyhow::{Context, Result};
use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, Editor, Helper};
use std::path::Path;

/// Result of asking the user for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// The interrupt key was pressed; the partial line is discarded.
    Interrupted,
    /// End of input on an empty buffer.
    Eof,
}

/// Source of input lines plus the history the user navigates.
pub trait LineEditor {
    fn read(&mut self, prompt: &str) -> Result<ReadOutcome>;

    fn add_history(&mut self, line: &str);

    /// Load the history file and return its entries, oldest first.
    fn load_history(&mut self, path: &Path) -> Result<Vec<String>>;

    /// Append the entries added this session to the history file.
    fn append_history(&mut self, path: &Path) -> Result<()>;

    /// Refresh the alias names offered by completion.
    fn set_alias_keys(&mut self, _keys: Vec<String>) {}
}

/// Completion helper plugged into `rustyline`.
pub struct ShellHelper {
    alias_keys: Vec<String>,
    files: FilenameCompleter,
}

impl ShellHelper {
    pub fn new() -> Self {
        Self {
            alias_keys: Vec::new(),
            files: FilenameCompleter::new(),
        }
    }
}

impl Default for ShellHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Helper for ShellHelper {}
impl Validator for ShellHelper {}
impl Highlighter for ShellHelper {}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let pos = pos.min(line.len());
        let (start, words) = complete::complete(line, pos, &self.alias_keys);
        if words.is_empty() {
            return self.files.complete(line, pos, ctx);
        }
        let pairs = words
            .into_iter()
            .map(|word| Pair {
                display: word.clone(),
                replacement: format!("{word} "),
            })
            .collect();
        Ok((start, pairs))
    }
}

/// Entries the editor keeps in memory and in the history file.
pub const MAX_HISTORY_ENTRIES: usize = 1000;

/// [`LineEditor`] backed by a `rustyline` editor.
pub struct RustylineEditor {
    editor: Editor<ShellHelper, DefaultHistory>,
}

impl RustylineEditor {
    pub fn new() -> Result<Self> {
        let config = Config::builder()
            .completion_type(CompletionType::List)
            .auto_add_history(false)
            .history_ignore_dups(false)
            .and_then(|builder| builder.max_history_size(MAX_HISTORY_ENTRIES))
            .context("cannot configure line editor")?
            .build();
        let mut editor = Editor::with_config(config).context("cannot initialize line editor")?;
        editor.set_helper(Some(ShellHelper::new()));
        Ok(Self { editor })
    }
}

impl LineEditor for RustylineEditor {
    fn read(&mut self, prompt: &str) -> Result<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(err).context("cannot read input"),
        }
    }

    fn add_history(&mut self, line: &str) {
        if let Err(err) = self.editor.add_history_entry(line) {
            tracing::debug!("history entry not recorded: {err}");
        }
    }

    fn load_history(&mut self, path: &Path) -> Result<Vec<String>> {
        self.editor
            .load_history(path)
            .with_context(|| format!("cannot load history from {}", path.display()))?;
        Ok(self.editor.history().iter().cloned().collect())
    }

    fn append_history(&mut self, path: &Path) -> Result<()> {
        self.editor
            .append_history(path)
            .with_context(|| format!("cannot append history to {}", path.display()))
    }

    fn set_alias_keys(&mut self, keys: Vec<String>) {
        if let Some(helper) = self.editor.helper_mut() {
            helper.alias_keys = keys;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lines_survive_a_history_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(".jsh_history");

        let mut editor = RustylineEditor::new().unwrap();
        for line in ["ls", "ls", "make", "ls"] {
            editor.add_history(line);
        }
        editor.append_history(&path).unwrap();

        let mut reloaded = RustylineEditor::new().unwrap();
        assert_eq!(reloaded.load_history(&path).unwrap(), vec!["ls", "ls", "make", "ls"]);
    }
}
