//! Input acquisition: prompt, read, history expansion, alias resolution.

use crate::command::ExitCode;
use crate::diag;
use crate::editor::{LineEditor, ReadOutcome};
use crate::prompt;
use crate::session::Shell;

/// What one read produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A line ready for evaluation, aliases already resolved.
    Line(String),
    Interrupted,
    EndOfSession,
}

/// Prompt for, read and expand one line.
///
/// A non-empty line is history-expanded (the expansion is echoed when it
/// changed anything), recorded in both histories and then alias-resolved.
/// An empty line comes back as `""` and is not recorded.
pub fn read_line(editor: &mut dyn LineEditor, shell: &mut Shell, last_status: ExitCode) -> Input {
    editor.set_alias_keys(shell.aliases.keys());
    let prompt = prompt::render(&shell.session, last_status);

    let raw = match editor.read(&prompt) {
        Ok(ReadOutcome::Line(raw)) => raw,
        Ok(ReadOutcome::Interrupted) => return Input::Interrupted,
        Ok(ReadOutcome::Eof) => return Input::EndOfSession,
        Err(err) => {
            diag::error(&shell.session, format!("{err:#}"));
            return Input::EndOfSession;
        }
    };
    if raw.is_empty() {
        return Input::Line(String::new());
    }

    let line = match shell.history.expand(&raw) {
        Ok(expansion) => {
            if expansion.changed {
                println!("{}", expansion.line);
            }
            expansion.line
        }
        Err(err) => {
            diag::error(&shell.session, err);
            raw
        }
    };

    editor.add_history(&line);
    shell.history.push(line.as_str());
    shell.session.history_entries += 1;

    Input::Line(shell.aliases.resolve(&line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use anyhow::Result;
    use std::collections::VecDeque;
    use std::path::Path;

    #[derive(Default)]
    struct Scripted {
        outcomes: VecDeque<ReadOutcome>,
        recorded: Vec<String>,
        prompts: Vec<String>,
        alias_keys: Vec<String>,
    }

    impl Scripted {
        fn lines(lines: &[&str]) -> Self {
            Self {
                outcomes: lines
                    .iter()
                    .map(|line| ReadOutcome::Line(line.to_string()))
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl LineEditor for Scripted {
        fn read(&mut self, prompt: &str) -> Result<ReadOutcome> {
            self.prompts.push(prompt.to_string());
            Ok(self.outcomes.pop_front().unwrap_or(ReadOutcome::Eof))
        }

        fn add_history(&mut self, line: &str) {
            self.recorded.push(line.to_string());
        }

        fn load_history(&mut self, _path: &Path) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn append_history(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }

        fn set_alias_keys(&mut self, keys: Vec<String>) {
            self.alias_keys = keys;
        }
    }

    fn shell() -> Shell {
        let mut session = Session::new();
        session.color = false;
        session.interactive = false;
        Shell::new(session)
    }

    #[test]
    fn lines_are_recorded_then_resolved() {
        let mut sh = shell();
        sh.aliases.define("ll", "ls -la").unwrap();
        let mut editor = Scripted::lines(&["ll /tmp"]);

        assert_eq!(read_line(&mut editor, &mut sh, 0), Input::Line("ls -la /tmp".into()));
        assert_eq!(editor.recorded, vec!["ll /tmp"]);
        assert_eq!(sh.history.entries(), ["ll /tmp".to_string()]);
        assert_eq!(sh.session.history_entries, 1);
        assert_eq!(editor.alias_keys, vec!["ll"]);
    }

    #[test]
    fn history_references_are_expanded_before_recording() {
        let mut sh = shell();
        sh.history.push("git status");
        let mut editor = Scripted::lines(&["sudo !!"]);

        assert_eq!(read_line(&mut editor, &mut sh, 0), Input::Line("sudo git status".into()));
        assert_eq!(editor.recorded, vec!["sudo git status"]);
    }

    #[test]
    fn failed_expansion_keeps_the_raw_line() {
        let mut sh = shell();
        let mut editor = Scripted::lines(&["echo !nothing"]);
        assert_eq!(read_line(&mut editor, &mut sh, 0), Input::Line("echo !nothing".into()));
        assert_eq!(sh.session.history_entries, 1);
    }

    #[test]
    fn only_empty_lines_skip_the_history() {
        let mut sh = shell();
        let mut editor = Scripted::lines(&["", "   "]);
        assert_eq!(read_line(&mut editor, &mut sh, 0), Input::Line(String::new()));
        assert!(editor.recorded.is_empty());
        assert_eq!(sh.session.history_entries, 0);

        assert_eq!(read_line(&mut editor, &mut sh, 0), Input::Line("   ".into()));
        assert_eq!(editor.recorded, vec!["   "]);
        assert_eq!(sh.session.history_entries, 1);
    }

    #[test]
    fn interrupts_and_end_of_input_pass_through() {
        let mut sh = shell();
        let mut editor = Scripted::default();
        editor.outcomes.push_back(ReadOutcome::Interrupted);
        assert_eq!(read_line(&mut editor, &mut sh, 0), Input::Interrupted);
        assert_eq!(read_line(&mut editor, &mut sh, 0), Input::EndOfSession);
        assert!(editor.recorded.is_empty());
    }

    #[test]
    fn non_interactive_sessions_get_an_empty_prompt() {
        let mut sh = shell();
        let mut editor = Scripted::lines(&["true"]);
        read_line(&mut editor, &mut sh, 7);
        assert_eq!(editor.prompts, vec![""]);
    }
}
