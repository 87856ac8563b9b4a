//! Built-in commands and their dispatcher.
//!
//! Built-ins run in-process. The set is fixed at compile time: the
//! [`builtins!`] list below generates both the [`Builtin`] enumeration and the
//! sorted [`REGISTRY`] used for lookup, so the two cannot drift apart.

use crate::command::{CommandRecord, ExitCode, FAILURE, Flow, INTERRUPTED, SUCCESS};
use crate::diag;
use crate::exec::Executor;
use crate::script::{self, StreamEnd};
use crate::session::{Session, Shell};
use crate::signal::CancelToken;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;

macro_rules! builtins {
    ($($name:literal => $variant:ident : $usage:literal),+ $(,)?) => {
        /// Behavior of a built-in command, one variant per registered name.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $($variant),+
        }

        /// Every built-in name with its behavior, sorted by name.
        pub const REGISTRY: &[(&str, Builtin)] = &[$(($name, Builtin::$variant)),+];

        impl Builtin {
            /// Canonical name of the command, e.g. "cd" or "prompt".
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name),+
                }
            }

            /// One-line synopsis printed on a usage error.
            pub fn usage(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $usage),+
                }
            }
        }
    };
}

builtins! {
    "" => Empty: "",
    "alias" => Alias: "alias [NAME VALUE]",
    "cd" => Cd: "cd [DIR]",
    "color" => ColorMode: "color on|off",
    "debug" => DebugMode: "debug on|off",
    "exit" => Exit: "exit",
    "false" => False: "false",
    "history" => History: "history",
    "prompt" => Prompt: "prompt TEMPLATE [MAX_DIR_LENGTH]",
    "shcat" => Shcat: "shcat",
    "source" => Source: "source FILE",
    "true" => True: "true",
    "unalias" => Unalias: "unalias NAME",
}

/// Find the built-in registered under `name`.
pub fn lookup(name: &str) -> Option<Builtin> {
    REGISTRY
        .binary_search_by(|(probe, _)| (*probe).cmp(name))
        .ok()
        .map(|index| REGISTRY[index].1)
}

/// Registered names in order, the empty name included.
pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

/// A built-in was called with arguments it does not accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("usage: {0}")]
pub struct UsageError(pub &'static str);

/// Standard streams handed to a built-in.
pub struct Io<'a> {
    pub stdin: &'a mut dyn BufRead,
    pub stdout: &'a mut dyn Write,
}

/// Run `builtin` with the arguments of `record`.
///
/// Errors never escape: they are reported on stderr and turned into a
/// failure status. A failing built-in leaves the session untouched.
pub fn dispatch(
    builtin: Builtin,
    record: &CommandRecord,
    shell: &mut Shell,
    executor: &mut dyn Executor,
    io: &mut Io<'_>,
) -> Flow {
    tracing::debug!("built-in {:?} with {:?}", builtin.name(), record.args());
    match run(builtin, record.args(), shell, executor, io) {
        Ok(flow) => flow,
        Err(err) => {
            diag::error(&shell.session, format!("{err:#}"));
            Flow::Continue(FAILURE)
        }
    }
}

fn run(
    builtin: Builtin,
    args: &[String],
    shell: &mut Shell,
    executor: &mut dyn Executor,
    io: &mut Io<'_>,
) -> Result<Flow> {
    let usage = || UsageError(builtin.usage());
    let no_args = || if args.is_empty() { Ok(()) } else { Err(usage()) };

    let status = match builtin {
        Builtin::Empty => SUCCESS,
        Builtin::True => {
            no_args()?;
            SUCCESS
        }
        Builtin::False => {
            no_args()?;
            FAILURE
        }
        Builtin::Exit => {
            no_args()?;
            return Ok(Flow::Exit(SUCCESS));
        }
        Builtin::Alias => {
            match args {
                [] => shell.aliases.write_all(io.stdout)?,
                [key, value] => shell.aliases.define(key, value).context("alias")?,
                _ => return Err(usage().into()),
            }
            SUCCESS
        }
        Builtin::Unalias => {
            let [key] = args else {
                return Err(usage().into());
            };
            shell.aliases.remove(key).context("unalias")?;
            SUCCESS
        }
        Builtin::Cd => {
            if args.len() > 1 {
                return Err(usage().into());
            }
            change_dir(&mut shell.session, args.first())?;
            SUCCESS
        }
        Builtin::ColorMode => {
            shell.session.color = toggle(args).ok_or_else(usage)?;
            SUCCESS
        }
        Builtin::DebugMode => {
            let on = toggle(args).ok_or_else(usage)?;
            shell.session.set_debug(on);
            SUCCESS
        }
        Builtin::History => {
            no_args()?;
            for (index, entry) in shell.history.entries().iter().enumerate() {
                writeln!(io.stdout, "{:5}  {entry}", index + 1)?;
            }
            SUCCESS
        }
        Builtin::Prompt => {
            match args {
                [template] => shell.session.set_prompt(template.as_str()),
                [template, bound] => {
                    let bound = usize::try_from(leading_int(bound).unsigned_abs())
                        .unwrap_or(usize::MAX);
                    shell.session.set_prompt(template.as_str());
                    shell.session.max_dir_length = bound;
                }
                _ => return Err(usage().into()),
            }
            SUCCESS
        }
        Builtin::Shcat => shcat(io, &shell.session.signals)?,
        Builtin::Source => {
            let [path] = args else {
                return Err(usage().into());
            };
            match script::source_file(&PathBuf::from(path), true, shell, executor) {
                Ok(Flow::Exit(code)) => return Ok(Flow::Exit(code)),
                Ok(Flow::Continue(_)) => {}
                Err(err) => diag::error(&shell.session, format!("source: {err:#}")),
            }
            SUCCESS
        }
    };
    Ok(Flow::Continue(status))
}

fn toggle(args: &[String]) -> Option<bool> {
    match args {
        [value] if value == "on" => Some(true),
        [value] if value == "off" => Some(false),
        _ => None,
    }
}

/// Leading decimal integer of `text`, ignoring leading whitespace; 0 if there is none.
fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(i64::from(digit - b'0'))
        });
    if negative { -value } else { value }
}

fn change_dir(session: &mut Session, target: Option<&String>) -> Result<()> {
    let target = match target {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => session.home.clone(),
    };
    let previous = std::env::current_dir().ok();

    std::env::set_current_dir(&target)
        .with_context(|| format!("cd: {}", target.display()))?;

    if let Some(previous) = previous {
        session.set_var("OLDPWD", previous.to_string_lossy());
    }
    let current = std::env::current_dir().unwrap_or(target);
    session.set_var("PWD", current.to_string_lossy());
    Ok(())
}

/// Copy standard input to standard output line by line.
fn shcat(io: &mut Io<'_>, signals: &CancelToken) -> Result<ExitCode> {
    let stdout = &mut *io.stdout;
    let end = script::parse_stream(&mut *io.stdin, signals, |line| {
        stdout.write_all(line.as_bytes())?;
        stdout.flush()?;
        Ok(ControlFlow::Continue(()))
    })
    .context("shcat")?;
    Ok(match end {
        StreamEnd::Interrupted => INTERRUPTED,
        StreamEnd::Finished | StreamEnd::Stopped(_) => SUCCESS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock_current_dir;
    use crate::session::DEFAULT_PROMPT;
    use std::env as stdenv;
    use std::fs;
    use std::io::Cursor;

    /// Records the lines it is asked to run.
    #[derive(Default)]
    struct Recorder {
        lines: Vec<String>,
    }

    impl Executor for Recorder {
        fn execute(&mut self, line: &str, _shell: &mut Shell) -> Flow {
            self.lines.push(line.to_string());
            match line {
                "exit" => Flow::Exit(SUCCESS),
                _ => Flow::Continue(SUCCESS),
            }
        }
    }

    fn shell() -> Shell {
        let mut session = Session::new();
        session.color = false;
        session.debug = false;
        Shell::new(session)
    }

    fn call_with(
        shell: &mut Shell,
        executor: &mut Recorder,
        line: &str,
        input: &str,
    ) -> (Flow, String) {
        let record = CommandRecord::parse_simple(line, &shell.session.home).unwrap();
        let builtin = lookup(record.name()).unwrap();
        let mut stdin = Cursor::new(input.as_bytes().to_vec());
        let mut stdout = Vec::new();
        let flow = dispatch(
            builtin,
            &record,
            shell,
            executor,
            &mut Io {
                stdin: &mut stdin,
                stdout: &mut stdout,
            },
        );
        (flow, String::from_utf8(stdout).unwrap())
    }

    fn call(shell: &mut Shell, line: &str) -> (Flow, String) {
        call_with(shell, &mut Recorder::default(), line, "")
    }

    #[test]
    fn registry_is_sorted_and_complete() {
        assert!(REGISTRY.windows(2).all(|pair| pair[0].0 < pair[1].0));
        for &(name, builtin) in REGISTRY {
            assert_eq!(lookup(name), Some(builtin));
            assert_eq!(builtin.name(), name);
        }
        assert_eq!(lookup("ls"), None);
        assert_eq!(lookup("T"), None);
        assert_eq!(names().count(), REGISTRY.len());
    }

    #[test]
    fn blank_line_is_a_no_op() {
        let mut sh = shell();
        assert_eq!(call(&mut sh, ""), (Flow::Continue(SUCCESS), String::new()));
    }

    #[test]
    fn true_and_false() {
        let mut sh = shell();
        assert_eq!(call(&mut sh, "true").0, Flow::Continue(SUCCESS));
        assert_eq!(call(&mut sh, "false").0, Flow::Continue(FAILURE));
    }

    #[test]
    fn bad_arity_fails_without_touching_the_session() {
        let lines = [
            "true x",
            "false x",
            "exit 3",
            "alias a",
            "alias a b c",
            "unalias",
            "unalias a b",
            "cd a b",
            "color",
            "color maybe",
            "color on off",
            "debug",
            "debug yes",
            "history x",
            "prompt",
            "prompt a 1 2",
            "source",
            "source a b",
        ];
        for line in lines {
            let mut sh = shell();
            sh.aliases.define("keep", "me").unwrap();
            let (flow, out) = call(&mut sh, line);
            assert_eq!(flow, Flow::Continue(FAILURE), "{line}");
            assert!(out.is_empty(), "{line}");
            assert!(!sh.session.color, "{line}");
            assert!(!sh.session.debug, "{line}");
            assert_eq!(sh.session.prompt(), DEFAULT_PROMPT, "{line}");
            assert_eq!(sh.session.max_dir_length, 25, "{line}");
            assert_eq!(sh.aliases.keys(), vec!["keep"], "{line}");
        }
    }

    #[test]
    fn exit_stops_the_session() {
        let mut sh = shell();
        assert_eq!(call(&mut sh, "exit").0, Flow::Exit(SUCCESS));
    }

    #[test]
    fn prompt_with_one_argument_keeps_the_bound() {
        let mut sh = shell();
        assert_eq!(call(&mut sh, "prompt '%d> '").0, Flow::Continue(SUCCESS));
        assert_eq!(sh.session.prompt(), "%d> ");
        assert_eq!(sh.session.max_dir_length, 25);
    }

    #[test]
    fn prompt_with_two_arguments_sets_the_bound() {
        let mut sh = shell();
        call(&mut sh, "prompt '%d$ ' 40");
        assert_eq!(sh.session.prompt(), "%d$ ");
        assert_eq!(sh.session.max_dir_length, 40);

        call(&mut sh, "prompt x -12");
        assert_eq!(sh.session.max_dir_length, 12);
        call(&mut sh, "prompt x 7abc");
        assert_eq!(sh.session.max_dir_length, 7);
        call(&mut sh, "prompt x abc");
        assert_eq!(sh.session.max_dir_length, 0);
        assert_eq!(sh.session.prompt(), "x");
    }

    #[test]
    fn toggles_switch_flags() {
        let mut sh = shell();
        call(&mut sh, "color on");
        assert!(sh.session.color);
        call(&mut sh, "color off");
        assert!(!sh.session.color);
        call(&mut sh, "debug on");
        assert!(sh.session.debug);
        call(&mut sh, "debug off");
        assert!(!sh.session.debug);
    }

    #[test]
    fn alias_defines_lists_and_removes() {
        let mut sh = shell();
        call(&mut sh, "alias ll 'ls -la'");
        call(&mut sh, "alias g git");
        let (flow, out) = call(&mut sh, "alias");
        assert_eq!(flow, Flow::Continue(SUCCESS));
        assert_eq!(out, "alias g='git'\nalias ll='ls -la'\n");

        assert_eq!(call(&mut sh, "unalias g").0, Flow::Continue(SUCCESS));
        assert_eq!(call(&mut sh, "unalias g").0, Flow::Continue(FAILURE));
        assert_eq!(call(&mut sh, "alias 'a b' x").0, Flow::Continue(FAILURE));
        assert_eq!(sh.aliases.keys(), vec!["ll"]);
    }

    #[test]
    fn history_is_numbered_in_order() {
        let mut sh = shell();
        sh.history.push("ls");
        sh.history.push("cd /tmp");
        let (_, out) = call(&mut sh, "history");
        assert_eq!(out, "    1  ls\n    2  cd /tmp\n");
    }

    #[test]
    fn shcat_echoes_input_verbatim() {
        let mut sh = shell();
        let input = "first line\n  second\tline \n\nno newline";
        let (flow, out) = call_with(&mut sh, &mut Recorder::default(), "shcat ignored", input);
        assert_eq!(flow, Flow::Continue(SUCCESS));
        assert_eq!(out, input);
    }

    #[test]
    fn shcat_stops_when_cancelled() {
        let mut sh = shell();
        sh.session.signals.notify();
        let (flow, out) = call_with(&mut sh, &mut Recorder::default(), "shcat", "a\nb\n");
        assert_eq!(flow, Flow::Continue(INTERRUPTED));
        assert!(out.is_empty());
    }

    #[test]
    fn source_runs_every_line_through_the_executor() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script");
        fs::write(&script, "alias g git\n\n# comment\ng status\r\n  true\n").unwrap();

        let mut sh = shell();
        let mut recorder = Recorder::default();
        let line = format!("source {}", script.display());
        let (flow, _) = call_with(&mut sh, &mut recorder, &line, "");
        assert_eq!(flow, Flow::Continue(SUCCESS));
        assert_eq!(recorder.lines, vec!["alias g git", "g status", "  true"]);
    }

    #[test]
    fn source_stops_at_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script");
        fs::write(&script, "true\nexit\nfalse\n").unwrap();

        let mut sh = shell();
        let mut recorder = Recorder::default();
        let line = format!("source {}", script.display());
        let (flow, _) = call_with(&mut sh, &mut recorder, &line, "");
        assert_eq!(flow, Flow::Exit(SUCCESS));
        assert_eq!(recorder.lines, vec!["true", "exit"]);
    }

    #[test]
    fn source_of_a_missing_file_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell();
        let mut recorder = Recorder::default();
        let line = format!("source {}", dir.path().join("missing").display());
        let (flow, _) = call_with(&mut sh, &mut recorder, &line, "");
        assert_eq!(flow, Flow::Continue(SUCCESS));
        assert!(recorder.lines.is_empty());
    }

    #[test]
    fn cd_changes_directory_and_pwd() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();

        let mut sh = shell();
        let (flow, _) = call(&mut sh, &format!("cd {}", canonical.display()));
        assert_eq!(flow, Flow::Continue(SUCCESS));
        assert_eq!(stdenv::current_dir().unwrap(), canonical);
        assert_eq!(sh.session.get_var("PWD"), Some(canonical.to_string_lossy().into_owned()));
        assert_eq!(sh.session.get_var("OLDPWD"), Some(orig.to_string_lossy().into_owned()));

        stdenv::set_current_dir(&orig).expect("failed to restore cwd");
    }

    #[test]
    fn cd_without_target_goes_home() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();

        let mut sh = shell();
        sh.session.home = canonical.clone();
        assert_eq!(call(&mut sh, "cd").0, Flow::Continue(SUCCESS));
        assert_eq!(stdenv::current_dir().unwrap(), canonical);

        stdenv::set_current_dir(&orig).expect("failed to restore cwd");
    }

    #[test]
    fn cd_to_a_missing_directory_fails() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let mut sh = shell();
        let name = format!("nonexistent_dir_for_jsh_test_{}", std::process::id());
        assert_eq!(call(&mut sh, &format!("cd {name}")).0, Flow::Continue(FAILURE));
        assert_eq!(stdenv::current_dir().unwrap(), orig);
        assert_eq!(sh.session.vars.get("PWD"), None);
    }
}
