//! Execution of resolved command lines: lists, pipelines, redirections and
//! external processes.

use crate::builtin::{self, Builtin, Io};
use crate::command::{
    CommandRecord, ExitCode, FAILURE, Flow, INTERRUPTED, NOT_FOUND, SUCCESS, expand_tilde,
};
use crate::diag;
use crate::parser::{self, Connector, Redirect, RedirectKind, SimpleCommand};
use crate::session::{Session, Shell};
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

/// Runs command lines the read-eval loop does not handle itself.
pub trait Executor {
    /// Execute `line` and report how the loop should continue.
    fn execute(&mut self, line: &str, shell: &mut Shell) -> Flow;
}

/// Executor that spawns real processes.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn execute(&mut self, line: &str, shell: &mut Shell) -> Flow {
        let script = match parser::parse(line) {
            Ok(script) => script,
            Err(err) => {
                diag::error(&shell.session, err);
                return Flow::Continue(FAILURE);
            }
        };

        let mut status = SUCCESS;
        for item in &script.items {
            if shell.session.signals.is_requested() {
                return Flow::Continue(INTERRUPTED);
            }
            let wanted = match item.connector {
                Connector::Always => true,
                Connector::IfSuccess => status == SUCCESS,
                Connector::IfFailure => status != SUCCESS,
            };
            if !wanted {
                continue;
            }
            match self.run_pipeline(&item.pipeline, shell) {
                Flow::Exit(code) => return Flow::Exit(code),
                Flow::Continue(code) => status = code,
            }
        }
        Flow::Continue(status)
    }
}

/// Where a pipeline stage reads its standard input from.
enum Upstream {
    Inherit,
    Bytes(Vec<u8>),
    Pipe(ChildStdout),
}

enum Stage {
    Finished(ExitCode),
    Spawned(Child),
}

#[derive(Default)]
struct Redirections {
    input: Option<File>,
    output: Option<File>,
}

impl ProcessExecutor {
    fn run_pipeline(&mut self, pipeline: &[SimpleCommand], shell: &mut Shell) -> Flow {
        if let [command] = pipeline {
            let record = record_of(command, &shell.session.home);
            if let Some(builtin) = builtin::lookup(record.name()) {
                return self.run_builtin(builtin, &record, &command.redirects, shell);
            }
        }
        Flow::Continue(self.run_stages(pipeline, shell))
    }

    /// Run a lone built-in in-process, with its redirections applied.
    fn run_builtin(
        &mut self,
        builtin: Builtin,
        record: &CommandRecord,
        redirects: &[Redirect],
        shell: &mut Shell,
    ) -> Flow {
        let opened = match open_redirects(redirects, &shell.session.home) {
            Ok(opened) => opened,
            Err(err) => {
                diag::error(&shell.session, format!("{err:#}"));
                return Flow::Continue(FAILURE);
            }
        };
        let mut stdin: Box<dyn BufRead> = match opened.input {
            Some(file) => Box::new(BufReader::new(file)),
            None => Box::new(io::stdin().lock()),
        };
        let mut stdout: Box<dyn Write> = match opened.output {
            Some(file) => Box::new(file),
            None => Box::new(io::stdout()),
        };
        let flow = builtin::dispatch(
            builtin,
            record,
            shell,
            self,
            &mut Io {
                stdin: &mut *stdin,
                stdout: &mut *stdout,
            },
        );
        if let Err(err) = stdout.flush() {
            tracing::debug!("flushing output of {}: {err}", builtin.name());
        }
        flow
    }

    /// Run every stage of a pipeline and return the status of the last one.
    ///
    /// External stages are connected by OS pipes; built-in stages run in
    /// turn, their output buffered for the next stage.
    fn run_stages(&mut self, pipeline: &[SimpleCommand], shell: &mut Shell) -> ExitCode {
        let mut upstream = Upstream::Inherit;
        let mut stages = Vec::with_capacity(pipeline.len());
        let mut feeders = Vec::new();
        // set from the first spawn on: later built-in stages may block on a child's pipe
        let mut waiting = None;

        for (index, command) in pipeline.iter().enumerate() {
            let last = index + 1 == pipeline.len();
            let record = record_of(command, &shell.session.home);
            let input = std::mem::replace(&mut upstream, Upstream::Bytes(Vec::new()));

            let opened = match open_redirects(&command.redirects, &shell.session.home) {
                Ok(opened) => opened,
                Err(err) => {
                    diag::error(&shell.session, format!("{err:#}"));
                    stages.push(Stage::Finished(FAILURE));
                    continue;
                }
            };

            let stage = match builtin::lookup(record.name()) {
                Some(builtin) => {
                    let (status, output) =
                        self.run_builtin_stage(builtin, &record, input, opened, last, shell);
                    if let Some(output) = output {
                        upstream = Upstream::Bytes(output);
                    }
                    Stage::Finished(status)
                }
                None => match spawn(&record, input, opened, last, &shell.session) {
                    Ok((mut child, feeder)) => {
                        waiting.get_or_insert_with(|| shell.session.signals.wait_for_child());
                        feeders.extend(feeder);
                        if let Some(stdout) = child.stdout.take() {
                            upstream = Upstream::Pipe(stdout);
                        }
                        Stage::Spawned(child)
                    }
                    Err(status) => Stage::Finished(status),
                },
            };
            stages.push(stage);
        }
        drop(upstream);

        let _waiting = waiting.unwrap_or_else(|| shell.session.signals.wait_for_child());
        let mut status = SUCCESS;
        for stage in stages {
            status = match stage {
                Stage::Finished(code) => code,
                Stage::Spawned(mut child) => wait_child(&mut child, &shell.session),
            };
        }
        for feeder in feeders {
            if feeder.join().is_err() {
                tracing::debug!("pipe feeder thread panicked");
            }
        }
        status
    }

    /// Run a built-in as one stage of a pipeline. Returns its status and,
    /// unless it wrote to the terminal or a file, its buffered output.
    fn run_builtin_stage(
        &mut self,
        builtin: Builtin,
        record: &CommandRecord,
        input: Upstream,
        opened: Redirections,
        last: bool,
        shell: &mut Shell,
    ) -> (ExitCode, Option<Vec<u8>>) {
        let mut stdin: Box<dyn BufRead> = match (opened.input, input) {
            (Some(file), _) => Box::new(BufReader::new(file)),
            (None, Upstream::Inherit) => Box::new(io::stdin().lock()),
            (None, Upstream::Bytes(bytes)) => Box::new(Cursor::new(bytes)),
            (None, Upstream::Pipe(pipe)) => Box::new(BufReader::new(pipe)),
        };
        let mut buffer = Vec::new();
        let mut file_output = opened.output;
        let mut terminal = io::stdout();
        let stdout: &mut dyn Write = match &mut file_output {
            Some(file) => file,
            None if last => &mut terminal,
            None => &mut buffer,
        };

        let flow = builtin::dispatch(
            builtin,
            record,
            shell,
            self,
            &mut Io {
                stdin: &mut *stdin,
                stdout: &mut *stdout,
            },
        );
        if let Err(err) = stdout.flush() {
            tracing::debug!("flushing output of {}: {err}", builtin.name());
        }
        // `exit` inside a pipeline only ends its own stage
        let status = flow.status();
        let forwarded = (file_output.is_none() && !last).then_some(buffer);
        (status, forwarded)
    }
}

fn record_of(command: &SimpleCommand, home: &Path) -> CommandRecord {
    CommandRecord::new(
        command
            .argv
            .iter()
            .map(|word| expand_tilde(word.clone(), home))
            .collect(),
    )
}

fn open_redirects(redirects: &[Redirect], home: &Path) -> Result<Redirections> {
    let mut opened = Redirections::default();
    for redirect in redirects {
        let target = expand_tilde(redirect.target.clone(), home);
        match redirect.kind {
            RedirectKind::Input => {
                opened.input = Some(File::open(&target).with_context(|| target.clone())?);
            }
            RedirectKind::Output => {
                opened.output = Some(File::create(&target).with_context(|| target.clone())?);
            }
            RedirectKind::Append => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&target)
                    .with_context(|| target.clone())?;
                opened.output = Some(file);
            }
        }
    }
    Ok(opened)
}

/// Start an external stage. On failure the error is reported and the
/// stage's status returned instead.
fn spawn(
    record: &CommandRecord,
    input: Upstream,
    opened: Redirections,
    last: bool,
    session: &Session,
) -> std::result::Result<(Child, Option<JoinHandle<()>>), ExitCode> {
    let name = record.name();
    let search_paths = session.get_var("PATH").unwrap_or_default();
    let Some(executable) = find_command_path(OsStr::new(&search_paths), Path::new(name)) else {
        diag::error(session, format!("{name}: command not found"));
        return Err(NOT_FOUND);
    };

    let mut pending = None;
    let stdin = match (opened.input, input) {
        (Some(file), _) => Stdio::from(file),
        (None, Upstream::Inherit) => Stdio::inherit(),
        (None, Upstream::Pipe(pipe)) => Stdio::from(pipe),
        (None, Upstream::Bytes(bytes)) => {
            pending = Some(bytes);
            Stdio::piped()
        }
    };
    let stdout = match opened.output {
        Some(file) => Stdio::from(file),
        None if last => Stdio::inherit(),
        None => Stdio::piped(),
    };

    let mut child = Command::new(&*executable)
        .args(record.args())
        .stdin(stdin)
        .stdout(stdout)
        .envs(&session.vars)
        .spawn()
        .map_err(|err| {
            diag::error(session, format!("{name}: {err}"));
            FAILURE
        })?;
    tracing::debug!("spawned {} as pid {}", executable.display(), child.id());

    let feeder = match (pending, child.stdin.take()) {
        (Some(bytes), Some(mut pipe)) => Some(std::thread::spawn(move || {
            // the reader may exit without consuming everything
            let _ = pipe.write_all(&bytes);
        })),
        _ => None,
    };
    Ok((child, feeder))
}

fn wait_child(child: &mut Child, session: &Session) -> ExitCode {
    match child.wait() {
        Ok(status) => status.code().unwrap_or_else(|| terminated_by_signal(status)),
        Err(err) => {
            diag::error(session, format!("wait for pid {}: {err}", child.id()));
            FAILURE
        }
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// - Absolute path: returned if it exists.
/// - `./foo`: returned if it exists.
/// - Several components (`bin/sh`): looked up relative to the current directory.
/// - A single component: searched in each directory of `search_paths`.
/// - Empty path: `None`.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(single), None) => find_in_path(search_paths, single.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock_current_dir;
    use std::fs;

    fn shell_in(home: &Path) -> Shell {
        let mut session = Session::new();
        session.color = false;
        session.home = home.to_path_buf();
        Shell::new(session)
    }

    fn run(shell: &mut Shell, line: &str) -> Flow {
        ProcessExecutor.execute(line, shell)
    }

    #[test]
    #[cfg(unix)]
    fn absolute_paths_must_exist() {
        let found = find_command_path(OsStr::new("/bin"), Path::new("/bin/sh"));
        assert_eq!(found.as_deref(), Some(Path::new("/bin/sh")));
        assert!(find_command_path(OsStr::new("/bin"), Path::new("/bin/nonexisting")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn single_components_are_searched_in_path() {
        let found = find_command_path(OsStr::new("/nowhere:/bin"), Path::new("sh"))
            .expect("expected to find 'sh' in /bin");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
        assert!(find_command_path(OsStr::new("/bin"), Path::new("nonexisting")).is_none());
        assert!(find_command_path(OsStr::new("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn relative_paths_resolve_against_the_current_dir() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("bin")).unwrap();
        File::create(temp.path().join("bin").join("tool")).unwrap();
        File::create(temp.path().join("local")).unwrap();

        std::env::set_current_dir(temp.path()).unwrap();
        let nested = find_command_path(OsStr::new("/does/not/matter"), Path::new("bin/tool"))
            .map(Cow::into_owned);
        let dotted =
            find_command_path(OsStr::new("/bin"), Path::new("./local")).map(Cow::into_owned);
        std::env::set_current_dir(&cwd_before).unwrap();

        assert_eq!(nested, Some(PathBuf::from("bin/tool")));
        assert_eq!(dotted, Some(PathBuf::from("./local")));
    }

    #[test]
    fn lists_follow_their_connectors() {
        let temp = tempfile::tempdir().unwrap();
        let mut shell = shell_in(temp.path());
        assert_eq!(run(&mut shell, "true && false"), Flow::Continue(FAILURE));
        assert_eq!(run(&mut shell, "false || true"), Flow::Continue(SUCCESS));
        assert_eq!(run(&mut shell, "false && exit"), Flow::Continue(FAILURE));
        assert_eq!(run(&mut shell, "false; true"), Flow::Continue(SUCCESS));
        assert_eq!(run(&mut shell, "true; exit; false"), Flow::Exit(SUCCESS));
    }

    #[test]
    fn exit_inside_a_pipeline_only_ends_its_stage() {
        let temp = tempfile::tempdir().unwrap();
        let mut shell = shell_in(temp.path());
        assert_eq!(run(&mut shell, "true | exit"), Flow::Continue(SUCCESS));
    }

    #[test]
    fn malformed_lines_fail() {
        let temp = tempfile::tempdir().unwrap();
        let mut shell = shell_in(temp.path());
        assert_eq!(run(&mut shell, "true |"), Flow::Continue(FAILURE));
        assert_eq!(run(&mut shell, "shcat < missing-file"), Flow::Continue(FAILURE));
    }

    #[test]
    fn pending_cancellation_stops_a_list() {
        let temp = tempfile::tempdir().unwrap();
        let mut shell = shell_in(temp.path());
        shell.session.signals.notify();
        assert_eq!(run(&mut shell, "true; true"), Flow::Continue(INTERRUPTED));
    }

    #[test]
    fn unknown_commands_are_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let mut shell = shell_in(temp.path());
        assert_eq!(
            run(&mut shell, "surely-not-an-installed-command-4242"),
            Flow::Continue(NOT_FOUND)
        );
    }

    #[test]
    fn builtins_honor_redirections_and_tilde() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("in"), "one\ntwo\n").unwrap();
        let mut shell = shell_in(temp.path());

        assert_eq!(run(&mut shell, "shcat < ~/in > ~/out"), Flow::Continue(SUCCESS));
        assert_eq!(fs::read_to_string(temp.path().join("out")).unwrap(), "one\ntwo\n");

        shell.history.push("ls");
        assert_eq!(run(&mut shell, "history >> ~/out"), Flow::Continue(SUCCESS));
        assert_eq!(
            fs::read_to_string(temp.path().join("out")).unwrap(),
            "one\ntwo\n    1  ls\n"
        );
    }

    #[test]
    #[cfg(unix)]
    fn external_statuses_are_reported() {
        let temp = tempfile::tempdir().unwrap();
        let mut shell = shell_in(temp.path());
        assert_eq!(run(&mut shell, "sh -c 'exit 3'"), Flow::Continue(3));
        assert_eq!(run(&mut shell, "sh -c 'kill -9 $$'"), Flow::Continue(128 + 9));
        assert_eq!(run(&mut shell, "sh -c 'exit 3' && true"), Flow::Continue(3));
    }

    #[test]
    #[cfg(unix)]
    fn pipelines_mix_builtins_and_processes() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path();
        fs::write(dir.join("in"), "alpha\nbeta\n").unwrap();
        let mut shell = shell_in(dir);

        assert_eq!(run(&mut shell, "shcat < ~/in | cat > ~/a"), Flow::Continue(SUCCESS));
        assert_eq!(fs::read_to_string(dir.join("a")).unwrap(), "alpha\nbeta\n");

        assert_eq!(
            run(&mut shell, "sh -c 'echo hi' | shcat | cat | shcat > ~/b"),
            Flow::Continue(SUCCESS)
        );
        assert_eq!(fs::read_to_string(dir.join("b")).unwrap(), "hi\n");
    }

    #[test]
    #[cfg(unix)]
    fn children_see_the_session_variables() {
        let temp = tempfile::tempdir().unwrap();
        let mut shell = shell_in(temp.path());
        shell.session.set_var("JSH_TEST_VALUE", "42");
        assert_eq!(
            run(&mut shell, "sh -c 'echo $JSH_TEST_VALUE' > ~/env"),
            Flow::Continue(SUCCESS)
        );
        assert_eq!(fs::read_to_string(temp.path().join("env")).unwrap(), "42\n");
    }

    /// The process-wide SIGINT handler routes to this token once installed.
    #[cfg(unix)]
    fn interrupt_token() -> crate::CancelToken {
        use std::sync::OnceLock;
        static TOKEN: OnceLock<crate::CancelToken> = OnceLock::new();
        TOKEN
            .get_or_init(|| {
                let token = crate::CancelToken::new();
                token.install().expect("install SIGINT handler");
                token
            })
            .clone()
    }

    #[test]
    #[cfg(unix)]
    fn interrupts_while_children_run_are_not_recorded() {
        let temp = tempfile::tempdir().unwrap();
        let mut shell = shell_in(temp.path());
        shell.session.signals = interrupt_token();
        let child = "sh -c 'kill -INT $PPID; sleep 0.2; exit 0'";

        assert_eq!(run(&mut shell, child), Flow::Continue(SUCCESS));
        assert!(!shell.session.signals.is_requested());

        // shcat blocks on the child's pipe before the child is waited on
        assert_eq!(run(&mut shell, &format!("{child} | shcat")), Flow::Continue(SUCCESS));
        assert!(!shell.session.signals.is_requested());
    }
}
