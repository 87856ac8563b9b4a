use crate::builtin::{self, Io};
use crate::command::{CommandRecord, ExitCode, Flow, INTERRUPTED, SUCCESS};
use crate::diag;
use crate::editor::LineEditor;
use crate::exec::Executor;
use crate::history::History;
use crate::input::{self, Input};
use crate::script;
use crate::session::{HISTORY_FILE, LOGIN_FILE, RC_FILE, Shell};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::Path;

/// The read-eval loop of an interactive shell.
///
/// Each cycle renders the prompt, reads and expands a line, then evaluates
/// it: simple built-in commands run here, everything else goes to the
/// [`Executor`]. A pending cancellation is consumed at the top of the cycle
/// and turns the last status into [`INTERRUPTED`].
///
/// Example
/// ```no_run
/// use jsh::{ProcessExecutor, Repl, RustylineEditor, Session, Shell};
/// let editor = RustylineEditor::new().unwrap();
/// let mut repl = Repl::new(editor, ProcessExecutor, Shell::new(Session::new()));
/// repl.startup();
/// std::process::exit(repl.run());
/// ```
pub struct Repl<L, E> {
    editor: L,
    executor: E,
    shell: Shell,
}

impl<L: LineEditor, E: Executor> Repl<L, E> {
    pub fn new(editor: L, executor: E, shell: Shell) -> Self {
        Self {
            editor,
            executor,
            shell,
        }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut Shell {
        &mut self.shell
    }

    pub fn editor(&self) -> &L {
        &self.editor
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Prepare the session: create missing configuration files, load the
    /// history, run the rc file and greet an interactive user.
    ///
    /// Returns [`Flow::Exit`] if the rc file ended the session.
    pub fn startup(&mut self) -> Flow {
        for name in [HISTORY_FILE, RC_FILE, LOGIN_FILE] {
            touch(&self.shell.session.config_path(name));
        }

        let history_path = self.shell.session.config_path(HISTORY_FILE);
        match self.editor.load_history(&history_path) {
            Ok(entries) => {
                tracing::debug!("loaded {} history entries", entries.len());
                self.shell.history = History::from(entries);
            }
            Err(err) => tracing::debug!("{err:#}"),
        }

        if self.shell.session.load_rc {
            let rc_path = self.shell.session.config_path(RC_FILE);
            match script::source_file(&rc_path, false, &mut self.shell, &mut self.executor) {
                Ok(Flow::Exit(code)) => return Flow::Exit(code),
                Ok(Flow::Continue(_)) => {}
                Err(err) => tracing::debug!("{err:#}"),
            }
        }

        if self.shell.session.interactive {
            self.greet();
        }
        Flow::Continue(SUCCESS)
    }

    /// Run cycles until end of input or `exit`, then tear the session down.
    pub fn run(&mut self) -> ExitCode {
        let mut status = SUCCESS;
        let code = loop {
            if self.shell.session.signals.take() {
                tracing::debug!("recovering from an interrupt");
                status = INTERRUPTED;
            }
            match input::read_line(&mut self.editor, &mut self.shell, status) {
                Input::EndOfSession => break SUCCESS,
                Input::Interrupted => status = INTERRUPTED,
                Input::Line(line) => match self.evaluate(&line) {
                    Flow::Continue(code) => status = code,
                    Flow::Exit(code) => break code,
                },
            }
        };
        self.teardown();
        code
    }

    /// Evaluate one resolved line.
    pub fn evaluate(&mut self, line: &str) -> Flow {
        if let Some(record) = CommandRecord::parse_simple(line, &self.shell.session.home) {
            if let Some(builtin) = builtin::lookup(record.name()) {
                let mut stdin = io::stdin().lock();
                let mut stdout = io::stdout();
                let flow = builtin::dispatch(
                    builtin,
                    &record,
                    &mut self.shell,
                    &mut self.executor,
                    &mut Io {
                        stdin: &mut stdin,
                        stdout: &mut stdout,
                    },
                );
                if let Err(err) = stdout.flush() {
                    tracing::debug!("flushing stdout: {err}");
                }
                return flow;
            }
        }
        self.executor.execute(line, &mut self.shell)
    }

    /// Flush this session's history. A forked copy of the shell never does.
    pub fn teardown(&mut self) {
        if self.shell.session.forked_child {
            return;
        }
        let path = self.shell.session.config_path(HISTORY_FILE);
        match self.editor.append_history(&path) {
            Ok(()) => tracing::debug!(
                "appended {} history entries to {}",
                self.shell.session.history_entries,
                path.display()
            ),
            Err(err) => tracing::debug!("{err:#}"),
        }
    }

    /// Print the login file with debug output suppressed.
    fn greet(&mut self) {
        let debug = self.shell.session.debug;
        self.shell.session.set_debug(false);

        let path = self.shell.session.config_path(LOGIN_FILE);
        let mut stdout = io::stdout().lock();
        let printed = script::parse_file(&path, false, &self.shell.session.signals, |line| {
            stdout.write_all(line.as_bytes())?;
            Ok(ControlFlow::Continue(()))
        });
        drop(stdout);

        self.shell.session.set_debug(debug);
        if let Err(err) = printed {
            tracing::debug!("{err:#}");
        }
        if debug {
            diag::info(
                &self.shell.session,
                "debugging is on. Turn it off with 'debug off'.",
            );
        }
    }
}

/// Create `path` empty if it does not exist yet.
fn touch(path: &Path) {
    if let Err(err) = OpenOptions::new().create(true).append(true).open(path) {
        tracing::debug!("cannot create {}: {err}", path.display());
    }
}
