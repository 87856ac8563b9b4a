use argh::FromArgs;
use jsh::command::{FAILURE, Flow};
use jsh::diag::LogControl;
use jsh::{ProcessExecutor, Repl, RustylineEditor, Session, Shell};
use std::process;

const LICENSE: &str = "\
Copyright (C) the jsh authors.

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.";

#[derive(FromArgs)]
/// An interactive shell with aliases, history expansion and a configurable prompt.
struct Options {
    #[argh(switch, short = 'd')]
    /// print debug messages
    debug: bool,

    #[argh(switch, short = 'n')]
    /// do not print debug messages; wins over --debug
    nodebug: bool,

    #[argh(switch, short = 'c')]
    /// color error and info messages
    color: bool,

    #[argh(switch, short = 'o')]
    /// do not color messages; wins over --color
    nocolor: bool,

    #[argh(switch, short = 'f')]
    /// do not run ~/.jshrc at startup
    norc: bool,

    #[argh(switch, short = 'l')]
    /// display license information and exit
    license: bool,

    #[argh(switch, short = 'v')]
    /// display version information and exit
    version: bool,
}

impl Options {
    fn apply(&self, session: &mut Session) {
        if self.debug {
            session.debug = true;
        }
        if self.nodebug {
            session.debug = false;
        }
        if self.color {
            session.color = true;
        }
        if self.nocolor {
            session.color = false;
        }
        if self.norc {
            session.load_rc = false;
        }
    }
}

fn main() {
    let options: Options = argh::from_env();
    if options.version {
        println!("jsh {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    if options.license {
        println!("{LICENSE}");
        return;
    }

    let mut session = Session::new();
    options.apply(&mut session);
    let log = LogControl::init(session.debug, session.color);
    session.attach_log(log);
    if let Err(err) = session.signals.install() {
        tracing::debug!("interrupt handler not installed: {err}");
    }

    let editor = match RustylineEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("jsh: {err:#}");
            eprintln!("Try 'jsh --help' for a list of recognized options.");
            process::exit(FAILURE);
        }
    };

    let mut repl = Repl::new(editor, ProcessExecutor, Shell::new(session));
    let code = match repl.startup() {
        Flow::Exit(code) => {
            repl.teardown();
            code
        }
        Flow::Continue(_) => repl.run(),
    };
    process::exit(code);
}
