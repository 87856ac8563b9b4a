use crate::alias::AliasTable;
use crate::diag::LogControl;
use crate::history::History;
use crate::signal::CancelToken;
use std::borrow::Cow;
use std::collections::HashMap;
use std::env as stdenv;
use std::io::IsTerminal;
use std::path::PathBuf;

/// Template used until the user installs one with `prompt`: `user@host[status]:pwd$ `.
pub const DEFAULT_PROMPT: &str = "%u@%h[%s]:%d$ ";
/// Default bound on the directory shown by `%d`.
pub const DEFAULT_MAX_DIR_LENGTH: usize = 25;

pub const HISTORY_FILE: &str = ".jsh_history";
pub const RC_FILE: &str = ".jshrc";
pub const LOGIN_FILE: &str = ".jsh_login";

/// Process-wide state of one shell session.
///
/// Only built-ins and the bootstrap step mutate it; the prompt engine and the
/// loop controller read it.
pub struct Session {
    /// Print debug-level diagnostics.
    pub debug: bool,
    /// Color user-facing diagnostics.
    pub color: bool,
    /// Run `~/.jshrc` at startup.
    pub load_rc: bool,
    /// Both stdin and stdout are terminals.
    pub interactive: bool,
    /// Set in a process that is a fork of the shell; such a process never tears the session down.
    pub forked_child: bool,
    /// Number of history entries added during this session.
    pub history_entries: usize,
    /// Upper bound on the length of the directory shown by `%d`.
    pub max_dir_length: usize,
    pub home: PathBuf,
    /// Variables exported to spawned commands on top of the process environment.
    pub vars: HashMap<String, String>,
    /// Cancellation record shared with the SIGINT handler; also carries the
    /// waiting-for-child flag.
    pub signals: CancelToken,
    prompt: Cow<'static, str>,
    log: Option<LogControl>,
}

impl Session {
    /// Capture the current process state into a new session with default flags.
    pub fn new() -> Self {
        let home = dirs::home_dir()
            .or_else(|| stdenv::var_os("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/"));
        Self {
            debug: cfg!(debug_assertions),
            color: true,
            load_rc: true,
            interactive: std::io::stdin().is_terminal() && std::io::stdout().is_terminal(),
            forked_child: false,
            history_entries: 0,
            max_dir_length: DEFAULT_MAX_DIR_LENGTH,
            home,
            vars: HashMap::new(),
            signals: CancelToken::new(),
            prompt: Cow::Borrowed(DEFAULT_PROMPT),
            log: None,
        }
    }

    /// The active prompt template.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Install a new prompt template. The previous one is released unless it
    /// is the built-in default, which is static.
    pub fn set_prompt(&mut self, template: impl Into<String>) {
        self.prompt = Cow::Owned(template.into());
    }

    pub fn has_default_prompt(&self) -> bool {
        matches!(self.prompt, Cow::Borrowed(_))
    }

    /// Hook the global log filter to this session's debug flag.
    pub fn attach_log(&mut self, log: Option<LogControl>) {
        self.log = log;
    }

    pub fn set_debug(&mut self, on: bool) {
        self.debug = on;
        if let Some(log) = &self.log {
            log.set_debug(on);
        }
    }

    /// Path of a per-user configuration file.
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.home.join(name)
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a built-in or the executor may touch: the session plus the
/// alias table and the history.
pub struct Shell {
    pub session: Session,
    pub aliases: AliasTable,
    pub history: History,
}

impl Shell {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            aliases: AliasTable::default(),
            history: History::default(),
        }
    }
}
