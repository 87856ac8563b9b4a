//! Prompt template rendering.
//!
//! A template mixes literal characters with `%`-directives:
//!
//! | directive | expands to |
//! |-----------|------------|
//! | `%u` | user name |
//! | `%h` | host name |
//! | `%s` | last exit status, at most [`MAX_STATUS_DIGITS`] characters |
//! | `%d` | working directory, truncated to the session's bound |
//! | `%%` | a literal `%` |
//!
//! The rendered prompt never exceeds [`MAX_PROMPT_LENGTH`] characters: a
//! segment that does not fit ends the rendering.

use crate::command::ExitCode;
use crate::diag;
use crate::session::Session;
use std::borrow::Cow;

pub const MAX_PROMPT_LENGTH: usize = 100;
pub const MAX_STATUS_DIGITS: usize = 9;

/// Values a template can refer to, gathered once per rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFacts {
    pub user: String,
    pub host: String,
    pub cwd: String,
    pub status: ExitCode,
}

impl PromptFacts {
    pub fn gather(status: ExitCode) -> Self {
        let cwd = std::env::current_dir()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            user: user_name(),
            host: host_name(),
            cwd,
            status,
        }
    }
}

/// Render the session's active template. Non-interactive sessions get an empty prompt.
pub fn render(session: &Session, status: ExitCode) -> String {
    if !session.interactive {
        return String::new();
    }
    expand(
        session.prompt(),
        &PromptFacts::gather(status),
        session.max_dir_length,
        |directive| match directive {
            Some(c) => diag::error(session, format!("skipping unrecognized prompt option '{c}'")),
            None => diag::error(session, "skipping dangling '%' at the end of the prompt"),
        },
    )
}

/// Expand `template` against `facts`.
///
/// `unknown` is called for every unrecognized directive (`None` for a
/// trailing lone `%`); such directives expand to nothing.
pub fn expand(
    template: &str,
    facts: &PromptFacts,
    max_dir_length: usize,
    mut unknown: impl FnMut(Option<char>),
) -> String {
    let mut prompt = String::new();
    let mut length = 0;
    let mut literal = [0u8; 4];
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        let segment: Cow<'_, str> = if c != '%' {
            Cow::Borrowed(c.encode_utf8(&mut literal))
        } else {
            match chars.next() {
                Some('u') => Cow::Borrowed(facts.user.as_str()),
                Some('h') => Cow::Borrowed(facts.host.as_str()),
                Some('s') => Cow::Owned(status_digits(facts.status)),
                Some('d') => Cow::Borrowed(truncate_dir(&facts.cwd, max_dir_length)),
                Some('%') => Cow::Borrowed("%"),
                other => {
                    unknown(other);
                    Cow::Borrowed("")
                }
            }
        };

        let segment_length = segment.chars().count();
        if length + segment_length > MAX_PROMPT_LENGTH {
            tracing::debug!("prompt expansion too long, dropping {segment:?} and the rest");
            break;
        }
        prompt.push_str(&segment);
        length += segment_length;
    }
    prompt
}

fn status_digits(status: ExitCode) -> String {
    status.to_string().chars().take(MAX_STATUS_DIGITS).collect()
}

/// Shorten `path` to roughly `max` characters without cutting a component.
///
/// When the path is too long, the result is the suffix starting at the first
/// `/` at or after the cut point, or at the last `/` if there is none after it.
pub fn truncate_dir(path: &str, max: usize) -> &str {
    let length = path.chars().count();
    if length <= max {
        return path;
    }
    let cut = path
        .char_indices()
        .nth(length - max)
        .map_or(path.len(), |(i, _)| i);
    let start = path[cut..]
        .find('/')
        .map(|i| cut + i)
        .or_else(|| path.rfind('/'))
        .unwrap_or(0);
    &path[start..]
}

/// The user name from `$USER`, then `$LOGNAME`.
pub fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_default()
}

/// The local host name, or an empty string if it cannot be determined.
pub fn host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the pointer and length describe `buf`, which outlives the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        tracing::debug!("gethostname failed: {}", std::io::Error::last_os_error());
        return String::new();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
