//! Line-by-line processing of streams and script files.

use crate::command::{Flow, INTERRUPTED, SUCCESS};
use crate::exec::Executor;
use crate::session::Shell;
use crate::signal::CancelToken;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::ops::ControlFlow;
use std::path::Path;

/// How a stream stopped being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The whole stream was consumed.
    Finished,
    /// A cancellation was requested between two lines.
    Interrupted,
    /// The handler asked to stop.
    Stopped(Flow),
}

/// Feed every line of `reader` to `handler`, line terminators included.
///
/// A pending cancellation is checked before each line and left in place for
/// the read-eval loop to consume.
pub fn parse_stream(
    reader: &mut dyn BufRead,
    signals: &CancelToken,
    mut handler: impl FnMut(&str) -> io::Result<ControlFlow<Flow>>,
) -> io::Result<StreamEnd> {
    let mut line = String::new();
    loop {
        if signals.is_requested() {
            return Ok(StreamEnd::Interrupted);
        }
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(StreamEnd::Finished);
        }
        if let ControlFlow::Break(flow) = handler(&line)? {
            return Ok(StreamEnd::Stopped(flow));
        }
    }
}

/// Open `path` and feed its lines to `handler`.
///
/// A missing file is an error only when `report_missing` is set; otherwise
/// it counts as an empty file.
pub fn parse_file(
    path: &Path,
    report_missing: bool,
    signals: &CancelToken,
    handler: impl FnMut(&str) -> io::Result<ControlFlow<Flow>>,
) -> Result<StreamEnd> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound && !report_missing => {
            tracing::debug!("{} does not exist, skipping", path.display());
            return Ok(StreamEnd::Finished);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("cannot open {}", path.display()));
        }
    };
    parse_stream(&mut BufReader::new(file), signals, handler)
        .with_context(|| format!("cannot read {}", path.display()))
}

/// Run every line of the script at `path` through `executor`.
///
/// Blank lines and `#` comments are skipped. Execution stops early when a
/// line ends the session; that flow is returned.
pub fn source_file(
    path: &Path,
    report_missing: bool,
    shell: &mut Shell,
    executor: &mut dyn Executor,
) -> Result<Flow> {
    let signals = shell.session.signals.clone();
    let mut last = Flow::Continue(SUCCESS);

    let end = parse_file(path, report_missing, &signals, |raw| {
        let line = raw.trim_end_matches(['\n', '\r']);
        let content = line.trim_start();
        if content.is_empty() || content.starts_with('#') {
            return Ok(ControlFlow::Continue(()));
        }
        last = executor.execute(line, shell);
        Ok(match last {
            Flow::Exit(_) => ControlFlow::Break(last),
            Flow::Continue(_) => ControlFlow::Continue(()),
        })
    })?;

    Ok(match end {
        StreamEnd::Finished => last,
        StreamEnd::Interrupted => Flow::Continue(INTERRUPTED),
        StreamEnd::Stopped(flow) => flow,
    })
}
