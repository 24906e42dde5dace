//! One task: a single step's child process and its captured output.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use tracing::{debug, instrument, warn};

use crate::notify::Notifier;
use crate::palette::Color;
use crate::sink::FailureReporter;

/// Display format for start/finish console lines and result timestamps.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// A step ready to run: addressable name plus fully rendered command.
///
/// The name is derived from the step's position (`"{stage}_{step}"`) and
/// is the key for log output and reporting.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub command: String,
}

/// Console presentation for one task's mirrored output.
#[derive(Debug, Clone, Copy)]
pub struct TaskStyle {
    /// Color tag; `None` when the console is not an interactive terminal.
    pub color: Option<Color>,
    /// Prefix each mirrored line with the rendered command.
    pub verbose: bool,
}

/// Completed (or never-started) task, kept as a read-only record.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub name: String,
    pub command: String,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Both streams appended in arrival order per stream; interleaving
    /// across the two streams is best-effort.
    pub combined: String,
}

impl TaskRecord {
    /// Record for a step that failed before its process ever started, e.g.
    /// an unrenderable template. It still occupies its slot in the results
    /// so no step silently vanishes from reporting.
    pub fn unrun(name: String, command: String) -> Self {
        let now = Local::now();
        Self {
            name,
            command,
            started_at: now,
            ended_at: now,
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            combined: String::new(),
        }
    }
}

/// Run one step to completion, capturing its output and classifying the
/// result.
///
/// Never returns an error: launch and execution failures go through
/// `reporter` and are recorded on the returned [`TaskRecord`], because
/// sibling tasks in the stage must keep running regardless of this one's
/// outcome.
#[instrument(skip_all, fields(task = %spec.name))]
pub fn run_task(
    spec: &TaskSpec,
    style: TaskStyle,
    reporter: &FailureReporter,
    notifier: &dyn Notifier,
) -> TaskRecord {
    let started_at = Local::now();
    console_line(
        style.color,
        &format!(
            "[{}] Starting: {}",
            started_at.format(TIME_FORMAT),
            spec.command
        ),
    );

    let outcome = match spawn_and_capture(spec, style) {
        Ok(outcome) => outcome,
        Err(error) => {
            notifier.notify(
                "Command failed",
                &format!("{} could not be started: {error:#}", spec.command),
            );
            reporter.report(&spec.name, error);
            let mut record = TaskRecord::unrun(spec.name.clone(), spec.command.clone());
            record.started_at = started_at;
            record.ended_at = Local::now();
            return record;
        }
    };

    let ended_at = Local::now();
    if outcome.status_ok {
        console_line(
            style.color,
            &format!(
                "[{}] Finished: {}",
                ended_at.format(TIME_FORMAT),
                spec.command
            ),
        );
        let elapsed = (ended_at - started_at).to_std().unwrap_or_default();
        if elapsed > notifier.long_running_threshold() {
            notifier.notify(
                "Command finished",
                &format!("{} finished after {elapsed:?}", spec.command),
            );
        }
    } else {
        notifier.notify(
            "Command failed",
            &format!("{} exited with {}", spec.command, outcome.status_display),
        );
        reporter.report(
            &spec.name,
            anyhow!("`{}` exited with {}", spec.command, outcome.status_display),
        );
    }
    debug!(success = outcome.status_ok, "task finished");

    TaskRecord {
        name: spec.name.clone(),
        command: spec.command.clone(),
        started_at,
        ended_at,
        success: outcome.status_ok,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        combined: outcome.combined,
    }
}

struct CaptureOutcome {
    status_ok: bool,
    status_display: String,
    stdout: String,
    stderr: String,
    combined: String,
}

/// Spawn `sh -c <command>` and drain both streams on dedicated threads.
///
/// Shell interpretation is deliberate: pipes, redirects, and globs in step
/// templates are shell syntax, not engine features.
fn spawn_and_capture(spec: &TaskSpec, style: TaskStyle) -> Result<CaptureOutcome> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&spec.command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn `{}`", spec.command))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let combined = Arc::new(Mutex::new(String::new()));
    let prefix = style.verbose.then(|| spec.command.clone());

    let stdout_handle = {
        let combined = Arc::clone(&combined);
        let prefix = prefix.clone();
        thread::spawn(move || {
            tee_stream(stdout, StreamTarget::Stdout, style.color, prefix, &combined)
        })
    };
    let stderr_handle = {
        let combined = Arc::clone(&combined);
        thread::spawn(move || {
            tee_stream(stderr, StreamTarget::Stderr, style.color, prefix, &combined)
        })
    };

    let status = child.wait().context("wait for child")?;
    let stdout = join_reader(stdout_handle)?;
    let stderr = join_reader(stderr_handle)?;
    let combined = Arc::try_unwrap(combined)
        .map_err(|_| anyhow!("combined buffer still shared after readers joined"))?
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);

    Ok(CaptureOutcome {
        status_ok: status.success(),
        status_display: match status.code() {
            Some(code) => format!("status {code}"),
            None => "a signal".to_string(),
        },
        stdout,
        stderr,
        combined,
    })
}

#[derive(Clone, Copy)]
enum StreamTarget {
    Stdout,
    Stderr,
}

/// Drain one pipe line-by-line, mirroring each line to the console and
/// appending it to the per-stream and combined buffers.
///
/// Line order within a stream is preserved. The verbose prefix and color
/// are console-only; the archived buffers get the raw line.
fn tee_stream<R: Read>(
    reader: R,
    target: StreamTarget,
    color: Option<Color>,
    prefix: Option<String>,
    combined: &Mutex<String>,
) -> String {
    let mut buf_reader = BufReader::new(reader);
    let mut captured = String::new();
    loop {
        let mut raw = Vec::new();
        let n = match buf_reader.read_until(b'\n', &mut raw) {
            Ok(n) => n,
            Err(error) => {
                warn!(%error, "read from child pipe failed");
                break;
            }
        };
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        captured.push_str(&line);
        combined
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(&line);
        mirror_line(target, color, prefix.as_deref(), &line);
    }
    captured
}

/// Write one captured line to the program's own stdout or stderr so a
/// human can watch concurrent tasks live.
fn mirror_line(target: StreamTarget, color: Option<Color>, prefix: Option<&str>, line: &str) {
    let mut shown = String::new();
    if let Some(prefix) = prefix {
        shown.push_str(prefix);
        shown.push_str(": ");
    }
    shown.push_str(line.trim_end_matches('\n'));
    let rendered = match color {
        Some(color) => color.paint(&shown),
        None => shown,
    };
    match target {
        StreamTarget::Stdout => {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{rendered}");
        }
        StreamTarget::Stderr => {
            let mut out = std::io::stderr().lock();
            let _ = writeln!(out, "{rendered}");
        }
    }
}

fn console_line(color: Option<Color>, line: &str) {
    let rendered = match color {
        Some(color) => color.paint(line),
        None => line.to_string(),
    };
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{rendered}");
}

fn join_reader(handle: JoinHandle<String>) -> Result<String> {
    handle
        .join()
        .map_err(|_| anyhow!("stream reader thread panicked"))
}
