//! Fixed-width test transcript sections.
//!
//! Rendering is pure; [`Reporter`] forwards rendered sections to tracing and
//! to the per-test log.

use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

use crate::logging::TestLog;

pub const REPORT_WIDTH: usize = 80;

/// `fill msg fill` centred in `width` columns.
///
/// `fill` is `sep` repeated `N = max((width - len(msg) - 2) / (2 * len(sep)), 1)`
/// times; one more trimmed `sep` is appended when it still fits.
pub fn add_sep(sep: &str, msg: &str, width: usize) -> String {
    let sep_len = sep.chars().count().max(1);
    let msg_len = msg.chars().count();
    let n = (width.saturating_sub(msg_len + 2) / (2 * sep_len)).max(1);
    let fill = sep.repeat(n);

    let mut line = format!("{} {} {}", fill, msg, fill);
    let tail = sep.trim_end();
    if line.chars().count() + tail.chars().count() <= width {
        line.push_str(tail);
    }
    line
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Setup,
    Call,
    Teardown,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Setup => "SETUP",
            Phase::Call => "TEST",
            Phase::Teardown => "TEARDOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
    /// Marked as expected to fail, and it did
    ExpectedFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// One finished test phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEvent {
    pub phase: Phase,
    pub outcome: Outcome,
    /// Test name shown above the failure text
    pub location: String,
    /// Failure text, only rendered for `Outcome::Failed`
    pub failure: Option<String>,
}

/// A block of transcript text and the level it is emitted at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub level: Level,
    pub text: String,
}

fn status(outcome: Outcome) -> (&'static str, Level) {
    match outcome {
        Outcome::Passed => ("PASSED", Level::Info),
        Outcome::ExpectedFailure => ("PASSED", Level::Warning),
        Outcome::Failed => ("FAILED", Level::Error),
        Outcome::Skipped => ("SKIPPED", Level::Warning),
    }
}

/// Session header for one test.
pub fn render_headline(test_id: &str, workspace: &Path) -> Vec<String> {
    let rootdir = std::env::current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    vec![
        add_sep("=", "Test session starts", REPORT_WIDTH),
        format!(
            "platform {} -- {}-{}",
            std::env::consts::OS,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
        format!("rootdir: {}", rootdir),
        format!("workspace: {}", workspace.display()),
        format!("\n{}\n", add_sep("=", test_id, REPORT_WIDTH)),
    ]
}

/// Status banner for a finished phase, plus location, failure text and a
/// closing rule when the phase failed.
pub fn render_status(event: &TestEvent) -> Vec<Section> {
    let (label, level) = status(event.outcome);
    let banner = add_sep(
        "=",
        &format!("{} {}", event.phase.label(), label),
        REPORT_WIDTH,
    );

    let mut sections = vec![Section {
        level,
        text: format!("\n{}\n", banner),
    }];

    if event.outcome == Outcome::Failed {
        sections.push(Section {
            level: Level::Info,
            text: format!(
                "{}\n{}",
                add_sep("_", &event.location, REPORT_WIDTH),
                event.failure.as_deref().unwrap_or_default()
            ),
        });
        sections.push(Section {
            level,
            text: "=".repeat(REPORT_WIDTH),
        });
    }
    sections
}

/// Emits transcript sections through tracing and, when attached, the test log.
#[derive(Clone, Default)]
pub struct Reporter {
    log: Option<TestLog>,
}

impl Reporter {
    pub fn new(log: Option<TestLog>) -> Self {
        Self { log }
    }

    pub fn headline(&self, test_id: &str, workspace: &Path) {
        for line in render_headline(test_id, workspace) {
            self.emit(Level::Info, &line);
        }
    }

    pub fn status(&self, event: &TestEvent) {
        for section in render_status(event) {
            self.emit(section.level, &section.text);
        }
    }

    fn emit(&self, level: Level, text: &str) {
        match level {
            Level::Info => info!(target: "reporter", "{}", text),
            Level::Warning => warn!(target: "reporter", "{}", text),
            Level::Error => error!(target: "reporter", "{}", text),
        }
        if let Some(log) = &self.log {
            log.log_raw(text);
        }
    }
}
