use crate::error::StepError;
use ansi_term::Colour::{Green, Purple, Red, Yellow};
use ascii_table::AsciiTable;
use chrono::{DateTime, Utc};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Planned but not attempted.
    Pending,
    Succeeded,
    Failed,
    /// The object was already in place and left untouched.
    Skipped,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Pending => "not attempted",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped (already exists)",
        }
    }

    /// Succeeded or skipped: the object is in the expected state.
    pub fn is_done(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Skipped)
    }

    fn paint(&self, color: bool) -> String {
        if !color {
            return self.label().to_string();
        }

        match self {
            StepStatus::Pending => Yellow.paint(self.label()).to_string(),
            StepStatus::Succeeded => Green.paint(self.label()).to_string(),
            StepStatus::Failed => Red.paint(self.label()).to_string(),
            StepStatus::Skipped => Purple.paint(self.label()).to_string(),
        }
    }
}

/// Outcome of one step. Never changed once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub id: String,
    pub status: StepStatus,
    pub error: Option<StepError>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl StepResult {
    fn new(id: &str, status: StepStatus, error: Option<StepError>, detail: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            status,
            error,
            detail,
            at: Utc::now(),
        }
    }

    pub fn succeeded(id: &str, detail: impl Into<String>) -> Self {
        Self::new(id, StepStatus::Succeeded, None, Some(detail.into()))
    }

    pub fn skipped(id: &str, detail: impl Into<String>) -> Self {
        Self::new(id, StepStatus::Skipped, None, Some(detail.into()))
    }

    pub fn failed(id: &str, error: StepError) -> Self {
        Self::new(id, StepStatus::Failed, Some(error), None)
    }

    pub fn pending(id: &str, reason: impl Into<String>) -> Self {
        Self::new(id, StepStatus::Pending, None, Some(reason.into()))
    }

    /// Human-readable outcome detail.
    pub fn describe(&self) -> String {
        match (&self.error, &self.detail) {
            (Some(error), _) => format!("{}: {}", error.kind(), error),
            (None, Some(detail)) => detail.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Ordered, append-only log of one run: provisioning results followed by
/// verification results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    results: Vec<StepResult>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: StepResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn get(&self, id: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.id == id)
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.get(id).map(|r| r.status)
    }

    /// Append a pending result for every planned id that has none yet.
    pub fn fill_pending(&mut self, planned: &[String], reason: &str) {
        for id in planned {
            if self.get(id).is_none() {
                self.push(StepResult::pending(id, reason));
            }
        }
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// True only if every step succeeded or was skipped.
    pub fn is_success(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.status.is_done())
    }

    pub fn has_failures(&self) -> bool {
        self.count(StepStatus::Failed) > 0
    }
}

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every step succeeded or was skipped.
    Success,
    /// At least one step failed or was not attempted.
    StepFailed,
    /// Configuration or connection error before provisioning started.
    Setup,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::StepFailed => 1,
            ExitStatus::Setup => 2,
        }
    }
}

/// Renders a run report as a table with one line per planned step and a
/// final status line.
pub struct Reporter {
    color: bool,
    max_width: usize,
}

impl Reporter {
    pub fn new(color: bool) -> Self {
        // Get the terminal width
        let max_width = term_size::dimensions().map(|(w, _)| w).unwrap_or(120);

        Self {
            color,
            max_width: max_width.saturating_sub(5).max(40),
        }
    }

    pub fn with_max_width(mut self, max_width: usize) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn render(&self, report: &RunReport) -> String {
        let mut rows = vec![
            vec![
                "#".to_string(),
                "Step".to_string(),
                "Status".to_string(),
                "Detail".to_string(),
            ],
            vec![
                "---".to_string(),
                "---".to_string(),
                "---".to_string(),
                "---".to_string(),
            ],
        ];
        for (i, result) in report.results().iter().enumerate() {
            rows.push(vec![
                (i + 1).to_string(),
                result.id.clone(),
                result.status.paint(self.color),
                result.describe(),
            ]);
        }

        let mut table = AsciiTable::default();
        table.set_max_width(self.max_width);

        format!("{}\n{}", table.format(rows), self.summary_line(report))
    }

    fn summary_line(&self, report: &RunReport) -> String {
        let verdict = if report.is_success() {
            if self.color {
                Green.paint("SUCCESS").to_string()
            } else {
                "SUCCESS".to_string()
            }
        } else if self.color {
            Red.paint("FAILURE").to_string()
        } else {
            "FAILURE".to_string()
        };

        format!(
            "Result: {} - {} succeeded, {} skipped, {} failed, {} not attempted",
            verdict,
            report.count(StepStatus::Succeeded),
            report.count(StepStatus::Skipped),
            report.count(StepStatus::Failed),
            report.count(StepStatus::Pending),
        )
    }

    /// Print the summary to stdout.
    pub fn print(&self, report: &RunReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", self.render(report))?;
        stdout.flush()
    }
}
