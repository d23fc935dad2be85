//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generation job record
///
/// Owned by the job manager in the runner; every other stage refers to a job
/// by its id only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub customer_id: String,
    pub workspace_id: String,
    pub template_id: String,
    pub output_name: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    pub file: Option<JobFile>,
    pub meta: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a running job from a spec
    pub fn new(id: impl Into<String>, spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            customer_id: spec.customer_id,
            workspace_id: spec.workspace_id,
            template_id: spec.template_id,
            output_name: spec.output_name,
            status: JobStatus::Running,
            logs: Vec::new(),
            steps: Vec::new(),
            file: None,
            meta: None,
            error: None,
            cancelled: false,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Generates a fresh job id
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Whether the job reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the job into a terminal status
    ///
    /// Returns `false` (and changes nothing) if the job is already terminal.
    pub fn finish(&mut self, status: JobStatus) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        self.completed_at = Some(now);
        true
    }

    /// Starts (or restarts) a named step
    pub fn start_step(&mut self, name: &str) {
        let now = Utc::now();
        match self.steps.iter_mut().find(|s| s.name == name) {
            Some(step) => {
                step.status = StepStatus::Start;
                step.started_at = now;
                step.ended_at = None;
                step.duration_ms = None;
            }
            None => self.steps.push(Step {
                name: name.to_string(),
                status: StepStatus::Start,
                started_at: now,
                ended_at: None,
                duration_ms: None,
            }),
        }
        self.updated_at = now;
    }

    /// Marks a named step as finished, creating it if it was never started
    pub fn complete_step(&mut self, name: &str) {
        let now = Utc::now();
        if !self.steps.iter().any(|s| s.name == name) {
            self.start_step(name);
        }
        if let Some(step) = self.steps.iter_mut().find(|s| s.name == name) {
            step.status = StepStatus::Ok;
            step.ended_at = Some(now);
            step.duration_ms = Some((now - step.started_at).num_milliseconds().max(0));
        }
        self.updated_at = now;
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
        self.updated_at = Utc::now();
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What the caller asks to generate
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub customer_id: String,
    pub workspace_id: String,
    pub template_id: String,
    pub output_name: Option<String>,
}

/// Output file recorded on a finished job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobFile {
    pub path: String,
    pub name: String,
}

/// One timed phase of a job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Start,
    Ok,
}
