//! Scenario and suite reports

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{E2eResult, FailureKind, StepError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioStatus {
    Passed,
    Failed,
}

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub label: String,
    /// Came from the suite's setup block
    pub setup: bool,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub status: ScenarioStatus,
    /// Index of the step that failed, when a step failed
    pub failing_step: Option<usize>,
    pub kind: Option<FailureKind>,
    pub message: Option<String>,
    pub expected: Option<String>,
    pub observed: Option<String>,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
    pub screenshot: Option<PathBuf>,
}

impl ScenarioReport {
    pub fn passed(name: &str, duration_ms: u64, steps: Vec<StepRecord>) -> Self {
        Self {
            name: name.to_string(),
            status: ScenarioStatus::Passed,
            failing_step: None,
            kind: None,
            message: None,
            expected: None,
            observed: None,
            duration_ms,
            steps,
            screenshot: None,
        }
    }

    pub fn failed(
        name: &str,
        failing_step: Option<usize>,
        error: StepError,
        duration_ms: u64,
        steps: Vec<StepRecord>,
    ) -> Self {
        Self {
            name: name.to_string(),
            status: ScenarioStatus::Failed,
            failing_step,
            kind: Some(error.kind),
            message: Some(error.message),
            expected: error.expected,
            observed: error.observed,
            duration_ms,
            steps,
            screenshot: None,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    /// One-line failure description
    pub fn summary(&self) -> String {
        match (self.status, self.kind) {
            (ScenarioStatus::Passed, _) => "passed".to_string(),
            (ScenarioStatus::Failed, kind) => {
                let mut out = kind.map(|k| k.to_string()).unwrap_or_else(|| "Failed".to_string());
                if let Some(step) = self.failing_step {
                    out.push_str(&format!(" at step {}", step));
                }
                if let Some(message) = &self.message {
                    out.push_str(&format!(": {}", message));
                }
                if let Some(expected) = &self.expected {
                    out.push_str(&format!(" (expected {}", expected));
                    if let Some(observed) = &self.observed {
                        out.push_str(&format!(", observed {}", observed));
                    }
                    out.push(')');
                }
                out
            }
        }
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn new(started_at: DateTime<Utc>, duration_ms: u64, scenarios: Vec<ScenarioReport>) -> Self {
        let passed = scenarios.iter().filter(|s| s.is_passed()).count();
        Self {
            started_at,
            total: scenarios.len(),
            passed,
            failed: scenarios.len() - passed,
            duration_ms,
            scenarios,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Write the report as pretty JSON into `dir/results.json`
    pub fn write_json(&self, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
