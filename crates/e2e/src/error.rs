//! Error types for the flow engine

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::DriverError;

/// Infrastructure and loading errors.
///
/// These never describe a step outcome; a failing step is a [`StepError`]
/// recorded in the scenario report.
#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Malformed scenario '{scenario}': {reason}")]
    MalformedScenario { scenario: String, reason: String },

    #[error("Malformed scenario '{scenario}', step {step}: {reason}")]
    MalformedStep {
        scenario: String,
        step: usize,
        reason: String,
    },

    #[error("WebDriver server failed to start: {0}")]
    DriverStartup(String),

    #[error("Readiness check for {url} failed after {attempts} attempts")]
    NotReady { url: String, attempts: usize },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Why a scenario run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    MalformedScenario,
    ElementNotFound,
    AssertionTimeout,
    UnexpectedDialog,
    DialogMismatch,
    DriverFailure,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::MalformedScenario => "MalformedScenario",
            FailureKind::ElementNotFound => "ElementNotFound",
            FailureKind::AssertionTimeout => "AssertionTimeout",
            FailureKind::UnexpectedDialog => "UnexpectedDialog",
            FailureKind::DialogMismatch => "DialogMismatch",
            FailureKind::DriverFailure => "DriverFailure",
            FailureKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// A step failure with enough context to diagnose it from the report alone.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: FailureKind,
    pub message: String,
    /// The condition the step was waiting for
    pub expected: Option<String>,
    /// Last state seen before giving up
    pub observed: Option<String>,
}

impl StepError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expected: None,
            observed: None,
        }
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn observed(mut self, observed: impl Into<String>) -> Self {
        self.observed = Some(observed.into());
        self
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedScenario, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, message)
    }
}

impl From<DriverError> for StepError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::DialogOpen(text) => {
                StepError::new(FailureKind::UnexpectedDialog, "a dialog blocked the page")
                    .observed(text)
            }
            other => StepError::new(FailureKind::DriverFailure, other.to_string()),
        }
    }
}
