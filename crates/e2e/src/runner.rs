//! Suite runner: one fresh session and context per scenario, bounded
//! concurrency, per-scenario timeout and external cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{E2eConfig, RunSettings};
use crate::driver::{Driver, DriverFactory};
use crate::error::{E2eResult, FailureKind, StepError};
use crate::executor::{RunState, ScenarioRun};
use crate::report::{ScenarioReport, SuiteReport};
use crate::spec::Scenario;

/// Runs scenarios against sessions opened from a [`DriverFactory`]
pub struct SuiteRunner {
    factory: Arc<dyn DriverFactory>,
    settings: RunSettings,
    concurrency: usize,
    scenario_timeout: Duration,
    screenshot_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl SuiteRunner {
    pub fn new(factory: Arc<dyn DriverFactory>, settings: RunSettings) -> Self {
        Self {
            factory,
            settings,
            concurrency: 1,
            scenario_timeout: Duration::from_secs(120),
            screenshot_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a runner with settings taken from the configuration
    pub fn from_config(config: &E2eConfig, factory: Arc<dyn DriverFactory>) -> E2eResult<Self> {
        let runner = Self::new(factory, config.run_settings()?)
            .with_concurrency(config.concurrency)
            .with_scenario_timeout(config.scenario_timeout());
        Ok(if config.screenshot_on_failure {
            runner.with_screenshots(config.output_dir.join("screenshots"))
        } else {
            runner
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_scenario_timeout(mut self, timeout: Duration) -> Self {
        self.scenario_timeout = timeout;
        self
    }

    /// Save a screenshot into `dir` when a scenario fails
    pub fn with_screenshots(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    /// Cancelling this token aborts running scenarios and skips pending ones
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a list of scenarios; reports keep the input order
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();

        info!("Running {} scenario(s)...", scenarios.len());

        let reports: Vec<ScenarioReport> = stream::iter(scenarios)
            .map(|scenario| self.run_scenario(scenario))
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = SuiteReport::new(started_at, start.elapsed().as_millis() as u64, reports);

        info!("");
        info!(
            "Results: {} passed, {} failed ({} ms)",
            report.passed, report.failed, report.duration_ms
        );
        report
    }

    /// Run a single scenario on its own session.
    ///
    /// The session is closed before this returns, whatever the outcome.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        let start = Instant::now();

        if self.cancel.is_cancelled() {
            let report = ScenarioReport::failed(
                &scenario.name,
                None,
                StepError::cancelled("suite cancelled before the scenario started"),
                0,
                Vec::new(),
            );
            warn!("✗ {} - {}", scenario.name, report.summary());
            return report;
        }

        let mut driver = match self.factory.open().await {
            Ok(driver) => driver,
            Err(e) => {
                let report = ScenarioReport::failed(
                    &scenario.name,
                    None,
                    StepError::new(FailureKind::DriverFailure, format!("could not open session: {}", e)),
                    start.elapsed().as_millis() as u64,
                    Vec::new(),
                );
                error!("✗ {} - {}", scenario.name, report.summary());
                return report;
            }
        };

        let mut run = ScenarioRun::new(scenario, &self.settings);
        let aborted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Some("scenario cancelled".to_string()),
            result = tokio::time::timeout(self.scenario_timeout, run.execute(driver.as_mut())) => {
                match result {
                    Ok(_) => None,
                    Err(_) => Some(format!("scenario timed out after {:?}", self.scenario_timeout)),
                }
            }
        };
        if let Some(reason) = aborted {
            run.cancel(&reason);
        }

        let (state, records) = run.into_parts();
        let duration_ms = start.elapsed().as_millis() as u64;
        let mut report = match state {
            RunState::Passed => ScenarioReport::passed(&scenario.name, duration_ms, records),
            RunState::Failed { step, error } => {
                ScenarioReport::failed(&scenario.name, step, error, duration_ms, records)
            }
            RunState::Idle | RunState::Running(_) => ScenarioReport::failed(
                &scenario.name,
                None,
                StepError::cancelled("run ended without a verdict"),
                duration_ms,
                records,
            ),
        };

        if !report.is_passed() {
            if let Some(dir) = &self.screenshot_dir {
                report.screenshot = capture(driver.as_mut(), dir, &scenario.name).await;
            }
        }

        if let Err(e) = driver.close().await {
            warn!("Failed to close session for '{}': {}", scenario.name, e);
        }

        if report.is_passed() {
            info!("✓ {} ({} ms)", report.name, report.duration_ms);
        } else {
            error!("✗ {} - {}", report.name, report.summary());
        }
        report
    }
}

async fn capture(driver: &mut dyn Driver, dir: &Path, scenario: &str) -> Option<PathBuf> {
    let png = match driver.screenshot().await {
        Ok(Some(png)) => png,
        Ok(None) => return None,
        Err(e) => {
            debug!("No failure screenshot for '{}': {}", scenario, e);
            return None;
        }
    };
    let path = dir.join(format!("{}.png", slug(scenario)));
    let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, png));
    match written {
        Ok(()) => Some(path),
        Err(e) => {
            warn!("Could not save screenshot {}: {}", path.display(), e);
            None
        }
    }
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
