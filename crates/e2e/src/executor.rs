//! Step execution for one scenario run

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::assertions::AssertionEngine;
use crate::config::RunSettings;
use crate::context::Context;
use crate::dialog::{DialogInterceptor, InterceptedDriver};
use crate::driver::{Driver, DriverResult, ElementRef};
use crate::error::{FailureKind, StepError};
use crate::locate::{self, LocateFailure, Located};
use crate::report::StepRecord;
use crate::spec::{Locator, Scenario, Step};
use crate::wait::Deadline;

/// Where a run is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(usize),
    Passed,
    Failed {
        /// None when the run failed outside any step
        step: Option<usize>,
        error: StepError,
    },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Passed | RunState::Failed { .. })
    }
}

/// What to do with an element once it has been located
#[derive(Debug, Clone)]
enum Interaction {
    Click,
    Type { text: String, clear_first: bool },
    Attach(PathBuf),
}

/// Executes one scenario's steps in order against a single session.
///
/// Owns the run's [`Context`]; nothing here outlives the run.
pub struct ScenarioRun<'a> {
    scenario: &'a Scenario,
    settings: &'a RunSettings,
    ctx: Context,
    assertions: AssertionEngine,
    state: RunState,
    records: Vec<StepRecord>,
}

impl<'a> ScenarioRun<'a> {
    pub fn new(scenario: &'a Scenario, settings: &'a RunSettings) -> Self {
        let timeouts = &settings.timeouts;
        Self {
            scenario,
            settings,
            ctx: Context::new(scenario),
            assertions: AssertionEngine::new(timeouts.poll_interval()),
            state: RunState::Idle,
            records: Vec::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn into_parts(self) -> (RunState, Vec<StepRecord>) {
        (self.state, self.records)
    }

    /// Run every step; stops at the first failure
    pub async fn execute(&mut self, driver: &mut dyn Driver) -> &RunState {
        let scenario = self.scenario;
        debug!("Running scenario '{}' (run {})", scenario.name, self.ctx.run_id());
        let timeouts = &self.settings.timeouts;
        let dialogs = DialogInterceptor::new(
            self.settings.strict_dialogs,
            timeouts.dialog(),
            timeouts.poll_interval(),
        );
        let mut driver = InterceptedDriver::new(driver, dialogs);

        for (index, step) in scenario.steps.iter().enumerate() {
            self.state = RunState::Running(index);
            let label = step.label();
            debug!("Step {}: {}", index, label);

            let start = Instant::now();
            let result = self.execute_step(&mut driver, index, step).await;
            // A dialog met mid-step explains whatever the command reported
            let result = match driver.take_failure() {
                Some(failure) => Err(failure),
                None => result,
            };
            self.records.push(StepRecord {
                index,
                label,
                setup: index < scenario.setup_len,
                duration_ms: start.elapsed().as_millis() as u64,
                success: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });

            if let Err(error) = result {
                self.state = RunState::Failed {
                    step: Some(index),
                    error,
                };
                return &self.state;
            }
        }

        let armed_at = driver.dialogs().armed().map(|e| e.step);
        if let Err(error) = driver.finish().await {
            self.state = RunState::Failed {
                step: armed_at,
                error,
            };
            return &self.state;
        }

        self.state = RunState::Passed;
        &self.state
    }

    /// Abort from outside; the step in progress becomes the failing step
    pub fn cancel(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        let step = match self.state {
            RunState::Running(index) => Some(index),
            _ => None,
        };
        if let Some(index) = step {
            if self.records.len() == index {
                self.records.push(StepRecord {
                    index,
                    label: self.scenario.steps[index].label(),
                    setup: index < self.scenario.setup_len,
                    duration_ms: 0,
                    success: false,
                    error: Some(reason.to_string()),
                });
            }
        }
        self.state = RunState::Failed {
            step,
            error: StepError::cancelled(reason),
        };
    }

    async fn execute_step(
        &mut self,
        driver: &mut InterceptedDriver<'_>,
        index: usize,
        step: &Step,
    ) -> Result<(), StepError> {
        let settings = self.settings;
        let timeouts = &settings.timeouts;
        let override_ms = step.timeout_ms().map(Duration::from_millis);
        let element_timeout = override_ms.unwrap_or_else(|| timeouts.element());
        let assertion_timeout = override_ms.unwrap_or_else(|| timeouts.assertion());

        match step {
            Step::Navigate { url } => {
                let url = self.resolve_url(&self.ctx.interpolate(url)?)?;
                driver.navigate(&url).await?;
                driver.after_action(true).await?;
                self.refresh_url(driver).await?;
            }
            Step::Fill {
                target,
                value,
                clear_first,
                ..
            } => {
                let target = self.ctx.interpolate_locator(target)?;
                let text = self.ctx.interpolate(value)?;
                let action = Interaction::Type {
                    text,
                    clear_first: *clear_first,
                };
                self.interact(driver, &target, true, element_timeout, &action).await?;
                driver.after_action(false).await?;
            }
            Step::Click { target, .. } => {
                let target = self.ctx.interpolate_locator(target)?;
                self.interact(driver, &target, true, element_timeout, &Interaction::Click)
                    .await?;
                driver.after_action(true).await?;
                self.refresh_url(driver).await?;
            }
            Step::SelectOption {
                trigger,
                option,
                listbox,
                option_selector,
                ..
            } => {
                let trigger = self.ctx.interpolate_locator(trigger)?;
                let option = self.ctx.interpolate(option)?;
                self.select_option(driver, &trigger, &option, listbox, option_selector, element_timeout)
                    .await?;
                driver.after_action(false).await?;
            }
            Step::UploadFile { target, fixture, .. } => {
                let target = self.ctx.interpolate_locator(target)?;
                self.upload(driver, &target, fixture, element_timeout).await?;
                driver.after_action(false).await?;
            }
            Step::AssertVisible { target, .. } => {
                let target = self.ctx.interpolate_locator(target)?;
                self.assertions.visible(driver, &target, assertion_timeout).await?;
            }
            Step::AssertAbsent { target, .. } => {
                let target = self.ctx.interpolate_locator(target)?;
                self.assertions.absent(driver, &target, assertion_timeout).await?;
            }
            Step::AssertUrlContains { fragment, timeout_ms } => {
                let fragment = self.ctx.interpolate(fragment)?;
                let timeout = timeout_ms.map(Duration::from_millis).unwrap_or_else(|| timeouts.url());
                let url = self.assertions.url_contains(driver, &fragment, timeout).await?;
                self.ctx.set_current_url(url);
            }
            Step::AssertValue { target, value, .. } => {
                let target = self.ctx.interpolate_locator(target)?;
                let value = self.ctx.interpolate(value)?;
                self.assertions
                    .value_equals(driver, &target, &value, assertion_timeout)
                    .await?;
            }
            Step::ExpectDialog { text, dismiss } => {
                let text = self.ctx.interpolate(text)?;
                driver.arm(index, text, !dismiss)?;
            }
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            Step::Log { message } => {
                info!("[{}] {}", self.scenario.name, self.ctx.interpolate(message)?);
            }
        }
        Ok(())
    }

    fn resolve_url(&self, raw: &str) -> Result<String, StepError> {
        if let Ok(url) = Url::parse(raw) {
            return Ok(url.to_string());
        }
        let base = self.settings.base_url.as_ref().ok_or_else(|| {
            StepError::malformed(format!("relative url {:?} needs a configured base_url", raw))
        })?;
        base.join(raw)
            .map(|u| u.to_string())
            .map_err(|e| StepError::malformed(format!("cannot join {:?} onto {}: {}", raw, base, e)))
    }

    async fn refresh_url(&mut self, driver: &mut dyn Driver) -> Result<(), StepError> {
        let url = driver.current_url().await?;
        self.ctx.set_current_url(url);
        Ok(())
    }

    /// Locate, then act. A reference that goes stale before the action is
    /// located again within the same deadline.
    async fn interact(
        &self,
        driver: &mut dyn Driver,
        target: &Locator,
        require_visible: bool,
        timeout: Duration,
        action: &Interaction,
    ) -> Result<(), StepError> {
        let deadline = Deadline::after(timeout, self.settings.timeouts.poll_interval());
        loop {
            let observed = match locate::locate_once(driver, target, require_visible).await? {
                Located::Found(element) => match perform(driver, &element, action).await {
                    Ok(()) => return Ok(()),
                    Err(e) if e.is_transient() => format!("element replaced before the action ({})", e),
                    Err(e) => return Err(e.into()),
                },
                Located::NotYet(observed) | Located::Unsettled(observed) => observed,
            };
            if !deadline.tick().await {
                return Err(StepError::new(
                    FailureKind::ElementNotFound,
                    format!("no usable element within {:?}", timeout),
                )
                .expected(target.to_string())
                .observed(observed));
            }
        }
    }

    /// Open the trigger, pick the option, then re-locate the trigger and
    /// confirm it shows the choice. The check never reuses the pre-selection
    /// reference because the trigger may be re-rendered.
    async fn select_option(
        &self,
        driver: &mut dyn Driver,
        trigger: &Locator,
        option: &str,
        listbox: &str,
        option_selector: &str,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let interval = self.settings.timeouts.poll_interval();

        self.interact(driver, trigger, true, timeout, &Interaction::Click).await?;

        let list = Locator::css(listbox);
        if let Err(failure) = locate::wait_for(driver, &list, true, timeout, interval).await {
            return Err(match failure {
                LocateFailure::Timeout(observed) => StepError::new(
                    FailureKind::ElementNotFound,
                    "options list did not open",
                )
                .expected(format!("{} visible", list))
                .observed(observed),
                LocateFailure::Driver(e) => e.into(),
            });
        }

        let entry = Locator::css_with_text(option_selector, option);
        self.interact(driver, &entry, false, timeout, &Interaction::Click).await?;

        let deadline = Deadline::after(timeout, interval);
        loop {
            let observed = match locate::locate_once(driver, trigger, false).await? {
                Located::Found(element) => match driver.element_text(&element).await {
                    Ok(text) if text.contains(option) => return Ok(()),
                    Ok(text) => format!("trigger shows {:?}", text),
                    Err(e) if e.is_transient() => e.to_string(),
                    Err(e) => return Err(e.into()),
                },
                Located::NotYet(observed) | Located::Unsettled(observed) => observed,
            };
            if !deadline.tick().await {
                return Err(StepError::new(
                    FailureKind::AssertionTimeout,
                    "selection not reflected by the trigger",
                )
                .expected(format!("{} showing {:?}", trigger, option))
                .observed(observed));
            }
        }
    }

    async fn upload(
        &self,
        driver: &mut dyn Driver,
        target: &Locator,
        fixture: &Path,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let action = Interaction::Attach(fixture.to_path_buf());
        self.interact(driver, target, false, timeout, &action).await?;

        let deadline = Deadline::after(timeout, self.settings.timeouts.poll_interval());
        loop {
            let observed = match locate::locate_once(driver, target, false).await? {
                Located::Found(element) => match driver.attached_file_count(&element).await {
                    Ok(count) if count > 0 => return Ok(()),
                    Ok(_) => "file list is empty".to_string(),
                    Err(e) if e.is_transient() => e.to_string(),
                    Err(e) => return Err(e.into()),
                },
                Located::NotYet(observed) | Located::Unsettled(observed) => observed,
            };
            if !deadline.tick().await {
                return Err(StepError::new(FailureKind::AssertionTimeout, "file was not attached")
                    .expected(format!("{} holding {}", target, fixture.display()))
                    .observed(observed));
            }
        }
    }
}

async fn perform(driver: &mut dyn Driver, element: &ElementRef, action: &Interaction) -> DriverResult<()> {
    match action {
        Interaction::Click => driver.click(element).await,
        Interaction::Type { text, clear_first } => {
            if *clear_first {
                driver.clear(element).await?;
            }
            driver.type_text(element, text).await
        }
        Interaction::Attach(path) => driver.attach_file(element, path).await,
    }
}
