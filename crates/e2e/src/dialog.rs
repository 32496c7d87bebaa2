//! Native dialog interception.
//!
//! An `expect_dialog` step arms a one-shot expectation. Action steps that run
//! afterwards hand control back here; the first dialog that opens is answered
//! and its message compared with the expectation. Dialogs nobody armed for
//! are accepted, or rejected as unexpected in strict mode.
//!
//! A dialog may also open later, while another step is polling. Steps talk to
//! the browser through [`InterceptedDriver`], which answers such a dialog the
//! same way and then repeats the blocked command.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::driver::{By, Driver, DriverError, DriverResult, ElementRef};
use crate::error::{FailureKind, StepError};
use crate::wait::Deadline;

/// An armed, not yet consumed expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogExpectation {
    /// Index of the `expect_dialog` step
    pub step: usize,
    pub text: String,
    pub accept: bool,
}

#[derive(Debug)]
pub struct DialogInterceptor {
    armed: Option<DialogExpectation>,
    strict: bool,
    timeout: Duration,
    interval: Duration,
}

impl DialogInterceptor {
    pub fn new(strict: bool, timeout: Duration, interval: Duration) -> Self {
        Self {
            armed: None,
            strict,
            timeout,
            interval,
        }
    }

    pub fn armed(&self) -> Option<&DialogExpectation> {
        self.armed.as_ref()
    }

    /// Register the expectation before the triggering action runs
    pub fn arm(&mut self, step: usize, text: String, accept: bool) -> Result<(), StepError> {
        if let Some(previous) = &self.armed {
            return Err(StepError::new(
                FailureKind::AssertionTimeout,
                format!(
                    "dialog expected since step {} never appeared before the next expectation",
                    previous.step
                ),
            )
            .expected(format!("dialog \"{}\"", previous.text))
            .observed("no dialog"));
        }
        debug!("Armed dialog expectation at step {}: {:?}", step, text);
        self.armed = Some(DialogExpectation { step, text, accept });
        Ok(())
    }

    /// Check for a dialog after an action step.
    ///
    /// With `wait` set and an expectation armed, polls up to the dialog
    /// timeout; otherwise checks once.
    pub async fn after_action(&mut self, driver: &mut dyn Driver, wait: bool) -> Result<(), StepError> {
        let message = if wait && self.armed.is_some() {
            self.wait_for_dialog(driver).await?
        } else {
            driver.pending_dialog().await?
        };
        match message {
            Some(message) => self.handle(driver, message).await,
            None => Ok(()),
        }
    }

    /// End of scenario: an expectation still armed must be met now
    pub async fn finish(&mut self, driver: &mut dyn Driver) -> Result<(), StepError> {
        let Some(expectation) = self.armed.clone() else {
            return Ok(());
        };
        match self.wait_for_dialog(driver).await? {
            Some(message) => self.handle(driver, message).await,
            None => {
                self.armed = None;
                Err(StepError::new(
                    FailureKind::AssertionTimeout,
                    format!("no dialog appeared after step {}", expectation.step),
                )
                .expected(format!("dialog \"{}\"", expectation.text))
                .observed("no dialog"))
            }
        }
    }

    async fn wait_for_dialog(&self, driver: &mut dyn Driver) -> Result<Option<String>, StepError> {
        let deadline = Deadline::after(self.timeout, self.interval);
        loop {
            if let Some(message) = driver.pending_dialog().await? {
                return Ok(Some(message));
            }
            if !deadline.tick().await {
                return Ok(None);
            }
        }
    }

    pub(crate) async fn handle(&mut self, driver: &mut dyn Driver, message: String) -> Result<(), StepError> {
        match self.armed.take() {
            Some(expectation) => {
                driver.answer_dialog(expectation.accept).await?;
                if message == expectation.text {
                    debug!("Dialog matched expectation from step {}", expectation.step);
                    Ok(())
                } else {
                    Err(StepError::new(
                        FailureKind::DialogMismatch,
                        format!("dialog text differs from step {} expectation", expectation.step),
                    )
                    .expected(expectation.text)
                    .observed(message))
                }
            }
            None if self.strict => {
                driver.answer_dialog(false).await?;
                Err(StepError::new(FailureKind::UnexpectedDialog, "dialog opened without expect_dialog")
                    .observed(message))
            }
            None => {
                warn!("Accepting dialog nobody expected: {:?}", message);
                driver.answer_dialog(true).await?;
                Ok(())
            }
        }
    }
}


/// A session whose commands survive dialogs opening at any time.
///
/// When a command is blocked by an open dialog, the dialog goes through the
/// interceptor and the command is sent again. A dialog the interceptor
/// rejects is kept as the step failure and the command reports the dialog.
pub struct InterceptedDriver<'a> {
    inner: &'a mut dyn Driver,
    dialogs: DialogInterceptor,
    failure: Option<StepError>,
}

macro_rules! intercepted {
    ($self:ident, $call:expr) => {
        loop {
            match $call {
                Err(DriverError::DialogOpen(message)) => $self.intercept(message).await?,
                other => break other,
            }
        }
    };
}

impl<'a> InterceptedDriver<'a> {
    pub fn new(inner: &'a mut dyn Driver, dialogs: DialogInterceptor) -> Self {
        Self {
            inner,
            dialogs,
            failure: None,
        }
    }

    pub fn dialogs(&self) -> &DialogInterceptor {
        &self.dialogs
    }

    pub fn arm(&mut self, step: usize, text: String, accept: bool) -> Result<(), StepError> {
        self.dialogs.arm(step, text, accept)
    }

    pub async fn after_action(&mut self, wait: bool) -> Result<(), StepError> {
        self.dialogs.after_action(&mut *self.inner, wait).await
    }

    pub async fn finish(&mut self) -> Result<(), StepError> {
        self.dialogs.finish(&mut *self.inner).await
    }

    /// Failure raised by a dialog met while a command was blocked
    pub fn take_failure(&mut self) -> Option<StepError> {
        self.failure.take()
    }

    async fn intercept(&mut self, reported: String) -> DriverResult<()> {
        if self.failure.is_some() {
            return Err(DriverError::DialogOpen(reported));
        }
        // Gone already: just retry the command
        let Some(message) = self.inner.pending_dialog().await? else {
            return Ok(());
        };
        debug!("Command blocked by dialog {:?}", message);
        match self.dialogs.handle(&mut *self.inner, message.clone()).await {
            Ok(()) => Ok(()),
            Err(failure) => {
                self.failure = Some(failure);
                Err(DriverError::DialogOpen(message))
            }
        }
    }
}

#[async_trait]
impl<'a> Driver for InterceptedDriver<'a> {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        intercepted!(self, self.inner.navigate(url).await)
    }

    async fn find_elements(&mut self, by: &By) -> DriverResult<Vec<ElementRef>> {
        intercepted!(self, self.inner.find_elements(by).await)
    }

    async fn find_elements_in(&mut self, scope: &ElementRef, by: &By) -> DriverResult<Vec<ElementRef>> {
        intercepted!(self, self.inner.find_elements_in(scope, by).await)
    }

    async fn is_displayed(&mut self, element: &ElementRef) -> DriverResult<bool> {
        intercepted!(self, self.inner.is_displayed(element).await)
    }

    async fn element_text(&mut self, element: &ElementRef) -> DriverResult<String> {
        intercepted!(self, self.inner.element_text(element).await)
    }

    async fn element_value(&mut self, element: &ElementRef) -> DriverResult<Option<String>> {
        intercepted!(self, self.inner.element_value(element).await)
    }

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()> {
        intercepted!(self, self.inner.click(element).await)
    }

    async fn clear(&mut self, element: &ElementRef) -> DriverResult<()> {
        intercepted!(self, self.inner.clear(element).await)
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> DriverResult<()> {
        intercepted!(self, self.inner.type_text(element, text).await)
    }

    async fn attach_file(&mut self, element: &ElementRef, path: &Path) -> DriverResult<()> {
        intercepted!(self, self.inner.attach_file(element, path).await)
    }

    async fn attached_file_count(&mut self, element: &ElementRef) -> DriverResult<usize> {
        intercepted!(self, self.inner.attached_file_count(element).await)
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        intercepted!(self, self.inner.current_url().await)
    }

    async fn pending_dialog(&mut self) -> DriverResult<Option<String>> {
        self.inner.pending_dialog().await
    }

    async fn answer_dialog(&mut self, accept: bool) -> DriverResult<()> {
        self.inner.answer_dialog(accept).await
    }

    async fn screenshot(&mut self) -> DriverResult<Option<Vec<u8>>> {
        self.inner.screenshot().await
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.inner.close().await
    }
}
