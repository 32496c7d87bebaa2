//! Post-condition checks.
//!
//! Each assertion polls the live page until it holds or its timeout passes.
//! Failures are `AssertionTimeout` with the expected condition and the last
//! state observed.

use std::time::Duration;

use crate::driver::Driver;
use crate::error::{FailureKind, StepError};
use crate::locate::{self, LocateFailure, Located};
use crate::spec::Locator;
use crate::wait::Deadline;

pub struct AssertionEngine {
    interval: Duration,
}

impl AssertionEngine {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// A matching element exists and is visible
    pub async fn visible(
        &self,
        driver: &mut dyn Driver,
        target: &Locator,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let expected = format!("{} visible", target);
        match locate::wait_for(driver, target, true, timeout, self.interval).await {
            Ok(_) => Ok(()),
            Err(failure) => Err(timeout_error(failure, expected, timeout)),
        }
    }

    /// No matching element is visible, whether it never existed or was removed
    pub async fn absent(
        &self,
        driver: &mut dyn Driver,
        target: &Locator,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let expected = format!("{} absent", target);
        match locate::wait_for_absence(driver, target, timeout, self.interval).await {
            Ok(()) => Ok(()),
            Err(failure) => Err(timeout_error(failure, expected, timeout)),
        }
    }

    /// The current URL contains `fragment`; returns the URL that matched
    pub async fn url_contains(
        &self,
        driver: &mut dyn Driver,
        fragment: &str,
        timeout: Duration,
    ) -> Result<String, StepError> {
        let deadline = Deadline::after(timeout, self.interval);
        loop {
            let url = driver.current_url().await?;
            if url.contains(fragment) {
                return Ok(url);
            }
            if !deadline.tick().await {
                return Err(StepError::new(
                    FailureKind::AssertionTimeout,
                    format!("url did not contain {:?} within {:?}", fragment, timeout),
                )
                .expected(format!("url containing {:?}", fragment))
                .observed(url));
            }
        }
    }

    /// A form control's value equals `value`
    pub async fn value_equals(
        &self,
        driver: &mut dyn Driver,
        target: &Locator,
        value: &str,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let expected = format!("{} with value {:?}", target, value);
        let deadline = Deadline::after(timeout, self.interval);
        loop {
            let observed = match locate::locate_once(driver, target, false).await? {
                Located::Found(element) => match driver.element_value(&element).await {
                    Ok(Some(current)) if current == value => return Ok(()),
                    Ok(Some(current)) => format!("value {:?}", current),
                    Ok(None) => "element has no value".to_string(),
                    Err(e) if e.is_transient() => e.to_string(),
                    Err(e) => return Err(e.into()),
                },
                Located::NotYet(observed) | Located::Unsettled(observed) => observed,
            };
            if !deadline.tick().await {
                return Err(StepError::new(
                    FailureKind::AssertionTimeout,
                    format!("value not observed within {:?}", timeout),
                )
                .expected(expected)
                .observed(observed));
            }
        }
    }
}

fn timeout_error(failure: LocateFailure, expected: String, timeout: Duration) -> StepError {
    match failure {
        LocateFailure::Timeout(observed) => StepError::new(
            FailureKind::AssertionTimeout,
            format!("condition not met within {:?}", timeout),
        )
        .expected(expected)
        .observed(observed),
        LocateFailure::Driver(e) => e.into(),
    }
}
