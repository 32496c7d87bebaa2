//! Element lookup with polling.
//!
//! Every attempt queries the page again. Element references are only used
//! within the attempt that produced them, so a node replaced between attempts
//! shows up as "not yet" instead of as a stale pass.

use std::time::Duration;

use crate::driver::{Driver, DriverError, ElementRef};
use crate::spec::Locator;
use crate::wait::Deadline;

/// Result of a single lookup pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    Found(ElementRef),
    /// Not satisfied; describes what the page showed
    NotYet(String),
    /// The DOM changed under the lookup; neither presence nor absence is known
    Unsettled(String),
}

/// Why a polling lookup gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateFailure {
    /// Deadline passed; last observation
    Timeout(String),
    Driver(DriverError),
}

impl From<DriverError> for LocateFailure {
    fn from(e: DriverError) -> Self {
        LocateFailure::Driver(e)
    }
}

/// One pass: query, filter by text, pick by position, check visibility
pub async fn locate_once(
    driver: &mut dyn Driver,
    locator: &Locator,
    require_visible: bool,
) -> Result<Located, DriverError> {
    match locate_inner(driver, locator, require_visible).await {
        Err(e) if e.is_transient() => Ok(Located::Unsettled(format!(
            "element changed while probing ({})",
            e
        ))),
        other => other,
    }
}

async fn locate_inner(
    driver: &mut dyn Driver,
    locator: &Locator,
    require_visible: bool,
) -> Result<Located, DriverError> {
    // Outermost scope first; each level searches inside the previous one
    let mut chain: Vec<&Locator> = locator.chain().collect();
    chain.reverse();
    let mut scopes: Option<Vec<ElementRef>> = None;
    for scope in &chain[..chain.len() - 1] {
        let found = matching(driver, scope, scopes.as_deref()).await?;
        let found = match position(scope, found.len()) {
            Some(index) => found.into_iter().nth(index).into_iter().collect(),
            None => found,
        };
        if found.is_empty() {
            return Ok(Located::NotYet(format!("no element matches scope {}", scope)));
        }
        scopes = Some(found);
    }

    let mut matches = matching(driver, locator, scopes.as_deref()).await?;
    if matches.is_empty() {
        return Ok(Located::NotYet("no matching element".to_string()));
    }
    let total = matches.len();

    match position(locator, total) {
        Some(index) => {
            let Some(element) = matches.into_iter().nth(index) else {
                return Ok(Located::NotYet(format!(
                    "{} matching element(s), no element at position {}",
                    total, index
                )));
            };
            if require_visible && !driver.is_displayed(&element).await? {
                return Ok(Located::NotYet(format!("element at position {} is hidden", index)));
            }
            Ok(Located::Found(element))
        }
        None if !require_visible => Ok(Located::Found(matches.remove(0))),
        None => {
            for element in matches {
                if driver.is_displayed(&element).await? {
                    return Ok(Located::Found(element));
                }
            }
            Ok(Located::NotYet(format!("{} matching element(s), none visible", total)))
        }
    }
}

/// Elements matching one level of a locator, inside `scopes` when given
async fn matching(
    driver: &mut dyn Driver,
    locator: &Locator,
    scopes: Option<&[ElementRef]>,
) -> Result<Vec<ElementRef>, DriverError> {
    let query = locator.query();
    let mut matches = match scopes {
        None => driver.find_elements(&query).await?,
        Some(scopes) => {
            let mut all = Vec::new();
            for scope in scopes {
                for element in driver.find_elements_in(scope, &query).await? {
                    if !all.contains(&element) {
                        all.push(element);
                    }
                }
            }
            all
        }
    };

    if locator.filters_by_text() {
        let needle = locator.text.as_deref().unwrap_or_default();
        let mut kept = Vec::with_capacity(matches.len());
        for element in matches {
            if driver.element_text(&element).await?.contains(needle) {
                kept.push(element);
            }
        }
        matches = kept;
    }
    Ok(matches)
}

fn position(locator: &Locator, total: usize) -> Option<usize> {
    match locator.index {
        Some(index) => Some(index),
        None if locator.last => total.checked_sub(1),
        None => None,
    }
}

/// Poll until the locator resolves or the timeout passes
pub async fn wait_for(
    driver: &mut dyn Driver,
    locator: &Locator,
    require_visible: bool,
    timeout: Duration,
    interval: Duration,
) -> Result<ElementRef, LocateFailure> {
    let deadline = Deadline::after(timeout, interval);
    loop {
        let observed = match locate_once(driver, locator, require_visible).await? {
            Located::Found(element) => return Ok(element),
            Located::NotYet(observed) | Located::Unsettled(observed) => observed,
        };
        if !deadline.tick().await {
            return Err(LocateFailure::Timeout(observed));
        }
    }
}

/// Poll until no visible element matches; never-present counts as absent
pub async fn wait_for_absence(
    driver: &mut dyn Driver,
    locator: &Locator,
    timeout: Duration,
    interval: Duration,
) -> Result<(), LocateFailure> {
    let deadline = Deadline::after(timeout, interval);
    loop {
        let observed = match locate_once(driver, locator, true).await? {
            Located::NotYet(_) => return Ok(()),
            Located::Found(_) => "element still visible".to_string(),
            Located::Unsettled(observed) => observed,
        };
        if !deadline.tick().await {
            return Err(LocateFailure::Timeout(observed));
        }
    }
}
