//! Per-run mutable state

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::StepError;
use crate::spec::{Locator, Scenario};

/// Variables every run defines
pub const BUILTIN_VARS: &[&str] = &["run_id"];

static VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid variable pattern"));

/// Names referenced as `${name}` in `s`
pub fn referenced_vars(s: &str) -> Vec<&str> {
    VAR_PATTERN
        .captures_iter(s)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// State owned by exactly one scenario run, dropped when the run ends.
#[derive(Debug, Clone)]
pub struct Context {
    run_id: String,
    vars: BTreeMap<String, String>,
    current_url: Option<String>,
}

impl Context {
    pub fn new(scenario: &Scenario) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let mut vars = scenario.vars.clone();
        vars.insert("run_id".to_string(), run_id.clone());
        Self {
            run_id,
            vars,
            current_url: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn set_current_url(&mut self, url: String) {
        self.current_url = Some(url);
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Store a value for later steps
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Replace `${name}` references with their values
    pub fn interpolate(&self, s: &str) -> Result<String, StepError> {
        if !s.contains("${") {
            return Ok(s.to_string());
        }
        let mut missing = None;
        let out = VAR_PATTERN.replace_all(s, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match self.vars.get(name) {
                Some(value) => value.clone(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(name) => Err(StepError::malformed(format!("undefined variable '{}'", name))),
            None => Ok(out.into_owned()),
        }
    }

    pub fn interpolate_locator(&self, locator: &Locator) -> Result<Locator, StepError> {
        locator.map_strings(|s| self.interpolate(s))
    }
}
