//! Scenario loading and validation
//!
//! A YAML file holds either one scenario:
//!
//! ```yaml
//! name: login-ok
//! steps:
//!   - action: navigate
//!     url: /login
//! ```
//!
//! or a suite whose `setup` steps run at the start of every scenario:
//!
//! ```yaml
//! name: pets
//! setup:
//!   - action: navigate
//!     url: /login
//! scenarios:
//!   - name: list-empty
//!     steps: [...]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::context::{referenced_vars, BUILTIN_VARS};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Locator, Scenario, Step};

/// One scenario as written, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

/// A step as written.
///
/// YAML steps are decoded one by one during validation so errors carry the
/// step index; steps built in code are already typed.
#[derive(Debug, Clone, PartialEq)]
pub enum StepDef {
    Yaml(serde_yaml::Value),
    Typed(Step),
}

impl StepDef {
    fn decode(&self) -> Result<Step, serde_yaml::Error> {
        match self {
            StepDef::Yaml(value) => serde_yaml::from_value(value.clone()),
            StepDef::Typed(step) => Ok(step.clone()),
        }
    }
}

impl<'de> Deserialize<'de> for StepDef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_yaml::Value::deserialize(deserializer).map(StepDef::Yaml)
    }
}

impl From<Step> for StepDef {
    fn from(step: Step) -> Self {
        StepDef::Typed(step)
    }
}

impl ScenarioDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step.into());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SuiteDef {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    vars: BTreeMap<String, String>,
    #[serde(default)]
    setup: Vec<StepDef>,
    scenarios: Vec<ScenarioDef>,
}

/// Turns definitions into executable, validated scenarios
#[derive(Debug, Clone)]
pub struct ScenarioLoader {
    fixtures_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(fixtures_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixtures_dir: fixtures_dir.into(),
        }
    }

    pub fn fixtures_dir(&self) -> &Path {
        &self.fixtures_dir
    }

    /// Parse a scenario or suite document
    pub fn from_yaml(&self, yaml: &str, source: Option<&Path>) -> E2eResult<Vec<Scenario>> {
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let label = source
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<inline>".to_string());

        let is_suite = doc
            .as_mapping()
            .map(|m| m.contains_key(&serde_yaml::Value::from("scenarios")))
            .unwrap_or(false);

        if !is_suite {
            let def: ScenarioDef = serde_yaml::from_value(doc)
                .map_err(|e| malformed(&label, e.to_string()))?;
            return Ok(vec![self.build(def, &[], source)?]);
        }

        let suite: SuiteDef =
            serde_yaml::from_value(doc).map_err(|e| malformed(&label, e.to_string()))?;
        if suite.scenarios.is_empty() {
            return Err(malformed(&suite.name, "suite has no scenarios"));
        }

        let mut scenarios = Vec::with_capacity(suite.scenarios.len());
        for mut def in suite.scenarios {
            if def.description.is_empty() {
                def.description = suite.description.clone();
            }
            for tag in &suite.tags {
                if !def.tags.contains(tag) {
                    def.tags.push(tag.clone());
                }
            }
            for (name, value) in &suite.vars {
                def.vars.entry(name.clone()).or_insert_with(|| value.clone());
            }
            scenarios.push(self.build(def, &suite.setup, source)?);
        }
        debug!("Loaded suite '{}' with {} scenario(s)", suite.name, scenarios.len());
        Ok(scenarios)
    }

    /// Parse a scenario file
    pub fn from_file(&self, path: &Path) -> E2eResult<Vec<Scenario>> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml(&content, Some(path))
    }

    /// Load all scenario files under a directory, in path order
    pub fn load_all(&self, dir: &Path) -> E2eResult<Vec<Scenario>> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        let mut scenarios: Vec<Scenario> = Vec::new();
        let mut names = HashSet::new();
        for file in files {
            for scenario in self.from_file(&file)? {
                if !names.insert(scenario.name.clone()) {
                    return Err(malformed(
                        &scenario.name,
                        format!("duplicate scenario name in {}", file.display()),
                    ));
                }
                scenarios.push(scenario);
            }
        }
        Ok(scenarios)
    }

    /// Validate a definition, prefixing the given setup steps
    pub fn build(
        &self,
        def: ScenarioDef,
        setup: &[StepDef],
        source: Option<&Path>,
    ) -> E2eResult<Scenario> {
        let name = def.name.trim().to_string();
        if name.is_empty() {
            return Err(malformed("<unnamed>", "scenario name is empty"));
        }
        if def.steps.is_empty() {
            return Err(malformed(&name, "scenario has no steps"));
        }
        for var in def.vars.keys() {
            if !is_identifier(var) {
                return Err(malformed(&name, format!("invalid variable name '{}'", var)));
            }
        }

        let mut steps = Vec::with_capacity(setup.len() + def.steps.len());
        for (index, raw) in setup.iter().chain(def.steps.iter()).enumerate() {
            let step = raw
                .decode()
                .map_err(|e| malformed_step(&name, index, e.to_string()))?;
            steps.push(self.check_step(&name, index, step, &def.vars)?);
        }

        for (index, step) in steps.iter().enumerate() {
            if matches!(step, Step::ExpectDialog { .. })
                && !steps[index + 1..].iter().any(Step::is_action)
            {
                return Err(malformed_step(
                    &name,
                    index,
                    "expect_dialog must precede the action that raises the dialog",
                ));
            }
        }

        Ok(Scenario {
            name,
            description: def.description,
            tags: def.tags,
            vars: def.vars,
            steps,
            setup_len: setup.len(),
            source: source.map(Path::to_path_buf),
        })
    }

    fn check_step(
        &self,
        scenario: &str,
        index: usize,
        step: Step,
        vars: &BTreeMap<String, String>,
    ) -> E2eResult<Step> {
        for locator in step.locators().into_iter().flat_map(Locator::chain) {
            if locator.is_empty() {
                return Err(malformed_step(scenario, index, "locator needs a css selector or text"));
            }
            if locator.last && locator.index.is_some() {
                return Err(malformed_step(scenario, index, "locator sets both index and last"));
            }
        }

        for field in step.strings() {
            for var in referenced_vars(field) {
                if !vars.contains_key(var) && !BUILTIN_VARS.contains(&var) {
                    return Err(malformed_step(
                        scenario,
                        index,
                        format!("undeclared variable '{}'", var),
                    ));
                }
            }
        }

        match step {
            Step::Navigate { ref url } if url.trim().is_empty() => {
                Err(malformed_step(scenario, index, "navigate needs a url"))
            }
            Step::SelectOption { ref option, .. } if option.is_empty() => {
                Err(malformed_step(scenario, index, "select_option needs an option"))
            }
            Step::UploadFile { target, fixture, timeout_ms } => {
                let resolved = self
                    .resolve_fixture(&fixture)
                    .map_err(|reason| malformed_step(scenario, index, reason))?;
                Ok(Step::UploadFile {
                    target,
                    fixture: resolved,
                    timeout_ms,
                })
            }
            other => Ok(other),
        }
    }

    /// Resolve a fixture path inside the fixtures directory
    pub fn resolve_fixture(&self, fixture: &Path) -> Result<PathBuf, String> {
        if fixture.as_os_str().is_empty() {
            return Err("upload_file needs a fixture".to_string());
        }
        let escapes = fixture
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(format!(
                "fixture '{}' must be a relative path inside the fixtures directory",
                fixture.display()
            ));
        }
        let path = self.fixtures_dir.join(fixture);
        if !path.is_file() {
            return Err(format!("fixture '{}' not found", path.display()));
        }
        Ok(path)
    }
}

/// Keep scenarios whose name contains `filter` and that carry `tag`
pub fn select(scenarios: Vec<Scenario>, filter: Option<&str>, tag: Option<&str>) -> Vec<Scenario> {
    scenarios
        .into_iter()
        .filter(|s| filter.map_or(true, |f| s.matches_filter(f)))
        .filter(|s| tag.map_or(true, |t| s.has_tag(t)))
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn malformed(scenario: &str, reason: impl Into<String>) -> E2eError {
    E2eError::MalformedScenario {
        scenario: scenario.to_string(),
        reason: reason.into(),
    }
}

fn malformed_step(scenario: &str, step: usize, reason: impl Into<String>) -> E2eError {
    E2eError::MalformedStep {
        scenario: scenario.to_string(),
        step,
        reason: reason.into(),
    }
}
