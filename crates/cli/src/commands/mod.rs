//! CLI Commands

pub mod check;
pub mod list;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use uiflow_e2e::loader::{self, ScenarioLoader};
use uiflow_e2e::{E2eConfig, Scenario};

/// Which scenarios to load
#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    /// Directory with scenario files (defaults to scenarios_dir from the config)
    pub dir: Option<PathBuf>,

    /// Only scenarios whose name contains this text
    #[arg(short, long, env = "UIFLOW_FILTER")]
    pub filter: Option<String>,

    /// Only scenarios carrying this tag
    #[arg(short, long, env = "UIFLOW_TAG")]
    pub tag: Option<String>,

    /// Directory upload fixtures are resolved against
    #[arg(long, env = "UIFLOW_FIXTURES_DIR")]
    pub fixtures: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<E2eConfig> {
    let config = E2eConfig::load(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Load and filter scenarios; a malformed file fails the whole load
pub fn load_scenarios(config: &E2eConfig, args: &SelectArgs) -> Result<Vec<Scenario>> {
    let dir = args.dir.clone().unwrap_or_else(|| config.scenarios_dir.clone());
    let fixtures = args.fixtures.clone().unwrap_or_else(|| config.fixtures_dir.clone());

    if !dir.is_dir() {
        anyhow::bail!("scenario directory {} does not exist", dir.display());
    }

    let scenarios = ScenarioLoader::new(fixtures)
        .load_all(&dir)
        .with_context(|| format!("failed to load scenarios from {}", dir.display()))?;
    let total = scenarios.len();
    let selected = loader::select(scenarios, args.filter.as_deref(), args.tag.as_deref());
    debug!("Selected {} of {} scenario(s)", selected.len(), total);
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = r#"
name: login
tags: [smoke]
steps:
  - { action: navigate, url: /login }
  - { action: assert_visible, target: "text=Login" }
"#;

    const PROFILE: &str = r#"
name: profile
steps:
  - { action: navigate, url: /area_logada/editar_dados }
"#;

    fn select(dir: &Path, filter: Option<&str>, tag: Option<&str>) -> SelectArgs {
        SelectArgs {
            dir: Some(dir.to_path_buf()),
            filter: filter.map(str::to_string),
            tag: tag.map(str::to_string),
            fixtures: None,
        }
    }

    #[test]
    fn test_load_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("login.yaml"), LOGIN).unwrap();
        std::fs::write(dir.path().join("profile.yml"), PROFILE).unwrap();
        let config = E2eConfig::default();

        let all = load_scenarios(&config, &select(dir.path(), None, None)).unwrap();
        assert_eq!(all.len(), 2);

        let tagged = load_scenarios(&config, &select(dir.path(), None, Some("smoke"))).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].name, "login");

        let filtered = load_scenarios(&config, &select(dir.path(), Some("PROF"), None)).unwrap();
        assert_eq!(filtered[0].name, "profile");
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = E2eConfig::default();
        assert!(load_scenarios(&config, &select(&dir.path().join("nope"), None, None)).is_err());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("uiflow.toml")).unwrap();
        assert_eq!(config.concurrency, 1);
    }
}
