//! Engine configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{E2eError, E2eResult};

/// Top-level configuration, usually read from `uiflow.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Root URL of the application under test; relative navigations join onto it
    pub base_url: Option<String>,

    /// Directory scanned for scenario files
    pub scenarios_dir: PathBuf,

    /// Directory upload fixtures are resolved against
    pub fixtures_dir: PathBuf,

    /// Output directory for results and failure screenshots
    pub output_dir: PathBuf,

    /// Scenarios running at the same time, each on its own session
    pub concurrency: usize,

    /// Hard limit for a whole scenario run
    pub scenario_timeout_secs: u64,

    /// Fail on dialogs nobody asked for instead of accepting them
    pub strict_dialogs: bool,

    /// Save a screenshot when a scenario fails
    pub screenshot_on_failure: bool,

    pub timeouts: Timeouts,

    pub webdriver: WebDriverConfig,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            base_url: Some("http://localhost:3000".to_string()),
            scenarios_dir: PathBuf::from("scenarios"),
            fixtures_dir: PathBuf::from("fixtures"),
            output_dir: PathBuf::from("test-results"),
            concurrency: 1,
            scenario_timeout_secs: 120,
            strict_dialogs: false,
            screenshot_on_failure: true,
            timeouts: Timeouts::default(),
            webdriver: WebDriverConfig::default(),
        }
    }
}

/// Polling deadlines, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Locating the target of an element step
    pub element_ms: u64,
    /// Visibility, absence and value assertions
    pub assertion_ms: u64,
    /// Waiting for the URL to change
    pub url_ms: u64,
    /// Waiting for an expected dialog after the triggering action
    pub dialog_ms: u64,
    /// Sleep between polls
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element_ms: 4000,
            assertion_ms: 4000,
            url_ms: 4000,
            dialog_ms: 2000,
            poll_interval_ms: 100,
        }
    }
}

impl Timeouts {
    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn assertion(&self) -> Duration {
        Duration::from_millis(self.assertion_ms)
    }

    pub fn url(&self) -> Duration {
        Duration::from_millis(self.url_ms)
    }

    pub fn dialog(&self) -> Duration {
        Duration::from_millis(self.dialog_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
    Safari,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
            Browser::Safari => "safari",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Browser::Chrome),
            "firefox" => Ok(Browser::Firefox),
            "safari" => Ok(Browser::Safari),
            other => Err(E2eError::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

/// Where the WebDriver server lives and how sessions are opened
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    /// URL of an already running WebDriver server
    pub url: String,

    /// Spawn this binary (chromedriver, geckodriver) instead of using `url`
    pub binary: Option<PathBuf>,

    pub browser: Browser,

    pub headless: bool,

    pub window_width: u32,

    pub window_height: u32,

    /// How long a spawned server may take to report ready
    pub startup_timeout_secs: u64,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:4444".to_string(),
            binary: None,
            browser: Browser::Chrome,
            headless: true,
            window_width: 1280,
            window_height: 720,
            startup_timeout_secs: 30,
        }
    }
}

/// The slice of configuration a scenario run needs
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub base_url: Option<Url>,
    pub timeouts: Timeouts,
    pub strict_dialogs: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeouts: Timeouts::default(),
            strict_dialogs: false,
        }
    }
}

impl E2eConfig {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| E2eError::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_secs(self.scenario_timeout_secs)
    }

    pub fn run_settings(&self) -> E2eResult<RunSettings> {
        let base_url = match &self.base_url {
            Some(raw) => Some(Url::parse(raw).map_err(|e| {
                E2eError::InvalidConfig(format!("base_url '{}': {}", raw, e))
            })?),
            None => None,
        };
        Ok(RunSettings {
            base_url,
            timeouts: self.timeouts.clone(),
            strict_dialogs: self.strict_dialogs,
        })
    }
}
