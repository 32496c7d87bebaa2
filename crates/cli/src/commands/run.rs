//! `uiflow run`: execute scenarios against a WebDriver server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use super::{load_scenarios, SelectArgs};
use crate::output::{print_error, print_list, print_success, print_warning, OutputFormat};
use uiflow_e2e::config::Browser;
use uiflow_e2e::server::{self, DriverProcess, DriverProcessConfig};
use uiflow_e2e::{E2eConfig, SuiteRunner, WebDriverFactory};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Base URL of the application under test
    #[arg(long, env = "UIFLOW_BASE_URL")]
    pub base_url: Option<String>,

    /// URL of a running WebDriver server
    #[arg(long, env = "UIFLOW_WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Spawn this chromedriver/geckodriver binary instead
    #[arg(long, env = "UIFLOW_DRIVER_BINARY")]
    pub driver_binary: Option<PathBuf>,

    /// Browser to request (chrome, firefox, safari)
    #[arg(long, env = "UIFLOW_BROWSER")]
    pub browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Scenarios to run at the same time
    #[arg(short = 'j', long, env = "UIFLOW_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Fail on dialogs no step expected
    #[arg(long)]
    pub strict_dialogs: bool,

    /// Output directory for results.json and screenshots
    #[arg(short, long, env = "UIFLOW_OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// Wait for the application to answer before starting
    #[arg(long)]
    pub wait_for_app: bool,
}

impl RunArgs {
    /// Command-line values win over the config file
    fn apply(&self, config: &mut E2eConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = Some(url.clone());
        }
        if let Some(url) = &self.webdriver_url {
            config.webdriver.url = url.clone();
        }
        if let Some(binary) = &self.driver_binary {
            config.webdriver.binary = Some(binary.clone());
        }
        if let Some(browser) = self.browser {
            config.webdriver.browser = browser;
        }
        if self.headed {
            config.webdriver.headless = false;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.strict_dialogs {
            config.strict_dialogs = true;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
    }
}

pub async fn execute(args: RunArgs, mut config: E2eConfig, format: OutputFormat) -> Result<i32> {
    args.apply(&mut config);

    let scenarios = load_scenarios(&config, &args.select)?;
    if scenarios.is_empty() {
        print_warning("No scenarios matched");
        return Ok(0);
    }

    // Kept alive until the run is over; dropping it stops the server
    let _driver_process = match DriverProcessConfig::from_config(&config.webdriver) {
        Some(process_config) => {
            let process = DriverProcess::spawn(process_config)
                .await
                .context("failed to start the WebDriver server")?;
            config.webdriver.url = process.url().to_string();
            Some(process)
        }
        None => None,
    };

    if args.wait_for_app {
        let base_url = config
            .base_url
            .clone()
            .context("--wait-for-app needs a base URL")?;
        server::wait_for_app(&base_url, Duration::from_secs(config.webdriver.startup_timeout_secs))
            .await
            .with_context(|| format!("{} is not reachable", base_url))?;
    }

    let factory = Arc::new(WebDriverFactory::new(config.webdriver.clone())?);
    let runner = SuiteRunner::from_config(&config, factory)?;

    let token = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling scenarios...");
            token.cancel();
        }
    });

    info!(
        "Running against {} via {}",
        config.base_url.as_deref().unwrap_or("<no base url>"),
        config.webdriver.url
    );
    let report = runner.run_all(&scenarios).await;
    report.write_json(&config.output_dir)?;

    print_list(&report.scenarios, format);
    if report.success() {
        print_success(&format!("All {} scenario(s) passed", report.total));
        Ok(0)
    } else {
        print_error(&format!("{} of {} scenario(s) failed", report.failed, report.total));
        Ok(1)
    }
}
