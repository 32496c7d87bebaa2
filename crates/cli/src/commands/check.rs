//! `uiflow check`: validate scenario files and config without a browser

use anyhow::{Context, Result};
use clap::Args;

use super::{load_scenarios, SelectArgs};
use crate::output::print_success;
use uiflow_e2e::E2eConfig;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub select: SelectArgs,
}

pub fn execute(args: CheckArgs, config: &E2eConfig) -> Result<i32> {
    config.run_settings().context("invalid configuration")?;
    let scenarios = load_scenarios(config, &args.select)?;
    let steps: usize = scenarios.iter().map(|s| s.steps.len()).sum();
    print_success(&format!(
        "{} scenario(s), {} step(s) valid",
        scenarios.len(),
        steps
    ));
    Ok(0)
}
