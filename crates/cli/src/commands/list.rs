//! `uiflow list`: show the scenarios a run would pick up

use anyhow::Result;
use clap::Args;

use super::{load_scenarios, SelectArgs};
use crate::output::{print_list, OutputFormat, ScenarioRow};
use uiflow_e2e::E2eConfig;

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub select: SelectArgs,
}

pub fn execute(args: ListArgs, config: &E2eConfig, format: OutputFormat) -> Result<i32> {
    let scenarios = load_scenarios(config, &args.select)?;
    let rows: Vec<ScenarioRow> = scenarios.iter().map(ScenarioRow::from).collect();
    print_list(&rows, format);
    Ok(0)
}
