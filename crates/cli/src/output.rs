//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use uiflow_e2e::{Scenario, ScenarioReport};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Listing entry for a loaded scenario
#[derive(Debug, Serialize)]
pub struct ScenarioRow {
    pub name: String,
    pub steps: usize,
    pub setup: usize,
    pub tags: Vec<String>,
    pub source: String,
}

impl From<&Scenario> for ScenarioRow {
    fn from(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.clone(),
            steps: scenario.steps.len(),
            setup: scenario.setup_len,
            tags: scenario.tags.clone(),
            source: scenario
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Steps", "Setup", "Tags", "Source"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.steps.to_string(),
            self.setup.to_string(),
            self.tags.join(", "),
            self.source.clone(),
        ]
    }
}

impl TableDisplay for ScenarioReport {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Status", "Step", "Duration", "Details"]
    }

    fn row(&self) -> Vec<String> {
        let status = if self.is_passed() {
            "PASSED".green().to_string()
        } else {
            "FAILED".red().to_string()
        };
        let details = if self.is_passed() {
            String::new()
        } else {
            self.summary()
        };
        vec![
            self.name.clone(),
            status,
            self.failing_step.map(|s| s.to_string()).unwrap_or_default(),
            format!("{} ms", self.duration_ms),
            details,
        ]
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_row_shows_failure_summary() {
        colored::control::set_override(false);
        let report = ScenarioReport::failed(
            "login",
            Some(4),
            uiflow_e2e::StepError::new(uiflow_e2e::FailureKind::DialogMismatch, "dialog text differs"),
            10,
            Vec::new(),
        );
        let row = report.row();
        assert_eq!(row[1], "FAILED");
        assert_eq!(row[2], "4");
        assert!(row[4].starts_with("DialogMismatch at step 4"));
    }
}
