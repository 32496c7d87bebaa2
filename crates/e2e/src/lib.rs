//! uiflow browser-flow engine
//!
//! This crate runs declarative end-to-end scenarios against a live web
//! application through a browser automation driver:
//! - Loads scenarios (setup, action and assertion steps) from YAML
//! - Executes steps in order with bounded polling for elements
//! - Evaluates post-conditions (visibility, absence, URL, form values)
//! - Intercepts native dialogs and checks their message
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     uiflow engine (Rust)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioLoader                                             │
//! │    └── load_all(dir) -> [Scenario]                          │
//! │  SuiteRunner                                                │
//! │    ├── DriverFactory::open() -> Box<dyn Driver>             │
//! │    ├── ScenarioRun::execute(driver) -> RunState             │
//! │    │     ├── locate (retry until visible)                   │
//! │    │     ├── AssertionEngine                                │
//! │    │     └── DialogInterceptor                              │
//! │    └── SuiteReport -> results.json                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, description, tags, vars                        │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate { url }                               │
//! │          ├── fill { target, value, clear_first? }           │
//! │          ├── click { target }                               │
//! │          ├── select_option { trigger, option }              │
//! │          ├── upload_file { target, fixture }                │
//! │          ├── assert_visible | assert_absent { target }      │
//! │          ├── assert_url_contains { fragment }               │
//! │          ├── assert_value { target, value }                 │
//! │          └── expect_dialog { text, dismiss? }               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod config;
pub mod context;
pub mod dialog;
pub mod driver;
pub mod error;
pub mod executor;
pub mod loader;
pub mod locate;
pub mod report;
pub mod runner;
pub mod server;
pub mod spec;
pub mod wait;
pub mod webdriver;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{E2eConfig, RunSettings, Timeouts};
pub use driver::{Driver, DriverError, DriverFactory};
pub use error::{E2eError, E2eResult, FailureKind, StepError};
pub use executor::{RunState, ScenarioRun};
pub use loader::{ScenarioDef, ScenarioLoader, StepDef};
pub use report::{ScenarioReport, ScenarioStatus, SuiteReport};
pub use runner::SuiteRunner;
pub use spec::{Locator, Scenario, Step};
pub use webdriver::WebDriverFactory;
