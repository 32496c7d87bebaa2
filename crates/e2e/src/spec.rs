//! Scenario definitions: steps, element locators and executable scenarios

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::driver::By;

/// Default selector of the options list opened by a select trigger
pub const DEFAULT_LISTBOX: &str = "[role=\"listbox\"]";

/// Default selector of the entries inside the options list
pub const DEFAULT_OPTION: &str = "[role=\"option\"]";

/// Identifies the element a step acts on or asserts about.
///
/// In YAML a locator can be a plain string (`text=Foo` for a text match,
/// anything else is a CSS selector) or a map with `css`, `text`, `index`,
/// `last` and `within`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LocatorRepr")]
pub struct Locator {
    /// CSS selector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,

    /// Visible text the element must contain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Zero-based position among the matches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    /// Take the last match instead of the first
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub last: bool,

    /// Only match descendants of the elements this locator resolves to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within: Option<Box<Locator>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LocatorRepr {
    Short(String),
    Full {
        #[serde(default)]
        css: Option<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        last: bool,
        #[serde(default)]
        within: Option<Box<Locator>>,
    },
}

impl From<LocatorRepr> for Locator {
    fn from(repr: LocatorRepr) -> Self {
        match repr {
            LocatorRepr::Short(s) => Locator::parse(&s),
            LocatorRepr::Full {
                css,
                text,
                index,
                last,
                within,
            } => Locator {
                css,
                text,
                index,
                last,
                within,
            },
        }
    }
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            css: Some(selector.into()),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// `cy.contains(selector, text)` equivalent
    pub fn css_with_text(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: Some(selector.into()),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.index = Some(index);
        self.last = false;
        self
    }

    pub fn last(mut self) -> Self {
        self.last = true;
        self.index = None;
        self
    }

    /// Restrict matches to descendants of `scope`
    pub fn within(mut self, scope: Locator) -> Self {
        self.within = Some(Box::new(scope));
        self
    }

    /// This locator followed by its enclosing scopes, innermost first
    pub fn chain(&self) -> impl Iterator<Item = &Locator> {
        std::iter::successors(Some(self), |l| l.within.as_deref())
    }

    /// Parse the string shorthand
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix("text=") {
            Some(text) => Locator::text(text),
            None => Locator::css(s),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.css.as_deref().map_or(true, str::is_empty) && self.text.as_deref().map_or(true, str::is_empty)
    }

    /// The driver query; a text filter on top of CSS is applied by the engine
    pub fn query(&self) -> By {
        match (&self.css, &self.text) {
            (Some(css), _) => By::Css(css.clone()),
            (None, Some(text)) => By::Text(text.clone()),
            (None, None) => By::Css(String::new()),
        }
    }

    /// Whether matches still need filtering by their text
    pub fn filters_by_text(&self) -> bool {
        self.css.is_some() && self.text.is_some()
    }

    /// Copy with `${var}` references replaced through `f`
    pub fn map_strings<E>(&self, mut f: impl FnMut(&str) -> Result<String, E>) -> Result<Self, E> {
        self.map_strings_dyn(&mut f)
    }

    fn map_strings_dyn<E>(&self, f: &mut dyn FnMut(&str) -> Result<String, E>) -> Result<Self, E> {
        Ok(Locator {
            css: self.css.as_deref().map(&mut *f).transpose()?,
            text: self.text.as_deref().map(&mut *f).transpose()?,
            index: self.index,
            last: self.last,
            within: match self.within.as_deref() {
                Some(scope) => Some(Box::new(scope.map_strings_dyn(f)?)),
                None => None,
            },
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.css, &self.text) {
            (Some(css), Some(text)) => write!(f, "{} containing \"{}\"", css, text)?,
            (Some(css), None) => write!(f, "{}", css)?,
            (None, Some(text)) => write!(f, "text \"{}\"", text)?,
            (None, None) => write!(f, "<empty locator>")?,
        }
        if let Some(index) = self.index {
            write!(f, " [#{}]", index)?;
        } else if self.last {
            write!(f, " [last]")?;
        }
        if let Some(scope) = &self.within {
            write!(f, " within {}", scope)?;
        }
        Ok(())
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Load a URL, absolute or relative to the base URL
    Navigate { url: String },

    /// Type into an input field
    Fill {
        target: Locator,
        value: String,
        #[serde(default)]
        clear_first: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Click an element
    Click {
        target: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Open a custom select, pick an option by text, confirm the trigger shows it
    SelectOption {
        trigger: Locator,
        option: String,
        #[serde(default = "default_listbox")]
        listbox: String,
        #[serde(default = "default_option")]
        option_selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Attach a fixture file to a file input
    UploadFile {
        target: Locator,
        fixture: PathBuf,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertVisible {
        target: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertAbsent {
        target: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    AssertUrlContains {
        fragment: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// A form control holds exactly this value
    AssertValue {
        target: Locator,
        value: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Arm a one-shot expectation for the next native dialog
    ExpectDialog {
        text: String,
        #[serde(default)]
        dismiss: bool,
    },

    /// Fixed pause (use sparingly)
    Wait { ms: u64 },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_listbox() -> String {
    DEFAULT_LISTBOX.to_string()
}

fn default_option() -> String {
    DEFAULT_OPTION.to_string()
}

impl Step {
    /// Short label used in logs and reports
    pub fn label(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate:{}", url),
            Step::Fill { target, .. } => format!("fill:{}", target),
            Step::Click { target, .. } => format!("click:{}", target),
            Step::SelectOption { trigger, option, .. } => format!("select:{}={}", trigger, option),
            Step::UploadFile { fixture, .. } => format!("upload:{}", fixture.display()),
            Step::AssertVisible { target, .. } => format!("assert_visible:{}", target),
            Step::AssertAbsent { target, .. } => format!("assert_absent:{}", target),
            Step::AssertUrlContains { fragment, .. } => format!("assert_url:{}", fragment),
            Step::AssertValue { target, .. } => format!("assert_value:{}", target),
            Step::ExpectDialog { text, .. } => format!("expect_dialog:{}", text),
            Step::Wait { ms } => format!("wait:{}ms", ms),
            Step::Log { message } => {
                let short: String = message.chars().take(30).collect();
                format!("log:{}", short)
            }
        }
    }

    /// Steps that drive the page and can therefore raise a dialog
    pub fn is_action(&self) -> bool {
        matches!(
            self,
            Step::Navigate { .. }
                | Step::Fill { .. }
                | Step::Click { .. }
                | Step::SelectOption { .. }
                | Step::UploadFile { .. }
        )
    }

    /// Per-step timeout override
    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            Step::Fill { timeout_ms, .. }
            | Step::Click { timeout_ms, .. }
            | Step::SelectOption { timeout_ms, .. }
            | Step::UploadFile { timeout_ms, .. }
            | Step::AssertVisible { timeout_ms, .. }
            | Step::AssertAbsent { timeout_ms, .. }
            | Step::AssertUrlContains { timeout_ms, .. }
            | Step::AssertValue { timeout_ms, .. } => *timeout_ms,
            _ => None,
        }
    }

    /// Every locator the step carries
    pub fn locators(&self) -> Vec<&Locator> {
        match self {
            Step::Fill { target, .. }
            | Step::Click { target, .. }
            | Step::UploadFile { target, .. }
            | Step::AssertVisible { target, .. }
            | Step::AssertAbsent { target, .. }
            | Step::AssertValue { target, .. } => vec![target],
            Step::SelectOption { trigger, .. } => vec![trigger],
            _ => Vec::new(),
        }
    }

    /// Every free-text field that may carry `${var}` references
    pub fn strings(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for locator in self.locators().into_iter().flat_map(Locator::chain) {
            out.extend(locator.css.as_deref());
            out.extend(locator.text.as_deref());
        }
        match self {
            Step::Navigate { url } => out.push(url),
            Step::Fill { value, .. } | Step::AssertValue { value, .. } => out.push(value),
            Step::SelectOption { option, .. } => out.push(option),
            Step::AssertUrlContains { fragment, .. } => out.push(fragment),
            Step::ExpectDialog { text, .. } => out.push(text),
            Step::Log { message } => out.push(message),
            _ => {}
        }
        out
    }
}

/// A validated, executable scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    pub description: String,

    /// Tags for filtering
    pub tags: Vec<String>,

    /// Declared variables, available to steps as `${name}`
    pub vars: BTreeMap<String, String>,

    /// Setup steps followed by the scenario's own steps
    pub steps: Vec<Step>,

    /// How many of `steps` came from the suite's setup block
    pub setup_len: usize,

    /// File the scenario was loaded from
    pub source: Option<PathBuf>,
}

impl Scenario {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn matches_filter(&self, filter: &str) -> bool {
        self.name.to_lowercase().contains(&filter.to_lowercase())
    }
}
