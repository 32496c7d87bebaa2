//! The browser automation capability set the engine runs on.
//!
//! A [`Driver`] is one exclusive browser session. Lookups are single-shot:
//! waiting and retrying belong to the engine, which polls through these calls
//! until its own deadlines expire.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Opaque handle to a DOM node, valid until the node is replaced or removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// How a driver should look elements up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum By {
    /// CSS selector
    Css(String),
    /// Innermost elements whose own text contains the string
    Text(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("no dialog is open")]
    NoDialog,

    #[error("a dialog is open: {0}")]
    DialogOpen(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether polling should treat this as "not there yet" rather than a failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::StaleElement(_) | DriverError::NoSuchElement(_))
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(e: reqwest::Error) -> Self {
        DriverError::Transport(e.to_string())
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// One live browser session.
#[async_trait]
pub trait Driver: Send {
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// All elements currently matching, in document order. Never waits.
    async fn find_elements(&mut self, by: &By) -> DriverResult<Vec<ElementRef>>;

    /// Descendants of `scope` currently matching, in document order.
    async fn find_elements_in(&mut self, scope: &ElementRef, by: &By) -> DriverResult<Vec<ElementRef>>;

    async fn is_displayed(&mut self, element: &ElementRef) -> DriverResult<bool>;

    async fn element_text(&mut self, element: &ElementRef) -> DriverResult<String>;

    /// Current `value` property of a form control, if it has one.
    async fn element_value(&mut self, element: &ElementRef) -> DriverResult<Option<String>>;

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()>;

    async fn clear(&mut self, element: &ElementRef) -> DriverResult<()>;

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> DriverResult<()>;

    async fn attach_file(&mut self, element: &ElementRef, path: &Path) -> DriverResult<()>;

    /// Length of a file input's file list.
    async fn attached_file_count(&mut self, element: &ElementRef) -> DriverResult<usize>;

    async fn current_url(&mut self) -> DriverResult<String>;

    /// Message of the native dialog currently open, if any.
    async fn pending_dialog(&mut self) -> DriverResult<Option<String>>;

    /// Accept or dismiss the open dialog.
    async fn answer_dialog(&mut self, accept: bool) -> DriverResult<()>;

    /// PNG bytes of the viewport, when the driver supports it.
    async fn screenshot(&mut self) -> DriverResult<Option<Vec<u8>>> {
        Ok(None)
    }

    /// End the session. Further calls are invalid.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Opens a fresh, exclusive session per scenario run.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self) -> DriverResult<Box<dyn Driver>>;
}
