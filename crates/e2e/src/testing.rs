//! In-memory browser for exercising the engine without a real driver.
//!
//! A [`FakeApp`] maps URL paths to route builders. Each route fills a
//! [`FakePage`] with elements, and element click handlers mutate the page the
//! way a client-side app would: navigate, replace nodes, open dialogs, remove
//! rows later. Time-based behaviour uses tokio's clock, so tests can run with
//! paused time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::driver::{By, Driver, DriverError, DriverFactory, DriverResult, ElementRef};

/// Page mutation run by a route, a click or a dialog answer
pub type Handler = Arc<dyn Fn(&mut FakePage) + Send + Sync>;

/// Shared key/value store standing in for the application backend
pub type Store = Arc<Mutex<BTreeMap<String, Vec<String>>>>;

/// A DOM node of the fake page
#[derive(Clone)]
pub struct FakeElement {
    id: String,
    parent: Option<String>,
    selectors: Vec<String>,
    text: String,
    value: Option<String>,
    visible: bool,
    file_input: bool,
    files: Vec<PathBuf>,
    appears_at: Option<Instant>,
    removed_at: Option<Instant>,
    on_click: Option<Handler>,
}

impl FakeElement {
    /// An element matched by the exact CSS selector `selector`
    pub fn new(selector: &str) -> Self {
        Self {
            id: String::new(),
            parent: None,
            selectors: vec![selector.to_string()],
            text: String::new(),
            value: None,
            visible: true,
            file_input: false,
            files: Vec::new(),
            appears_at: None,
            removed_at: None,
            on_click: None,
        }
    }

    /// A form control, which reports a value
    pub fn input(selector: &str) -> Self {
        Self::new(selector).value("")
    }

    /// Another selector this element answers to
    pub fn also(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// A file input; usually hidden behind a styled button
    pub fn file_input(mut self) -> Self {
        self.file_input = true;
        self.visible = false;
        self
    }

    /// Inserted into the DOM only after `delay`
    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_at = Some(Instant::now() + delay);
        self
    }

    pub fn on_click(mut self, handler: impl Fn(&mut FakePage) + Send + Sync + 'static) -> Self {
        self.on_click = Some(Arc::new(handler));
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }

    fn present(&self, now: Instant) -> bool {
        self.appears_at.map_or(true, |at| now >= at) && self.removed_at.map_or(true, |at| now < at)
    }

    fn label(&self) -> &str {
        self.selectors.first().map(String::as_str).unwrap_or_default()
    }
}

/// A native dialog opened by the page
#[derive(Clone)]
pub struct FakeDialog {
    text: String,
    opens_at: Option<Instant>,
    on_accept: Option<Handler>,
    on_dismiss: Option<Handler>,
}

impl FakeDialog {
    pub fn alert(text: &str) -> Self {
        Self {
            text: text.to_string(),
            opens_at: None,
            on_accept: None,
            on_dismiss: None,
        }
    }

    pub fn confirm(text: &str, on_accept: impl Fn(&mut FakePage) + Send + Sync + 'static) -> Self {
        Self {
            on_accept: Some(Arc::new(on_accept)),
            ..Self::alert(text)
        }
    }

    pub fn on_dismiss(mut self, handler: impl Fn(&mut FakePage) + Send + Sync + 'static) -> Self {
        self.on_dismiss = Some(Arc::new(handler));
        self
    }

    /// Opens only after `delay`, as after a network round trip
    pub fn after(mut self, delay: Duration) -> Self {
        self.opens_at = Some(Instant::now() + delay);
        self
    }

    fn open(&self, now: Instant) -> bool {
        self.opens_at.map_or(true, |at| now >= at)
    }
}

/// The document of one fake session
pub struct FakePage {
    url: String,
    elements: Vec<FakeElement>,
    dialog: Option<FakeDialog>,
    next_id: u64,
    routes: Arc<BTreeMap<String, Handler>>,
    store: Store,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakePage {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Insert an element; returns its reference id
    pub fn add(&mut self, mut element: FakeElement) -> String {
        self.next_id += 1;
        element.id = format!("el-{}", self.next_id);
        let id = element.id.clone();
        self.elements.push(element);
        id
    }

    /// Insert an element as a child of the element with reference id `parent`
    pub fn add_within(&mut self, parent: &str, mut element: FakeElement) -> String {
        element.parent = Some(parent.to_string());
        self.add(element)
    }

    /// Remove an element and its descendants once `delay` has passed
    pub fn remove_after(&mut self, id: &str, delay: Duration) {
        let at = Instant::now() + delay;
        let doomed: Vec<usize> = (0..self.elements.len())
            .filter(|&pos| self.elements[pos].id == id || self.is_descendant(pos, id))
            .collect();
        for pos in doomed {
            self.elements[pos].removed_at = Some(at);
        }
    }

    /// Remove every element matching `selector` now
    pub fn remove(&mut self, selector: &str) {
        self.elements.retain(|e| !e.matches(selector));
    }

    /// Remove elements whose text contains `text` once `delay` has passed
    pub fn remove_text_after(&mut self, text: &str, delay: Duration) {
        let at = Instant::now() + delay;
        for element in self.elements.iter_mut().filter(|e| e.text.contains(text)) {
            element.removed_at = Some(at);
        }
    }

    /// Re-render the first element matching `selector` as a new node.
    ///
    /// References to the old node go stale.
    pub fn replace(&mut self, selector: &str, f: impl FnOnce(FakeElement) -> FakeElement) {
        let Some(pos) = self.elements.iter().position(|e| e.matches(selector)) else {
            return;
        };
        let old = self.elements.remove(pos);
        let mut new = f(old);
        self.next_id += 1;
        new.id = format!("el-{}", self.next_id);
        self.elements.insert(pos, new);
    }

    /// Current value of the first control matching `selector`
    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.elements
            .iter()
            .find(|e| e.matches(selector))
            .and_then(|e| e.value.clone())
    }

    pub fn text_of(&self, selector: &str) -> Option<String> {
        self.elements
            .iter()
            .find(|e| e.matches(selector))
            .map(|e| e.text.clone())
    }

    /// Whether the first element matching `selector` holds files
    pub fn has_files(&self, selector: &str) -> bool {
        self.elements
            .iter()
            .find(|e| e.matches(selector))
            .map_or(false, |e| !e.files.is_empty())
    }

    pub fn open_dialog(&mut self, dialog: FakeDialog) {
        self.dialog = Some(dialog);
    }

    /// Client-side navigation to a path or absolute URL
    pub fn go(&mut self, target: &str) {
        let resolved = Url::parse(&self.url)
            .and_then(|base| base.join(target))
            .or_else(|_| Url::parse(target));
        match resolved {
            Ok(url) => self.load(url),
            Err(_) => self.url = target.to_string(),
        }
    }

    fn load(&mut self, url: Url) {
        self.url = url.to_string();
        self.elements.clear();
        self.dialog = None;
        match self.routes.get(url.path()).cloned() {
            Some(route) => route(self),
            None => {
                self.add(FakeElement::new("h1").text("404 Not Found"));
            }
        }
    }

    fn is_descendant(&self, pos: usize, ancestor: &str) -> bool {
        let mut parent = self.elements[pos].parent.as_deref();
        while let Some(id) = parent {
            if id == ancestor {
                return true;
            }
            parent = self
                .elements
                .iter()
                .find(|e| e.id == id)
                .and_then(|e| e.parent.as_deref());
        }
        false
    }

    /// Own text followed by the text of present descendants, like innerText
    fn text_content(&self, pos: usize, now: Instant) -> String {
        let id = &self.elements[pos].id;
        let mut parts = vec![self.elements[pos].text.clone()];
        for (other, element) in self.elements.iter().enumerate() {
            if other != pos && element.present(now) && self.is_descendant(other, id) && !element.text.is_empty() {
                parts.push(element.text.clone());
            }
        }
        parts.retain(|p| !p.is_empty());
        parts.join("\n")
    }

    fn query(&self, by: &By, scope: Option<&str>, now: Instant) -> Vec<ElementRef> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.present(now))
            .filter(|(pos, _)| scope.map_or(true, |id| self.is_descendant(*pos, id)))
            .filter(|(_, e)| match by {
                By::Css(css) => e.matches(css),
                By::Text(text) => e.text.contains(text.as_str()),
            })
            .map(|(_, e)| ElementRef(e.id.clone()))
            .collect()
    }

    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }

    fn blocking_dialog(&self, now: Instant) -> Option<&FakeDialog> {
        self.dialog.as_ref().filter(|d| d.open(now))
    }

    fn element(&self, element: &ElementRef, now: Instant) -> DriverResult<usize> {
        self.elements
            .iter()
            .position(|e| e.id == element.id() && e.present(now))
            .ok_or_else(|| DriverError::StaleElement(format!("{} is no longer attached", element.id())))
    }
}

/// Session bookkeeping shared by every browser a [`FakeApp`] opens
#[derive(Debug, Default)]
pub struct SessionStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SessionStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Most sessions open at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Fake application and the factory for its browser sessions
pub struct FakeApp {
    routes: BTreeMap<String, Handler>,
    store: Store,
    log: Arc<Mutex<Vec<String>>>,
    stats: Arc<SessionStats>,
    unavailable: bool,
}

impl Default for FakeApp {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeApp {
    pub fn new() -> Self {
        Self {
            routes: BTreeMap::new(),
            store: Arc::new(Mutex::new(BTreeMap::new())),
            log: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(SessionStats::default()),
            unavailable: false,
        }
    }

    /// Serve `path` by running `build` on a freshly cleared page
    pub fn route(mut self, path: &str, build: impl Fn(&mut FakePage) + Send + Sync + 'static) -> Self {
        self.routes.insert(path.to_string(), Arc::new(build));
        self
    }

    /// Every session open fails
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Commands received by all sessions, in order
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

#[async_trait]
impl DriverFactory for FakeApp {
    async fn open(&self) -> DriverResult<Box<dyn Driver>> {
        if self.unavailable {
            return Err(DriverError::Session("browser could not be started".into()));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(active, Ordering::SeqCst);

        let page = FakePage {
            url: "about:blank".to_string(),
            elements: Vec::new(),
            dialog: None,
            next_id: 0,
            routes: Arc::new(self.routes.clone()),
            store: self.store.clone(),
            log: self.log.clone(),
        };
        Ok(Box::new(FakeBrowser {
            page: Mutex::new(page),
            stats: self.stats.clone(),
            closed: false,
        }))
    }
}

/// One fake session
pub struct FakeBrowser {
    page: Mutex<FakePage>,
    stats: Arc<SessionStats>,
    closed: bool,
}

impl FakeBrowser {
    /// Run `f` on the page unless the session is closed or a dialog blocks it
    fn with_page<T>(&self, f: impl FnOnce(&mut FakePage, Instant) -> DriverResult<T>) -> DriverResult<T> {
        if self.closed {
            return Err(DriverError::Session("session is closed".into()));
        }
        let now = Instant::now();
        let mut page = self.page.lock();
        if let Some(dialog) = page.blocking_dialog(now) {
            return Err(DriverError::DialogOpen(dialog.text.clone()));
        }
        f(&mut *page, now)
    }
}

#[async_trait]
impl Driver for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        let url = Url::parse(url).map_err(|e| DriverError::Protocol(format!("invalid url {}: {}", url, e)))?;
        self.with_page(|page, _| {
            page.record(format!("navigate {}", url.path()));
            page.load(url);
            Ok(())
        })
    }

    async fn find_elements(&mut self, by: &By) -> DriverResult<Vec<ElementRef>> {
        self.with_page(|page, now| Ok(page.query(by, None, now)))
    }

    async fn find_elements_in(&mut self, scope: &ElementRef, by: &By) -> DriverResult<Vec<ElementRef>> {
        self.with_page(|page, now| {
            page.element(scope, now)?;
            Ok(page.query(by, Some(scope.id()), now))
        })
    }

    async fn is_displayed(&mut self, element: &ElementRef) -> DriverResult<bool> {
        self.with_page(|page, now| {
            let pos = page.element(element, now)?;
            Ok(page.elements[pos].visible)
        })
    }

    async fn element_text(&mut self, element: &ElementRef) -> DriverResult<String> {
        self.with_page(|page, now| {
            let pos = page.element(element, now)?;
            Ok(page.text_content(pos, now))
        })
    }

    async fn element_value(&mut self, element: &ElementRef) -> DriverResult<Option<String>> {
        self.with_page(|page, now| {
            let pos = page.element(element, now)?;
            Ok(page.elements[pos].value.clone())
        })
    }

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.with_page(|page, now| {
            let pos = page.element(element, now)?;
            let target = &page.elements[pos];
            let entry = if target.text.is_empty() {
                format!("click {}", target.label())
            } else {
                format!("click {} {:?}", target.label(), target.text)
            };
            let handler = target.on_click.clone();
            page.record(entry);
            if let Some(handler) = handler {
                handler(page);
            }
            Ok(())
        })
    }

    async fn clear(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.with_page(|page, now| {
            let pos = page.element(element, now)?;
            let target = &mut page.elements[pos];
            if target.value.is_none() {
                return Err(DriverError::Protocol("element is not editable".into()));
            }
            target.value = Some(String::new());
            let entry = format!("clear {}", target.label());
            page.record(entry);
            Ok(())
        })
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> DriverResult<()> {
        self.with_page(|page, now| {
            let pos = page.element(element, now)?;
            let target = &mut page.elements[pos];
            let Some(value) = target.value.as_mut() else {
                return Err(DriverError::Protocol("element is not editable".into()));
            };
            value.push_str(text);
            let entry = format!("type {} {}", target.label(), text);
            page.record(entry);
            Ok(())
        })
    }

    async fn attach_file(&mut self, element: &ElementRef, path: &Path) -> DriverResult<()> {
        self.with_page(|page, now| {
            let pos = page.element(element, now)?;
            let target = &mut page.elements[pos];
            if !target.file_input {
                return Err(DriverError::Protocol("element is not a file input".into()));
            }
            target.files.push(path.to_path_buf());
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let entry = format!("attach {} {}", target.label(), name);
            page.record(entry);
            Ok(())
        })
    }

    async fn attached_file_count(&mut self, element: &ElementRef) -> DriverResult<usize> {
        self.with_page(|page, now| {
            let pos = page.element(element, now)?;
            Ok(page.elements[pos].files.len())
        })
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.with_page(|page, _| Ok(page.url.clone()))
    }

    async fn pending_dialog(&mut self) -> DriverResult<Option<String>> {
        if self.closed {
            return Err(DriverError::Session("session is closed".into()));
        }
        let now = Instant::now();
        let page = self.page.lock();
        Ok(page.blocking_dialog(now).map(|d| d.text.clone()))
    }

    async fn answer_dialog(&mut self, accept: bool) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::Session("session is closed".into()));
        }
        let now = Instant::now();
        let mut page = self.page.lock();
        if page.blocking_dialog(now).is_none() {
            return Err(DriverError::NoDialog);
        }
        let Some(dialog) = page.dialog.take() else {
            return Err(DriverError::NoDialog);
        };
        page.record(format!("{} dialog {:?}", if accept { "accept" } else { "dismiss" }, dialog.text));
        let handler = if accept { dialog.on_accept } else { dialog.on_dismiss };
        if let Some(handler) = handler {
            handler(&mut *page);
        }
        Ok(())
    }

    async fn screenshot(&mut self) -> DriverResult<Option<Vec<u8>>> {
        if self.closed {
            return Err(DriverError::Session("session is closed".into()));
        }
        Ok(Some(b"\x89PNG\r\n\x1a\nfake".to_vec()))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> FakeApp {
        FakeApp::new()
            .route("/", |page| {
                page.add(FakeElement::new("button").text("Go").on_click(|page| page.go("/next")));
                page.add(FakeElement::new("button").text("Ask").on_click(|page| {
                    page.open_dialog(FakeDialog::confirm("Sure?", |page| {
                        page.add(FakeElement::new("p").text("confirmed"));
                    }))
                }));
            })
            .route("/next", |page| {
                page.add(FakeElement::new("h1").text("Next page"));
            })
    }

    async fn first(driver: &mut dyn Driver, by: By) -> ElementRef {
        driver.find_elements(&by).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_click_navigates() {
        let app = app();
        let mut driver = app.open().await.unwrap();
        driver.navigate("http://app.test/").await.unwrap();
        let go = first(driver.as_mut(), By::Text("Go".into())).await;
        driver.click(&go).await.unwrap();

        assert_eq!(driver.current_url().await.unwrap(), "http://app.test/next");
        // The old page's nodes are gone
        assert!(matches!(driver.click(&go).await, Err(DriverError::StaleElement(_))));
        driver.close().await.unwrap();
        assert_eq!(app.stats().closed(), 1);
    }

    #[tokio::test]
    async fn test_open_dialog_blocks_commands() {
        let app = app();
        let mut driver = app.open().await.unwrap();
        driver.navigate("http://app.test/").await.unwrap();
        let ask = first(driver.as_mut(), By::Text("Ask".into())).await;
        driver.click(&ask).await.unwrap();

        assert_eq!(driver.pending_dialog().await.unwrap().as_deref(), Some("Sure?"));
        assert_eq!(
            driver.current_url().await,
            Err(DriverError::DialogOpen("Sure?".into()))
        );
        driver.answer_dialog(true).await.unwrap();
        assert_eq!(driver.find_elements(&By::Text("confirmed".into())).await.unwrap().len(), 1);
        assert_eq!(driver.answer_dialog(true).await, Err(DriverError::NoDialog));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_elements() {
        let app = FakeApp::new().route("/", |page| {
            page.add(FakeElement::new("p").text("late").appears_after(Duration::from_millis(300)));
        });
        let mut driver = app.open().await.unwrap();
        driver.navigate("http://app.test/").await.unwrap();
        let by = By::Css("p".into());
        assert!(driver.find_elements(&by).await.unwrap().is_empty());
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(driver.find_elements(&by).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_lookup_and_removal() {
        let app = FakeApp::new().route("/", |page| {
            for name in ["Rex", "Mimi"] {
                let card = page.add(FakeElement::new("div.card"));
                page.add_within(&card, FakeElement::new("h3").text(name));
                let removed = card.clone();
                page.add_within(&card, FakeElement::new("button").text("Excluir").on_click(move |page| {
                    page.remove_after(&removed, Duration::from_millis(100));
                }));
            }
        });
        let mut driver = app.open().await.unwrap();
        driver.navigate("http://app.test/").await.unwrap();

        let cards = driver.find_elements(&By::Css("div.card".into())).await.unwrap();
        assert_eq!(driver.element_text(&cards[1]).await.unwrap(), "Mimi\nExcluir");
        let buttons = driver.find_elements_in(&cards[1], &By::Css("button".into())).await.unwrap();
        assert_eq!(buttons.len(), 1);
        assert_eq!(driver.find_elements(&By::Css("button".into())).await.unwrap().len(), 2);

        driver.click(&buttons[0]).await.unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(driver.find_elements(&By::Text("Mimi".into())).await.unwrap().is_empty());
        assert_eq!(driver.find_elements(&By::Text("Rex".into())).await.unwrap().len(), 1);
        assert!(matches!(
            driver.find_elements_in(&cards[1], &By::Css("button".into())).await,
            Err(DriverError::StaleElement(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_makes_reference_stale() {
        let app = FakeApp::new().route("/", |page| {
            page.add(FakeElement::new("button").text("Selecione"));
        });
        let mut driver = app.open().await.unwrap();
        driver.navigate("http://app.test/").await.unwrap();
        let before = first(driver.as_mut(), By::Css("button".into())).await;

        // Reloading re-renders every node
        driver.navigate("http://app.test/").await.unwrap();
        assert!(matches!(driver.element_text(&before).await, Err(DriverError::StaleElement(_))));
        let after = first(driver.as_mut(), By::Css("button".into())).await;
        assert_ne!(before, after);
    }
}
