//! W3C WebDriver client
//!
//! Speaks the WebDriver HTTP protocol to chromedriver, geckodriver or a
//! Selenium server. One [`WebDriverSession`] is one browser session.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{Browser, WebDriverConfig};
use crate::driver::{By, Driver, DriverError, DriverFactory, DriverResult, ElementRef};

/// Key the protocol uses for element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Opens WebDriver sessions on a running server
pub struct WebDriverFactory {
    http: Client,
    config: WebDriverConfig,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig) -> DriverResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, config })
    }

    /// Capabilities requested for new sessions
    pub fn capabilities(&self) -> Value {
        let size = format!(
            "--window-size={},{}",
            self.config.window_width, self.config.window_height
        );
        let mut always = json!({ "browserName": self.config.browser.as_str() });
        match self.config.browser {
            Browser::Chrome => {
                let mut args = vec![size];
                if self.config.headless {
                    args.push("--headless=new".to_string());
                }
                always["goog:chromeOptions"] = json!({ "args": args });
            }
            Browser::Firefox => {
                let mut args = vec![
                    format!("--width={}", self.config.window_width),
                    format!("--height={}", self.config.window_height),
                ];
                if self.config.headless {
                    args.push("-headless".to_string());
                }
                always["moz:firefoxOptions"] = json!({ "args": args });
            }
            Browser::Safari => {}
        }
        // Dialogs stay open until the engine answers them
        always["unhandledPromptBehavior"] = json!("ignore");
        json!({ "capabilities": { "alwaysMatch": always } })
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn open(&self) -> DriverResult<Box<dyn Driver>> {
        let server = self.config.url.trim_end_matches('/').to_string();
        let value = send(&self.http, Method::POST, &format!("{}/session", server), Some(self.capabilities())).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol("new session response without sessionId".into()))?
            .to_string();
        debug!("Opened WebDriver session {}", session_id);
        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            base: format!("{}/session/{}", server, session_id),
            session_id,
            closed: false,
        }))
    }
}

/// A live WebDriver session
pub struct WebDriverSession {
    http: Client,
    base: String,
    session_id: String,
    closed: bool,
}

impl WebDriverSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        if self.closed {
            return Err(DriverError::Session("session already closed".into()));
        }
        send(&self.http, method, &format!("{}{}", self.base, path), body).await
    }

    async fn element_call(
        &self,
        method: Method,
        element: &ElementRef,
        suffix: &str,
        body: Option<Value>,
    ) -> DriverResult<Value> {
        self.call(method, &format!("/element/{}{}", element.id(), suffix), body)
            .await
    }
}

#[async_trait]
impl Driver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.call(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn find_elements(&mut self, by: &By) -> DriverResult<Vec<ElementRef>> {
        let found = self.call(Method::POST, "/elements", Some(locator_body(by, ""))).await?;
        element_list(&found)
    }

    async fn find_elements_in(&mut self, scope: &ElementRef, by: &By) -> DriverResult<Vec<ElementRef>> {
        // Relative XPath, so text matches stay inside the scope
        let found = self
            .element_call(Method::POST, scope, "/elements", Some(locator_body(by, ".")))
            .await?;
        element_list(&found)
    }

    async fn is_displayed(&mut self, element: &ElementRef) -> DriverResult<bool> {
        let value = self.element_call(Method::GET, element, "/displayed", None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn element_text(&mut self, element: &ElementRef) -> DriverResult<String> {
        let value = self.element_call(Method::GET, element, "/text", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn element_value(&mut self, element: &ElementRef) -> DriverResult<Option<String>> {
        let value = self.element_call(Method::GET, element, "/property/value", None).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.element_call(Method::POST, element, "/click", Some(json!({}))).await?;
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.element_call(Method::POST, element, "/clear", Some(json!({}))).await?;
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementRef, text: &str) -> DriverResult<()> {
        self.element_call(Method::POST, element, "/value", Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn attach_file(&mut self, element: &ElementRef, path: &Path) -> DriverResult<()> {
        let absolute = std::fs::canonicalize(path)
            .map_err(|e| DriverError::Protocol(format!("fixture {}: {}", path.display(), e)))?;
        let text = absolute.to_string_lossy().to_string();
        self.element_call(Method::POST, element, "/value", Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn attached_file_count(&mut self, element: &ElementRef) -> DriverResult<usize> {
        let script = "return arguments[0].files ? arguments[0].files.length : 0;";
        let body = json!({ "script": script, "args": [{ ELEMENT_KEY: element.id() }] });
        let value = self.call(Method::POST, "/execute/sync", Some(body)).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        let value = self.call(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("current url is not a string".into()))
    }

    async fn pending_dialog(&mut self) -> DriverResult<Option<String>> {
        match self.call(Method::GET, "/alert/text", None).await {
            Ok(value) => Ok(Some(value.as_str().unwrap_or_default().to_string())),
            Err(DriverError::NoDialog) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn answer_dialog(&mut self, accept: bool) -> DriverResult<()> {
        let path = if accept { "/alert/accept" } else { "/alert/dismiss" };
        self.call(Method::POST, path, Some(json!({}))).await?;
        Ok(())
    }

    async fn screenshot(&mut self) -> DriverResult<Option<Vec<u8>>> {
        let value = self.call(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot is not a string".into()))?;
        let png = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Protocol(format!("screenshot encoding: {}", e)))?;
        Ok(Some(png))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = send(&self.http, Method::DELETE, &self.base, None).await;
        self.closed = true;
        debug!("Closed WebDriver session {}", self.session_id);
        result.map(|_| ())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!("Session {} dropped without close; deleting it in the background", self.session_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let http = self.http.clone();
            let url = self.base.clone();
            handle.spawn(async move {
                let _ = http.delete(url).send().await;
            });
        }
    }
}

/// Send a command and unwrap the protocol's `value` envelope
async fn send(http: &Client, method: Method, url: &str, body: Option<Value>) -> DriverResult<Value> {
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    Err(protocol_error(&value, status.as_u16()))
}

/// Map a WebDriver error object onto [`DriverError`]
pub fn protocol_error(value: &Value, status: u16) -> DriverError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match code {
        "stale element reference" => DriverError::StaleElement(message),
        "no such element" => DriverError::NoSuchElement(message),
        "no such alert" => DriverError::NoDialog,
        "unexpected alert open" => {
            let text = value
                .pointer("/data/text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(message);
            DriverError::DialogOpen(text)
        }
        "invalid session id" | "no such window" | "session not created" => DriverError::Session(message),
        other => DriverError::Protocol(format!("{} ({}): {}", other, status, message)),
    }
}

/// XPath for the innermost elements whose own text contains `text`
fn locator_body(by: &By, xpath_prefix: &str) -> Value {
    match by {
        By::Css(css) => json!({ "using": "css selector", "value": css }),
        By::Text(text) => json!({ "using": "xpath", "value": format!("{}{}", xpath_prefix, text_xpath(text)) }),
    }
}

fn element_list(found: &Value) -> DriverResult<Vec<ElementRef>> {
    let list = found
        .as_array()
        .ok_or_else(|| DriverError::Protocol("find elements did not return a list".into()))?;
    list.iter()
        .map(|entry| {
            entry
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementRef(id.to_string()))
                .ok_or_else(|| DriverError::Protocol("element reference without id".into()))
        })
        .collect()
}

pub fn text_xpath(text: &str) -> String {
    format!("//*[text()[contains(normalize-space(.), {})]]", xpath_literal(text))
}

/// Quote a string as an XPath 1.0 literal
fn xpath_literal(s: &str) -> String {
    if !s.contains('"') {
        return format!("\"{}\"", s);
    }
    if !s.contains('\'') {
        return format!("'{}'", s);
    }
    let parts: Vec<String> = s.split('"').map(|p| format!("\"{}\"", p)).collect();
    format!("concat({})", parts.join(", '\"', "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("stale element reference", "stale element reference: gone" ; "stale")]
    #[test_case("no such element", "no such element: gone" ; "missing")]
    #[test_case("invalid session id", "session error: gone" ; "session")]
    fn test_protocol_error_codes(code: &str, expected: &str) {
        let err = protocol_error(&json!({ "error": code, "message": "gone" }), 404);
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn test_unexpected_alert_carries_text() {
        let err = protocol_error(
            &json!({
                "error": "unexpected alert open",
                "message": "unexpected alert open",
                "data": { "text": "Email ou senha inválidos." }
            }),
            500,
        );
        assert_eq!(err, DriverError::DialogOpen("Email ou senha inválidos.".into()));
    }

    #[test]
    fn test_no_such_alert_is_no_dialog() {
        assert_eq!(protocol_error(&json!({ "error": "no such alert" }), 404), DriverError::NoDialog);
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("Caramelo Totó"), "\"Caramelo Totó\"");
        assert_eq!(xpath_literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(xpath_literal("it's \"x\""), "concat(\"it's \", '\"', \"x\", '\"', \"\")");
    }

    #[test]
    fn test_text_xpath() {
        assert_eq!(
            text_xpath("Login"),
            "//*[text()[contains(normalize-space(.), \"Login\")]]"
        );
    }

    #[test]
    fn test_scoped_text_query_is_relative() {
        let body = locator_body(&By::Text("Excluir".into()), ".");
        assert_eq!(body["using"], "xpath");
        assert_eq!(
            body["value"],
            ".//*[text()[contains(normalize-space(.), \"Excluir\")]]"
        );
        assert_eq!(locator_body(&By::Css("button".into()), ".")["value"], "button");
    }

    #[test]
    fn test_element_list_reads_references() {
        let found = json!([{ ELEMENT_KEY: "a" }, { ELEMENT_KEY: "b" }]);
        assert_eq!(
            element_list(&found).unwrap(),
            vec![ElementRef("a".into()), ElementRef("b".into())]
        );
        assert!(element_list(&json!({})).is_err());
    }

    #[test]
    fn test_chrome_headless_capabilities() {
        let factory = WebDriverFactory::new(WebDriverConfig::default()).unwrap();
        let caps = factory.capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "chrome");
        let args = always["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a == "--window-size=1280,720"));
    }

    #[test]
    fn test_firefox_capabilities() {
        let factory = WebDriverFactory::new(WebDriverConfig {
            browser: Browser::Firefox,
            headless: false,
            ..Default::default()
        })
        .unwrap();
        let caps = factory.capabilities();
        let args = caps["capabilities"]["alwaysMatch"]["moz:firefoxOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(!args.iter().any(|a| a == "-headless"));
    }
}
