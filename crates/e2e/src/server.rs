//! Process management - spawning a local WebDriver server and waiting for
//! the application under test

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::WebDriverConfig;
use crate::error::{E2eError, E2eResult};

/// Handle to a running chromedriver/geckodriver process
pub struct DriverProcess {
    child: Child,
    pub url: String,
    pub port: u16,
}

impl DriverProcess {
    /// Spawn the driver binary on a free port and wait until it is ready
    pub async fn spawn(config: DriverProcessConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let url = format!("http://127.0.0.1:{}", port);

        info!("Spawning {} on port {}", config.binary_path.display(), port);

        let mut cmd = Command::new(&config.binary_path);
        cmd.arg(format!("--port={}", port));
        cmd.args(&config.extra_args);
        cmd.stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::DriverStartup(format!(
                "Failed to spawn {}: {}",
                config.binary_path.display(),
                e
            ))
        })?;

        // An unread pipe fills up and blocks a chatty driver
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, "webdriver");
        }

        let handle = DriverProcess {
            child,
            url: url.clone(),
            port,
        };

        handle.wait_for_ready(config.startup_timeout).await?;

        info!("WebDriver is ready at {}", url);
        Ok(handle)
    }

    /// Poll `/status` until the server reports `ready`
    async fn wait_for_ready(&self, timeout_duration: Duration) -> E2eResult<()> {
        let status_url = format!("{}/status", self.url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&status_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let body: serde_json::Value = resp.json().await.unwrap_or_default();
                    if body.pointer("/value/ready").and_then(|v| v.as_bool()) == Some(true) {
                        return Ok(());
                    }
                }
                Ok(resp) => {
                    warn!("Status check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for WebDriver to start...");
                    }
                    if !e.is_connect() {
                        warn!("Status check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::NotReady {
            url: status_url,
            attempts,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop the driver: SIGTERM first, then kill
    pub fn stop(&mut self) -> E2eResult<()> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        let Some(id) = self.child.id() else {
            return Ok(());
        };
        info!("Stopping WebDriver (pid: {})", id);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if kill(Pid::from_raw(id as i32), Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.start_kill();
        }

        Ok(())
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning a WebDriver server
#[derive(Debug, Clone)]
pub struct DriverProcessConfig {
    /// Path to chromedriver or geckodriver
    pub binary_path: PathBuf,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    pub extra_args: Vec<String>,

    pub startup_timeout: Duration,
}

impl DriverProcessConfig {
    /// Settings for the binary named in the configuration, if any
    pub fn from_config(config: &WebDriverConfig) -> Option<Self> {
        let binary_path = config.binary.clone()?;
        Some(Self {
            binary_path,
            port: None,
            extra_args: Vec::new(),
            startup_timeout: Duration::from_secs(config.startup_timeout_secs),
        })
    }
}

impl Default for DriverProcessConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("chromedriver"),
            port: None,
            extra_args: Vec::new(),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// Wait until the application at `base_url` answers any HTTP response
pub async fn wait_for_app(base_url: &str, timeout_duration: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = std::time::Instant::now();
    let mut attempts = 0;

    while start.elapsed() < timeout_duration {
        attempts += 1;
        match client.get(base_url).send().await {
            Ok(_) => return Ok(()),
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to accept connections...", base_url);
                }
                if !e.is_connect() {
                    warn!("Readiness check error: {}", e);
                }
            }
        }
        sleep(Duration::from_millis(100)).await;
    }

    Err(E2eError::NotReady {
        url: base_url.to_string(),
        attempts,
    })
}

/// Log every line of a child's output stream at debug level until it closes
fn forward_lines<R>(stream: R, label: &'static str) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut count = 0;
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}] {}", label, line);
            count += 1;
        }
        count
    })
}

/// Find a free port to use
fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
