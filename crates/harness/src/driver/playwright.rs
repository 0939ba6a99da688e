//! Playwright-backed page driver
//!
//! One long-lived `node` process per session hosts a Playwright page and
//! runs the embedded bridge script. Requests and responses travel as
//! newline-delimited JSON over the child's stdin/stdout; stderr is forwarded
//! to `tracing`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{PageDriver, Region, SessionFactory};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

/// Slack added on top of Playwright's own timeouts for the stdio round trip
const ROUND_TRIP_SLACK: Duration = Duration::from_secs(5);

/// A request understood by the bridge script
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeCommand<'a> {
    Open,
    LocateInput,
    LocateOutput,
    Clear,
    Fill { text: &'a str },
    Type { text: &'a str, delay_ms: u64 },
    ReadOutput,
    Close,
}

impl BridgeCommand<'_> {
    fn name(&self) -> &'static str {
        match self {
            BridgeCommand::Open => "open",
            BridgeCommand::LocateInput => "locate_input",
            BridgeCommand::LocateOutput => "locate_output",
            BridgeCommand::Clear => "clear",
            BridgeCommand::Fill { .. } => "fill",
            BridgeCommand::Type { .. } => "type",
            BridgeCommand::ReadOutput => "read_output",
            BridgeCommand::Close => "close",
        }
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl BridgeResponse {
    fn into_result(self) -> HarnessResult<serde_json::Value> {
        if self.ok {
            return Ok(self.value);
        }
        let message = self.message.unwrap_or_else(|| "no message".to_string());
        Err(match self.kind.as_deref() {
            Some("navigation") => HarnessError::Navigation(message),
            Some("element_not_found") => HarnessError::ElementNotFound(message),
            Some(kind) => HarnessError::Bridge(format!("{}: {}", kind, message)),
            None => HarnessError::Bridge(message),
        })
    }
}

/// Settings handed to the bridge script through its environment
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeSettings<'a> {
    url: &'a str,
    input_name: &'a str,
    output_selector: &'a str,
    browser: &'a str,
    headless: bool,
    navigation_timeout_ms: u64,
}

impl<'a> BridgeSettings<'a> {
    fn from_config(config: &'a HarnessConfig) -> Self {
        Self {
            url: &config.target.url,
            input_name: &config.target.input_name,
            output_selector: &config.target.output_selector,
            browser: config.browser.engine.as_str(),
            headless: config.browser.headless,
            navigation_timeout_ms: config.timing.navigation_timeout_ms,
        }
    }
}

/// Request/response framing over a pair of byte streams
pub struct BridgeChannel<W, R> {
    writer: W,
    reader: R,
    next_id: u64,
}

impl<W, R> BridgeChannel<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            reader,
            next_id: 1,
        }
    }

    /// Send one command and wait for the response carrying its id.
    ///
    /// Lines that are not protocol responses (stray console output) and
    /// responses for other ids are skipped.
    pub async fn exchange(&mut self, command: &BridgeCommand<'_>) -> HarnessResult<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_string(&BridgeRequest { id, command })?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        let mut buf = String::new();
        loop {
            buf.clear();
            if self.reader.read_line(&mut buf).await? == 0 {
                return Err(HarnessError::Bridge(format!(
                    "bridge exited while waiting for '{}'",
                    command.name()
                )));
            }
            match serde_json::from_str::<BridgeResponse>(buf.trim()) {
                Ok(response) if response.id == id => return response.into_result(),
                Ok(response) => warn!("Discarding bridge response for stale request {}", response.id),
                Err(_) => debug!("bridge: {}", buf.trim_end()),
            }
        }
    }
}

/// Production [`PageDriver`] backed by a Playwright bridge process
pub struct PlaywrightDriver {
    config: HarnessConfig,
    child: Child,
    channel: Mutex<BridgeChannel<ChildStdin, BufReader<ChildStdout>>>,

    // Keeps the staged bridge script alive for the life of the process
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Spawn the bridge process. The page is not opened yet.
    pub async fn launch(config: &HarnessConfig) -> HarnessResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        let settings = serde_json::to_string(&BridgeSettings::from_config(config))?;
        let node_path = match std::env::var_os("NODE_PATH") {
            Some(existing) => existing,
            None => config.browser.workdir.join("node_modules").into_os_string(),
        };

        debug!("Launching bridge: {} {}", config.browser.node_binary.display(), script_path.display());

        let mut child = Command::new(&config.browser.node_binary)
            .arg(&script_path)
            .current_dir(&config.browser.workdir)
            .env("TRANSLIT_BRIDGE_CONFIG", settings)
            .env("NODE_PATH", node_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::BrowserUnavailable(format!(
                    "failed to spawn {}: {}",
                    config.browser.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::BrowserUnavailable("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::BrowserUnavailable("bridge stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("bridge stderr: {}", line);
                }
            });
        }

        info!(
            "Playwright bridge started (pid: {:?}, browser: {})",
            child.id(),
            config.browser.engine.as_str()
        );

        Ok(Self {
            config: config.clone(),
            child,
            channel: Mutex::new(BridgeChannel::new(stdin, BufReader::new(stdout))),
            _script_dir: script_dir,
        })
    }

    async fn request(&self, command: BridgeCommand<'_>, limit: Duration) -> HarnessResult<serde_json::Value> {
        let name = command.name();
        let mut channel = self.channel.lock().await;
        match tokio::time::timeout(limit, channel.exchange(&command)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Bridge(format!(
                "'{}' got no answer within {} ms",
                name,
                limit.as_millis()
            ))),
        }
    }

    fn command_timeout(&self) -> Duration {
        self.config.timing.command_timeout()
    }

    async fn locate(&self, command: BridgeCommand<'_>) -> HarnessResult<Region> {
        let value = self.request(command, self.command_timeout()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the bridge to close, then make sure the process is gone.
    pub async fn shutdown(&mut self) -> HarnessResult<()> {
        if let Err(e) = self.request(BridgeCommand::Close, ROUND_TRIP_SLACK).await {
            debug!("Bridge close request failed: {}", e);
        }

        if tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await.is_ok() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                info!("Stopping bridge (pid: {})", pid);
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(Duration::from_millis(500), self.child.wait())
                        .await
                        .is_ok()
                {
                    return Ok(());
                }
            }
        }

        self.child.kill().await?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn open(&mut self) -> HarnessResult<()> {
        let limit = self.config.timing.navigation_timeout() * 2 + ROUND_TRIP_SLACK;
        match self.request(BridgeCommand::Open, limit).await {
            Ok(_) => {}
            Err(HarnessError::Bridge(reason)) => return Err(HarnessError::Navigation(reason)),
            Err(e) => return Err(e),
        }
        info!("Opened {}", self.config.target.url);
        tokio::time::sleep(self.config.timing.page_load_settle()).await;
        Ok(())
    }

    async fn locate_input(&self) -> HarnessResult<Region> {
        self.locate(BridgeCommand::LocateInput).await
    }

    async fn locate_output(&self) -> HarnessResult<Region> {
        self.locate(BridgeCommand::LocateOutput).await
    }

    async fn clear(&mut self) -> HarnessResult<()> {
        self.request(BridgeCommand::Clear, self.command_timeout()).await?;
        tokio::time::sleep(self.config.timing.after_clear()).await;
        Ok(())
    }

    async fn set_text(&mut self, text: &str) -> HarnessResult<()> {
        self.request(BridgeCommand::Fill { text }, self.command_timeout()).await?;
        Ok(())
    }

    async fn type_incrementally(&mut self, text: &str, per_char_delay: Duration) -> HarnessResult<()> {
        let typing = per_char_delay * text.chars().count() as u32;
        let command = BridgeCommand::Type {
            text,
            delay_ms: per_char_delay.as_millis() as u64,
        };
        self.request(command, typing + self.command_timeout()).await?;
        Ok(())
    }

    async fn read_output_text(&self) -> HarnessResult<String> {
        let value = self.request(BridgeCommand::ReadOutput, self.command_timeout()).await?;
        match value {
            serde_json::Value::String(text) => Ok(text.trim().to_string()),
            serde_json::Value::Null => Ok(String::new()),
            other => Err(HarnessError::Bridge(format!("unexpected read_output value: {}", other))),
        }
    }

    async fn close(&mut self) -> HarnessResult<()> {
        self.shutdown().await
    }
}

/// Launches and opens one Playwright session per call
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    config: HarnessConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for PlaywrightLauncher {
    type Driver = PlaywrightDriver;

    async fn open_session(&self) -> HarnessResult<PlaywrightDriver> {
        let mut driver = PlaywrightDriver::launch(&self.config).await?;
        if let Err(e) = driver.open().await {
            let _ = driver.shutdown().await;
            return Err(e);
        }
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RegionRole;
    use std::path::PathBuf;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    #[test]
    fn test_command_wire_format() {
        let typed = BridgeCommand::Type {
            text: "mama",
            delay_ms: 150,
        };
        let json = serde_json::to_value(BridgeRequest { id: 7, command: &typed }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 7, "op": "type", "text": "mama", "delay_ms": 150})
        );

        let json = serde_json::to_value(BridgeRequest {
            id: 1,
            command: &BridgeCommand::ReadOutput,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"id": 1, "op": "read_output"}));
    }

    #[test]
    fn test_error_kinds_map_to_taxonomy() {
        let response: BridgeResponse = serde_json::from_str(
            r#"{"id":3,"ok":false,"kind":"element_not_found","message":"no output region"}"#,
        )
        .unwrap();
        assert!(matches!(response.into_result(), Err(HarnessError::ElementNotFound(_))));

        let response: BridgeResponse =
            serde_json::from_str(r#"{"id":3,"ok":false,"kind":"navigation","message":"net::ERR"}"#).unwrap();
        assert!(matches!(response.into_result(), Err(HarnessError::Navigation(_))));

        let response: BridgeResponse =
            serde_json::from_str(r#"{"id":3,"ok":false,"kind":"playwright","message":"boom"}"#).unwrap();
        assert!(matches!(response.into_result(), Err(HarnessError::Bridge(_))));
    }

    #[test]
    fn test_settings_use_camel_case() {
        let config = HarnessConfig::default();
        let json = serde_json::to_value(BridgeSettings::from_config(&config)).unwrap();
        assert_eq!(json["inputName"], "Input Your Singlish Text Here.");
        assert_eq!(json["browser"], "chromium");
        assert_eq!(json["navigationTimeoutMs"], 30_000);
    }

    #[tokio::test]
    async fn test_channel_skips_noise_and_matches_ids() {
        let (client, server) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, mut server_write) = tokio::io::split(server);

        let bridge = tokio::spawn(async move {
            let mut requests = BufReader::new(server_read).lines();
            let line = requests.next_line().await.unwrap().unwrap();
            let request: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["op"], "locate_output");

            server_write
                .write_all(b"Playwright noise\n{\"id\":99,\"ok\":true}\n")
                .await
                .unwrap();
            let reply = format!(
                "{{\"id\":{},\"ok\":true,\"value\":{{\"role\":\"output\",\"tag\":\"div\",\"candidates\":2}}}}\n",
                request["id"]
            );
            server_write.write_all(reply.as_bytes()).await.unwrap();
        });

        let mut channel = BridgeChannel::new(client_write, BufReader::new(client_read));
        let value = channel.exchange(&BridgeCommand::LocateOutput).await.unwrap();
        let region: Region = serde_json::from_value(value).unwrap();
        assert_eq!(region.role, RegionRole::Output);
        assert_eq!(region.candidates, 2);
        bridge.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_reports_bridge_exit() {
        let (client, server) = duplex(1024);
        let (client_read, client_write) = tokio::io::split(client);
        drop(server);

        let mut channel = BridgeChannel::new(client_write, BufReader::new(client_read));
        let err = channel.exchange(&BridgeCommand::Clear).await.unwrap_err();
        assert!(matches!(err, HarnessError::Bridge(_) | HarnessError::Io(_)));
    }

    #[tokio::test]
    async fn test_launch_without_node_is_unavailable() {
        let mut config = HarnessConfig::default();
        config.browser.node_binary = PathBuf::from("/nonexistent/translit-node");

        match PlaywrightDriver::launch(&config).await {
            Err(HarnessError::BrowserUnavailable(reason)) => {
                assert!(reason.contains("/nonexistent/translit-node"))
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("launch should fail without a node binary"),
        }
    }
}
