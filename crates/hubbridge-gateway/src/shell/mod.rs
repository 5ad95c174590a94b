/*!
 * Remote shell sessions.
 *
 * A [`ShellSession`] drives a prompt-delimited request/response exchange
 * with the coordinator's login shell. Device families differ only in their
 * [`ShellProfile`]: login steps, prompt and storage layout.
 *
 * Commands never fail towards the caller. An I/O error or timeout yields an
 * empty result, which callers treat as "unknown".
 */
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, trace};

use crate::error::{GatewayError, Result};

pub mod telnet;

#[cfg(test)]
pub(crate) mod testing;

pub use telnet::{TelnetConnector, TelnetTransport};

/// Prompt printed by the coordinator's root shell
pub const DEFAULT_PROMPT: &str = "\r\n# ";

/// Marker of the extended property tool on newer firmware
pub const AQARA_PROPERTY_TOOL: &str = "/tmp/out/agetprop";

const NO_SUCH_FILE: &str = "No such";

/// Byte stream to a remote shell
#[async_trait]
pub trait ShellTransport: Send {
    /// Write raw bytes
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to and including `marker`
    async fn read_until(&mut self, marker: &[u8], timeout: Duration) -> Result<Vec<u8>>;

    /// Close the stream
    async fn close(&mut self) -> Result<()>;
}

/// Opens shell transports
#[async_trait]
pub trait ShellConnector: Send + Sync {
    /// Whether `host:port` accepts TCP connections
    async fn probe(&self, host: &str, port: u16) -> bool;

    /// Open a transport to `host:port`
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn ShellTransport>>;
}

/// Which property command the firmware provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyTool {
    /// `getprop` / `setprop`
    Standard,
    /// `agetprop` / `asetprop`
    Aqara,
}

impl PropertyTool {
    fn get_command(&self, name: &str) -> String {
        match self {
            PropertyTool::Standard => format!("getprop {}", name),
            PropertyTool::Aqara => format!("agetprop {}", name),
        }
    }

    fn set_command(&self, name: &str, value: &str) -> String {
        match self {
            PropertyTool::Standard => format!("setprop {} {}", name, value),
            PropertyTool::Aqara => format!("asetprop {} {}", name, value),
        }
    }
}

/// One login step: optionally send a line, then wait for `expect`
#[derive(Clone, PartialEq, Eq)]
pub struct LoginStep {
    /// Line to send, without terminator
    pub send: Option<String>,
    /// Text that ends the step
    pub expect: String,
}

impl LoginStep {
    fn expect<S: Into<String>>(expect: S) -> Self {
        Self {
            send: None,
            expect: expect.into(),
        }
    }

    fn send<A: Into<String>, B: Into<String>>(send: A, expect: B) -> Self {
        Self {
            send: Some(send.into()),
            expect: expect.into(),
        }
    }
}

impl fmt::Debug for LoginStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginStep")
            .field("send", &self.send.as_ref().map(|_| "..."))
            .field("expect", &self.expect)
            .finish()
    }
}

/// Per-family shell behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellProfile {
    /// User name sent at the login prompt
    pub login_name: String,
    /// Prompt that terminates each command's output
    pub prompt: String,
    /// Ordered login handshake
    pub login_steps: Vec<LoginStep>,
    /// Property tool assumed until detection says otherwise
    pub property_tool: PropertyTool,
    /// Root of the persistent store holding device files
    pub store_root: String,
}

fn is_camera_family(model: &str) -> bool {
    model.contains("g2h") || model.starts_with("lumi.camera")
}

impl ShellProfile {
    /// Select the profile for a declared model string
    pub fn for_model(model: &str, password: Option<&str>) -> Self {
        let login_name = if is_camera_family(model) { "root" } else { "admin" };
        let store_root = if model.starts_with("lumi.camera") {
            "/mnt/config"
        } else {
            "/data"
        };

        let mut login_steps = vec![LoginStep::expect("login: ")];
        match password.filter(|p| !p.is_empty()) {
            Some(password) => {
                login_steps.push(LoginStep::send(login_name, "Password: "));
                login_steps.push(LoginStep::send(password, DEFAULT_PROMPT));
            }
            None => login_steps.push(LoginStep::send(login_name, DEFAULT_PROMPT)),
        }

        Self {
            login_name: login_name.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            login_steps,
            property_tool: PropertyTool::Standard,
            store_root: store_root.to_string(),
        }
    }
}

/// Login and command timeouts
#[derive(Debug, Clone, Copy)]
pub struct ShellTimeouts {
    /// Bound on each login step
    pub login: Duration,
    /// Bound on each command
    pub command: Duration,
}

impl Default for ShellTimeouts {
    fn default() -> Self {
        Self {
            login: Duration::from_secs(10),
            command: Duration::from_secs(30),
        }
    }
}

/// A logged-in remote shell
pub struct ShellSession {
    transport: Box<dyn ShellTransport>,
    profile: ShellProfile,
    property_tool: PropertyTool,
    timeouts: ShellTimeouts,
}

impl fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellSession")
            .field("profile", &self.profile)
            .field("property_tool", &self.property_tool)
            .finish()
    }
}

/// Drop the echoed command line from the front of a command's output
fn strip_echo<'a>(body: &'a [u8], command: &str) -> &'a [u8] {
    if !body.starts_with(command.as_bytes()) {
        return body;
    }
    match body.iter().position(|b| *b == b'\n') {
        Some(pos) => &body[pos + 1..],
        None => &[],
    }
}

impl ShellSession {
    /// Wrap a transport without logging in
    pub fn new(
        transport: Box<dyn ShellTransport>,
        profile: ShellProfile,
        timeouts: ShellTimeouts,
    ) -> Self {
        let property_tool = profile.property_tool;
        Self {
            transport,
            profile,
            property_tool,
            timeouts,
        }
    }

    /// Connect and log in
    pub async fn open(
        connector: &dyn ShellConnector,
        host: &str,
        port: u16,
        profile: ShellProfile,
        timeouts: ShellTimeouts,
    ) -> Result<Self> {
        let transport = connector.connect(host, port).await?;
        let mut session = Self::new(transport, profile, timeouts);
        session.login().await?;
        Ok(session)
    }

    /// The active profile
    pub fn profile(&self) -> &ShellProfile {
        &self.profile
    }

    /// The property tool in use
    pub fn property_tool(&self) -> PropertyTool {
        self.property_tool
    }

    /// Run the login handshake, then detect the property tool
    pub async fn login(&mut self) -> Result<()> {
        let steps = self.profile.login_steps.clone();
        for step in &steps {
            if let Some(line) = &step.send {
                self.transport.write_all(format!("{}\r\n", line).as_bytes()).await?;
            }
            self.transport
                .read_until(step.expect.as_bytes(), self.timeouts.login)
                .await
                .map_err(|e| {
                    GatewayError::shell(format!("login failed waiting for {:?}: {}", step.expect, e))
                })?;
        }

        if self.file_exists(AQARA_PROPERTY_TOOL).await {
            self.property_tool = PropertyTool::Aqara;
        }
        debug!(
            "Logged in as {} using {:?} properties",
            self.profile.login_name, self.property_tool
        );
        Ok(())
    }

    async fn exchange(&mut self, command: &str) -> Result<Vec<u8>> {
        self.transport
            .write_all(format!("{}\r\n", command).as_bytes())
            .await?;
        let raw = self
            .transport
            .read_until(self.profile.prompt.as_bytes(), self.timeouts.command)
            .await?;
        let body = &raw[..raw.len().saturating_sub(self.profile.prompt.len())];
        Ok(strip_echo(body, command).to_vec())
    }

    async fn exchange_or_empty(&mut self, command: &str) -> Vec<u8> {
        match self.exchange(command).await {
            Ok(output) => output,
            Err(e) => {
                debug!("Shell command {:?} failed: {}", command, e);
                Vec::new()
            }
        }
    }

    /// Run a command and return its output, or an empty string on failure
    pub async fn run_command(&mut self, command: &str) -> String {
        let output = self.exchange_or_empty(command).await;
        String::from_utf8_lossy(&output).into_owned()
    }

    /// Read a remote file. With `base64` the content is piped through
    /// `base64` on the device and decoded here.
    pub async fn read_file(&mut self, path: &str, base64: bool) -> Vec<u8> {
        if !base64 {
            return self.exchange_or_empty(&format!("cat {}", path)).await;
        }

        let encoded = self
            .exchange_or_empty(&format!("cat {} | base64", path))
            .await;
        let compact: Vec<u8> = encoded
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        match STANDARD.decode(&compact) {
            Ok(content) => content,
            Err(e) => {
                debug!("Invalid base64 content of {}: {}", path, e);
                Vec::new()
            }
        }
    }

    /// Read a system property, or an empty string if unknown
    pub async fn get_property(&mut self, name: &str) -> String {
        let command = self.property_tool.get_command(name);
        self.run_command(&command).await.trim().to_string()
    }

    /// Write a system property
    pub async fn set_property(&mut self, name: &str, value: &str) {
        let command = self.property_tool.set_command(name, value);
        self.run_command(&command).await;
    }

    /// Whether a path exists on the device
    pub async fn file_exists(&mut self, path: &str) -> bool {
        let output = self.run_command(&format!("ls -al {}", path)).await;
        !output.is_empty() && !output.contains(NO_SUCH_FILE)
    }

    /// Whether the binary at `path` has the expected MD5 checksum. With a
    /// download URL, a mismatch triggers one download and a second check.
    pub async fn check_binary(&mut self, path: &str, md5: &str, download_url: Option<&str>) -> bool {
        if self.checksum_matches(path, md5).await {
            return true;
        }
        let Some(url) = download_url else {
            return false;
        };

        debug!("Downloading {} from {}", path, url);
        self.run_command(&format!("wget -O {} {} && chmod +x {}", path, url, path))
            .await;
        self.checksum_matches(path, md5).await
    }

    async fn checksum_matches(&mut self, path: &str, md5: &str) -> bool {
        let output = self.run_command(&format!("md5sum {}", path)).await;
        trace!("md5sum {} => {:?}", path, output);
        output.split_whitespace().next() == Some(md5)
    }

    /// The running process list
    pub async fn processes(&mut self) -> String {
        self.run_command("ps").await
    }

    /// Firmware version property
    pub async fn firmware_version(&mut self) -> String {
        self.get_property("ro.sys.fw_ver").await
    }

    /// Log out and close the stream
    pub async fn close(mut self) {
        if let Err(e) = self.transport.close().await {
            trace!("Closing shell failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{answers, FakeShell, Transcript};
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fake(table: &[(&str, &str)]) -> (FakeShell, Transcript) {
        let written = Arc::new(Mutex::new(Vec::new()));
        (FakeShell::new(answers(table), written.clone()), written)
    }

    async fn logged_in(table: &[(&str, &str)]) -> (ShellSession, Transcript) {
        let (shell, written) = fake(table);
        let mut session = ShellSession::new(
            Box::new(shell),
            ShellProfile::for_model("lumi.gateway.acn01", None),
            ShellTimeouts::default(),
        );
        session.login().await.unwrap();
        (session, written)
    }

    #[test]
    fn test_profile_selection() {
        let hub = ShellProfile::for_model("lumi.gateway.acn01", None);
        assert_eq!(hub.login_name, "admin");
        assert_eq!(hub.store_root, "/data");
        assert_eq!(hub.login_steps.len(), 2);

        let camera = ShellProfile::for_model("lumi.camera.gwagl02", Some("secret"));
        assert_eq!(camera.login_name, "root");
        assert_eq!(camera.store_root, "/mnt/config");
        assert_eq!(camera.login_steps[1].expect, "Password: ");
        assert_eq!(camera.login_steps[2].send.as_deref(), Some("secret"));
        assert!(!format!("{:?}", camera).contains("secret"));

        assert_eq!(ShellProfile::for_model("g2h", None).login_name, "root");
        assert_eq!(ShellProfile::for_model("", Some("")).login_steps.len(), 2);
    }

    #[tokio::test]
    async fn test_login_with_password() {
        let (mut shell, written) = fake(&[]);
        shell.password = Some("pw".into());
        let mut session = ShellSession::new(
            Box::new(shell),
            ShellProfile::for_model("lumi.gateway.aqcn02", Some("pw")),
            ShellTimeouts::default(),
        );
        session.login().await.unwrap();

        let written = written.lock().unwrap();
        assert_eq!(written[0], "admin");
        assert_eq!(written[1], "pw");
    }

    #[tokio::test]
    async fn test_login_fails_without_prompt() {
        let (mut shell, _) = fake(&[]);
        shell.buffer.clear();
        let mut session = ShellSession::new(
            Box::new(shell),
            ShellProfile::for_model("lumi.gateway.acn01", None),
            ShellTimeouts::default(),
        );
        assert!(matches!(session.login().await, Err(GatewayError::Shell(_))));
    }

    #[tokio::test]
    async fn test_property_tool_detection() {
        let (session, _) = logged_in(&[]).await;
        assert_eq!(session.property_tool(), PropertyTool::Standard);

        let listing = "-rwxr-xr-x 1 root root 9000 Jan 1 00:00 /tmp/out/agetprop";
        let (mut session, written) = logged_in(&[
            ("ls -al /tmp/out/agetprop", listing),
            ("agetprop persist.sys.model", "lumi.gateway.acn01"),
        ])
        .await;
        assert_eq!(session.property_tool(), PropertyTool::Aqara);
        assert_eq!(session.get_property("persist.sys.model").await, "lumi.gateway.acn01");
        session.set_property("persist.app.debug", "1").await;
        assert!(written
            .lock()
            .unwrap()
            .contains(&"asetprop persist.app.debug 1".to_string()));
    }

    #[tokio::test]
    async fn test_run_command_strips_echo_and_prompt() {
        let (mut session, _) = logged_in(&[("echo hi", "hi")]).await;
        assert_eq!(session.run_command("echo hi").await, "hi");
        assert_eq!(session.run_command("true").await, "");
    }

    #[tokio::test]
    async fn test_get_property_missing_is_empty() {
        let (mut session, _) = logged_in(&[("getprop sys.zb_device", "  ")]).await;
        assert_eq!(session.get_property("sys.zb_device").await, "");
        assert_eq!(session.get_property("ro.sys.fw_ver").await, "");
    }

    #[tokio::test]
    async fn test_read_file() {
        let json = r#"{"mac":"0x00158d0001"}"#;
        let (mut session, _) = logged_in(&[
            ("cat /data/zigbee/coordinator.info", json),
            ("cat /data/blob | base64", "aGVs\r\nbG8="),
        ])
        .await;

        assert_eq!(
            session.read_file("/data/zigbee/coordinator.info", false).await,
            json.as_bytes()
        );
        assert_eq!(session.read_file("/data/blob", true).await, b"hello");
    }

    #[tokio::test]
    async fn test_file_exists() {
        let (mut session, _) = logged_in(&[
            ("ls -al /data/bin/mosquitto", "-rwxr-xr-x 1 root root 1 /data/bin/mosquitto"),
            ("ls -al /data/nothing", "ls: /data/nothing: No such file or directory"),
        ])
        .await;
        assert!(session.file_exists("/data/bin/mosquitto").await);
        assert!(!session.file_exists("/data/nothing").await);
    }

    #[tokio::test]
    async fn test_check_binary_downloads_once() {
        let md5 = "e0ce4757cfcccb079d89134381fd11b0";
        let (mut session, written) = logged_in(&[(
            "md5sum /data/bin/mosquitto",
            "00000000000000000000000000000000  /data/bin/mosquitto",
        )])
        .await;

        assert!(!session.check_binary("/data/bin/mosquitto", md5, None).await);
        assert!(
            !session
                .check_binary("/data/bin/mosquitto", md5, Some("http://example.invalid/m"))
                .await
        );
        let downloads = written
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.starts_with("wget"))
            .count();
        assert_eq!(downloads, 1);
    }

    #[tokio::test]
    async fn test_check_binary_match() {
        let md5 = "0422c48517dc464a2e986a1038dc448a";
        let (mut session, _) = logged_in(&[(
            "md5sum /data/bin/mosquitto",
            "0422c48517dc464a2e986a1038dc448a  /data/bin/mosquitto",
        )])
        .await;
        assert!(session.check_binary("/data/bin/mosquitto", md5, None).await);
    }
}
