//! Engine lifecycle: either connect to an engine that is already listening,
//! or launch one inside a throwaway training directory.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::transport::{TcpTransport, Transport, TransportError};

const EXIT_OUTPUT_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to prepare training directory: {0}")]
    Setup(#[source] std::io::Error),
    #[error("failed to spawn engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine exited during startup ({status})")]
    Exited {
        status: String,
        /// Console lines the engine printed before it died.
        output: Vec<String>,
    },
    #[error("could not connect to engine at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: TransportError,
    },
}

/// Something that can produce a fresh connection to an engine.
pub trait Engine {
    type Transport: Transport;

    fn start(&mut self) -> Result<Self::Transport, EngineError>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Captured engine console output since the last call.
    fn drain_output(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// An engine somebody else started; we only connect to it.
#[derive(Debug, Clone)]
pub struct RemoteEngine {
    addr: SocketAddr,
    connect_timeout: Duration,
    read_timeout: Duration,
    connected: bool,
}

impl RemoteEngine {
    pub fn new(addr: SocketAddr, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            addr,
            connect_timeout,
            read_timeout,
            connected: false,
        }
    }
}

impl Engine for RemoteEngine {
    type Transport = TcpTransport;

    fn start(&mut self) -> Result<TcpTransport, EngineError> {
        let transport = TcpTransport::connect(self.addr, self.connect_timeout, self.read_timeout)
            .map_err(|source| EngineError::Connect {
                addr: self.addr,
                source,
            })?;
        debug!(peer = %transport.peer(), "connected to remote engine");
        self.connected = true;
        Ok(transport)
    }

    fn stop(&mut self) {
        self.connected = false;
    }

    fn is_running(&self) -> bool {
        self.connected
    }
}

/// A value in the engine's python config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Display for ConfigValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Bool(true) => f.write_str("True"),
            ConfigValue::Bool(false) => f.write_str("False"),
            ConfigValue::Int(value) => write!(f, "{value}"),
            ConfigValue::Float(value) => write!(f, "{value:?}"),
            ConfigValue::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

pub fn default_engine_config() -> BTreeMap<String, ConfigValue> {
    [
        ("PLAYER_1_NAME", ConfigValue::from("Agent")),
        ("PLAYER_1_PATH", "./agent_bot".into()),
        ("PLAYER_2_NAME", "Opponent".into()),
        ("PLAYER_2_PATH", "./python_skeleton".into()),
        ("GAME_LOG_FILENAME", "training_log".into()),
        ("PLAYER_LOG_SIZE_LIMIT", 1_048_576i64.into()),
        ("ENFORCE_GAME_CLOCK", false.into()),
        ("STARTING_GAME_CLOCK", 3600.0f64.into()),
        ("BUILD_TIMEOUT", 30.0f64.into()),
        ("CONNECT_TIMEOUT", 30.0f64.into()),
        ("NUM_ROUNDS", 100i64.into()),
        ("STARTING_STACK", 400i64.into()),
        ("BIG_BLIND", 2i64.into()),
        ("SMALL_BLIND", 1i64.into()),
        ("ROUNDS_PER_BOUNTY", 25i64.into()),
        ("BOUNTY_RATIO", 1.5f64.into()),
        ("BOUNTY_CONSTANT", 10i64.into()),
        ("PLAYER_TIMEOUT", 300i64.into()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Directory holding the engine entry script and opponent bot.
    pub engine_dir: PathBuf,
    pub entry_file: String,
    pub opponent_dir: String,
    pub player_dir: String,
    pub command: Vec<String>,
    pub player_command: Vec<String>,
    pub port: u16,
    /// Forwarded to the engine config untouched.
    pub overrides: BTreeMap<String, ConfigValue>,
    pub output_capacity: usize,
    pub startup_grace: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl EngineSettings {
    pub fn new(engine_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine_dir: engine_dir.into(),
            entry_file: "engine.py".to_string(),
            opponent_dir: "python_skeleton".to_string(),
            player_dir: "agent_bot".to_string(),
            command: vec!["python3".to_string(), "engine.py".to_string()],
            player_command: vec!["python3".to_string(), "player.py".to_string()],
            port: 12345,
            overrides: BTreeMap::new(),
            output_capacity: 1024,
            startup_grace: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }

    /// Generous clocks for long training runs.
    pub fn training(engine_dir: impl Into<PathBuf>) -> Self {
        Self::new(engine_dir)
            .with_override("STARTING_GAME_CLOCK", 600.0f64)
            .with_override("PLAYER_TIMEOUT", 300i64)
            .with_override("ENFORCE_GAME_CLOCK", false)
    }

    pub fn with_override(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.overrides.insert(key.to_string(), value.into());
        self
    }

    pub fn render_config(&self) -> String {
        let mut merged = default_engine_config();
        merged.extend(self.overrides.clone());

        let mut content = String::from("# Training configuration\n# Auto-generated\n\n");
        for (key, value) in merged {
            content.push_str(&format!("{key} = {value}\n"));
        }
        content
    }
}

/// Engine launched as a child process in its own temporary directory.
pub struct EngineProcess {
    settings: EngineSettings,
    training_dir: Option<TempDir>,
    child: Mutex<Option<Child>>,
    output: Option<Receiver<String>>,
}

impl EngineProcess {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            training_dir: None,
            child: Mutex::new(None),
            output: None,
        }
    }

    pub fn training_dir(&self) -> Option<&Path> {
        self.training_dir.as_ref().map(TempDir::path)
    }

    /// Creates a fresh training directory with the engine files, generated
    /// config and player stub. Replaces any previous directory.
    pub fn create_training_dir(&mut self) -> Result<PathBuf, EngineError> {
        let dir = tempfile::Builder::new()
            .prefix("poker_training_")
            .tempdir()
            .map_err(EngineError::Setup)?;

        let source = &self.settings.engine_dir;
        let entry = source.join(&self.settings.entry_file);
        if entry.is_file() {
            fs::copy(&entry, dir.path().join(&self.settings.entry_file))
                .map_err(EngineError::Setup)?;
        }
        let opponent = source.join(&self.settings.opponent_dir);
        if opponent.is_dir() {
            copy_dir(&opponent, &dir.path().join(&self.settings.opponent_dir))
                .map_err(EngineError::Setup)?;
        }

        fs::write(dir.path().join("config.py"), self.settings.render_config())
            .map_err(EngineError::Setup)?;
        write_player_stub(dir.path(), &self.settings).map_err(EngineError::Setup)?;

        let path = dir.path().to_path_buf();
        debug!(dir = %path.display(), "created training directory");
        self.training_dir = Some(dir);
        Ok(path)
    }

    fn spawn(&mut self, dir: &Path) -> Result<(), EngineError> {
        self.output = None;
        let (program, args) = self
            .settings
            .command
            .split_first()
            .ok_or_else(|| {
                EngineError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "empty engine command",
                ))
            })?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(dir)
            .env("PYTHONPATH", dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(EngineError::Spawn)?;

        if let Some(stdout) = child.stdout.take() {
            let (tx, rx) = sync_channel(self.settings.output_capacity.max(1));
            thread::spawn(move || capture_output(stdout, tx));
            self.output = Some(rx);
        }
        info!(pid = child.id(), dir = %dir.display(), "engine started");
        *self.child.get_mut() = Some(child);
        Ok(())
    }

    fn connect(&mut self) -> Result<TcpTransport, EngineError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.settings.port));
        let deadline = Instant::now() + self.settings.connect_timeout;
        loop {
            let attempt = TcpTransport::connect(
                addr,
                self.settings.connect_timeout,
                self.settings.read_timeout,
            );
            match attempt {
                Ok(transport) => return Ok(transport),
                Err(source) if Instant::now() >= deadline => {
                    return Err(EngineError::Connect { addr, source });
                }
                Err(err) => {
                    debug!(%addr, error = %err, "engine not accepting yet");
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    /// Reads what the capture thread still holds for a child that has exited.
    fn collect_remaining_output(&mut self) -> Vec<String> {
        let Some(rx) = self.output.as_ref() else {
            return Vec::new();
        };
        let deadline = Instant::now() + EXIT_OUTPUT_WAIT;
        let mut lines = Vec::new();
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match rx.recv_timeout(left) {
                Ok(line) => lines.push(line),
                Err(_) => break,
            }
        }
        lines
    }
}

impl Engine for EngineProcess {
    type Transport = TcpTransport;

    fn start(&mut self) -> Result<TcpTransport, EngineError> {
        self.stop();
        let dir = self.create_training_dir()?;
        if let Err(err) = self.spawn(&dir) {
            self.stop();
            return Err(err);
        }

        thread::sleep(self.settings.startup_grace);
        let exited = self
            .child
            .get_mut()
            .as_mut()
            .and_then(|child| child.try_wait().ok().flatten());
        if let Some(status) = exited {
            let output = self.collect_remaining_output();
            self.stop();
            return Err(EngineError::Exited {
                status: status.to_string(),
                output,
            });
        }

        let transport = self.connect();
        if transport.is_err() {
            self.stop();
        }
        transport
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.get_mut().take() {
            if let Err(err) = child.kill() {
                debug!(error = %err, "engine already gone");
            }
            match child.wait() {
                Ok(status) => info!(%status, "engine stopped"),
                Err(err) => warn!(error = %err, "failed to reap engine"),
            }
        }
        if let Some(dir) = self.training_dir.take() {
            if let Err(err) = dir.close() {
                warn!(error = %err, "failed to remove training directory");
            }
        }
    }

    fn is_running(&self) -> bool {
        let mut child = self.child.lock();
        matches!(child.as_mut().map(Child::try_wait), Some(Ok(None)))
    }

    fn drain_output(&mut self) -> Vec<String> {
        self.output
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default()
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stand-in agent the engine launches as player one. It checks whenever the
/// engine reports a game clock and leaves real decisions to the socket
/// client on the other side.
const PLAYER_STUB: &str = r#"#!/usr/bin/env python3
import socket
import sys


def main():
    port = int(sys.argv[-1]) if len(sys.argv) > 1 else 12345
    sock = socket.create_connection(("localhost", port))
    stream = sock.makefile("rw")
    for line in stream:
        if "T" in line:
            stream.write("K
")
            stream.flush()
    sock.close()


if __name__ == "__main__":
    main()
"#;

/// Writes `<dir>/<player_dir>/` with a `commands.json` describing how to
/// launch the agent-side player and the executable `player.py` it runs.
pub fn write_player_stub(dir: &Path, settings: &EngineSettings) -> std::io::Result<PathBuf> {
    let bot_dir = dir.join(&settings.player_dir);
    fs::create_dir_all(&bot_dir)?;
    let commands = serde_json::json!({
        "build": [],
        "run": settings.player_command,
    });
    let body = serde_json::to_string_pretty(&commands).map_err(std::io::Error::other)?;
    fs::write(bot_dir.join("commands.json"), body)?;

    let player = bot_dir.join("player.py");
    fs::write(&player, PLAYER_STUB)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&player, fs::Permissions::from_mode(0o755))?;
    }
    Ok(bot_dir)
}

fn capture_output(stdout: std::process::ChildStdout, tx: SyncSender<String>) {
    let mut dropped = 0usize;
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else { break };
        match tx.try_send(line.trim().to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                if dropped.is_power_of_two() {
                    warn!(dropped, "engine output buffer full, dropping lines");
                }
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
