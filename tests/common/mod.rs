#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pokerbots_env::engine::{Engine, EngineError};
use pokerbots_env::transport::{Transport, TransportError};

/// One scripted reply: a line, or a read timeout.
#[derive(Debug, Clone)]
pub enum Reply {
    Line(&'static str),
    Timeout,
}

pub struct ScriptedTransport {
    replies: VecDeque<Reply>,
    sent: Arc<Mutex<Vec<String>>>,
    refuse_sends: bool,
}

impl Transport for ScriptedTransport {
    fn send_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        if self.refuse_sends {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(frame.to_string());
        Ok(())
    }

    fn recv_line(&mut self) -> Result<Option<String>, TransportError> {
        match self.replies.pop_front() {
            Some(Reply::Line(line)) => Ok(Some(line.to_string())),
            Some(Reply::Timeout) => Err(TransportError::Timeout),
            None => Ok(None),
        }
    }
}

/// In-memory engine replaying the same script on every start.
pub struct ScriptedEngine {
    script: Vec<Reply>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub starts: usize,
    pub refuse_sends: bool,
    pub unavailable: bool,
    /// Console lines handed out by the next `drain_output`.
    pub console: Vec<String>,
    running: bool,
}

impl ScriptedEngine {
    pub fn new(lines: &[&'static str]) -> Self {
        Self::with_replies(lines.iter().copied().map(Reply::Line).collect())
    }

    pub fn with_replies(script: Vec<Reply>) -> Self {
        Self {
            script,
            sent: Arc::new(Mutex::new(Vec::new())),
            starts: 0,
            refuse_sends: false,
            unavailable: false,
            console: Vec::new(),
            running: false,
        }
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Engine for ScriptedEngine {
    type Transport = ScriptedTransport;

    fn start(&mut self) -> Result<ScriptedTransport, EngineError> {
        if self.unavailable {
            return Err(EngineError::Exited {
                status: "scripted engine unavailable".to_string(),
                output: Vec::new(),
            });
        }
        self.starts += 1;
        self.running = true;
        Ok(ScriptedTransport {
            replies: self.script.iter().cloned().collect(),
            sent: Arc::clone(&self.sent),
            refuse_sends: self.refuse_sends,
        })
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn drain_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.console)
    }
}

/// Real TCP engine: writes a line, waits for one action, repeats, then hangs
/// up after the last line. Returns the actions it received.
pub fn spawn_tcp_engine(script: Vec<&'static str>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind scripted engine");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept client");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut writer = stream;
        let mut received = Vec::new();

        for (position, line) in script.iter().enumerate() {
            if writeln!(writer, "{line}").and_then(|_| writer.flush()).is_err() {
                break;
            }
            if position + 1 == script.len() {
                break;
            }
            let mut action = String::new();
            match reader.read_line(&mut action) {
                Ok(0) | Err(_) => break,
                Ok(_) => received.push(action.trim_end().to_string()),
            }
        }
        received
    });
    (addr, handle)
}

/// TCP engine that sends `opening`, reads one action, then goes silent for
/// `stall` before hanging up. Returns the action it received.
pub fn spawn_stalling_engine(
    opening: &'static str,
    stall: Duration,
) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stalling engine");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept client");
        let mut writer = stream.try_clone().expect("clone stream");
        writeln!(writer, "{opening}").expect("write opening line");
        let mut action = String::new();
        let _ = BufReader::new(stream).read_line(&mut action);
        thread::sleep(stall);
        action.trim_end().to_string()
    });
    (addr, handle)
}
