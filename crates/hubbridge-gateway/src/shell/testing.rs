//! In-memory shell used by unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{ShellConnector, ShellTransport};
use crate::error::{GatewayError, Result};

pub(crate) type Answers = Arc<Mutex<HashMap<String, String>>>;
pub(crate) type Transcript = Arc<Mutex<Vec<String>>>;

pub(crate) fn answers(table: &[(&str, &str)]) -> Answers {
    Arc::new(Mutex::new(
        table
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    ))
}

/// Echoes each line, prints the matching answer and a `# ` prompt
pub(crate) struct FakeShell {
    pub(crate) buffer: Vec<u8>,
    pub(crate) password: Option<String>,
    answers: Answers,
    written: Transcript,
}

impl FakeShell {
    pub(crate) fn new(answers: Answers, written: Transcript) -> Self {
        Self {
            buffer: b"\r\nAqara login: ".to_vec(),
            password: None,
            answers,
            written,
        }
    }
}

#[async_trait]
impl ShellTransport for FakeShell {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(data).trim_end().to_string();
        self.written.lock().unwrap().push(line.clone());

        if line == "admin" && self.password.is_some() {
            self.buffer.extend_from_slice(b"Password: ");
            return Ok(());
        }
        self.buffer.extend_from_slice(line.as_bytes());
        self.buffer.extend_from_slice(b"\r\n");
        if let Some(answer) = self.answers.lock().unwrap().get(&line) {
            self.buffer.extend_from_slice(answer.as_bytes());
            self.buffer.extend_from_slice(b"\r\n");
        }
        self.buffer.extend_from_slice(b"# ");
        Ok(())
    }

    async fn read_until(&mut self, marker: &[u8], _timeout: Duration) -> Result<Vec<u8>> {
        let pos = self
            .buffer
            .windows(marker.len())
            .position(|w| w == marker)
            .ok_or_else(|| GatewayError::timeout("marker not found"))?;
        Ok(self.buffer.drain(..pos + marker.len()).collect())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Hands out [`FakeShell`]s sharing one answer table
pub(crate) struct FakeConnector {
    pub(crate) answers: Answers,
    pub(crate) written: Transcript,
    pub(crate) reachable: AtomicBool,
    pub(crate) connects: AtomicUsize,
}

impl FakeConnector {
    pub(crate) fn new(answers: Answers) -> Self {
        Self {
            answers,
            written: Arc::new(Mutex::new(Vec::new())),
            reachable: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ShellConnector for FakeConnector {
    async fn probe(&self, _host: &str, _port: u16) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn ShellTransport>> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(GatewayError::connection(format!("{}:{} refused", host, port)));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeShell::new(
            self.answers.clone(),
            self.written.clone(),
        )))
    }
}
