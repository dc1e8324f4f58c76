//! In-memory transport used by unit tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{BootstrapError, Result};
use crate::options::ConnectionOptions;
use crate::transport::{
    CommandResult, Connector, OsFamily, OutputChunk, OutputSink, OutputStream, TargetHost,
};

/// Shared record of what happened on a fake host
pub type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
pub struct FakeHost {
    os: OsFamily,
    user: String,
    hostname: String,
    temp_dir: String,
    output: Vec<String>,
    exit_status: i32,
    stderr: String,
    events: EventLog,
    files: Arc<Mutex<BTreeMap<String, String>>>,
    uploads: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeHost {
    fn new(os: OsFamily, temp_dir: &str) -> Self {
        Self {
            os,
            user: "root".to_string(),
            hostname: "fake".to_string(),
            temp_dir: temp_dir.to_string(),
            output: Vec::new(),
            exit_status: 0,
            stderr: String::new(),
            events: EventLog::default(),
            files: Arc::default(),
            uploads: Arc::default(),
        }
    }

    pub fn linux() -> Self {
        Self::new(OsFamily::Linux, "/tmp/fake")
    }

    pub fn windows() -> Self {
        Self::new(OsFamily::Windows, r"C:\Temp")
    }

    /// Stdout chunks emitted by every command
    pub fn with_output(mut self, chunks: &[&str]) -> Self {
        self.output = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_exit_status(mut self, status: i32, stderr: &str) -> Self {
        self.exit_status = status;
        self.stderr = stderr.to_string();
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Every file written, in order, including ones deleted since
    pub fn uploaded(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl TargetHost for FakeHost {
    fn base_os(&self) -> OsFamily {
        self.os
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn run_command(&self, command: &str, on_output: OutputSink<'_>) -> Result<CommandResult> {
        self.record(format!("run {command}"));
        for chunk in &self.output {
            on_output(OutputChunk {
                stream: OutputStream::Stdout,
                data: chunk,
            });
        }
        if !self.stderr.is_empty() {
            on_output(OutputChunk {
                stream: OutputStream::Stderr,
                data: &self.stderr,
            });
        }
        Ok(CommandResult {
            exit_status: self.exit_status,
            stdout: self.output.concat(),
            stderr: self.stderr.clone(),
        })
    }

    async fn save_as_remote_file(&self, content: &str, remote_path: &str) -> Result<()> {
        self.record(format!("save {remote_path}"));
        self.files
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), content.to_string());
        self.uploads
            .lock()
            .unwrap()
            .push((remote_path.to_string(), content.to_string()));
        Ok(())
    }

    fn temp_dir(&self) -> &str {
        &self.temp_dir
    }

    fn normalize_path(&self, path: &str) -> String {
        if self.os.is_windows() {
            path.replace('/', "\\")
        } else {
            path.to_string()
        }
    }

    async fn del_file(&self, path: &str) -> Result<()> {
        self.record(format!("del {path}"));
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record("close".to_string());
        Ok(())
    }
}

/// What the next `connect` call does
pub enum Scripted {
    Connect(FakeHost),
    RejectCredentials,
    Fail(String),
}

/// Connector that replays scripted outcomes and records the options it saw
#[derive(Default)]
pub struct ScriptedConnector {
    outcomes: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<ConnectionOptions>>,
}

impl ScriptedConnector {
    pub fn new(outcomes: Vec<Scripted>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            seen: Mutex::default(),
        }
    }

    pub fn seen(&self) -> Vec<ConnectionOptions> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn TargetHost>> {
        self.seen.lock().unwrap().push(options.clone());
        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Connect(host)) => Ok(Box::new(host)),
            Some(Scripted::RejectCredentials) => Err(BootstrapError::AuthenticationFailure {
                user: options.base().user.clone(),
                host: options.base().host.clone(),
                message: "Permission denied (publickey)".to_string(),
            }),
            Some(Scripted::Fail(message)) => Err(BootstrapError::Transport(message)),
            None => Err(BootstrapError::Transport("no scripted outcome left".to_string())),
        }
    }
}
