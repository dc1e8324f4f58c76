//! Script upload and execution on a connected target

use crate::error::{BootstrapError, Result};
use crate::options::{ConnectionOptions, SudoOptions};
use crate::shell;
use crate::transport::{OsFamily, OutputChunk, OutputStream, TargetHost};

pub const UNIX_SCRIPT_NAME: &str = "bootstrap.sh";
pub const WINDOWS_SCRIPT_NAME: &str = "bootstrap.bat";

/// Callback receiving complete lines of remote output
pub type LineSink<'a> = &'a mut (dyn FnMut(OutputStream, &str) + Send);

/// Reassembles chunks into lines per stream
#[derive(Debug, Default)]
struct LineBuffer {
    stdout: String,
    stderr: String,
}

impl LineBuffer {
    fn buffer(&mut self, stream: OutputStream) -> &mut String {
        match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        }
    }

    fn push(&mut self, chunk: OutputChunk<'_>, on_line: &mut (dyn FnMut(OutputStream, &str) + Send)) {
        let buffer = self.buffer(chunk.stream);
        buffer.push_str(chunk.data);
        while let Some(end) = buffer.find('\n') {
            let line: String = buffer.drain(..=end).collect();
            on_line(chunk.stream, line.trim_end_matches(['\r', '\n']));
        }
    }

    fn flush(&mut self, on_line: &mut (dyn FnMut(OutputStream, &str) + Send)) {
        for stream in [OutputStream::Stdout, OutputStream::Stderr] {
            let rest = std::mem::take(self.buffer(stream));
            if !rest.is_empty() {
                on_line(stream, rest.trim_end_matches('\r'));
            }
        }
    }
}

/// Uploads and runs the rendered bootstrap script over one session
pub struct BootstrapExecutor<'a> {
    session: &'a dyn TargetHost,
    sudo: SudoOptions,
}

impl<'a> BootstrapExecutor<'a> {
    pub fn new(session: &'a dyn TargetHost, options: &ConnectionOptions) -> Self {
        let sudo = match options {
            ConnectionOptions::Ssh(ssh) => ssh.sudo.clone(),
            ConnectionOptions::Winrm(_) => SudoOptions::Disabled,
        };
        Self { session, sudo }
    }

    /// Remote script path inside the session's temp dir
    pub fn remote_path(&self) -> String {
        let name = if self.session.base_os().is_windows() {
            WINDOWS_SCRIPT_NAME
        } else {
            UNIX_SCRIPT_NAME
        };
        let separator = if self.session.base_os().is_windows() { '\\' } else { '/' };
        let dir = self.session.temp_dir().trim_end_matches(['/', '\\']);
        self.session
            .normalize_path(&format!("{dir}{separator}{name}"))
    }

    /// Command that runs the uploaded script
    pub fn bootstrap_command(&self, remote_path: &str) -> String {
        match self.session.base_os() {
            OsFamily::Windows => format!("cmd.exe /C \"{remote_path}\""),
            OsFamily::Linux | OsFamily::Other => {
                self.sudo.wrap(&format!("sh {}", shell::quote(remote_path)))
            }
        }
    }

    /// Write the script to the target, returning its remote path
    pub async fn upload(&self, script: &str) -> Result<String> {
        let remote_path = self.remote_path();
        tracing::debug!("Uploading bootstrap script to {}", remote_path);
        self.session.save_as_remote_file(script, &remote_path).await?;
        Ok(remote_path)
    }

    /// Run the uploaded script, streaming its output line by line
    pub async fn execute(&self, remote_path: &str, on_line: LineSink<'_>) -> Result<()> {
        let command = self.bootstrap_command(remote_path);
        tracing::debug!("Running {}", command);

        let mut lines = LineBuffer::default();
        let result = self
            .session
            .run_command(&command, &mut |chunk| lines.push(chunk, &mut *on_line))
            .await;
        lines.flush(&mut *on_line);
        let result = result?;

        if result.success() {
            Ok(())
        } else {
            Err(BootstrapError::RemoteExecutionFailure {
                host: self.session.hostname().to_string(),
                status: result.exit_status,
                stderr: result.stderr.trim().to_string(),
            })
        }
    }

    /// Upload, execute and always remove the script
    pub async fn run(&self, script: &str, on_line: LineSink<'_>) -> Result<String> {
        let remote_path = self.upload(script).await?;
        let outcome = self.execute(&remote_path, on_line).await;

        if let Err(e) = self.session.del_file(&remote_path).await {
            tracing::warn!("Could not remove {} from {}: {}", remote_path, self.session.hostname(), e);
        }

        outcome.map(|()| remote_path)
    }
}
