//! SSH transport backed by the system `ssh` binary
//!
//! Every remote operation is one `ssh` invocation built from the
//! connection's [`SshOptions`]. Password authentication goes through
//! `SSH_ASKPASS`: the configured askpass program is run by `ssh` with
//! [`ASKPASS_PASSWORD_ENV`] set, and [`askpass_response`] hands the password
//! back.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::{
    CommandResult, Connector, OsFamily, OutputChunk, OutputSink, OutputStream, TargetHost,
};
use crate::config::paths::expand_home;
use crate::error::{BootstrapError, Result};
use crate::options::{ConnectionOptions, SshOptions};
use crate::shell;

/// Environment variable carrying the password to the askpass helper
pub const ASKPASS_PASSWORD_ENV: &str = "CHEF_BOOTSTRAP_ASKPASS_PASSWORD";

const CONNECT_TIMEOUT_SECS: u32 = 30;

/// Password to print when this process was started as an askpass helper
pub fn askpass_response() -> Option<String> {
    std::env::var(ASKPASS_PASSWORD_ENV).ok()
}

/// Opens [`SshSession`]s using the local OpenSSH client
#[derive(Debug, Clone, Default)]
pub struct SshProcessConnector {
    askpass_program: Option<PathBuf>,
}

impl SshProcessConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program `ssh` runs to obtain a password
    pub fn with_askpass_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.askpass_program = Some(program.into());
        self
    }
}

#[async_trait]
impl Connector for SshProcessConnector {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn TargetHost>> {
        let ConnectionOptions::Ssh(opts) = options else {
            return Err(BootstrapError::Transport(format!(
                "The ssh transport cannot open a {} connection",
                options.protocol()
            )));
        };

        let mut session = SshSession {
            args: ssh_args(opts),
            options: opts.clone(),
            askpass_program: self.askpass_program.clone(),
            os: OsFamily::Other,
            temp_dir: String::new(),
        };

        tracing::info!(
            "Connecting to {}@{}:{}",
            opts.base.user,
            opts.base.host,
            opts.base.port
        );
        // cmd.exe has no uname, `ver` answers there instead
        let probe = session.exec("uname -s || ver", None, &mut |_| {}).await?;
        check_auth(&probe, opts)?;
        session.os = OsFamily::from_uname(&probe.stdout);
        tracing::debug!("Detected {:?} on {}", session.os, opts.base.host);

        session.temp_dir = session.create_temp_dir().await?;
        Ok(Box::new(session))
    }
}

/// Build the argument list shared by every `ssh` call for a target
pub fn ssh_args(opts: &SshOptions) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if opts.base.password.is_some() {
        push_option(&mut args, "BatchMode=no".to_string());
        push_option(&mut args, "NumberOfPasswordPrompts=1".to_string());
    } else {
        push_option(&mut args, "BatchMode=yes".to_string());
    }
    push_option(&mut args, format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"));
    push_option(&mut args, "RequestTTY=no".to_string());

    if opts.verify_host_key {
        push_option(&mut args, "StrictHostKeyChecking=accept-new".to_string());
    } else {
        push_option(&mut args, "StrictHostKeyChecking=no".to_string());
        push_option(&mut args, "UserKnownHostsFile=/dev/null".to_string());
    }

    if opts.keys_only {
        push_option(&mut args, "IdentitiesOnly=yes".to_string());
    }

    if let Some(gateway) = &opts.gateway {
        // A second identity belongs to the gateway, which -J cannot target
        match opts.key_files.get(1).filter(|_| opts.keys_only) {
            Some(gateway_key) => {
                let mut proxy = format!(
                    "ProxyCommand=ssh -i {} -W %h:%p",
                    expand_home(gateway_key).display()
                );
                if let Some(port) = gateway.port {
                    proxy.push_str(&format!(" -p {port}"));
                }
                match &gateway.user {
                    Some(user) => proxy.push_str(&format!(" {user}@{}", gateway.host)),
                    None => proxy.push_str(&format!(" {}", gateway.host)),
                }
                push_option(&mut args, proxy);
            }
            None => {
                args.push("-J".to_string());
                args.push(gateway.to_string());
            }
        }
    }

    for key in &opts.key_files {
        args.push("-i".to_string());
        args.push(expand_home(key).display().to_string());
    }

    if opts.forward_agent {
        args.push("-A".to_string());
    }

    args.push("-p".to_string());
    args.push(opts.base.port.to_string());
    args.push(format!("{}@{}", opts.base.user, opts.base.host));
    args
}

fn push_option(args: &mut Vec<String>, value: impl Into<String>) {
    args.push("-o".to_string());
    args.push(value.into());
}

/// Map an ssh-level rejection of the probe command to an error
fn check_auth(probe: &CommandResult, opts: &SshOptions) -> Result<()> {
    // ssh exits 255 on its own failures, anything else came from the remote shell
    if probe.exit_status != 255 {
        return Ok(());
    }

    let stderr = probe.stderr.trim();
    if stderr.contains("Permission denied") || stderr.contains("Too many authentication failures")
    {
        return Err(BootstrapError::AuthenticationFailure {
            user: opts.base.user.clone(),
            host: opts.base.host.clone(),
            message: stderr.to_string(),
        });
    }

    Err(BootstrapError::Transport(format!(
        "ssh to {} failed: {}",
        opts.base.host, stderr
    )))
}

/// Next `\n`-terminated line, with invalid UTF-8 replaced
///
/// Bytes left in `buf` by a cancelled call are kept and completed by the
/// next one, so this can be raced in `tokio::select!`.
async fn next_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    reader.read_until(b'\n', buf).await?;
    if buf.is_empty() {
        return Ok(None);
    }
    let bytes = std::mem::take(buf);
    let line = String::from_utf8_lossy(&bytes);
    Ok(Some(format!("{}\n", line.trim_end_matches(['\r', '\n']))))
}

fn spawn_error(e: std::io::Error) -> BootstrapError {
    if e.kind() == std::io::ErrorKind::NotFound {
        BootstrapError::Transport("SSH not found. Install OpenSSH client.".to_string())
    } else {
        BootstrapError::Transport(e.to_string())
    }
}

/// A logical session over repeated `ssh` invocations
#[derive(Debug)]
pub struct SshSession {
    args: Vec<String>,
    options: SshOptions,
    askpass_program: Option<PathBuf>,
    os: OsFamily,
    temp_dir: String,
}

impl SshSession {
    fn command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(&self.args).arg(remote_command);

        if let (Some(password), Some(program)) =
            (&self.options.base.password, &self.askpass_program)
        {
            cmd.env("SSH_ASKPASS", program)
                .env("SSH_ASKPASS_REQUIRE", "force")
                .env("DISPLAY", ":0")
                .env(ASKPASS_PASSWORD_ENV, password);
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run one remote command, optionally writing `input` to its stdin
    async fn exec(
        &self,
        remote_command: &str,
        input: Option<&str>,
        on_output: OutputSink<'_>,
    ) -> Result<CommandResult> {
        let mut cmd = self.command(remote_command);
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(spawn_error)?;

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BootstrapError::Transport("ssh stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BootstrapError::Transport("ssh stderr was not captured".to_string()))?;

        let mut out_reader = BufReader::new(stdout);
        let mut err_reader = BufReader::new(stderr);
        let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
        let mut result = CommandResult::default();
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            tokio::select! {
                line = next_line_lossy(&mut out_reader, &mut out_buf), if !out_done => match line? {
                    Some(line) => {
                        on_output(OutputChunk { stream: OutputStream::Stdout, data: &line });
                        result.stdout.push_str(&line);
                    }
                    None => out_done = true,
                },
                line = next_line_lossy(&mut err_reader, &mut err_buf), if !err_done => match line? {
                    Some(line) => {
                        on_output(OutputChunk { stream: OutputStream::Stderr, data: &line });
                        result.stderr.push_str(&line);
                    }
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        result.exit_status = status.code().unwrap_or(-1);
        Ok(result)
    }

    /// Run a housekeeping command and fail on a non-zero exit
    async fn exec_checked(&self, remote_command: &str, input: Option<&str>) -> Result<String> {
        let result = self.exec(remote_command, input, &mut |_| {}).await?;
        if result.success() {
            Ok(result.stdout)
        } else {
            Err(BootstrapError::RemoteExecutionFailure {
                host: self.options.base.host.clone(),
                status: result.exit_status,
                stderr: result.stderr,
            })
        }
    }

    async fn create_temp_dir(&self) -> Result<String> {
        let command = if self.os.is_windows() {
            "echo %TEMP%"
        } else {
            "mktemp -d /tmp/chef_bootstrap.XXXXXX"
        };
        let output = self.exec_checked(command, None).await?;
        let dir = output.trim().to_string();
        if dir.is_empty() {
            return Err(BootstrapError::Transport(format!(
                "Could not create a temporary directory on {}",
                self.options.base.host
            )));
        }
        Ok(dir)
    }
}

#[async_trait]
impl TargetHost for SshSession {
    fn base_os(&self) -> OsFamily {
        self.os
    }

    fn user(&self) -> &str {
        &self.options.base.user
    }

    fn hostname(&self) -> &str {
        &self.options.base.host
    }

    async fn run_command(&self, command: &str, on_output: OutputSink<'_>) -> Result<CommandResult> {
        self.exec(command, None, on_output).await
    }

    async fn save_as_remote_file(&self, content: &str, remote_path: &str) -> Result<()> {
        let command = if self.os.is_windows() {
            format!(
                "powershell -NoProfile -Command \"[Console]::In.ReadToEnd() | Set-Content -NoNewline -Path '{remote_path}'\""
            )
        } else {
            format!("cat > {}", shell::quote(remote_path))
        };
        self.exec_checked(&command, Some(content)).await?;
        tracing::debug!("Wrote {} bytes to {}", content.len(), remote_path);
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
        let command = if self.os.is_windows() {
            format!("del /F /Q \"{path}\"")
        } else {
            format!("rm -f {}", shell::quote(path))
        };
        self.exec_checked(&command, None).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // %TEMP% on Windows is shared, only the mktemp directory is ours
        if !self.os.is_windows() && !self.temp_dir.is_empty() {
            self.exec_checked(&format!("rm -rf {}", shell::quote(&self.temp_dir)), None)
                .await?;
        }
        Ok(())
    }
}
