//! Transport seam
//!
//! The bootstrap flow talks to the remote host only through [`TargetHost`],
//! and obtains one only through a [`Connector`]. Wire protocols live behind
//! these traits; this crate ships an OpenSSH-process connector in [`ssh`].

pub mod ssh;

use async_trait::async_trait;

use crate::error::{BootstrapError, Result};
use crate::options::ConnectionOptions;
use crate::protocol::Protocol;

/// Operating system family of a connected target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Linux,
    Other,
}

impl OsFamily {
    pub fn is_windows(&self) -> bool {
        matches!(self, OsFamily::Windows)
    }

    /// Classify the output of `uname -s`, or of `ver` on Windows
    pub fn from_uname(output: &str) -> Self {
        let lowered = output.to_lowercase();
        if lowered.contains("windows")
            || lowered.contains("mingw")
            || lowered.contains("msys")
            || lowered.contains("cygwin")
        {
            OsFamily::Windows
        } else if lowered.lines().any(|line| line.trim() == "linux") {
            OsFamily::Linux
        } else {
            OsFamily::Other
        }
    }
}

/// Which stream a chunk of remote output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A piece of remote output
///
/// Chunks carry no line-boundary guarantee; a chunk may end mid-line.
#[derive(Debug, Clone, Copy)]
pub struct OutputChunk<'a> {
    pub stream: OutputStream,
    pub data: &'a str,
}

/// Final state of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Callback receiving remote output while a command runs
pub type OutputSink<'a> = &'a mut (dyn FnMut(OutputChunk<'_>) + Send);

/// An open session to a bootstrap target
///
/// Calls on one session must not overlap.
#[async_trait]
pub trait TargetHost: Send + Sync {
    fn base_os(&self) -> OsFamily;

    /// User the session is authenticated as
    fn user(&self) -> &str;

    fn hostname(&self) -> &str;

    /// Run `command`, streaming output to `on_output` as it arrives
    async fn run_command(&self, command: &str, on_output: OutputSink<'_>) -> Result<CommandResult>;

    /// Write `content` to `remote_path`, replacing any existing file
    async fn save_as_remote_file(&self, content: &str, remote_path: &str) -> Result<()>;

    /// Scratch directory owned by this session
    fn temp_dir(&self) -> &str;

    /// Convert a path to the target's native form
    fn normalize_path(&self, path: &str) -> String;

    async fn del_file(&self, path: &str) -> Result<()>;

    /// Release the session and anything it created on the target
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens sessions from a connection bundle
///
/// Credential rejections must surface as
/// [`BootstrapError::AuthenticationFailure`]; every other failure is passed
/// through unchanged by the connection manager.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn TargetHost>>;
}

/// Dispatches to a connector per protocol
#[derive(Default)]
pub struct ProtocolConnector {
    ssh: Option<Box<dyn Connector>>,
    winrm: Option<Box<dyn Connector>>,
}

impl ProtocolConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set the SSH connector
    pub fn with_ssh(mut self, connector: impl Connector + 'static) -> Self {
        self.ssh = Some(Box::new(connector));
        self
    }

    /// Builder pattern: set the WinRM connector
    pub fn with_winrm(mut self, connector: impl Connector + 'static) -> Self {
        self.winrm = Some(Box::new(connector));
        self
    }
}

#[async_trait]
impl Connector for ProtocolConnector {
    async fn connect(&self, options: &ConnectionOptions) -> Result<Box<dyn TargetHost>> {
        let protocol = options.protocol();
        let connector = match protocol {
            Protocol::Ssh => self.ssh.as_ref(),
            Protocol::Winrm => self.winrm.as_ref(),
        };
        match connector {
            Some(connector) => connector.connect(options).await,
            None => Err(BootstrapError::Transport(format!(
                "No {protocol} transport is available in this build"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLayers;
    use crate::options::connection_opts;
    use crate::protocol::HostTarget;

    #[test]
    fn test_os_family_from_uname() {
        assert_eq!(OsFamily::from_uname("Linux\n"), OsFamily::Linux);
        assert_eq!(OsFamily::from_uname("Darwin\n"), OsFamily::Other);
        assert_eq!(OsFamily::from_uname("MINGW64_NT-10.0"), OsFamily::Windows);
        assert_eq!(
            OsFamily::from_uname("'uname' is not recognized\r\nWindows\r\n"),
            OsFamily::Windows
        );
        assert!(OsFamily::Windows.is_windows());
        assert!(!OsFamily::Linux.is_windows());
    }

    #[tokio::test]
    async fn test_protocol_connector_without_winrm() {
        let connector = ProtocolConnector::new();
        let target = HostTarget::parse("winrm://win01").unwrap();
        let opts = connection_opts(Protocol::Winrm, &target, &ConfigLayers::default()).unwrap();

        let err = connector.connect(&opts).await.err().unwrap();
        assert!(matches!(err, BootstrapError::Transport(_)));
        assert!(err.to_string().contains("winrm"));
    }
}
