//! Connection establishment with a single credential retry
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                     |
//!                     +-> AuthFailed -> Reauthenticating -> Connecting -> Connected
//!                     |                                          |
//!                     +-> Failed                                 +-> Failed
//! ```
//!
//! The retry happens at most once, and only when the first attempt was
//! rejected for credentials while no password had been supplied.

use crate::error::{BootstrapError, Result};
use crate::options::ConnectionOptions;
use crate::transport::{Connector, TargetHost};

/// Asks the operator for a password
pub trait PasswordPrompt: Send + Sync {
    fn prompt_password(&self, user: &str, host: &str) -> Result<String>;
}

/// Prompt for non-interactive runs: always declines
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl PasswordPrompt for NoPrompt {
    fn prompt_password(&self, user: &str, host: &str) -> Result<String> {
        Err(BootstrapError::Config(format!(
            "a password for {user}@{host} is required but no prompt is available"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AuthFailed,
    Reauthenticating,
    Connected,
    Failed,
}

/// Outcome of one connection attempt
enum Attempt {
    Connected(Box<dyn TargetHost>),
    RetryWithPassword(BootstrapError),
    Fatal(BootstrapError),
}

/// Drives a [`Connector`] through the connection state machine
pub struct ConnectionManager<'a> {
    connector: &'a dyn Connector,
    prompt: &'a dyn PasswordPrompt,
    state: ConnectionState,
    history: Vec<ConnectionState>,
}

impl<'a> ConnectionManager<'a> {
    pub fn new(connector: &'a dyn Connector, prompt: &'a dyn PasswordPrompt) -> Self {
        Self {
            connector,
            prompt,
            state: ConnectionState::Disconnected,
            history: vec![ConnectionState::Disconnected],
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Every state entered so far, starting with `Disconnected`
    pub fn history(&self) -> &[ConnectionState] {
        &self.history
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::trace!("connection state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    async fn attempt(&mut self, options: &ConnectionOptions, may_retry: bool) -> Attempt {
        self.transition(ConnectionState::Connecting);
        match self.connector.connect(options).await {
            Ok(session) => Attempt::Connected(session),
            Err(e) if may_retry && e.is_authentication_failure() => Attempt::RetryWithPassword(e),
            Err(e) => Attempt::Fatal(e),
        }
    }

    fn fail(&mut self, err: BootstrapError) -> Result<Box<dyn TargetHost>> {
        self.transition(ConnectionState::Failed);
        Err(err)
    }

    /// Open a session, prompting for a password once if needed
    pub async fn connect(&mut self, options: &ConnectionOptions) -> Result<Box<dyn TargetHost>> {
        let retry_allowed = !options.has_password();

        let err = match self.attempt(options, retry_allowed).await {
            Attempt::Connected(session) => {
                self.transition(ConnectionState::Connected);
                return Ok(session);
            }
            Attempt::Fatal(e) => return self.fail(e),
            Attempt::RetryWithPassword(e) => e,
        };

        let base = options.base();
        self.transition(ConnectionState::AuthFailed);
        tracing::warn!(
            "Failed to authenticate {} to {} - trying password auth",
            base.user,
            base.host
        );
        tracing::debug!("{}", err);

        self.transition(ConnectionState::Reauthenticating);
        let password = match self.prompt.prompt_password(&base.user, &base.host) {
            Ok(password) => password,
            Err(e) => return self.fail(e),
        };

        let retry = options.with_password(password);
        match self.attempt(&retry, false).await {
            Attempt::Connected(session) => {
                self.transition(ConnectionState::Connected);
                Ok(session)
            }
            Attempt::Fatal(e) | Attempt::RetryWithPassword(e) => self.fail(e),
        }
    }
}
