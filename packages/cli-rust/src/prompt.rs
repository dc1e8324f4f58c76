//! Interactive password prompt used when key authentication is refused

use chef_bootstrap_core::{BootstrapError, PasswordPrompt};
use console::Term;
use dialoguer::Password;

use crate::output::CommandSpinner;

/// Asks on the terminal, hiding the spinner while it waits
pub struct TerminalPrompt {
    spinner: CommandSpinner,
}

impl TerminalPrompt {
    pub fn new(spinner: CommandSpinner) -> Self {
        Self { spinner }
    }
}

impl PasswordPrompt for TerminalPrompt {
    fn prompt_password(&self, user: &str, host: &str) -> chef_bootstrap_core::Result<String> {
        if !Term::stderr().is_term() {
            return Err(BootstrapError::Config(format!(
                "a password for {user}@{host} is required; pass --connection-password when not running interactively"
            )));
        }

        self.spinner.suspend(|| {
            Password::new()
                .with_prompt(format!("Enter password for {user}@{host}"))
                .interact()
                .map_err(|e| {
                    let _ = Term::stderr().show_cursor();
                    BootstrapError::Config(format!("Password prompt cancelled: {e}"))
                })
        })
    }
}
