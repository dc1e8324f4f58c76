//! Terminal rendering of bootstrap progress

use chef_bootstrap_core::{BootstrapEvent, OsFamily, OutputStream};
use console::style;

use super::CommandSpinner;

/// Remote output line prefixed with the host it came from
pub fn format_output_line(host: &str, stream: OutputStream, line: &str) -> String {
    match stream {
        OutputStream::Stdout => format!("{} {}", style(host).cyan(), line),
        OutputStream::Stderr => format!("{} {}", style(host).cyan(), style(line).yellow()),
    }
}

fn os_label(os: OsFamily) -> &'static str {
    match os {
        OsFamily::Windows => "windows",
        OsFamily::Linux => "linux",
        OsFamily::Other => "unix",
    }
}

/// Prints [`BootstrapEvent`]s as a run progresses
///
/// The spinner covers everything up to the connection; after that remote
/// output is printed line by line.
pub struct BootstrapPrinter {
    spinner: Option<CommandSpinner>,
    quiet: bool,
    host: String,
}

impl BootstrapPrinter {
    pub fn new(spinner: CommandSpinner, quiet: bool) -> Self {
        Self {
            spinner: Some(spinner),
            quiet,
            host: String::new(),
        }
    }

    fn update(&self, message: &str) {
        if let Some(spinner) = &self.spinner {
            spinner.update(message);
        }
    }

    fn note(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style(&self.host).cyan(), style(message).dim());
        }
    }

    pub fn handle(&mut self, event: BootstrapEvent<'_>) {
        match event {
            BootstrapEvent::Validated { host, protocol } => {
                self.host = host.to_string();
                self.update(&format!("Bootstrapping {host} over {protocol}..."));
            }
            BootstrapEvent::Registered { client_path } => {
                if let Some(path) = client_path {
                    self.update(&format!("Using client key {}", path.display()));
                }
            }
            BootstrapEvent::Connecting { user, host, port } => {
                self.update(&format!("Connecting to {user}@{host}:{port}..."));
            }
            BootstrapEvent::Connected { host, os } => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.success(&format!("Connected to {host} ({})", os_label(os)));
                }
            }
            BootstrapEvent::Rendered { template } => {
                self.note(&format!("Rendered bootstrap template {template}"));
            }
            BootstrapEvent::Uploading { path } => {
                self.note(&format!("Uploading bootstrap script to {path}"));
            }
            BootstrapEvent::Output { stream, line } => match stream {
                OutputStream::Stdout if self.quiet => {}
                OutputStream::Stdout => println!("{}", format_output_line(&self.host, stream, line)),
                OutputStream::Stderr => {
                    eprintln!("{}", format_output_line(&self.host, stream, line))
                }
            },
        }
    }

    /// Close the spinner after a successful run
    pub fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.success("Done");
        }
    }

    /// Mark the spinner failed, if it is still running
    pub fn abort(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.fail(&format!("Bootstrap of {} failed", self.host));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chef_bootstrap_core::Protocol;

    #[test]
    fn format_output_line_keeps_text() {
        let line = format_output_line("web01", OutputStream::Stdout, "Installing chef");
        assert!(line.contains("web01"));
        assert!(line.ends_with("Installing chef"));
        let line = format_output_line("web01", OutputStream::Stderr, "warning");
        assert!(line.contains("warning"));
    }

    #[test]
    fn printer_finishes_spinner_on_connect() {
        let mut printer = BootstrapPrinter::new(CommandSpinner::new_maybe("x", true), true);
        printer.handle(BootstrapEvent::Validated {
            host: "web01",
            protocol: Protocol::Ssh,
        });
        assert_eq!(printer.host, "web01");
        assert!(printer.spinner.is_some());

        printer.handle(BootstrapEvent::Connected {
            host: "web01",
            os: OsFamily::Linux,
        });
        assert!(printer.spinner.is_none());
        printer.abort();
    }
}
