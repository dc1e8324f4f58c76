//! chef-bootstrap CLI entry point
//!
//! `ssh` re-runs this binary as its askpass helper when a password is
//! needed; in that mode it only prints the password.

use chef_bootstrap_core::transport::ssh::askpass_response;
use console::style;

fn main() {
    if let Some(password) = askpass_response() {
        println!("{password}");
        return;
    }

    if let Err(e) = chef_bootstrap::run() {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}
