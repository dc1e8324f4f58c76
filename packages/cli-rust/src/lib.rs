//! chef-bootstrap CLI - Install and register the Chef client on remote hosts
//!
//! This module contains the CLI implementation driven by the binary.

mod commands;
mod output;
mod prompt;

use anyhow::Result;
use chef_bootstrap_core::{config, get_version, get_version_long, load_config};
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

/// Install and register the Chef client on a remote host
#[derive(Parser)]
#[command(name = "chef-bootstrap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Install and register the Chef client on a remote host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap a host over SSH or WinRM
    Bootstrap(commands::BootstrapArgs),
    /// Locate or render bootstrap templates
    Template(commands::TemplateArgs),
}

/// Log filter for the verbosity flags, unless RUST_LOG is set
fn default_log_filter(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose, quiet)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Configure color output
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    init_tracing(cli.verbose, cli.quiet);

    let config_path = config::paths::get_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

    let config = match load_config() {
        Ok(config) => {
            if cli.verbose > 0 {
                eprintln!(
                    "{} Config: {}",
                    style("[info]").cyan(),
                    config_path.display()
                );
                eprintln!("{} Version: {}", style("[info]").cyan(), get_version_long());
            }
            config
        }
        Err(e) => {
            // Display rich error for invalid config
            eprintln!("{} Configuration error", style("Error:").red().bold());
            eprintln!();
            eprintln!("  {:#}", e);
            eprintln!();
            eprintln!("  Config file: {}", style(config_path.display()).yellow());
            eprintln!();
            eprintln!(
                "  {} Check the config file for syntax errors or unknown fields.",
                style("Tip:").cyan()
            );
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Bootstrap(args)) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::cmd_bootstrap(&args, &config, cli.quiet))
        }
        Some(Commands::Template(args)) => commands::cmd_template(args, &config, cli.quiet),
        None => {
            // No command - show a welcome message and hint to use --help
            if !cli.quiet {
                println!(
                    "{} {}",
                    style("chef-bootstrap").cyan().bold(),
                    style(get_version()).dim()
                );
                println!();
                println!("Run {} for available commands.", style("--help").green());
            }
            Ok(())
        }
    }
}
