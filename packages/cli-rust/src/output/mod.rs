//! Output utilities for CLI commands
//!
//! Spinners with elapsed time display for the connection phase, and the
//! printer that turns bootstrap progress events into terminal output.

pub mod progress;
pub mod spinner;

pub use progress::BootstrapPrinter;
pub use spinner::CommandSpinner;
