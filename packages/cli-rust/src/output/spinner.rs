//! Spinner shown while a target is validated and connected
//!
//! Clones share one progress bar, so the password prompt can hide the
//! spinner that the event printer drives.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const TICK_CHARS: &str =
    "\u{28CB}\u{2819}\u{2839}\u{2838}\u{283C}\u{2834}\u{2826}\u{2827}\u{2807}\u{280F}";

/// Animated `spinner message (elapsed)` line, or nothing in quiet mode
///
/// ```ignore
/// let spinner = CommandSpinner::new_maybe("Connecting to web01...", quiet);
/// spinner.success("Connected to web01");
/// ```
#[derive(Clone)]
pub struct CommandSpinner {
    bar: Option<ProgressBar>,
}

impl CommandSpinner {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(template) =
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed_precise:.dim})")
        {
            bar.set_style(template.tick_chars(TICK_CHARS));
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(TICK_INTERVAL);
        Self { bar: Some(bar) }
    }

    pub fn new_maybe(message: &str, quiet: bool) -> Self {
        if quiet {
            Self { bar: None }
        } else {
            Self::new(message)
        }
    }

    pub fn update(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Clear the line while `f` writes to the terminal, then redraw
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }

    fn finish(&self, mark: String, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(format!("{mark} {message}"));
        }
    }

    pub fn success(self, message: &str) {
        self.finish(style("\u{2713}").green().to_string(), message);
    }

    pub fn fail(self, message: &str) {
        self.finish(style("\u{2717}").red().to_string(), message);
    }
}
