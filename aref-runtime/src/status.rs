//! Terse console status lines
//!
//! The console only gets short progress lines; detail goes to the log.

use tracing::{error, info};

/// Console output volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// `--verbose` wins over `--quiet`
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub fn is_verbose(self) -> bool {
        self == Self::Verbose
    }
}

/// Prints `[*]` (verbose) or `[+]` (normal) lines, nothing when quiet
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPrinter {
    verbosity: Verbosity,
}

impl StatusPrinter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Render a status line, or `None` when quiet
    pub fn format(&self, message: &str) -> Option<String> {
        match self.verbosity {
            Verbosity::Verbose => Some(format!("[*] {message}")),
            Verbosity::Normal => Some(format!("[+] {message}")),
            Verbosity::Quiet => None,
        }
    }

    pub fn line(&self, message: &str) {
        if let Some(line) = self.format(message) {
            println!("{line}");
        }
        info!("{}", message);
    }

    /// Result lines (such as saved report paths) are shown even when quiet
    pub fn announce(&self, message: &str) {
        println!("{}", Self::format_announcement(message));
        info!("{}", message);
    }

    pub fn format_announcement(message: &str) -> String {
        format!("[+] {message}")
    }

    /// Fatal errors are always shown
    pub fn fatal(&self, message: &str) {
        eprintln!("[-] {message}");
        error!("{}", message);
    }
}
