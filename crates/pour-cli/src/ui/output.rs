//! Line-oriented status output on stderr.
//!
//! Every line is written under one lock so concurrent installs never
//! interleave partial lines.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crossterm::style::Stylize;
use pour_core::Reporter;
use pour_schema::{PackageName, Version};

use super::theme::{NAME_WIDTH, Theme, VERSION_WIDTH, format_size};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Styled reporter used by every command.
#[derive(Clone)]
pub struct Output {
    quiet: bool,
    theme: Theme,
    sink: Sink,
}

impl Output {
    /// Write to stderr.
    pub fn new(quiet: bool) -> Self {
        Self::with_writer(quiet, io::stderr())
    }

    pub fn with_writer(quiet: bool, writer: impl Write + Send + 'static) -> Self {
        Self {
            quiet,
            theme: Theme::default(),
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    fn line(&self, text: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        // A closed stderr is not worth failing an install over.
        let _ = writeln!(sink, "{text}");
        let _ = sink.flush();
    }

    fn status(&self, icon: String, name: &PackageName, version: &Version, detail: &str) {
        let c = &self.theme.colors;
        let name = format!("{:<NAME_WIDTH$}", name.as_str()).with(c.package_name);
        let version = format!("{:<VERSION_WIDTH$}", version.as_str()).with(c.version);
        self.line(&format!("  {icon} {name} {version} {}", detail.with(c.secondary)));
    }

    fn progress(&self, name: &PackageName, version: &Version, detail: &str) {
        if !self.quiet {
            let icon = self.theme.icons.active.with(self.theme.colors.active).to_string();
            self.status(icon, name, version, detail);
        }
    }

    /// Bold section title.
    pub fn section(&self, title: &str) {
        if !self.quiet {
            self.line(&format!("{}", title.bold()));
        }
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            let icon = self.theme.icons.success.with(self.theme.colors.success);
            self.line(&format!("{icon} {msg}"));
        }
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl Reporter for Output {
    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        // Progress is line based: only announce the start.
        if current == 0 {
            let detail = match total {
                Some(t) => format!("downloading {}", format_size(t)),
                None => "downloading".to_string(),
            };
            self.progress(name, version, &detail);
        }
    }

    fn verifying(&self, name: &PackageName, version: &Version) {
        self.progress(name, version, "verifying");
    }

    fn extracting(&self, name: &PackageName, version: &Version) {
        self.progress(name, version, "extracting");
    }

    fn installing(&self, name: &PackageName, version: &Version) {
        self.progress(name, version, "installing");
    }

    fn removing(&self, name: &PackageName, version: &Version) {
        self.progress(name, version, "removing");
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str, size: Option<u64>) {
        if self.quiet {
            return;
        }
        let detail = match size {
            Some(bytes) => format!("{detail} ({})", format_size(bytes)),
            None => detail.to_string(),
        };
        let icon = self.theme.icons.success.with(self.theme.colors.success).to_string();
        self.status(icon, name, version, &detail);
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        let icon = self.theme.icons.error.with(self.theme.colors.error).to_string();
        self.status(icon, name, version, reason);
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            let icon = self.theme.icons.info.with(self.theme.colors.secondary);
            self.line(&format!("{icon} {msg}"));
        }
    }

    fn warning(&self, msg: &str) {
        let icon = self.theme.icons.warning.with(self.theme.colors.warning);
        self.line(&format!("{icon} {}", msg.with(self.theme.colors.warning)));
    }

    fn error(&self, msg: &str) {
        let icon = self.theme.icons.error.with(self.theme.colors.error);
        self.line(&format!("{icon} {}", msg.with(self.theme.colors.error)));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        if self.quiet || count == 0 {
            return;
        }
        let noun = if count == 1 { "package" } else { "packages" };
        self.line(&format!(
            "{}",
            format!("{count} {noun} {action} in {elapsed_secs:.1}s").with(self.theme.colors.secondary)
        ));
    }
}
