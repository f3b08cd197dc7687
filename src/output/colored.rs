//! Colored formatter implementation with terminal color support
//!
//! Colour is applied to status tags and headings only, so the coloured
//! report carries exactly the canonical text once the escapes are removed.

use super::formatter::{render_report, OutputFormatter, Paint, Tone};
use crate::{
    error::{AppError, Result},
    report::DiagnosticReport,
};
use colored::*;

/// Color scheme for different report elements
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
        }
    }
}

impl Paint for ColorScheme {
    fn paint(&self, text: &str, tone: Tone) -> String {
        let painted = match tone {
            Tone::Heading => text.color(self.header).bold(),
            Tone::Good => text.color(self.success),
            Tone::Warning => text.color(self.warning).bold(),
            Tone::Bad => text.color(self.error).bold(),
            Tone::Info => text.color(self.info),
            Tone::Muted => text.color(self.muted),
        };
        painted.to_string()
    }
}

/// Colored formatter implementation
#[derive(Debug, Clone, Default)]
pub struct ColoredFormatter {
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a colored formatter with custom color scheme
    pub fn with_color_scheme(color_scheme: ColorScheme) -> Self {
        Self { color_scheme }
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_report(&self, report: &DiagnosticReport) -> Result<String> {
        render_report(report, &self.color_scheme)
    }

    fn format_error(&self, error: &AppError) -> String {
        error.format_for_console(true)
    }

    fn format_warning(&self, warning: &str) -> String {
        format!("{} {}", "[WARNING]".color(self.color_scheme.warning).bold(), warning)
    }
}
