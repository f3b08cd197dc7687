//! Output formatting and display system
//!
//! Plain and coloured text share one renderer; JSON serializes the report
//! structure directly for scripts.

mod colored;
mod formatter;

pub use colored::{ColorScheme, ColoredFormatter};
pub use formatter::{
    render_report, NoPaint, OutputFormatter, Paint, PlainFormatter, Tone, REPORT_FOOTER, REPORT_HEADER,
    UNTESTED,
};

use crate::{
    error::{AppError, Result},
    report::DiagnosticReport,
};

/// Machine-readable formatter
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_report(&self, report: &DiagnosticReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    fn format_error(&self, error: &AppError) -> String {
        serde_json::json!({
            "error": error.to_string(),
            "category": error.category(),
            "exit_code": error.exit_code(),
        })
        .to_string()
    }

    fn format_warning(&self, warning: &str) -> String {
        serde_json::json!({ "warning": warning }).to_string()
    }
}

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// JSON wins over colour; colour only applies to text output
    pub fn create(json: bool, enable_color: bool) -> Box<dyn OutputFormatter> {
        if json {
            Box::new(JsonFormatter::new())
        } else if enable_color {
            Box::new(ColoredFormatter::new())
        } else {
            Box::new(PlainFormatter::new())
        }
    }

    /// Create a plain text formatter for scripts/logs
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create(false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportBuilder;

    #[test]
    fn test_json_report_round_trips_structure() {
        let report = ReportBuilder::new().ping_host("1.1.1.1").build();
        let json = JsonFormatter.format_report(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["ping_host"], "1.1.1.1");
        assert_eq!(value["status_line"], "[INCOMPLETE] 4 checks untested");
        assert_eq!(value["untested_checks"], 4);
        assert!(value["ping"].is_null());
    }

    #[test]
    fn test_json_error_carries_exit_code() {
        let rendered = JsonFormatter.format_error(&AppError::platform("no snapshot"));
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["category"], "PLATFORM");
        assert_eq!(value["exit_code"], 3);
    }

    #[test]
    fn test_factory_plain_output_has_no_escapes() {
        let report = ReportBuilder::new().build();
        let text = OutputFormatterFactory::create_plain_formatter()
            .format_report(&report)
            .unwrap();
        assert!(!text.contains('\u{1b}'));
        assert!(text.starts_with(REPORT_HEADER));
    }
}
