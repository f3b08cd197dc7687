//! Core formatting trait and the canonical text rendering
//!
//! [`render_report`] is the single source of the report's text layout. The
//! plain and coloured formatters differ only in how they paint status tags,
//! so stripping colour from coloured output yields the canonical text.

use crate::{
    analyzer::{overall_headline, ProtocolBlockingReport, TargetCheck},
    error::{AppError, Result},
    models::{PingStatistics, SpeedEstimate},
    platform::{NetworkSnapshot, TrafficCounters},
    report::{DiagnosticReport, DnsServerCheck, SiteCheck},
    types::{CheckStatus, SpeedConfidence},
};
use std::fmt::Write as _;

pub const REPORT_HEADER: &str = "=== NETWORK DIAGNOSTIC REPORT ===";
pub const REPORT_FOOTER: &str = "=== END OF REPORT ===";
pub const UNTESTED: &str = "UNTESTED";

/// Packet loss above this gets an inline warning
const LOSS_WARNING_PERCENT: f64 = 10.0;
const LATENCY_WARNING_MS: f64 = 200.0;
const SPEED_WARNING_MBPS: f64 = 1.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Main trait for output formatting
pub trait OutputFormatter {
    /// Render a complete diagnostic report
    fn format_report(&self, report: &DiagnosticReport) -> Result<String>;

    /// Format an error that prevented a run
    fn format_error(&self, error: &AppError) -> String;

    /// Format a configuration or runtime warning
    fn format_warning(&self, warning: &str) -> String;
}

/// What a painted fragment conveys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Heading,
    Good,
    Warning,
    Bad,
    Info,
    Muted,
}

/// Decorates tags and headings; the plain painter returns text unchanged
pub trait Paint {
    fn paint(&self, text: &str, tone: Tone) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPaint;

impl Paint for NoPaint {
    fn paint(&self, text: &str, _tone: Tone) -> String {
        text.to_string()
    }
}

/// Canonical plain-text formatter
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl PlainFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_report(&self, report: &DiagnosticReport) -> Result<String> {
        render_report(report, &NoPaint)
    }

    fn format_error(&self, error: &AppError) -> String {
        error.format_for_console(false)
    }

    fn format_warning(&self, warning: &str) -> String {
        format!("[WARNING] {}", warning)
    }
}

/// Render `report` as text, painting tags through `paint`
pub fn render_report(report: &DiagnosticReport, paint: &dyn Paint) -> Result<String> {
    let mut out = String::new();

    if let Some(error) = &report.error {
        writeln!(out, "{} {}", paint.paint("[ERROR]", Tone::Bad), format_args!("Diagnostic failed: {}", error))?;
    }
    writeln!(out, "{}", paint.paint(REPORT_HEADER, Tone::Heading))?;

    section(&mut out, paint, "1. CONNECTION STATUS:")?;
    render_connection(&mut out, paint, report)?;

    section(&mut out, paint, "2. INTERNET CONNECTIVITY TESTS:")?;
    if report.sites.is_empty() {
        writeln!(out, "{}", paint.paint(UNTESTED, Tone::Muted))?;
    }
    for site in &report.sites {
        writeln!(out, "[{:<15}] {}", site.target, site_status(site, "OK", paint))?;
    }

    section(&mut out, paint, "3. PACKET LOSS & PING TEST:")?;
    render_ping(&mut out, paint, &report.ping_host, report.ping.as_ref())?;

    section(&mut out, paint, "4. DNS & CENSORSHIP TESTS:")?;
    if report.dns_servers.is_empty() {
        writeln!(out, "[DNS] {}", paint.paint(UNTESTED, Tone::Muted))?;
    }
    for check in &report.dns_servers {
        writeln!(out, "[DNS {:<15}] {}", check.server.to_string(), dns_status(check, paint))?;
    }
    writeln!(out)?;
    writeln!(out, "[CENSORSHIP BLOCKING DETECTION]")?;
    if report.censorship.is_empty() {
        writeln!(out, "{}", paint.paint(UNTESTED, Tone::Muted))?;
    }
    for site in &report.censorship {
        writeln!(out, "[{:<15}] {}", site.target, site_status(site, "ACCESSIBLE", paint))?;
    }
    writeln!(out)?;
    writeln!(out, "[PROXY DETECTION]")?;
    match report.connection.as_ref().and_then(|c| c.proxy.as_deref()) {
        Some(proxy) => writeln!(out, "[PROXY] {} {}", paint.paint("DETECTED:", Tone::Warning), proxy)?,
        None => writeln!(out, "[PROXY] NOT DETECTED")?,
    }

    section(&mut out, paint, "5. VPN PROTOCOL BLOCKING:")?;
    match &report.protocol_blocking {
        Some(protocols) => render_protocols(&mut out, paint, protocols)?,
        None => writeln!(out, "{}", paint.paint(UNTESTED, Tone::Muted))?,
    }

    section(&mut out, paint, "6. NETWORK SPEED ESTIMATION:")?;
    render_speed(&mut out, paint, report.speed.as_ref())?;

    section(&mut out, paint, "7. NETWORK TRAFFIC STATISTICS:")?;
    render_traffic(&mut out, report.traffic.as_ref())?;

    section(&mut out, paint, "8. DIAGNOSTIC SUMMARY:")?;
    for issue in &report.issues {
        writeln!(out, "{} {}", paint.paint("[ISSUE]", Tone::Warning), issue.message)?;
    }
    let tone = match (report.is_complete(), report.issue_count) {
        (false, _) => Tone::Muted,
        (true, 0) => Tone::Good,
        (true, _) => Tone::Warning,
    };
    writeln!(out, "{}", paint.paint(&report.status_line, tone))?;
    for recommendation in &report.recommendations {
        writeln!(out, "[RECOMMENDATION] {}", recommendation)?;
    }

    writeln!(out)?;
    writeln!(out, "Diagnostic completed in {} ms", report.duration_ms)?;
    writeln!(out)?;
    write!(out, "{}", paint.paint(REPORT_FOOTER, Tone::Heading))?;

    Ok(out)
}

fn section(out: &mut String, paint: &dyn Paint, title: &str) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", paint.paint(title, Tone::Heading))?;
    writeln!(out, "{}", "-".repeat(title.len() + 1))?;
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

fn render_connection(out: &mut String, paint: &dyn Paint, report: &DiagnosticReport) -> Result<()> {
    let Some(snapshot) = &report.connection else {
        writeln!(out, "[STATUS] {}", paint.paint(UNTESTED, Tone::Muted))?;
        return Ok(());
    };

    if !snapshot.connected {
        writeln!(out, "[STATUS] {}", paint.paint("DISCONNECTED (No active network)", Tone::Bad))?;
    } else {
        writeln!(out, "[STATUS] {}", paint.paint("CONNECTED", Tone::Good))?;
    }
    render_snapshot_details(out, paint, snapshot, report.vpn_active)?;

    if report.quick_mode {
        writeln!(out)?;
        writeln!(out, "{} VPN detected - running quick tests", paint.paint("[INFO]", Tone::Info))?;
    }
    Ok(())
}

fn render_snapshot_details(out: &mut String, paint: &dyn Paint, snapshot: &NetworkSnapshot, vpn_active: bool) -> Result<()> {
    let or_na = |value: Option<&String>| value.cloned().unwrap_or_else(|| "N/A".to_string());

    writeln!(out, "[TYPE] {}", snapshot.network_type.display_name())?;
    writeln!(out, "[SUBTYPE] {}", or_na(snapshot.subtype.as_ref()))?;
    writeln!(out, "[ROAMING] {}", yes_no(snapshot.capabilities.roaming))?;
    writeln!(out, "[PROVIDER] {}", or_na(snapshot.provider_name.as_ref()))?;
    writeln!(out, "[WIFI] {}", or_na(snapshot.wifi_ssid.as_ref()))?;
    if snapshot.ip_addresses.is_empty() {
        writeln!(out, "[IP] N/A")?;
    } else {
        let addresses: Vec<String> = snapshot.ip_addresses.iter().map(ToString::to_string).collect();
        writeln!(out, "[IP] {}", addresses.join(", "))?;
    }
    let vpn = if vpn_active {
        paint.paint("ACTIVE", Tone::Info)
    } else {
        "NOT ACTIVE".to_string()
    };
    writeln!(out, "[VPN] {}", vpn)?;

    if snapshot.connected {
        let caps = snapshot.capabilities;
        writeln!(out)?;
        writeln!(out, "[CAPABILITIES]")?;
        writeln!(out, "  - INTERNET: {}", yes_no(caps.internet))?;
        writeln!(out, "  - VALIDATED: {}", yes_no(caps.validated))?;
        writeln!(out, "  - NOT_METERED: {}", yes_no(!caps.metered))?;
        writeln!(out, "  - NOT_ROAMING: {}", yes_no(!caps.roaming))?;
    }
    Ok(())
}

fn site_status(site: &SiteCheck, reachable_label: &str, paint: &dyn Paint) -> String {
    if site.status == CheckStatus::Untested {
        return paint.paint(UNTESTED, Tone::Muted);
    }
    if let Some(verdict) = site.verdict.as_ref().filter(|v| v.is_blocked()) {
        return paint.paint(&format!("BLOCKED ({})", verdict.kind), Tone::Bad);
    }
    match site.reachable_latency_ms() {
        Some(ms) => paint.paint(&format!("{} ({:.0}ms)", reachable_label, ms), Tone::Good),
        None => paint.paint("UNREACHABLE", Tone::Warning),
    }
}

fn dns_status(check: &DnsServerCheck, paint: &dyn Paint) -> String {
    match (check.status, check.working) {
        (CheckStatus::Untested, _) => paint.paint(UNTESTED, Tone::Muted),
        (CheckStatus::Completed, true) => {
            let latency = check.lookup.as_ref().and_then(|l| l.latency_ms).unwrap_or(0.0);
            paint.paint(&format!("WORKING ({:.0}ms)", latency), Tone::Good)
        }
        (CheckStatus::Completed, false) => paint.paint("BLOCKED/FAILED", Tone::Bad),
    }
}

fn render_ping(out: &mut String, paint: &dyn Paint, host: &str, ping: Option<&PingStatistics>) -> Result<()> {
    writeln!(out, "Target: {}", host)?;
    let Some(ping) = ping else {
        writeln!(out, "{}", paint.paint(UNTESTED, Tone::Muted))?;
        return Ok(());
    };

    writeln!(
        out,
        "Packet loss: {:.1}% ({}/{} packets)",
        ping.loss_percent, ping.lost_packets, ping.total_packets
    )?;
    writeln!(out, "Average ping: {:.1} ms", ping.avg_ms)?;
    writeln!(out, "Jitter: {:.1} ms", ping.jitter_ms)?;
    writeln!(out, "Max ping: {:.1} ms", ping.max_ms)?;

    if ping.loss_percent > LOSS_WARNING_PERCENT {
        writeln!(out, "{} High packet loss detected!", paint.paint("[WARNING]", Tone::Warning))?;
    }
    if ping.avg_ms > LATENCY_WARNING_MS {
        writeln!(out, "{} High latency detected!", paint.paint("[WARNING]", Tone::Warning))?;
    }
    Ok(())
}

fn check_tag(check: &TargetCheck, blocked_tag: &str, paint: &dyn Paint) -> String {
    match check.status {
        CheckStatus::Untested => format!("[{}]", paint.paint(UNTESTED, Tone::Muted)),
        CheckStatus::Completed if check.is_blocked() => paint.paint(blocked_tag, Tone::Bad),
        CheckStatus::Completed => paint.paint("[OK]", Tone::Good),
    }
}

fn render_protocols(out: &mut String, paint: &dyn Paint, report: &ProtocolBlockingReport) -> Result<()> {
    for summary in &report.summaries {
        write!(out, "[{}] Ports: ", summary.protocol)?;
        if summary.tested_count == 0 {
            writeln!(out, "{}", paint.paint(UNTESTED, Tone::Muted))?;
            continue;
        }
        let tone = if summary.blocked_count == 0 { Tone::Good } else { Tone::Bad };
        write!(
            out,
            "{:.0}% blocked ({}/{}) {}",
            summary.blocked_percent,
            summary.blocked_count,
            summary.tested_count,
            paint.paint(&format!("[{}]", summary.severity.as_str()), tone)
        )?;
        if summary.untested_count > 0 {
            write!(out, " ({} untested)", summary.untested_count)?;
        }
        writeln!(out)?;
    }

    writeln!(out)?;
    writeln!(out, "Known VPN domains:")?;
    for check in &report.domain_checks {
        writeln!(out, "{} {}", check_tag(check, "[BLOCKED]", paint), check.target)?;
    }

    writeln!(out)?;
    writeln!(out, "TLS/SNI:")?;
    for check in &report.sni_checks {
        writeln!(out, "SNI {}: {}", check.target, check_tag(check, "[POSSIBLE BLOCK]", paint))?;
    }

    writeln!(out)?;
    let dpi = match report.dpi_detected {
        Some(true) => paint.paint("[DETECTED]", Tone::Bad),
        Some(false) => paint.paint("[NOT DETECTED]", Tone::Good),
        None => format!("[{}]", paint.paint(UNTESTED, Tone::Muted)),
    };
    writeln!(out, "DPI Detection: {}", dpi)?;
    if report.dpi_detected == Some(true) {
        writeln!(
            out,
            "{} ISP may be using DPI to block VPN traffic",
            paint.paint("[WARNING]", Tone::Warning)
        )?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "Overall blocking: {:.1}% ({}/{} tests)",
        report.overall_percent, report.overall_blocked, report.overall_tested
    )?;
    let headline = overall_headline(report.overall);
    let tone = match report.overall {
        crate::types::OverallBlocking::Critical => Tone::Bad,
        crate::types::OverallBlocking::Moderate => Tone::Warning,
        crate::types::OverallBlocking::Minimal => Tone::Good,
    };
    writeln!(out, "{}", paint.paint(headline, tone))?;
    if !report.recommendations.is_empty() {
        writeln!(out, "Recommendations:")?;
        for line in &report.recommendations {
            writeln!(out, "- {}", line)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Protocol advice:")?;
    for advice in &report.protocol_advice {
        let text = advice.advice.as_deref().unwrap_or(UNTESTED);
        writeln!(out, "{}: {}", advice.protocol, text)?;
    }
    Ok(())
}

fn render_speed(out: &mut String, paint: &dyn Paint, speed: Option<&SpeedEstimate>) -> Result<()> {
    let Some(speed) = speed else {
        writeln!(out, "{}", paint.paint(UNTESTED, Tone::Muted))?;
        return Ok(());
    };

    writeln!(out, "Download speed: ~{:.1} Mbps", speed.download_mbps)?;
    writeln!(out, "Upload speed: ~{:.1} Mbps", speed.upload_mbps)?;
    let basis = match speed.confidence {
        SpeedConfidence::Low => "rough estimate from round-trip time",
        SpeedConfidence::Medium => "timed transfer",
        SpeedConfidence::Unavailable => "speed request failed",
    };
    writeln!(out, "Confidence: {} ({})", speed.confidence.as_str(), basis)?;

    if speed.confidence != SpeedConfidence::Unavailable && speed.download_mbps < SPEED_WARNING_MBPS {
        writeln!(out, "{} Very slow connection!", paint.paint("[WARNING]", Tone::Warning))?;
    }
    Ok(())
}

fn render_traffic(out: &mut String, traffic: Option<&TrafficCounters>) -> Result<()> {
    let megabytes = |bytes: Option<u64>| match bytes {
        Some(bytes) => format!("{:.2} MB", bytes as f64 / BYTES_PER_MB),
        None => "N/A".to_string(),
    };

    let Some(traffic) = traffic else {
        writeln!(out, "Traffic counters: N/A")?;
        return Ok(());
    };
    writeln!(out, "Total received: {}", megabytes(Some(traffic.rx_bytes)))?;
    writeln!(out, "Total sent: {}", megabytes(Some(traffic.tx_bytes)))?;
    writeln!(out, "Mobile received: {}", megabytes(traffic.mobile_rx_bytes))?;
    writeln!(out, "Mobile sent: {}", megabytes(traffic.mobile_tx_bytes))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{BlockVerdict, ProbeOutcome, ProbeTarget};
    use crate::report::ReportBuilder;
    use crate::types::{NetworkType, VerdictKind};
    use std::time::Duration;

    fn site(target: &str, kind: VerdictKind, latency: Option<u64>) -> SiteCheck {
        let probe_target = ProbeTarget::host(target);
        let tcp = match latency {
            Some(ms) => ProbeOutcome::success(probe_target.clone(), Duration::from_millis(ms)),
            None => ProbeOutcome::failure(probe_target.clone(), crate::types::FailureKind::Timeout, None),
        };
        SiteCheck::completed(target, None, Some(tcp), None, BlockVerdict::new(probe_target, kind, "test"))
    }

    #[test]
    fn test_site_lines() {
        let report = ReportBuilder::new()
            .connection(NetworkSnapshot::connected(NetworkType::Wifi))
            .sites(vec![
                site("google.com", VerdictKind::NotBlocked, Some(23)),
                site("vk.com", VerdictKind::TimeoutBlock, None),
                SiteCheck::untested("github.com"),
            ])
            .build();
        let text = PlainFormatter.format_report(&report).unwrap();

        assert!(text.contains("[google.com     ] OK (23ms)"));
        assert!(text.contains("[vk.com         ] BLOCKED (TIMEOUT_BLOCK)"));
        assert!(text.contains("[github.com     ] UNTESTED"));
        assert!(text.starts_with(REPORT_HEADER));
        assert!(text.ends_with(REPORT_FOOTER));
    }

    #[test]
    fn test_missing_sections_render_untested() {
        let report = ReportBuilder::new().ping_host("8.8.8.8").build();
        let text = PlainFormatter.format_report(&report).unwrap();

        assert!(text.contains("[STATUS] UNTESTED"));
        assert!(text.contains("Target: 8.8.8.8\nUNTESTED"));
        assert!(text.contains("5. VPN PROTOCOL BLOCKING:\n--------------------------\nUNTESTED"));
        assert!(text.contains("Traffic counters: N/A"));
    }

    #[test]
    fn test_error_marker_comes_first() {
        let report = ReportBuilder::failed(&AppError::platform("snapshot missing"));
        let text = PlainFormatter.format_report(&report).unwrap();
        assert!(text.starts_with("[ERROR] Diagnostic failed: Platform error: snapshot missing\n"));
    }

    #[test]
    fn test_run_id_is_not_rendered() {
        let report = ReportBuilder::new().run_id("0f8e2b4c-run").build();
        let text = PlainFormatter.format_report(&report).unwrap();
        assert!(!text.contains("0f8e2b4c"));
    }

    #[test]
    fn test_speed_is_labelled() {
        let report = ReportBuilder::new()
            .speed(Some(SpeedEstimate {
                download_mbps: 12.5,
                upload_mbps: 3.125,
                confidence: SpeedConfidence::Low,
            }))
            .build();
        let text = PlainFormatter.format_report(&report).unwrap();
        assert!(text.contains("Download speed: ~12.5 Mbps"));
        assert!(text.contains("Confidence: low (rough estimate from round-trip time)"));
    }
}
