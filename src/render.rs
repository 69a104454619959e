//! Human-readable terminal output. Logs go to stderr through `tracing`;
//! everything here is written to stdout.

use std::fmt::Write as _;
use std::io::IsTerminal;

use crate::config::SinkSpec;
use crate::redact::{IPV4_PREFIX_LEN, IPV6_PREFIX_LEN};
use crate::report::ResultRecord;
use crate::sink::SinkReport;
use crate::types::{ProbeOutcome, SiteResult, TestPointMetadata};

const RULE: &str = "═══════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────";

/// ANSI escape codes; all empty when color is off.
#[derive(Debug, Clone, Copy, Default)]
pub struct Palette {
    pub red: &'static str,
    pub green: &'static str,
    pub yellow: &'static str,
    pub blue: &'static str,
    pub cyan: &'static str,
    pub reset: &'static str,
}

impl Palette {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn ansi() -> Self {
        Self {
            red: "\x1b[0;31m",
            green: "\x1b[0;32m",
            yellow: "\x1b[1;33m",
            blue: "\x1b[0;34m",
            cyan: "\x1b[0;36m",
            reset: "\x1b[0m",
        }
    }

    /// Color unless disabled by flag, by a non-empty `no_color_env`, or because stdout is not a terminal.
    pub fn detect(no_color_flag: bool, no_color_env: Option<&str>) -> Self {
        let env_off = no_color_env.is_some_and(|v| !v.is_empty());
        if no_color_flag || env_off || !std::io::stdout().is_terminal() {
            Self::plain()
        } else {
            Self::ansi()
        }
    }
}

pub fn format_test_point(meta: &TestPointMetadata, sinks: &[SinkSpec], c: &Palette) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  Test Point: {}", meta.test_point_id);
    match &meta.ipv4_prefix {
        Some(p) => {
            let _ = writeln!(out, "  IPv4: {p}/{IPV4_PREFIX_LEN} (redacted)");
        }
        None => out.push_str("  IPv4: Not detected\n"),
    }
    match &meta.ipv6_prefix {
        Some(p) => {
            let _ = writeln!(out, "  IPv6: {p}/{IPV6_PREFIX_LEN} (redacted)");
        }
        None => out.push_str("  IPv6: Not detected\n"),
    }
    let _ = writeln!(out, "  ASN: {}", meta.asn.as_deref().unwrap_or("Not detected"));
    let _ = writeln!(out, "  Location: {}", meta.location);

    if !sinks.is_empty() {
        let _ = writeln!(out, "\n{}Result submission enabled:{}", c.cyan, c.reset);
        for s in sinks {
            let _ = writeln!(out, "  • {s}");
        }
    }
    out
}

pub fn format_summary(record: &ResultRecord, c: &Palette) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}\n{}TEST RESULTS{}\n{RULE}\n", c.cyan, c.reset);
    let _ = writeln!(out, "  {}Score:{}        {} / 10", c.blue, c.reset, record.score);
    let _ = writeln!(
        out,
        "  {}IPv4:{}         {}",
        c.blue,
        c.reset,
        reachability(record.ipv4_success, record.ipv4_success_count, record.site_test_count, c)
    );
    let _ = writeln!(
        out,
        "  {}IPv6:{}         {}",
        c.blue,
        c.reset,
        reachability(record.ipv6_success, record.ipv6_success_count, record.site_test_count, c)
    );
    let _ = writeln!(out, "  {}Sites tested:{} {}", c.blue, c.reset, record.site_test_count);
    let _ = writeln!(out, "  {}Timestamp:{}    {}", c.blue, c.reset, record.timestamp_rfc3339());
    out
}

fn reachability(ok: bool, count: usize, total: usize, c: &Palette) -> String {
    if ok {
        format!("{}{count}/{total} sites reachable{}", c.green, c.reset)
    } else {
        format!("{}No connectivity{}", c.red, c.reset)
    }
}

/// Per-site table, column widths sized to the longest name.
pub fn format_site_table(sites: &[SiteResult], c: &Palette) -> String {
    let name_w = sites
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Site".len());
    let cell_w = 8usize;

    let mut out = String::new();
    let _ = writeln!(out, "{THIN_RULE}\n{}Per-site Results:{}\n{THIN_RULE}\n", c.cyan, c.reset);
    let _ = writeln!(out, "  {:<name_w$}  {:<cell_w$}  {:<cell_w$}", "Site", "IPv4", "IPv6");
    let _ = writeln!(out, "  {:-<name_w$}  {:-<cell_w$}  {:-<cell_w$}", "", "", "");
    for s in sites {
        let _ = writeln!(
            out,
            "  {:<name_w$}  {}  {}",
            s.name,
            cell(&s.ipv4, cell_w, c),
            cell(&s.ipv6, cell_w, c)
        );
    }
    out
}

/// `✓   42ms` or `✗`, padded to `width` visible characters.
fn cell(o: &ProbeOutcome, width: usize, c: &Palette) -> String {
    let (mark, color, text) = match o.latency_ms() {
        Some(ms) if o.success => ("✓", c.green, format!(" {ms:>4}ms")),
        _ => ("✗", c.red, String::new()),
    };
    let visible = 1 + text.chars().count();
    let pad = width.saturating_sub(visible);
    format!("{color}{mark}{}{text}{}", c.reset, " ".repeat(pad))
}

/// One-line assessment comparing per-family success counts.
pub fn verdict(record: &ResultRecord, c: &Palette) -> Option<String> {
    let v4 = record.ipv4_success_count;
    let v6 = record.ipv6_success_count;
    if v6 == 0 && v4 > 0 {
        Some(format!(
            "{}⚠ No IPv6 connectivity detected. Your network may be IPv4-only.{}",
            c.yellow, c.reset
        ))
    } else if v6 > 0 && v6 < v4 {
        Some(format!(
            "{}⚠ Partial IPv6 connectivity. Some sites may not have IPv6 or your connection is unstable.{}",
            c.yellow, c.reset
        ))
    } else if v6 > 0 {
        Some(format!("{}✓ Good IPv6 connectivity!{}", c.green, c.reset))
    } else {
        None
    }
}

pub fn format_submissions(reports: &[SinkReport], c: &Palette) -> String {
    let mut out = String::new();
    for r in reports {
        let _ = match &r.result {
            Ok(receipt) => writeln!(out, "{}✓ {}: {receipt}{}", c.green, r.sink, c.reset),
            Err(e) => writeln!(out, "{}✗ {}: {e}{}", c.red, r.sink, c.reset),
        };
    }
    out
}

pub fn print_report(record: &ResultRecord, verbose: bool, c: &Palette) {
    println!("\n{}✓ Tests completed!{}\n", c.green, c.reset);
    print!("{}", format_summary(record, c));
    if verbose {
        println!();
        print!("{}", format_site_table(&record.sites, c));
    }
    println!("\n{RULE}\n");
    if let Some(line) = verdict(record, c) {
        println!("{line}");
    }
}
