//! Parser for the human-oriented `zpool status` report.
//!
//! The report is a run of `header: value` lines whose headers are
//! right-aligned into a fixed-width column, e.g.
//!
//! ```text
//!   pool: tank
//!  state: ONLINE
//! status: One or more devices has experienced an unrecoverable error.  An
//!         attempt was made to correct the error.
//! config:
//!
//!         NAME        STATE     READ WRITE CKSUM
//!         tank        ONLINE       0     0     0
//!           sda       ONLINE       0     0     0
//!
//! errors: No known data errors
//! ```
//!
//! Lines without a header continue the previous header's value. Everything
//! between `config:` and `errors:` is the device tree, whose nesting is only
//! expressed through indentation.
//!
//! The parser never fails. Input that does not follow this layout yields a
//! [`Pool`] with blank fields.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, trace};

use crate::pool::{Container, Pool};

/// Width of the right-aligned header column, colon included.
pub const HEADER_WIDTH: usize = 7;

/// Indentation added per level of the device tree.
pub const INDENT_WIDTH: usize = 2;

/// Status reported when the tool prints no `status:` line.
pub const DEFAULT_STATUS: &str = "OK";

/// Action reported when the tool prints no `action:` line.
pub const DEFAULT_ACTION: &str = "No action needed";

#[allow(clippy::expect_used)]
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)%").expect("percent pattern must compile"));

/// How a single report line participates in the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Blank or single-character line, ignored.
    Skip,
    /// Starts a new `header: value` pair.
    Header,
    /// Continues the previous header's value, or is a device-tree row.
    Continuation,
}

/// Classify one line of the report.
///
/// A line is a header when a colon appears within its first
/// [`HEADER_WIDTH`] characters. This is the only place the fixed-width
/// assumption is made.
pub fn classify_line(line: &str) -> LineKind {
    if line.len() <= 1 {
        LineKind::Skip
    } else if header_column(line).contains(':') {
        LineKind::Header
    } else {
        LineKind::Continuation
    }
}

fn header_column(line: &str) -> &str {
    match line.char_indices().nth(HEADER_WIDTH) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}

fn is_header(line: &str, name: &str) -> bool {
    header_column(line).contains(name)
}

/// Split a trimmed header line into its key and value.
fn split_header(line: &str) -> (String, String) {
    let key = header_column(line)
        .split(':')
        .next()
        .unwrap_or_default()
        .to_owned();
    let value = line.get(key.len() + 2..).unwrap_or_default().to_owned();
    (key, value)
}

/// Converts raw status reports into [`Pool`] records.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusParser {
    dump_headers: bool,
}

impl StatusParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the intermediate header map of every parse at `info` level.
    ///
    /// Meant for diagnosing parser regressions against a new tool version.
    #[must_use]
    pub fn with_header_dump(mut self, enabled: bool) -> Self {
        self.dump_headers = enabled;
        self
    }

    /// Parse one report. Dataset, snapshot and pool property lists are left
    /// empty; they come from separate listings.
    pub fn parse(&self, raw: &str) -> Pool {
        let (headers, config) = collect_headers(raw);

        if self.dump_headers {
            info!("==== processed zpool status output ====");
            for (key, value) in &headers {
                info!(header = %key, value = %value, "parsed header");
            }
            info!(value = %config, "parsed config block");
            info!(value = %raw, "raw status output");
        }

        let field = |key: &str| headers.get(key).cloned().unwrap_or_default();
        let or_default = |key: &str, fallback: &str| {
            headers
                .get(key)
                .filter(|v| !v.is_empty())
                .map_or_else(|| fallback.to_owned(), Clone::clone)
        };

        let scan = field("scan");
        let (scanned, scan_paused) = scan_progress(&scan);

        Pool {
            name: field("pool"),
            state: field("state"),
            status: or_default("status", DEFAULT_STATUS),
            action: or_default("action", DEFAULT_ACTION),
            see: field("see"),
            scanned,
            scan_paused,
            scan,
            errors: field("errors"),
            raw: raw.to_owned(),
            containers: parse_config(&config),
            ..Pool::default()
        }
    }
}

/// Parse one report with header dumping disabled.
pub fn parse_pool_status(raw: &str) -> Pool {
    StatusParser::new().parse(raw)
}

/// Join continuation lines onto their headers and cut out the device tree.
fn collect_headers(raw: &str) -> (BTreeMap<String, String>, String) {
    let mut processed: Vec<String> = Vec::new();
    let mut config = String::new();
    let mut in_config = false;

    for line in raw.split('\n') {
        match classify_line(line) {
            LineKind::Skip => {}
            LineKind::Header => {
                let line = line.trim();
                if is_header(line, "config:") {
                    in_config = true;
                    continue;
                }
                if in_config && is_header(line, "errors:") {
                    in_config = false;
                }
                processed.push(line.to_owned());
            }
            LineKind::Continuation if in_config => {
                config.push_str(line);
                config.push('\n');
            }
            LineKind::Continuation => match processed.last_mut() {
                Some(last) => {
                    last.push('\n');
                    last.push_str(line.trim());
                }
                None => trace!(line = %line, "dropping continuation with no header"),
            },
        }
    }

    let headers = processed.iter().map(|l| split_header(l)).collect();
    (headers, config)
}

/// Extract the scan percentage and paused flag from the `scan:` text.
fn scan_progress(scan: &str) -> (f64, bool) {
    PERCENT
        .captures(scan)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map_or((0.0, false), |pct| (pct, scan.contains("paused")))
}

/// Turn the device-tree block into containers, skipping the column titles.
fn parse_config(block: &str) -> Vec<Container> {
    let mut base_indent: Option<usize> = None;

    block
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .skip(1)
        .filter_map(|line| {
            let base = *base_indent.get_or_insert_with(|| count_indent(line));
            parse_device_row(line, base)
        })
        .collect()
}

/// Parse one device-tree row.
///
/// `base_indent` is the indentation of the first row of the tree, which is
/// the pool's own row. Returns `None` for rows with no name.
pub fn parse_device_row(line: &str, base_indent: usize) -> Option<Container> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (&name, rest) = tokens.split_first()?;

    let column = |i: usize| tokens.get(i).map_or_else(String::new, |t| (*t).to_owned());

    // Cache devices print a bare name and stay at level 0.
    let level = if rest.is_empty() {
        0
    } else {
        count_indent(line).saturating_sub(base_indent) / INDENT_WIDTH
    };

    Some(Container {
        name: name.to_owned(),
        state: column(1),
        read: column(2),
        write: column(3),
        cksum: column(4),
        status: tokens.get(5..).map(|t| t.join(" ")).unwrap_or_default(),
        level,
    })
}

/// Leading spaces of `line`. Tabs are skipped without being counted.
fn count_indent(line: &str) -> usize {
    line.chars()
        .take_while(|&c| c == ' ' || c == '\t')
        .filter(|&c| c == ' ')
        .count()
}
