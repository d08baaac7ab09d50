//! Built-in Reports and the boxed text layout they share

pub mod json;
pub mod stdout;

pub use json::{Collected, Json};
pub use stdout::StdOut;

use owo_colors::OwoColorize;
use std::io::IsTerminal;
use tracing::warn;
use trawl_common::{ColorMode, FactTable};

/// Columns taken by the box borders around unit output. Units that want to
/// avoid truncation can size their lines to the terminal width minus this.
pub const TABLE_FORMATTING_WIDTH: usize = 4;

/// Report width when the terminal width is unknown
pub const DEFAULT_WIDTH: usize = 150;

/// Line cap per unit while truncating
pub const MAX_LINES_PER_UNIT: usize = 20;

const MIN_WIDTH: usize = TABLE_FORMATTING_WIDTH + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

/// Fixed-width box drawing
#[derive(Debug, Clone, Copy)]
pub struct BoxLayout {
    width: usize,
}

impl BoxLayout {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(MIN_WIDTH),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Room for text inside the borders
    pub fn inner_width(&self) -> usize {
        self.width - TABLE_FORMATTING_WIDTH
    }

    pub fn separator(&self) -> String {
        format!("+{}+", "-".repeat(self.width - 2))
    }

    /// `text` as bordered rows; lines too long for the box are wrapped
    pub fn middle(&self, text: &str, align: Align) -> String {
        let inner = self.inner_width();
        let mut rows = Vec::new();
        let lines: Vec<&str> = if text.is_empty() {
            vec![""]
        } else {
            text.lines().collect()
        };

        for line in lines {
            for piece in textwrap::wrap(line, inner) {
                let row = match align {
                    Align::Left => format!("| {:<inner$} |", piece, inner = inner),
                    Align::Center => format!("| {:^inner$} |", piece, inner = inner),
                };
                rows.push(row);
            }
        }
        rows.join("\n")
    }
}

/// Cap `text` at `max_height` lines and `max_width` columns, appending a note
/// for each kind of cut that was made.
pub fn truncate(text: &str, max_width: Option<usize>, max_height: Option<usize>) -> String {
    let mut text = text.to_string();

    if let Some(max_height) = max_height {
        let lines: Vec<&str> = text.lines().collect();
        let line_count = lines.len();
        if line_count > max_height {
            let mut kept = lines[..max_height].join("\n");
            kept.push_str(&format!(
                "\nTruncated line count from {} to {}. Run with --no-truncate to stop truncation.",
                line_count, max_height
            ));
            text = kept;
        }
    }

    if let Some(max_width) = max_width {
        let long_lines = text
            .lines()
            .filter(|line| line.chars().count() > max_width)
            .count();
        if long_lines > 0 {
            let mut cut: String = text
                .lines()
                .map(|line| line.chars().take(max_width).collect::<String>())
                .collect::<Vec<_>>()
                .join("\n");
            cut.push_str(&format!(
                "\nTruncated {} lines to a width of {}. Run with --no-truncate to stop truncation.",
                long_lines, max_width
            ));
            text = cut;
        }
    }

    text
}

/// Whether printed report lines get terminal colors
pub fn color_enabled(facts: &FactTable) -> bool {
    let mode = match facts.get("color") {
        Some(value) => ColorMode::parse(&value.to_string()).unwrap_or_else(|e| {
            warn!("{}", e);
            ColorMode::Auto
        }),
        None => ColorMode::Auto,
    };
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    }
}

/// What a report line is, for coloring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Border,
    Title,
    UnitName,
    Body,
}

pub fn paint(text: &str, kind: LineKind) -> String {
    match kind {
        LineKind::Border => text.dimmed().to_string(),
        LineKind::Title => text.bold().to_string(),
        LineKind::UnitName => text.bright_cyan().to_string(),
        LineKind::Body => text.to_string(),
    }
}
