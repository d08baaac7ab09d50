use super::{
    color_enabled, paint, truncate, Align, BoxLayout, LineKind, DEFAULT_WIDTH, MAX_LINES_PER_UNIT,
};
use anyhow::Result;
use trawl_common::{FactTable, FactValue, Report, ReportOptions, ResultStream};

/// Boxed text report for a terminal
///
/// With `live` set, each box is printed as its result arrives. When debug
/// logging is on the whole report is printed once at the end instead, so log
/// lines do not interleave with it.
#[derive(Default)]
pub struct StdOut;

struct Lines {
    rendered: Vec<String>,
    live: bool,
    color: bool,
}

impl Lines {
    fn add(&mut self, text: String, kind: LineKind) {
        if self.live {
            if self.color {
                println!("{}", paint(&text, kind));
            } else {
                println!("{}", text);
            }
        }
        self.rendered.push(text);
    }
}

impl Report for StdOut {
    fn run(
        &mut self,
        facts: &FactTable,
        stream: &mut ResultStream,
        options: &ReportOptions,
    ) -> Result<String> {
        let width = facts
            .get("TerminalWidth")
            .and_then(FactValue::as_i64)
            .filter(|w| *w > 0)
            .map(|w| w as usize)
            .or(options.width)
            .unwrap_or(DEFAULT_WIDTH);
        let layout = BoxLayout::new(width);

        let truncating = facts
            .get("truncate")
            .map(FactValue::is_truthy)
            .unwrap_or(options.truncate);
        let max_lines = truncating.then(|| options.max_lines_per_unit.unwrap_or(MAX_LINES_PER_UNIT));
        let debug = facts.flag("debug");

        let mut lines = Lines {
            rendered: Vec::new(),
            live: options.live && !debug,
            color: options.live && color_enabled(facts),
        };

        lines.add(layout.separator(), LineKind::Border);
        lines.add(layout.middle("Report", Align::Center), LineKind::Title);
        lines.add(layout.separator(), LineKind::Border);

        loop {
            let tuple = stream.recv()?;
            if tuple.is_eof() {
                break;
            }

            let output = tuple.output.unwrap_or_default();
            let output = if truncating {
                truncate(&output, Some(layout.inner_width()), max_lines)
            } else {
                output
            };

            lines.add(
                layout.middle(&format!("Unit: {}", tuple.name), Align::Left),
                LineKind::UnitName,
            );
            lines.add(layout.separator(), LineKind::Border);
            lines.add(layout.middle(&output, Align::Left), LineKind::Body);
            lines.add(layout.separator(), LineKind::Border);
        }

        let report = lines.rendered.join("\n");
        if options.live && debug {
            println!("{}", report);
        }
        Ok(report)
    }
}
