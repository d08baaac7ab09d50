use anyhow::Result;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use trawl_common::{FactTable, Report, ReportOptions, ResultStream};

/// Results as one JSON object, printed when run live
#[derive(Default)]
pub struct Json;

impl Report for Json {
    fn run(
        &mut self,
        _facts: &FactTable,
        stream: &mut ResultStream,
        options: &ReportOptions,
    ) -> Result<String> {
        let text = render(stream)?;
        if options.live {
            println!("{}", text);
        }
        Ok(text)
    }
}

/// Results as one JSON object, never printed
#[derive(Default)]
pub struct Collected;

impl Report for Collected {
    fn run(
        &mut self,
        _facts: &FactTable,
        stream: &mut ResultStream,
        _options: &ReportOptions,
    ) -> Result<String> {
        render(stream)
    }
}

/// Drain the stream into name -> output with sorted keys and four-space
/// indentation
fn render(stream: &mut ResultStream) -> Result<String> {
    let results = stream.collect_map()?;

    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    results.serialize(&mut serializer)?;
    Ok(String::from_utf8(buf)?)
}
