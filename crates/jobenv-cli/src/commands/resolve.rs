//! `jobenv resolve`

use jobenv_core::VariableEntry;
use serde::Serialize;
use std::path::Path;

use super::{Settings, resolve_context};

const HIDDEN: &str = "[MASKED]";

pub struct Options {
    pub environment: Option<String>,
    pub dependencies: bool,
    pub reveal: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct Row<'a> {
    key: &'a str,
    value: &'a str,
    public: bool,
    file: bool,
    raw: bool,
    masked: bool,
}

pub async fn run(settings: &Settings, context: &Path, options: Options) -> anyhow::Result<()> {
    let (_, variables) =
        resolve_context(settings, context, options.environment, options.dependencies).await?;
    let effective = variables.to_effective_map();

    if options.json {
        let rows: Vec<_> = effective
            .values()
            .map(|entry| Row {
                key: entry.key(),
                value: display_value(entry, options.reveal),
                public: entry.is_public(),
                file: entry.is_file(),
                raw: entry.is_raw(),
                masked: entry.is_masked(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for entry in effective.values() {
        let marker = if entry.is_file() { " (file)" } else { "" };
        println!(
            "{}={}{}",
            entry.key(),
            display_value(entry, options.reveal),
            marker
        );
    }
    Ok(())
}

fn display_value(entry: &VariableEntry, reveal: bool) -> &str {
    if entry.is_public() || reveal {
        entry.value()
    } else {
        HIDDEN
    }
}
