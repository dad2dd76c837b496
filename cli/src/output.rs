use anyhow::Result;
use clap::ValueEnum;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
    Csv,
}

pub struct Output {
    format: Format,
}

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.to_vec());
    table
}

impl Output {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Print a list. `row` renders one item for table and CSV output; JSON uses `Serialize`.
    pub fn rows<T, F>(&self, headers: &[&str], items: &[T], row: F) -> Result<()>
    where
        T: Serialize,
        F: Fn(&T) -> Vec<String>,
    {
        match self.format {
            Format::Json => println!("{}", serde_json::to_string_pretty(items)?),
            Format::Csv => {
                let mut writer = csv::Writer::from_writer(std::io::stdout());
                writer.write_record(headers)?;
                for item in items {
                    writer.write_record(row(item))?;
                }
                writer.flush()?;
            }
            Format::Table => {
                if items.is_empty() {
                    println!("(none)");
                    return Ok(());
                }
                let mut table = table(headers);
                for item in items {
                    table.add_row(row(item));
                }
                println!("{table}");
            }
        }
        Ok(())
    }

    /// Print a single record as key/value pairs.
    pub fn record<T: Serialize>(&self, value: &T, pairs: Vec<(&str, String)>) -> Result<()> {
        match self.format {
            Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
            Format::Csv => {
                let mut writer = csv::Writer::from_writer(std::io::stdout());
                writer.write_record(pairs.iter().map(|(k, _)| *k))?;
                writer.write_record(pairs.iter().map(|(_, v)| v.as_str()))?;
                writer.flush()?;
            }
            Format::Table => {
                let mut table = table(&["Field", "Value"]);
                for (key, value) in pairs {
                    table.add_row(vec![key.to_string(), value]);
                }
                println!("{table}");
            }
        }
        Ok(())
    }

    /// Confirmation line; suppressed for machine-readable formats.
    pub fn done(&self, message: &str) {
        if self.format == Format::Table {
            println!("{}", message);
        } else {
            log::info!("{}", message);
        }
    }
}

pub fn when(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
