//! Output formatters for job results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use jetsql_proto::Value;

use crate::job::JobOutput;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

pub trait Formatter: Send + Sync {
    /// Format the rows of a finished job.
    fn format_output(&self, output: &JobOutput) -> String;

    /// Format the result of an insert job.
    fn format_insert(&self, target: &str, rows: usize) -> String;

    fn format_error(&self, error: &str) -> String;
}

pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_output(&self, output: &JobOutput) -> String {
        if output.rows.is_empty() {
            return "No results".to_string();
        }

        let mut table = Table::new();
        table.set_header(output.columns.iter().map(Cell::new).collect::<Vec<_>>());
        for row in &output.rows {
            table.add_row(
                row.values()
                    .iter()
                    .map(|value| Cell::new(format_value(value)))
                    .collect::<Vec<_>>(),
            );
        }
        format!("{}\n{} row(s)", table, output.rows.len())
    }

    fn format_insert(&self, target: &str, rows: usize) -> String {
        format!("{} row(s) written to {}", rows, target)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_output(&self, output: &JobOutput) -> String {
        let rows: Vec<serde_json::Value> = output
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (name, value) in output.columns.iter().zip(row.values()) {
                    obj.insert(name.clone(), value_to_json(value));
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_insert(&self, target: &str, rows: usize) -> String {
        serde_json::json!({
            "target": target,
            "rows": rows
        })
        .to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({
            "error": error
        })
        .to_string()
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_output(&self, output: &JobOutput) -> String {
        let mut out = output.columns.join(",");
        out.push('\n');
        for row in &output.rows {
            let cells: Vec<String> = row.values().iter().map(format_value_csv).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    fn format_insert(&self, target: &str, rows: usize) -> String {
        format!("target,rows\n\"{}\",{}", escape_csv(target), rows)
    }

    fn format_error(&self, error: &str) -> String {
        format!("error\n\"{}\"", escape_csv(error))
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_value_csv(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => format!("\"{}\"", escape_csv(s)),
        _ => format_value(value),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int32(i) => serde_json::Value::Number((*i).into()),
        Value::Int64(i) | Value::Timestamp(i) => serde_json::Value::Number((*i).into()),
        Value::Float32(f) => serde_json::Number::from_f64(*f as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Float64(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::Array(
            b.iter().map(|byte| serde_json::Value::Number((*byte).into())).collect(),
        ),
    }
}

fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jetsql_proto::{row, Row};

    fn output() -> JobOutput {
        JobOutput {
            columns: vec!["v".to_string(), "this".to_string()],
            rows: vec![
                row![1i32, "value-1"],
                Row::new(vec![Value::Int32(2), Value::Null]),
            ],
            sink: None,
        }
    }

    #[test]
    fn test_table_format() {
        let text = TableFormatter.format_output(&output());
        assert!(text.contains("value-1"));
        assert!(text.contains("NULL"));
        assert!(text.ends_with("2 row(s)"));
    }

    #[test]
    fn test_json_format() {
        let text = JsonFormatter.format_output(&output());
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["this"], "value-1");
        assert!(parsed[1]["this"].is_null());
    }

    #[test]
    fn test_csv_format() {
        let text = CsvFormatter.format_output(&output());
        assert_eq!(text, "v,this\n1,\"value-1\"\n2,\n");
    }

    #[test]
    fn test_empty_table() {
        let empty = JobOutput {
            columns: vec![],
            rows: vec![],
            sink: None,
        };
        assert_eq!(TableFormatter.format_output(&empty), "No results");
    }
}
